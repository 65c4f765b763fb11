//! JSON error responses.
//!
//! Every failure is rendered as `{"detail": ...}` where `detail` is either a
//! message or, for request validation failures, the list of field issues.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use cardio_model::{PredictionError, TableError, ValidationError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Detail returned when a batch upload is not a CSV file.
pub const INVALID_FORMAT_DETAIL: &str = "Invalid file format. Only CSV Files accepted.";

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: Value,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: Value,
}

impl ApiError {
    pub fn new<S: Into<String>>(status: StatusCode, message: S) -> Self {
        Self {
            status,
            detail: Value::String(message.into()),
        }
    }

    pub fn bad_request<S: Into<String>>(message: S) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unprocessable<S: Into<String>>(message: S) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, message)
    }

    pub fn payload_too_large<S: Into<String>>(message: S) -> Self {
        Self::new(StatusCode::PAYLOAD_TOO_LARGE, message)
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn invalid_format() -> Self {
        Self::bad_request(INVALID_FORMAT_DETAIL)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn detail(&self) -> &Value {
        &self.detail
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let payload = Json(ErrorResponse {
            detail: self.detail,
        });
        (self.status, payload).into_response()
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        match serde_json::to_value(&err.issues) {
            Ok(detail) => Self {
                status: StatusCode::UNPROCESSABLE_ENTITY,
                detail,
            },
            Err(_) => Self::unprocessable(err.to_string()),
        }
    }
}

impl From<TableError> for ApiError {
    fn from(err: TableError) -> Self {
        match err {
            TableError::TooManyRows { .. } => Self::payload_too_large(err.to_string()),
            TableError::Io(io) => Self::internal(format!("failed to read staged upload: {io}")),
            other => Self::bad_request(other.to_string()),
        }
    }
}

impl From<PredictionError> for ApiError {
    fn from(err: PredictionError) -> Self {
        Self::unprocessable(format!("Batch does not match the model inputs: {err}"))
    }
}
