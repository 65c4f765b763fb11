use std::path::Path;

use axum::body::Bytes;
use axum::extract::multipart::{Multipart, MultipartError, MultipartRejection};
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use cardio_model::{validate_record, Classifier, FieldIssue, Table, ValidationError};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::server::SharedState;
use crate::upload::{is_csv_filename, StagedUpload};

/// Multipart field that carries the batch file.
pub const UPLOAD_FIELD: &str = "file";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictionResponse {
    #[serde(rename = "Labels")]
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
enum PredictionKind {
    Individual,
    Batch,
}

#[instrument(skip_all, fields(request_id = %Uuid::new_v4()))]
pub async fn handle_predict_individual(
    State(state): State<SharedState>,
    body: Bytes,
) -> Result<Json<PredictionResponse>, ApiError> {
    state.record_request();
    let result = predict_individual(&state.classifier, &body);
    finish(&state, PredictionKind::Individual, result)
}

fn predict_individual(classifier: &Classifier, body: &[u8]) -> Result<Vec<String>, ApiError> {
    let json: serde_json::Value = serde_json::from_slice(body)
        .map_err(|err| ValidationError::json_decode(format!("invalid JSON body: {err}")))?;
    let record = validate_record(&json)?;
    let table = Table::from_records([record]);
    Ok(classifier.predict(&table)?)
}

#[instrument(skip_all, fields(request_id = %Uuid::new_v4()))]
pub async fn handle_predict_batch(
    State(state): State<SharedState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictionResponse>, ApiError> {
    state.record_request();
    let result = predict_batch(&state, multipart).await;
    finish(&state, PredictionKind::Batch, result)
}

async fn predict_batch(
    state: &SharedState,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Vec<String>, ApiError> {
    let mut multipart = multipart.map_err(|err| {
        debug!("request is not multipart: {err}");
        missing_upload()
    })?;

    let bytes = loop {
        let field = multipart
            .next_field()
            .await
            .map_err(|err| multipart_error(state, err))?
            .ok_or_else(missing_upload)?;

        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        // A plain form value under the upload field is not a file at all.
        let Some(file_name) = field.file_name().map(str::to_owned) else {
            return Err(missing_upload());
        };
        if !is_csv_filename(Some(&file_name)) {
            return Err(ApiError::invalid_format());
        }
        debug!(file_name = %file_name, "receiving batch upload");
        break field
            .bytes()
            .await
            .map_err(|err| multipart_error(state, err))?;
    };

    let classifier = state.classifier.clone();
    let upload_dir = state.upload_dir.clone();
    let max_rows = state.max_batch_rows;
    tokio::task::spawn_blocking(move || score_upload(&classifier, &upload_dir, &bytes, max_rows))
        .await
        .map_err(|err| ApiError::internal(format!("batch worker failed: {err}")))?
}

/// Stage the upload, read it back as a table, remove it, then score it.
fn score_upload(
    classifier: &Classifier,
    upload_dir: &Path,
    bytes: &[u8],
    max_rows: usize,
) -> Result<Vec<String>, ApiError> {
    let staged = StagedUpload::create(upload_dir, bytes)
        .map_err(|err| ApiError::internal(format!("failed to stage upload: {err}")))?;
    let parsed = Table::from_csv_path(staged.path(), max_rows);
    if let Err(err) = staged.discard() {
        warn!("failed to remove staged upload: {err}");
    }

    let table = parsed?;
    debug!(rows = table.num_rows(), columns = table.columns().len(), "parsed batch");
    Ok(classifier.predict(&table)?)
}

fn multipart_error(state: &SharedState, err: MultipartError) -> ApiError {
    let status = err.status();
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::payload_too_large(format!(
            "Upload exceeds the {} byte limit",
            state.max_upload_bytes
        ))
    } else {
        ApiError::new(status, err.body_text())
    }
}

fn missing_upload() -> ApiError {
    ValidationError::single(FieldIssue::missing(UPLOAD_FIELD)).into()
}

fn finish(
    state: &SharedState,
    kind: PredictionKind,
    result: Result<Vec<String>, ApiError>,
) -> Result<Json<PredictionResponse>, ApiError> {
    match result {
        Ok(labels) => {
            match kind {
                PredictionKind::Individual => state.stats.record_individual(labels.len()),
                PredictionKind::Batch => state.stats.record_batch(labels.len()),
            }
            info!(kind = ?kind, rows = labels.len(), "prediction served");
            Ok(Json(PredictionResponse { labels }))
        }
        Err(err) => {
            state.stats.record_failure();
            if err.status().is_server_error() {
                error!(kind = ?kind, status = %err.status(), detail = %err.detail(), "prediction failed");
            } else {
                warn!(kind = ?kind, status = %err.status(), detail = %err.detail(), "prediction rejected");
            }
            Err(err)
        }
    }
}
