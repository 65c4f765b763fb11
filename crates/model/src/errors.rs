//! Error types for loading and evaluating the classifier

use std::path::PathBuf;

use thiserror::Error;

use crate::gbdt::BoosterError;
use crate::serde_canon::CanonicalError;

/// The model artifact could not be turned into a usable classifier.
///
/// Raised once at start-up; the process cannot serve without a model.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("model artifact not found at {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read model artifact {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("model artifact is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid model artifact: {0}")]
    Invalid(String),

    #[error("invalid booster {index}: {source}")]
    Booster {
        index: usize,
        #[source]
        source: BoosterError,
    },

    #[error("model hash mismatch: expected {expected}, found {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error(transparent)]
    Canonical(#[from] CanonicalError),
}

/// A table could not be scored because it does not fit the model's inputs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PredictionError {
    #[error("missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("row {row}, column '{column}': {message}")]
    InvalidValue {
        row: usize,
        column: String,
        message: String,
    },
}

pub type Result<T, E = LoadError> = std::result::Result<T, E>;
