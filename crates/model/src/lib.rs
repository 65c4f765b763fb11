//! Heart-disease classifier core
//!
//! Turns validated input into tables and tables into class labels:
//!
//! - `schema`: the single-record request schema and its validation
//! - `table`: tabular batches built from records or CSV documents
//! - `classifier`: the loaded model artifact and its `predict` operation
//! - `gbdt`: integer-only Gradient Boosted Decision Tree evaluator
//! - `fixed`: decimal text to fixed-point conversion
//! - `serde_canon`: canonical JSON and blake3 hashing of artifacts

pub mod classifier;
pub mod errors;
pub mod fixed;
pub mod gbdt;
pub mod schema;
pub mod serde_canon;
pub mod table;

pub use classifier::{Classifier, FeatureSpec, ModelArtifact};
pub use errors::{LoadError, PredictionError};
pub use schema::{validate_record, FieldIssue, Record, ValidationError, RECORD_FIELDS};
pub use table::{Table, TableError, Value};
