//! HTTP surface of the heart-disease classifier.
//!
//! `POST /predict/individual` scores one JSON record and
//! `POST /predict/batch` scores every row of an uploaded CSV file. Both
//! answer `{"Labels": [...]}`.

pub mod error;
pub mod predict;
pub mod server;
pub mod upload;


pub use error::{ApiError, ErrorResponse, INVALID_FORMAT_DETAIL};
pub use predict::PredictionResponse;
pub use server::{
    build_router, git_commit_hash, start_server, AppState, PredictionStats, SharedState,
};
