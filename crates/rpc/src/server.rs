use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use cardio_model::Classifier;
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::predict::{handle_predict_batch, handle_predict_individual};

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
pub const DEFAULT_MAX_BATCH_ROWS: usize = 100_000;

pub type SharedState = Arc<AppState>;

/// Commit the crate was built from, when the build could determine it.
pub fn git_commit_hash() -> Option<&'static str> {
    option_env!("GIT_COMMIT_HASH")
}

/// Counters behind `/metrics`.
#[derive(Debug, Default)]
pub struct PredictionStats {
    individual: AtomicU64,
    batch: AtomicU64,
    rows_scored: AtomicU64,
    failures: AtomicU64,
}

impl PredictionStats {
    pub fn record_individual(&self, rows: usize) {
        self.individual.fetch_add(1, Ordering::Relaxed);
        self.rows_scored.fetch_add(rows as u64, Ordering::Relaxed);
    }

    pub fn record_batch(&self, rows: usize) {
        self.batch.fetch_add(1, Ordering::Relaxed);
        self.rows_scored.fetch_add(rows as u64, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            individual: self.individual.load(Ordering::Relaxed),
            batch: self.batch.load(Ordering::Relaxed),
            rows_scored: self.rows_scored.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub individual: u64,
    pub batch: u64,
    pub rows_scored: u64,
    pub failures: u64,
}

/// Everything a request handler can see. The classifier is loaded once at
/// startup and shared read-only between requests.
#[derive(Clone)]
pub struct AppState {
    pub classifier: Arc<Classifier>,
    pub service_name: String,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub max_batch_rows: usize,
    pub start_time: Instant,
    pub req_count: Arc<AtomicUsize>,
    pub stats: Arc<PredictionStats>,
}

impl AppState {
    pub fn new(classifier: Classifier, upload_dir: impl Into<PathBuf>) -> Self {
        Self {
            classifier: Arc::new(classifier),
            service_name: env!("CARGO_PKG_NAME").to_string(),
            upload_dir: upload_dir.into(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            max_batch_rows: DEFAULT_MAX_BATCH_ROWS,
            start_time: Instant::now(),
            req_count: Arc::new(AtomicUsize::new(0)),
            stats: Arc::new(PredictionStats::default()),
        }
    }

    pub fn with_limits(mut self, max_upload_bytes: usize, max_batch_rows: usize) -> Self {
        self.max_upload_bytes = max_upload_bytes;
        self.max_batch_rows = max_batch_rows;
        self
    }

    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = name.into();
        self
    }

    pub(crate) fn record_request(&self) -> u64 {
        self.req_count.fetch_add(1, Ordering::Relaxed) as u64 + 1
    }

    fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

#[derive(Serialize, Deserialize)]
struct ModelSummary {
    name: String,
    hash: String,
    classes: Vec<String>,
    features: Vec<String>,
}

#[derive(Serialize, Deserialize)]
struct HealthResponse {
    status: String,
    service: String,
    model: ModelSummary,
    uptime_secs: u64,
    req_total: u64,
}

#[derive(Serialize, Deserialize)]
struct VersionResponse {
    service: String,
    version: String,
    commit: Option<String>,
}

/// Serve until ctrl-c.
pub async fn start_server(state: AppState, addr: &str) -> Result<()> {
    let shared = Arc::new(state);
    let app = build_router(shared.clone());
    let listener = bind_listener(addr).await?;
    let local = listener
        .local_addr()
        .context("failed to read bound address")?;
    info!(
        "prediction server listening on {local} (model {} {})",
        shared.classifier.name(),
        shared.classifier.hash_hex()
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("prediction server terminated unexpectedly")
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received, draining connections");
}

async fn bind_listener(addr: &str) -> Result<tokio::net::TcpListener> {
    if let Ok(socket_addr) = addr.parse::<SocketAddr>() {
        tokio::net::TcpListener::bind(socket_addr)
            .await
            .with_context(|| format!("failed to bind listener on {socket_addr}"))
    } else {
        tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind listener on {addr}"))
    }
}

pub fn build_router(state: SharedState) -> Router {
    let body_limit = state.max_upload_bytes;
    Router::new()
        .route("/health", get(handle_health))
        .route("/version", get(handle_version))
        .route("/metrics", get(handle_metrics))
        .route("/predict/individual", post(handle_predict_individual))
        .route("/predict/batch", post(handle_predict_batch))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn handle_health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let req_total = state.record_request();
    let classifier = &state.classifier;
    Json(HealthResponse {
        status: "ok".to_string(),
        service: state.service_name.clone(),
        model: ModelSummary {
            name: classifier.name().to_string(),
            hash: classifier.hash_hex().to_string(),
            classes: classifier.classes().to_vec(),
            features: classifier
                .feature_names()
                .into_iter()
                .map(str::to_string)
                .collect(),
        },
        uptime_secs: state.uptime_seconds(),
        req_total,
    })
}

async fn handle_version(State(state): State<SharedState>) -> Json<VersionResponse> {
    state.record_request();
    Json(VersionResponse {
        service: state.service_name.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        commit: git_commit_hash().map(str::to_string),
    })
}

async fn handle_metrics(State(state): State<SharedState>) -> Response {
    let req_total = state.record_request();
    let uptime = state.uptime_seconds();
    let stats = state.stats.snapshot();

    let mut metrics =
        "# HELP cardio_http_requests_total Total number of HTTP requests handled\n".to_string();
    metrics.push_str("# TYPE cardio_http_requests_total counter\n");
    metrics.push_str(&format!("cardio_http_requests_total {req_total}\n"));
    metrics.push_str("# HELP cardio_uptime_seconds Uptime of the server in seconds\n");
    metrics.push_str("# TYPE cardio_uptime_seconds gauge\n");
    metrics.push_str(&format!("cardio_uptime_seconds {uptime}\n"));
    metrics.push_str("# HELP cardio_predictions_total Successful prediction requests by endpoint\n");
    metrics.push_str("# TYPE cardio_predictions_total counter\n");
    metrics.push_str(&format!(
        "cardio_predictions_total{{endpoint=\"individual\"}} {}\n",
        stats.individual
    ));
    metrics.push_str(&format!(
        "cardio_predictions_total{{endpoint=\"batch\"}} {}\n",
        stats.batch
    ));
    metrics.push_str("# HELP cardio_rows_scored_total Rows labelled across all requests\n");
    metrics.push_str("# TYPE cardio_rows_scored_total counter\n");
    metrics.push_str(&format!("cardio_rows_scored_total {}\n", stats.rows_scored));
    metrics.push_str("# HELP cardio_prediction_failures_total Prediction requests that returned an error\n");
    metrics.push_str("# TYPE cardio_prediction_failures_total counter\n");
    metrics.push_str(&format!(
        "cardio_prediction_failures_total {}\n",
        stats.failures
    ));

    (
        [(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; version=0.0.4"),
        )],
        metrics,
    )
        .into_response()
}
