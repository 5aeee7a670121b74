mod error;
mod routes;

pub use error::ApiError;

use std::path::PathBuf;
use std::sync::Arc;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;
use crate::catalog::Catalog;
use crate::publish::Publisher;
use crate::segment::{JobRegistry, SegmentProcessor};
use crate::storage::ObjectStorage;

pub struct AppState {
    pub storage: Arc<dyn ObjectStorage>,
    pub registry: Arc<JobRegistry>,
    pub processor: Arc<SegmentProcessor>,
    pub publisher: Arc<Publisher>,
    pub catalog: Arc<dyn Catalog>,
    pub work_root: PathBuf,
    /// Base URL prefixed onto storage keys in returned preview URLs.
    pub public_base: String,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/upload", post(routes::upload))
        .route("/preview", post(routes::preview))
        .route("/status/{job_id}", get(routes::status))
        .route("/process", post(routes::process))
        .layer(DefaultBodyLimit::disable())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
