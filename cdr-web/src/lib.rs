//! cdr-web library interface
//!
//! HTTP front end over the run orchestrator. Exposed as a library so the
//! router can be exercised in integration tests.

pub mod api;
pub mod error;

pub use crate::error::{ApiError, ApiResult};

use axum::extract::DefaultBodyLimit;
use axum::Router;
use cdr_refine::{Orchestrator, RefinementConfig};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Run registry; one active run at a time
    pub orchestrator: Arc<Orchestrator>,
    /// Uploaded inputs, one sub-directory per request
    pub upload_root: PathBuf,
    /// Base refinement settings; coordinate columns come from each request
    pub refinement: Arc<RefinementConfig>,
    pub max_upload_bytes: usize,
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        upload_root: PathBuf,
        refinement: RefinementConfig,
        max_upload_bytes: usize,
    ) -> Self {
        Self {
            orchestrator,
            upload_root,
            refinement: Arc::new(refinement),
            max_upload_bytes,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let limit = state.max_upload_bytes;

    Router::new()
        .merge(api::health_routes())
        .merge(api::settings_routes())
        .merge(api::preview_routes())
        .merge(api::run_routes())
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
