//! Settings endpoint
//!
//! Read-only: reports the defaults a front end needs to build its forms.

use axum::{extract::State, routing::get, Json, Router};
use cdr_refine::config::LabelOrder;
use cdr_refine::orchestrator::MAX_LOG_ENTRIES;
use cdr_refine::source::{BOUNDARY_EXTENSIONS, DATA_EXTENSIONS};
use cdr_refine::RefinementConfig;
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsResponse {
    pub output_root: String,
    pub max_upload_bytes: usize,
    pub data_extensions: Vec<String>,
    pub boundary_extensions: Vec<String>,
    pub label_orders: Vec<LabelOrder>,
    pub log_retention: usize,
    pub refinement: RefinementConfig,
}

fn dotted(extensions: &[&str]) -> Vec<String> {
    extensions.iter().map(|e| format!(".{e}")).collect()
}

/// GET /api/settings
pub async fn get_settings(State(state): State<AppState>) -> Json<SettingsResponse> {
    Json(SettingsResponse {
        output_root: state.orchestrator.output_root().display().to_string(),
        max_upload_bytes: state.max_upload_bytes,
        data_extensions: dotted(DATA_EXTENSIONS),
        boundary_extensions: dotted(BOUNDARY_EXTENSIONS),
        label_orders: vec![
            LabelOrder::Source,
            LabelOrder::WestToEast,
            LabelOrder::SouthToNorth,
        ],
        log_retention: MAX_LOG_ENTRIES,
        refinement: state.refinement.as_ref().clone(),
    })
}

pub fn settings_routes() -> Router<AppState> {
    Router::new().route("/api/settings", get(get_settings))
}
