//! Header preview endpoint
//!
//! POST /api/preview with a `data_file` part; returns the header row and
//! the guessed coordinate columns so a front end can prefill its pickers.

use axum::{
    extract::{Multipart, State},
    routing::post,
    Json, Router,
};
use cdr_refine::source::{guess_lat_lon, read_headers, CoordinateGuess};
use serde::Serialize;
use std::path::PathBuf;

use super::upload::{receive, Upload};
use crate::{ApiError, ApiResult, AppState};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewResponse {
    pub file_name: String,
    pub headers: Vec<String>,
    pub guess: CoordinateGuess,
}

/// Read the header row off the blocking pool
pub(super) async fn headers_of(path: PathBuf) -> ApiResult<Vec<String>> {
    tokio::task::spawn_blocking(move || read_headers(&path))
        .await
        .map_err(|e| ApiError::Internal(format!("Header read task failed: {e}")))?
        .map_err(ApiError::from)
}

/// POST /api/preview
pub async fn preview_headers(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<PreviewResponse>> {
    let upload = receive(&state.upload_root, multipart).await?;
    let result = preview(&upload).await;
    upload.discard();

    result.map(Json)
}

async fn preview(upload: &Upload) -> ApiResult<PreviewResponse> {
    let path = upload.require_data()?.to_path_buf();
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let headers = headers_of(path).await?;
    let guess = guess_lat_lon(&headers);

    Ok(PreviewResponse {
        file_name,
        headers,
        guess,
    })
}

pub fn preview_routes() -> Router<AppState> {
    Router::new().route("/api/preview", post(preview_headers))
}
