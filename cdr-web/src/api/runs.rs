//! Run API handlers
//!
//! POST /api/run, GET /api/runs, DELETE /api/runs, GET /api/run/{id}, GET /api/run/{id}/log,
//! GET /api/run/{id}/result, POST /api/run/{id}/cancel, DELETE /api/run/{id},
//! GET /api/run/{id}/download/{file}, GET /api/run/{id}/view/{file}

use axum::{
    extract::{Multipart, Path, Query, Request, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use cdr_refine::config::LabelOrder;
use cdr_refine::orchestrator::{LogPage, RunSnapshot, RunStatus, RunSummary};
use cdr_refine::source::guess_lat_lon;
use cdr_refine::RunRequest;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use tower_http::services::ServeFile;
use uuid::Uuid;

use super::preview::headers_of;
use super::upload::{discard_dir, receive, Upload};
use crate::{ApiError, ApiResult, AppState};

/// How often the upload janitor checks for run completion
const CLEANUP_POLL: Duration = Duration::from_millis(500);

/// POST /api/run response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRunResponse {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub created_at: DateTime<Utc>,
    pub lat_column: String,
    pub lon_column: String,
}

/// POST /api/run/{id}/cancel and DELETE /api/run/{id} response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunActionResponse {
    pub run_id: Uuid,
    pub message: String,
}

/// DELETE /api/runs response
#[derive(Debug, Serialize)]
pub struct ClearRunsResponse {
    pub cleared: usize,
}

#[derive(Debug, Deserialize)]
pub struct LogQuery {
    #[serde(default)]
    pub since: u64,
}

fn parse_label_order(raw: &str) -> ApiResult<LabelOrder> {
    match raw {
        "source" => Ok(LabelOrder::Source),
        "west_to_east" => Ok(LabelOrder::WestToEast),
        "south_to_north" => Ok(LabelOrder::SouthToNorth),
        other => Err(ApiError::BadRequest(format!("Unknown label order: {other}"))),
    }
}

/// POST /api/run
///
/// Multipart fields: `data_file`, `boundary_file`, optional `lat_column`,
/// `lon_column` and `label_order`. Missing coordinate columns are guessed
/// from the data file's headers. Returns 202 with the new run id.
pub async fn start_run(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<StartRunResponse>)> {
    if let Some(active) = state.orchestrator.active() {
        return Err(ApiError::Conflict(format!(
            "A run is already in progress: {active}"
        )));
    }

    let upload = receive(&state.upload_root, multipart).await?;
    match submit(&state, &upload).await {
        Ok(response) => {
            spawn_upload_cleanup(&state, response.run_id, upload.dir);
            Ok((StatusCode::ACCEPTED, Json(response)))
        }
        Err(e) => {
            upload.discard();
            Err(e)
        }
    }
}

async fn submit(state: &AppState, upload: &Upload) -> ApiResult<StartRunResponse> {
    let data = upload.require_data()?;
    let boundary = upload.require_boundary()?;

    let mut lat = upload.field("lat_column").map(str::to_string);
    let mut lon = upload.field("lon_column").map(str::to_string);
    if lat.is_none() || lon.is_none() {
        let guess = guess_lat_lon(&headers_of(data.to_path_buf()).await?);
        lat = lat.or(guess.latitude);
        lon = lon.or(guess.longitude);
    }
    let (Some(lat), Some(lon)) = (lat, lon) else {
        return Err(ApiError::BadRequest(
            "Could not determine the latitude/longitude columns; choose them explicitly"
                .to_string(),
        ));
    };

    let mut config = state.refinement.as_ref().clone().with_coordinates(&lat, &lon);
    if let Some(order) = upload.field("label_order") {
        config.label_order = parse_label_order(order)?;
    }

    let request = RunRequest::from_files(data, boundary, config)?;
    let run_id = state.orchestrator.submit(request)?;
    let snapshot = state.orchestrator.snapshot(run_id)?;

    tracing::info!(
        run_id = %run_id,
        data_file = %snapshot.inputs.data_file,
        boundary_file = %snapshot.inputs.boundary_file,
        "Run started from upload"
    );

    Ok(StartRunResponse {
        run_id,
        status: snapshot.status,
        created_at: snapshot.created_at,
        lat_column: lat,
        lon_column: lon,
    })
}

/// Remove a run's uploaded inputs once it has finished
fn spawn_upload_cleanup(state: &AppState, run_id: Uuid, dir: PathBuf) {
    let orchestrator = Arc::clone(&state.orchestrator);
    tokio::spawn(async move {
        // NotFound means the run was cleared; the inputs are unused either way
        let _ = orchestrator.wait(run_id, CLEANUP_POLL).await;
        discard_dir(&dir);
        tracing::debug!(run_id = %run_id, "Removed uploaded inputs");
    });
}

/// GET /api/runs
pub async fn list_runs(State(state): State<AppState>) -> Json<Vec<RunSnapshot>> {
    Json(state.orchestrator.list())
}

/// DELETE /api/runs
///
/// Forgets every finished run; a pending or running run is kept.
pub async fn clear_finished_runs(State(state): State<AppState>) -> Json<ClearRunsResponse> {
    let cleared = state.orchestrator.clear_finished();
    tracing::info!(cleared, "Cleared finished runs");
    Json(ClearRunsResponse { cleared })
}

/// GET /api/run/{id}
pub async fn get_run(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> ApiResult<Json<RunSnapshot>> {
    Ok(Json(state.orchestrator.snapshot(run_id)?))
}

/// GET /api/run/{id}/log?since=N
pub async fn get_run_log(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
    Query(query): Query<LogQuery>,
) -> ApiResult<Json<LogPage>> {
    Ok(Json(state.orchestrator.poll_log(run_id, query.since)?))
}

/// GET /api/run/{id}/result
pub async fn get_run_result(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> ApiResult<Json<RunSummary>> {
    Ok(Json(state.orchestrator.get_result(run_id)?))
}

/// POST /api/run/{id}/cancel
pub async fn cancel_run(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> ApiResult<Json<RunActionResponse>> {
    state.orchestrator.cancel(run_id)?;
    tracing::info!(run_id = %run_id, "Cancellation requested via API");

    Ok(Json(RunActionResponse {
        run_id,
        message: "Cancellation requested".to_string(),
    }))
}

/// DELETE /api/run/{id}
pub async fn clear_run(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> ApiResult<Json<RunActionResponse>> {
    state.orchestrator.clear(run_id)?;

    Ok(Json(RunActionResponse {
        run_id,
        message: "Run cleared".to_string(),
    }))
}

async fn serve_published(
    state: &AppState,
    run_id: Uuid,
    file_name: &str,
    disposition: &str,
    request: Request,
) -> ApiResult<Response> {
    let path = state.orchestrator.published_file(run_id, file_name)?;
    let mut response = match ServeFile::new(&path).oneshot(request).await {
        Ok(response) => response.into_response(),
        Err(never) => match never {},
    };

    let quoted = file_name.replace(['"', '\\'], "_");
    if let Ok(value) = HeaderValue::from_str(&format!("{disposition}; filename=\"{quoted}\"")) {
        response
            .headers_mut()
            .insert(header::CONTENT_DISPOSITION, value);
    }
    Ok(response)
}

/// GET /api/run/{id}/download/{file}
pub async fn download_file(
    State(state): State<AppState>,
    Path((run_id, file_name)): Path<(Uuid, String)>,
    request: Request,
) -> ApiResult<Response> {
    serve_published(&state, run_id, &file_name, "attachment", request).await
}

/// GET /api/run/{id}/view/{file}
pub async fn view_file(
    State(state): State<AppState>,
    Path((run_id, file_name)): Path<(Uuid, String)>,
    request: Request,
) -> ApiResult<Response> {
    serve_published(&state, run_id, &file_name, "inline", request).await
}

pub fn run_routes() -> Router<AppState> {
    Router::new()
        .route("/api/run", post(start_run))
        .route("/api/runs", get(list_runs).delete(clear_finished_runs))
        .route("/api/run/:id", get(get_run).delete(clear_run))
        .route("/api/run/:id/log", get(get_run_log))
        .route("/api/run/:id/result", get(get_run_result))
        .route("/api/run/:id/cancel", post(cancel_run))
        .route("/api/run/:id/download/:file", get(download_file))
        .route("/api/run/:id/view/:file", get(view_file))
}
