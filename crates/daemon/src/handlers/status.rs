//! Handlers for daemon status and control.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/status
///
/// Full daemon snapshot: running jobs, queue, resource state with the
/// current admission reason, lifetime totals, and per-job progress.
pub async fn get_status(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    Ok(Json(DataResponse {
        data: state.orchestrator.status_snapshot(),
    }))
}

/// POST /api/v1/pause
///
/// Manually pause admission. Takes precedence over automatic sampling
/// until resumed.
pub async fn pause(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    state.monitor.pause();
    Ok(Json(DataResponse {
        data: state.monitor.status(),
    }))
}

/// POST /api/v1/resume
///
/// Release a manual pause.
pub async fn resume(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    state.monitor.resume();
    Ok(Json(DataResponse {
        data: state.monitor.status(),
    }))
}

/// POST /api/v1/stop
///
/// Begin graceful shutdown: the queue snapshot is flushed and the process
/// exits once in-flight requests drain.
pub async fn stop(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    tracing::info!("Stop requested over control surface");
    state.shutdown.cancel();
    Ok(Json(DataResponse { data: "stopping" }))
}
