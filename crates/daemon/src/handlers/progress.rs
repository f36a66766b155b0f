//! Handlers for per-job live progress.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use forager_core::error::CoreError;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/progress/{job}
///
/// Live progress for one job. 404 if the job has never been enqueued.
pub async fn get_progress(
    State(state): State<AppState>,
    Path(job): Path<String>,
) -> AppResult<impl IntoResponse> {
    let progress = state
        .orchestrator
        .progress(&job)
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Job progress",
            key: job,
        }))?;

    Ok(Json(DataResponse { data: progress }))
}
