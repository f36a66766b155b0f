//! Handlers for the execution queue.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// Request body for `POST /api/v1/queue`.
#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    pub job: String,
    /// Head-insert instead of appending.
    #[serde(default)]
    pub priority: bool,
}

/// Response for queue mutations: whether the change took effect plus the
/// resulting queue.
#[derive(Debug, Serialize)]
pub struct QueueChange {
    pub accepted: bool,
    pub queue: Vec<String>,
}

/// GET /api/v1/queue
pub async fn list_queue(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    Ok(Json(DataResponse {
        data: state.orchestrator.queued_jobs(),
    }))
}

/// POST /api/v1/queue
///
/// Enqueue a job. Idempotent: re-enqueuing an already-queued (or running)
/// job returns `accepted: false` and leaves the queue unchanged.
pub async fn enqueue(
    State(state): State<AppState>,
    Json(request): Json<EnqueueRequest>,
) -> AppResult<impl IntoResponse> {
    let accepted = state
        .orchestrator
        .enqueue(&request.job, request.priority)
        .await;
    Ok(Json(DataResponse {
        data: QueueChange {
            accepted,
            queue: state.orchestrator.queued_jobs(),
        },
    }))
}

/// DELETE /api/v1/queue/{job}
pub async fn remove(
    State(state): State<AppState>,
    Path(job): Path<String>,
) -> AppResult<impl IntoResponse> {
    let accepted = state.orchestrator.cancel(&job).await;
    Ok(Json(DataResponse {
        data: QueueChange {
            accepted,
            queue: state.orchestrator.queued_jobs(),
        },
    }))
}

/// POST /api/v1/queue/add-all
///
/// Enqueue every enabled catalog job.
pub async fn add_all(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let added = state.orchestrator.add_all_enabled().await;
    tracing::info!(added = added.len(), "Enqueued all enabled jobs");
    Ok(Json(DataResponse {
        data: QueueChange {
            accepted: !added.is_empty(),
            queue: state.orchestrator.queued_jobs(),
        },
    }))
}
