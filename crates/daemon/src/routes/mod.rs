pub mod health;
pub mod progress;
pub mod queue;
pub mod stats;
pub mod status;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /status               full daemon snapshot (GET)
/// /pause                manual admission pause (POST)
/// /resume               release manual pause (POST)
/// /stop                 graceful shutdown (POST)
///
/// /queue                list (GET), enqueue (POST)
/// /queue/add-all        enqueue all enabled catalog jobs (POST)
/// /queue/{job}          remove or cancel (DELETE)
///
/// /progress/{job}       live per-job progress (GET)
///
/// /stats                aggregate statistics (GET)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(status::router())
        .merge(queue::router())
        .merge(progress::router())
        .merge(stats::router())
}
