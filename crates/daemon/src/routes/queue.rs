//! Route definitions for the execution queue.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::queue;
use crate::state::AppState;

/// Routes mounted at `/queue`.
///
/// ```text
/// GET    /queue           -> list_queue
/// POST   /queue           -> enqueue
/// POST   /queue/add-all   -> add_all
/// DELETE /queue/{job}     -> remove
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/queue", get(queue::list_queue).post(queue::enqueue))
        .route("/queue/add-all", post(queue::add_all))
        .route("/queue/{job}", axum::routing::delete(queue::remove))
}
