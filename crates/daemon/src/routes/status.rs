//! Route definitions for daemon status and control.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::status;
use crate::state::AppState;

/// Routes mounted at the API root.
///
/// ```text
/// GET  /status  -> get_status
/// POST /pause   -> pause
/// POST /resume  -> resume
/// POST /stop    -> stop
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/status", get(status::get_status))
        .route("/pause", post(status::pause))
        .route("/resume", post(status::resume))
        .route("/stop", post(status::stop))
}
