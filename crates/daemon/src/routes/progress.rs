//! Route definitions for live progress.

use axum::routing::get;
use axum::Router;

use crate::handlers::progress;
use crate::state::AppState;

/// Routes mounted at `/progress`.
///
/// ```text
/// GET /progress/{job} -> get_progress
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/progress/{job}", get(progress::get_progress))
}
