//! Route definitions for aggregate statistics.

use axum::routing::get;
use axum::Router;

use crate::handlers::stats;
use crate::state::AppState;

/// Routes mounted at `/stats`.
///
/// ```text
/// GET /stats -> get_stats
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/stats", get(stats::get_stats))
}
