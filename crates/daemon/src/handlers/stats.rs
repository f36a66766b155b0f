//! Handlers for aggregate statistics.

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use forager_db::models::stats::{GlobalStats, SourceStats};
use forager_db::repositories::StatsRepo;
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// Query parameters for `GET /api/v1/stats`.
#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    /// Restrict per-source aggregates to one source.
    pub source: Option<String>,
}

/// Combined statistics payload.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub global: GlobalStats,
    pub sources: Vec<SourceStats>,
}

/// GET /api/v1/stats
///
/// Aggregate counts, bytes, and success/failure totals for dashboards.
pub async fn get_stats(
    State(state): State<AppState>,
    Query(params): Query<StatsQuery>,
) -> AppResult<impl IntoResponse> {
    let global = StatsRepo::global(&state.pool).await?;
    let sources = StatsRepo::by_source(&state.pool, params.source.as_deref()).await?;

    Ok(Json(DataResponse {
        data: StatsResponse { global, sources },
    }))
}
