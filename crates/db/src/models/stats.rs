//! Aggregate statistics models, consumed by external dashboards.

use forager_core::types::Timestamp;
use serde::Serialize;
use sqlx::FromRow;

/// Per-source aggregates over `content_items`.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SourceStats {
    pub source: String,
    pub total_items: i64,
    pub total_bytes: Option<i64>,
    pub last_collected: Option<Timestamp>,
    pub processed_count: i64,
}

/// Global aggregates across all sources plus ledger totals.
#[derive(Debug, Clone, Serialize)]
pub struct GlobalStats {
    pub total_items: i64,
    pub total_sources: i64,
    pub total_bytes: Option<i64>,
    pub processed_count: i64,
    pub total_jobs: i64,
    pub completed_jobs: i64,
    pub failed_jobs: i64,
}
