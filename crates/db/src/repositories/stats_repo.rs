//! Aggregate statistics over content and the job ledger.
//!
//! Read-only; exposed to external dashboards through the status surface
//! but not otherwise consumed by the core.

use sqlx::PgPool;

use crate::models::job::LedgerStatus;
use crate::models::stats::{GlobalStats, SourceStats};

/// Provides aggregate read queries.
pub struct StatsRepo;

impl StatsRepo {
    /// Per-source aggregates, optionally filtered to a single source.
    pub async fn by_source(
        pool: &PgPool,
        source: Option<&str>,
    ) -> Result<Vec<SourceStats>, sqlx::Error> {
        let base = "SELECT \
                source, \
                COUNT(*) AS total_items, \
                SUM(LENGTH(body)) AS total_bytes, \
                MAX(collected_at) AS last_collected, \
                COUNT(*) FILTER (WHERE processed) AS processed_count \
            FROM content_items";

        match source {
            Some(s) => {
                let query = format!("{base} WHERE source = $1 GROUP BY source");
                sqlx::query_as::<_, SourceStats>(&query)
                    .bind(s)
                    .fetch_all(pool)
                    .await
            }
            None => {
                let query = format!("{base} GROUP BY source ORDER BY total_items DESC");
                sqlx::query_as::<_, SourceStats>(&query)
                    .fetch_all(pool)
                    .await
            }
        }
    }

    /// Global aggregates across content and the ledger.
    pub async fn global(pool: &PgPool) -> Result<GlobalStats, sqlx::Error> {
        let (total_items, total_sources, total_bytes, processed_count): (
            i64,
            i64,
            Option<i64>,
            i64,
        ) = sqlx::query_as(
            "SELECT \
                COUNT(*), \
                COUNT(DISTINCT source), \
                SUM(LENGTH(body)), \
                COUNT(*) FILTER (WHERE processed) \
             FROM content_items",
        )
        .fetch_one(pool)
        .await?;

        let (total_jobs, completed_jobs, failed_jobs): (i64, i64, i64) = sqlx::query_as(
            "SELECT \
                COUNT(*), \
                COUNT(*) FILTER (WHERE status = $1), \
                COUNT(*) FILTER (WHERE status = $2) \
             FROM collection_jobs",
        )
        .bind(LedgerStatus::Completed.as_str())
        .bind(LedgerStatus::Failed.as_str())
        .fetch_one(pool)
        .await?;

        Ok(GlobalStats {
            total_items,
            total_sources,
            total_bytes,
            processed_count,
            total_jobs,
            completed_jobs,
            failed_jobs,
        })
    }
}
