//! Repository for the `collection_jobs` ledger.
//!
//! The ledger is append-only: rows are inserted as `running` and updated
//! exactly once on completion. The completion guard (`completed_at IS
//! NULL`) makes finished entries immutable.

use forager_core::types::DbId;
use sqlx::PgPool;

use crate::models::job::{HistoryQuery, JobLedgerEntry, LedgerStatus};

/// Column list for `collection_jobs` queries.
const COLUMNS: &str = "\
    id, job_name, status, started_at, completed_at, \
    items_collected, bytes_downloaded, error, metadata";

/// Maximum page size for history listing.
const MAX_LIMIT: i64 = 200;

/// Default page size for history listing.
const DEFAULT_LIMIT: i64 = 50;

/// Provides append-only operations on the job ledger.
pub struct JobRepo;

impl JobRepo {
    /// Record a job starting. Returns the ledger entry id.
    pub async fn start(pool: &PgPool, job_name: &str) -> Result<DbId, sqlx::Error> {
        sqlx::query_scalar(
            "INSERT INTO collection_jobs (job_name, status, started_at) \
             VALUES ($1, $2, NOW()) \
             RETURNING id",
        )
        .bind(job_name)
        .bind(LedgerStatus::Running.as_str())
        .fetch_one(pool)
        .await
    }

    /// Record a job completing. Status is derived from `error` presence.
    ///
    /// Already-completed entries are left untouched; returns `false` when
    /// the guard rejected the update.
    pub async fn complete(
        pool: &PgPool,
        id: DbId,
        items_collected: i64,
        bytes_downloaded: i64,
        error: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        let status = LedgerStatus::from_outcome(error);
        let result = sqlx::query(
            "UPDATE collection_jobs \
             SET status = $2, completed_at = NOW(), \
                 items_collected = $3, bytes_downloaded = $4, error = $5 \
             WHERE id = $1 AND completed_at IS NULL",
        )
        .bind(id)
        .bind(status.as_str())
        .bind(items_collected)
        .bind(bytes_downloaded)
        .bind(error)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Find a ledger entry by id.
    pub async fn find_by_id(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<JobLedgerEntry>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM collection_jobs WHERE id = $1");
        sqlx::query_as::<_, JobLedgerEntry>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List ledger history, newest first, optionally filtered by job name.
    pub async fn history(
        pool: &PgPool,
        params: &HistoryQuery,
    ) -> Result<Vec<JobLedgerEntry>, sqlx::Error> {
        let limit = params.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);

        match &params.job_name {
            Some(name) => {
                let query = format!(
                    "SELECT {COLUMNS} FROM collection_jobs \
                     WHERE job_name = $1 \
                     ORDER BY started_at DESC \
                     LIMIT $2"
                );
                sqlx::query_as::<_, JobLedgerEntry>(&query)
                    .bind(name)
                    .bind(limit)
                    .fetch_all(pool)
                    .await
            }
            None => {
                let query = format!(
                    "SELECT {COLUMNS} FROM collection_jobs \
                     ORDER BY started_at DESC \
                     LIMIT $1"
                );
                sqlx::query_as::<_, JobLedgerEntry>(&query)
                    .bind(limit)
                    .fetch_all(pool)
                    .await
            }
        }
    }
}
