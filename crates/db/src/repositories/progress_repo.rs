//! Repository for the `collection_progress` resume cursors.

use sqlx::PgPool;

use crate::models::progress::{ProgressRecord, ProgressUpdate};

/// Column list for `collection_progress` queries.
const COLUMNS: &str = "source, last_page, last_url, last_id, total_items, metadata, updated_at";

/// Provides cursor reads and coalescing upserts.
pub struct ProgressRepo;

impl ProgressRepo {
    /// Fetch the cursor for a source, or a zero-value cursor if the source
    /// has never run.
    pub async fn get(pool: &PgPool, source: &str) -> Result<ProgressRecord, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM collection_progress WHERE source = $1");
        let record = sqlx::query_as::<_, ProgressRecord>(&query)
            .bind(source)
            .fetch_optional(pool)
            .await?;
        Ok(record.unwrap_or_else(|| ProgressRecord::empty(source)))
    }

    /// Upsert a partial cursor update.
    ///
    /// Each column coalesces with its stored value, so a caller updating
    /// only `last_page` cannot clobber another caller's `total_items`.
    pub async fn save(
        pool: &PgPool,
        source: &str,
        update: &ProgressUpdate,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO collection_progress \
                 (source, last_page, last_url, last_id, total_items, metadata, updated_at) \
             VALUES ($1, COALESCE($2, 0), $3, $4, COALESCE($5, 0), $6, NOW()) \
             ON CONFLICT (source) DO UPDATE SET \
                 last_page = COALESCE($2, collection_progress.last_page), \
                 last_url = COALESCE($3, collection_progress.last_url), \
                 last_id = COALESCE($4, collection_progress.last_id), \
                 total_items = COALESCE($5, collection_progress.total_items), \
                 metadata = COALESCE($6, collection_progress.metadata), \
                 updated_at = NOW()",
        )
        .bind(source)
        .bind(update.last_page)
        .bind(&update.last_url)
        .bind(&update.last_id)
        .bind(update.total_items)
        .bind(&update.metadata)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Reset a source's cursor so its next run starts from scratch.
    pub async fn reset(pool: &PgPool, source: &str) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM collection_progress WHERE source = $1")
            .bind(source)
            .execute(pool)
            .await?;
        Ok(())
    }
}
