//! Repository for the `content_items` table.
//!
//! Deduplication happens at the storage layer: inserts go through
//! `ON CONFLICT (content_hash) DO NOTHING`, never check-then-insert, so
//! concurrent writers racing on the same hash yield exactly one stored row.

use forager_core::hashing::sha256_hex;
use forager_core::types::DbId;
use sqlx::PgPool;

use crate::models::content_item::{ContentItem, ContentQuery, NewContentItem, PutOutcome};

/// Column list for `content_items` queries.
const COLUMNS: &str =
    "id, source, url, content_hash, title, body, metadata, collected_at, processed";

/// Maximum page size for content listing.
const MAX_LIMIT: i64 = 500;

/// Default page size for content listing.
const DEFAULT_LIMIT: i64 = 100;

/// Provides dedup-aware CRUD operations for collected content.
pub struct ContentRepo;

impl ContentRepo {
    /// Check whether content with this hash is already stored.
    pub async fn exists_by_hash(pool: &PgPool, content_hash: &str) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM content_items WHERE content_hash = $1)")
            .bind(content_hash)
            .fetch_one(pool)
            .await
    }

    /// Check whether this URL has already been collected.
    pub async fn exists_by_url(pool: &PgPool, url: &str) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM content_items WHERE url = $1)")
            .bind(url)
            .fetch_one(pool)
            .await
    }

    /// Insert a content record if its hash is not already stored.
    ///
    /// Hashes `body` when the caller did not supply a digest. Returns
    /// [`PutOutcome::Duplicate`] when the unique constraint swallowed the
    /// insert — that is a normal outcome, not an error.
    pub async fn insert(
        pool: &PgPool,
        item: &NewContentItem,
    ) -> Result<PutOutcome, sqlx::Error> {
        Self::insert_with(pool, item).await
    }

    /// Insert multiple records in one transaction, returning how many were
    /// actually stored (duplicates are skipped, not counted).
    pub async fn insert_batch(
        pool: &PgPool,
        items: &[NewContentItem],
    ) -> Result<u64, sqlx::Error> {
        let mut tx = pool.begin().await?;
        let mut inserted = 0u64;
        for item in items {
            if Self::insert_with(&mut *tx, item).await?.inserted() {
                inserted += 1;
            }
        }
        tx.commit().await?;
        Ok(inserted)
    }

    /// Flip the `processed` flag — the only mutation content rows allow.
    pub async fn mark_processed(pool: &PgPool, ids: &[DbId]) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("UPDATE content_items SET processed = TRUE WHERE id = ANY($1)")
            .bind(ids)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// List content items with optional source/processed filters.
    pub async fn list(
        pool: &PgPool,
        params: &ContentQuery,
    ) -> Result<Vec<ContentItem>, sqlx::Error> {
        let limit = params.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
        let offset = params.offset.unwrap_or(0);

        // Build the WHERE clause and track the next bind parameter index.
        let mut conditions: Vec<String> = Vec::new();
        let mut bind_idx: u32 = 1;

        if params.source.is_some() {
            conditions.push(format!("source = ${bind_idx}"));
            bind_idx += 1;
        }
        if params.processed.is_some() {
            conditions.push(format!("processed = ${bind_idx}"));
            bind_idx += 1;
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let query = format!(
            "SELECT {COLUMNS} FROM content_items \
             {where_clause} \
             ORDER BY collected_at DESC \
             LIMIT ${bind_idx} OFFSET ${}",
            bind_idx + 1,
        );

        let mut q = sqlx::query_as::<_, ContentItem>(&query);
        if let Some(source) = &params.source {
            q = q.bind(source);
        }
        if let Some(processed) = params.processed {
            q = q.bind(processed);
        }
        q = q.bind(limit).bind(offset);

        q.fetch_all(pool).await
    }

    /// Shared insert used by both the single and batch paths. Generic over
    /// the executor so it works inside a transaction.
    async fn insert_with<'e, E>(
        executor: E,
        item: &NewContentItem,
    ) -> Result<PutOutcome, sqlx::Error>
    where
        E: sqlx::Executor<'e, Database = sqlx::Postgres>,
    {
        let hash = match &item.content_hash {
            Some(h) => h.clone(),
            None => sha256_hex(item.body.as_deref().unwrap_or_default().as_bytes()),
        };

        let id: Option<DbId> = sqlx::query_scalar(
            "INSERT INTO content_items (source, url, content_hash, title, body, metadata) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (content_hash) DO NOTHING \
             RETURNING id",
        )
        .bind(&item.source)
        .bind(&item.url)
        .bind(&hash)
        .bind(&item.title)
        .bind(&item.body)
        .bind(&item.metadata)
        .fetch_optional(executor)
        .await?;

        Ok(match id {
            Some(id) => PutOutcome::Inserted(id),
            None => PutOutcome::Duplicate,
        })
    }
}
