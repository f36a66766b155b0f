//! Resume cursor models.

use chrono::Utc;
use forager_core::types::Timestamp;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `collection_progress` table — where a source's last run
/// left off.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ProgressRecord {
    pub source: String,
    pub last_page: i32,
    pub last_url: Option<String>,
    pub last_id: Option<String>,
    pub total_items: i64,
    pub metadata: Option<serde_json::Value>,
    pub updated_at: Timestamp,
}

impl ProgressRecord {
    /// Zero-value cursor for a source that has never run.
    pub fn empty(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            last_page: 0,
            last_url: None,
            last_id: None,
            total_items: 0,
            metadata: None,
            updated_at: Utc::now(),
        }
    }
}

/// Partial cursor update. Fields left `None` keep their stored values —
/// the upsert coalesces per column, so concurrent partial updates from
/// different code paths cannot clobber unrelated fields.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProgressUpdate {
    pub last_page: Option<i32>,
    pub last_url: Option<String>,
    pub last_id: Option<String>,
    pub total_items: Option<i64>,
    pub metadata: Option<serde_json::Value>,
}
