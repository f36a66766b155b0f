//! Content record models for the dedup store.

use forager_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `content_items` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ContentItem {
    pub id: DbId,
    pub source: String,
    pub url: String,
    pub content_hash: String,
    pub title: Option<String>,
    pub body: Option<String>,
    pub metadata: serde_json::Value,
    pub collected_at: Timestamp,
    pub processed: bool,
}

/// DTO for inserting a content record.
///
/// When `content_hash` is `None`, the repository hashes `body` before the
/// insert so every writer deduplicates on the same digest.
#[derive(Debug, Clone, Deserialize)]
pub struct NewContentItem {
    pub source: String,
    pub url: String,
    #[serde(default)]
    pub content_hash: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default = "empty_object")]
    pub metadata: serde_json::Value,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

/// Outcome of a dedup-aware insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// A new row was stored under this id.
    Inserted(DbId),
    /// A row with the same content hash already existed; nothing stored.
    Duplicate,
}

impl PutOutcome {
    pub fn inserted(&self) -> bool {
        matches!(self, Self::Inserted(_))
    }
}

/// Filters for listing content items.
#[derive(Debug, Default, Deserialize)]
pub struct ContentQuery {
    pub source: Option<String>,
    pub processed: Option<bool>,
    /// Maximum number of results. Defaults to 100, capped at 500.
    pub limit: Option<i64>,
    /// Number of results to skip. Defaults to 0.
    pub offset: Option<i64>,
}
