//! Job ledger models.

use forager_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `collection_jobs` ledger.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct JobLedgerEntry {
    pub id: DbId,
    pub job_name: String,
    pub status: String,
    pub started_at: Timestamp,
    pub completed_at: Option<Timestamp>,
    pub items_collected: i64,
    pub bytes_downloaded: i64,
    pub error: Option<String>,
    pub metadata: serde_json::Value,
}

/// Ledger status values stored in the `status` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerStatus {
    Running,
    Completed,
    Failed,
}

impl LedgerStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Terminal status derived from the completion outcome.
    pub fn from_outcome(error: Option<&str>) -> Self {
        if error.is_some() {
            Self::Failed
        } else {
            Self::Completed
        }
    }
}

/// Query parameters for listing ledger history.
#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub job_name: Option<String>,
    /// Maximum number of results. Defaults to 50, capped at 200.
    pub limit: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_from_outcome() {
        assert_eq!(LedgerStatus::from_outcome(None), LedgerStatus::Completed);
        assert_eq!(
            LedgerStatus::from_outcome(Some("boom")),
            LedgerStatus::Failed
        );
    }
}
