//! The job history ledger seam.
//!
//! The orchestrator writes history through this trait rather than a
//! concrete repository so the engine is testable without a database.

use async_trait::async_trait;
use forager_core::types::DbId;
use forager_db::repositories::JobRepo;
use forager_db::DbPool;

/// Append-only history of job executions.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Record a job starting; returns the entry id used on completion.
    async fn start(&self, job: &str) -> anyhow::Result<DbId>;

    /// Record a job's terminal outcome. Entries are immutable afterwards.
    async fn complete(
        &self,
        id: DbId,
        items: i64,
        bytes: i64,
        error: Option<&str>,
    ) -> anyhow::Result<()>;
}

/// Postgres-backed ledger over [`JobRepo`].
pub struct PgLedger {
    pool: DbPool,
}

impl PgLedger {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Ledger for PgLedger {
    async fn start(&self, job: &str) -> anyhow::Result<DbId> {
        Ok(JobRepo::start(&self.pool, job).await?)
    }

    async fn complete(
        &self,
        id: DbId,
        items: i64,
        bytes: i64,
        error: Option<&str>,
    ) -> anyhow::Result<()> {
        JobRepo::complete(&self.pool, id, items, bytes, error).await?;
        Ok(())
    }
}

/// Ledger that drops everything — for deployments without a database and
/// for engine tests that only care about orchestration behavior.
pub struct NullLedger;

#[async_trait]
impl Ledger for NullLedger {
    async fn start(&self, _job: &str) -> anyhow::Result<DbId> {
        Ok(0)
    }

    async fn complete(
        &self,
        _id: DbId,
        _items: i64,
        _bytes: i64,
        _error: Option<&str>,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}
