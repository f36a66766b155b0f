//! The callback surface handed to running jobs.
//!
//! A job body stays agnostic of the orchestration machinery: through its
//! context it can await admission, read and update its resume cursor, and
//! report incremental progress. Nothing else of the core leaks in.

use std::sync::Arc;
use std::time::Duration;

use forager_core::progress::ProgressEvent;
use forager_db::models::content_item::{NewContentItem, PutOutcome};
use forager_db::models::progress::{ProgressRecord, ProgressUpdate};
use forager_db::repositories::{ContentRepo, ProgressRepo};
use forager_db::DbPool;
use forager_monitor::ResourceMonitor;
use tokio::sync::mpsc;

/// Per-run handle passed to a job body.
#[derive(Clone)]
pub struct JobContext {
    job: String,
    monitor: Arc<ResourceMonitor>,
    pool: Option<DbPool>,
    progress: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

impl JobContext {
    pub fn new(
        job: impl Into<String>,
        monitor: Arc<ResourceMonitor>,
        pool: Option<DbPool>,
        progress: Option<mpsc::UnboundedSender<ProgressEvent>>,
    ) -> Self {
        Self {
            job: job.into(),
            monitor,
            pool,
            progress,
        }
    }

    pub fn job(&self) -> &str {
        &self.job
    }

    /// Quick admission check, e.g. between pages of a long crawl.
    pub fn can_proceed(&self) -> bool {
        self.monitor.can_admit()
    }

    /// Suspend until admission is granted or the timeout elapses.
    pub async fn wait_for_admission(&self, timeout: Option<Duration>) -> bool {
        self.monitor.wait_until_admittable(timeout).await
    }

    /// Report one unit of progress. Best-effort: a closed receiver is not
    /// an error the job should care about.
    pub fn report(&self, event: ProgressEvent) {
        if let Some(tx) = &self.progress {
            let _ = tx.send(event);
        }
    }

    /// Read this job's resume cursor.
    ///
    /// Degrades to the zero-value cursor when the store is unavailable —
    /// the job then starts from scratch, which is safe because writes
    /// dedup on content hash.
    pub async fn cursor(&self) -> ProgressRecord {
        match &self.pool {
            Some(pool) => match ProgressRepo::get(pool, &self.job).await {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!(job = %self.job, error = %e, "Failed to read cursor, using defaults");
                    ProgressRecord::empty(self.job.clone())
                }
            },
            None => ProgressRecord::empty(self.job.clone()),
        }
    }

    /// Persist a partial cursor update. Write failures surface to the job.
    pub async fn save_cursor(&self, update: &ProgressUpdate) -> anyhow::Result<()> {
        let pool = self.pool()?;
        ProgressRepo::save(pool, &self.job, update).await?;
        Ok(())
    }

    /// Check whether content with this hash is already stored.
    ///
    /// Degrades to `false` (and logs) when the store is unavailable: the
    /// worst case is re-collecting an item the unique constraint will then
    /// deduplicate anyway.
    pub async fn seen(&self, content_hash: &str) -> bool {
        let Some(pool) = &self.pool else { return false };
        match ContentRepo::exists_by_hash(pool, content_hash).await {
            Ok(exists) => exists,
            Err(e) => {
                tracing::warn!(job = %self.job, error = %e, "Dedup check failed, assuming unseen");
                false
            }
        }
    }

    /// Check whether this URL has already been collected.
    pub async fn seen_url(&self, url: &str) -> bool {
        let Some(pool) = &self.pool else { return false };
        match ContentRepo::exists_by_url(pool, url).await {
            Ok(exists) => exists,
            Err(e) => {
                tracing::warn!(job = %self.job, error = %e, "Dedup check failed, assuming unseen");
                false
            }
        }
    }

    /// Store one collected item. A [`PutOutcome::Duplicate`] is a normal
    /// outcome; write failures surface to the job.
    pub async fn store(&self, item: &NewContentItem) -> anyhow::Result<PutOutcome> {
        let pool = self.pool()?;
        Ok(ContentRepo::insert(pool, item).await?)
    }

    fn pool(&self) -> anyhow::Result<&DbPool> {
        self.pool
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("job store not configured"))
    }
}
