//! The job runner contract.
//!
//! Implementations own registration, execution, chaining, scheduling, and
//! the global pause breaker. Only admission-denial retries are automatic;
//! business-logic failures from the job body propagate verbatim and are
//! never auto-retried here.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use forager_core::schedule::ScheduleConfig;
use forager_core::types::Timestamp;
use serde::Serialize;
use uuid::Uuid;

use crate::context::JobContext;

/// A job body: an async function over a context and a JSON parameter bag.
pub type JobFn = Arc<
    dyn Fn(
            JobContext,
            serde_json::Value,
        ) -> Pin<Box<dyn Future<Output = anyhow::Result<serde_json::Value>> + Send>>
        + Send
        + Sync,
>;

/// Per-job execution options.
#[derive(Debug, Clone)]
pub struct JobOptions {
    /// Bounded number of admission re-checks before giving up.
    pub admission_retries: u32,
    /// How long each admission re-check waits before sampling again.
    pub admission_retry_delay: Duration,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            admission_retries: 3,
            admission_retry_delay: Duration::from_secs(60),
        }
    }
}

/// Execution status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

/// Result of a run, observable while it executes and after it finishes.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub run_id: Uuid,
    pub job: String,
    pub status: RunStatus,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub started_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("unknown job: {0}")]
    UnknownJob(String),

    /// The global breaker is tripped; nothing is enqueued.
    #[error("runner is paused")]
    Paused,

    /// Admission stayed denied through the bounded retries.
    #[error("admission denied after {attempts} attempts: {reason}")]
    AdmissionDenied { attempts: u32, reason: String },
}

/// Uniform execution contract over a pluggable concurrency backend.
#[async_trait]
pub trait JobRunner: Send + Sync {
    /// Register a job body under a name. Re-registering a name replaces
    /// the previous body and options.
    fn register_job(&self, name: &str, job: JobFn, options: JobOptions);

    /// Run a job and wait for it. Re-checks admission (bounded backoff)
    /// before executing; a failing job body yields a `Failed` outcome with
    /// the error surfaced verbatim.
    async fn run_now(
        &self,
        name: &str,
        args: serde_json::Value,
    ) -> Result<RunOutcome, RuntimeError>;

    /// Start a job without waiting. Completion is observable via
    /// [`JobRunner::status`].
    async fn run_async(
        &self,
        name: &str,
        args: serde_json::Value,
    ) -> Result<Uuid, RuntimeError>;

    /// Run steps strictly in order; the first failure aborts the rest.
    async fn run_chain(
        &self,
        steps: Vec<(String, serde_json::Value)>,
    ) -> Result<Uuid, RuntimeError>;

    /// Register or replace a cron trigger. A disabled config keeps its
    /// slot (and history) but never fires.
    fn schedule(&self, config: ScheduleConfig) -> Result<(), forager_core::error::CoreError>;

    /// Remove a trigger entirely.
    fn unschedule(&self, job: &str);

    /// All registered triggers, enabled or not.
    fn schedules(&self) -> Vec<ScheduleConfig>;

    /// Trip the global breaker: `run_now`/`run_async` reject immediately.
    fn pause_all(&self);

    /// Release the global breaker.
    fn resume_all(&self);

    /// Look up a run (or chain) by id.
    async fn status(&self, run_id: Uuid) -> Option<RunOutcome>;
}
