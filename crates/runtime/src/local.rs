//! Tokio-backed [`JobRunner`] implementation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::Utc;
use forager_core::error::CoreError;
use forager_core::schedule::{fires_within_minute, parse_cron, FiredMinuteTracker, ScheduleConfig};
use forager_db::DbPool;
use forager_monitor::ResourceMonitor;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::context::JobContext;
use crate::runner::{JobFn, JobOptions, JobRunner, RunOutcome, RunStatus, RuntimeError};

use async_trait::async_trait;

/// Run id recorded for chains in the runs map.
const CHAIN_JOB_NAME: &str = "chain";

#[derive(Clone)]
struct Registered {
    job: JobFn,
    options: JobOptions,
}

struct RunnerInner {
    registry: RwLock<HashMap<String, Registered>>,
    runs: RwLock<HashMap<Uuid, RunOutcome>>,
    schedules: Mutex<HashMap<String, ScheduleConfig>>,
    fired: Mutex<FiredMinuteTracker>,
    paused: AtomicBool,
    monitor: Arc<ResourceMonitor>,
    pool: Option<DbPool>,
}

/// In-process runner executing registered jobs on the tokio runtime.
#[derive(Clone)]
pub struct LocalRunner {
    inner: Arc<RunnerInner>,
}

impl LocalRunner {
    pub fn new(monitor: Arc<ResourceMonitor>, pool: Option<DbPool>) -> Self {
        Self {
            inner: Arc::new(RunnerInner {
                registry: RwLock::new(HashMap::new()),
                runs: RwLock::new(HashMap::new()),
                schedules: Mutex::new(HashMap::new()),
                fired: Mutex::new(FiredMinuteTracker::new()),
                paused: AtomicBool::new(false),
                monitor,
                pool,
            }),
        }
    }

    /// Run the cron sub-loop until cancelled.
    ///
    /// Evaluates triggers once per tick; each trigger fires at most once
    /// per matching minute via the fired-minute tracker, so the tick can
    /// be much shorter than a minute.
    pub fn run_scheduler(
        &self,
        cancel: CancellationToken,
        poll_interval: Duration,
    ) -> JoinHandle<()> {
        let runner = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            tracing::info!(
                poll_interval_ms = poll_interval.as_millis() as u64,
                "Runner scheduler started",
            );

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::info!("Runner scheduler stopped");
                        break;
                    }
                    _ = ticker.tick() => runner.fire_due_schedules().await,
                }
            }
        })
    }

    async fn fire_due_schedules(&self) {
        let now = Utc::now();

        let candidates: Vec<(String, String)> = {
            let schedules = self.inner.schedules.lock().expect("schedules lock poisoned");
            schedules
                .values()
                .filter(|c| c.enabled)
                .map(|c| (c.job.clone(), c.cron.clone()))
                .collect()
        };

        for (job, cron_expr) in candidates {
            let schedule = match parse_cron(&cron_expr) {
                Ok(schedule) => schedule,
                Err(e) => {
                    tracing::warn!(job = %job, error = %e, "Skipping invalid cron trigger");
                    continue;
                }
            };

            if !fires_within_minute(&schedule, now) {
                continue;
            }

            let first_this_minute = {
                let mut fired = self.inner.fired.lock().expect("fired lock poisoned");
                fired.should_fire(&job, now)
            };
            if !first_this_minute {
                continue;
            }

            tracing::info!(job = %job, "Cron trigger fired");
            if let Err(e) = self.run_async(&job, serde_json::Value::Null).await {
                tracing::warn!(job = %job, error = %e, "Scheduled run rejected");
            }
        }
    }

    fn lookup(&self, name: &str) -> Result<Registered, RuntimeError> {
        self.inner
            .registry
            .read()
            .expect("registry lock poisoned")
            .get(name)
            .cloned()
            .ok_or_else(|| RuntimeError::UnknownJob(name.to_string()))
    }

    fn record(&self, outcome: RunOutcome) {
        self.inner
            .runs
            .write()
            .expect("runs lock poisoned")
            .insert(outcome.run_id, outcome);
    }

    /// Bounded admission gate executed before every job body.
    ///
    /// Never retries the job itself — only the admission check.
    async fn gate_admission(&self, options: &JobOptions) -> Result<(), RuntimeError> {
        for attempt in 0..=options.admission_retries {
            if self.inner.monitor.can_admit() {
                return Ok(());
            }
            if attempt == options.admission_retries {
                break;
            }
            let status = self.inner.monitor.status();
            tracing::warn!(
                attempt,
                reason = %status.reason,
                "Admission denied, backing off",
            );
            self.inner
                .monitor
                .wait_until_admittable(Some(options.admission_retry_delay))
                .await;
        }

        Err(RuntimeError::AdmissionDenied {
            attempts: options.admission_retries + 1,
            reason: self.inner.monitor.status().reason,
        })
    }

    /// Execute one registered job body and return its outcome.
    async fn execute(
        &self,
        run_id: Uuid,
        name: &str,
        registered: Registered,
        args: serde_json::Value,
    ) -> RunOutcome {
        let mut outcome = RunOutcome {
            run_id,
            job: name.to_string(),
            status: RunStatus::Running,
            result: None,
            error: None,
            started_at: Utc::now(),
            completed_at: None,
        };
        self.record(outcome.clone());

        let ctx = JobContext::new(
            name,
            Arc::clone(&self.inner.monitor),
            self.inner.pool.clone(),
            None,
        );

        match (registered.job)(ctx, args).await {
            Ok(result) => {
                outcome.status = RunStatus::Completed;
                outcome.result = Some(result);
            }
            Err(e) => {
                // Business failure: surfaced verbatim, never auto-retried.
                tracing::error!(job = %name, error = %e, "Job failed");
                outcome.status = RunStatus::Failed;
                outcome.error = Some(format!("{e:#}"));
            }
        }
        outcome.completed_at = Some(Utc::now());
        self.record(outcome.clone());
        outcome
    }

    fn reject_if_paused(&self) -> Result<(), RuntimeError> {
        if self.inner.paused.load(Ordering::SeqCst) {
            return Err(RuntimeError::Paused);
        }
        Ok(())
    }
}

#[async_trait]
impl JobRunner for LocalRunner {
    fn register_job(&self, name: &str, job: JobFn, options: JobOptions) {
        let replaced = self
            .inner
            .registry
            .write()
            .expect("registry lock poisoned")
            .insert(name.to_string(), Registered { job, options })
            .is_some();
        tracing::debug!(job = %name, replaced, "Job registered");
    }

    async fn run_now(
        &self,
        name: &str,
        args: serde_json::Value,
    ) -> Result<RunOutcome, RuntimeError> {
        self.reject_if_paused()?;
        let registered = self.lookup(name)?;
        self.gate_admission(&registered.options).await?;
        Ok(self.execute(Uuid::new_v4(), name, registered, args).await)
    }

    async fn run_async(
        &self,
        name: &str,
        args: serde_json::Value,
    ) -> Result<Uuid, RuntimeError> {
        self.reject_if_paused()?;
        let registered = self.lookup(name)?;

        let run_id = Uuid::new_v4();
        self.record(RunOutcome {
            run_id,
            job: name.to_string(),
            status: RunStatus::Queued,
            result: None,
            error: None,
            started_at: Utc::now(),
            completed_at: None,
        });

        let runner = self.clone();
        let name = name.to_string();
        tokio::spawn(async move {
            match runner.gate_admission(&registered.options).await {
                Ok(()) => {
                    runner.execute(run_id, &name, registered, args).await;
                }
                Err(e) => {
                    let mut runs = runner.inner.runs.write().expect("runs lock poisoned");
                    if let Some(run) = runs.get_mut(&run_id) {
                        run.status = RunStatus::Failed;
                        run.error = Some(e.to_string());
                        run.completed_at = Some(Utc::now());
                    }
                }
            }
        });

        Ok(run_id)
    }

    async fn run_chain(
        &self,
        steps: Vec<(String, serde_json::Value)>,
    ) -> Result<Uuid, RuntimeError> {
        self.reject_if_paused()?;

        // Validate the whole chain up front; a chain with an unknown step
        // should never start.
        for (name, _) in &steps {
            self.lookup(name)?;
        }

        let chain_id = Uuid::new_v4();
        self.record(RunOutcome {
            run_id: chain_id,
            job: CHAIN_JOB_NAME.to_string(),
            status: RunStatus::Queued,
            result: None,
            error: None,
            started_at: Utc::now(),
            completed_at: None,
        });

        let runner = self.clone();
        tokio::spawn(async move {
            let mut results = Vec::with_capacity(steps.len());
            let mut chain_error: Option<String> = None;

            for (index, (name, args)) in steps.into_iter().enumerate() {
                let registered = match runner.lookup(&name) {
                    Ok(registered) => registered,
                    Err(e) => {
                        chain_error = Some(e.to_string());
                        break;
                    }
                };

                if let Err(e) = runner.gate_admission(&registered.options).await {
                    chain_error = Some(format!("step {index} ({name}): {e}"));
                    break;
                }

                let outcome = runner.execute(Uuid::new_v4(), &name, registered, args).await;
                match outcome.status {
                    RunStatus::Completed => {
                        results.push(outcome.result.unwrap_or(serde_json::Value::Null));
                    }
                    _ => {
                        // First failure aborts the remaining steps.
                        chain_error = Some(format!(
                            "step {index} ({name}) failed: {}",
                            outcome.error.as_deref().unwrap_or("unknown error"),
                        ));
                        break;
                    }
                }
            }

            let mut runs = runner.inner.runs.write().expect("runs lock poisoned");
            if let Some(run) = runs.get_mut(&chain_id) {
                match chain_error {
                    Some(error) => {
                        run.status = RunStatus::Failed;
                        run.error = Some(error);
                    }
                    None => {
                        run.status = RunStatus::Completed;
                        run.result = Some(serde_json::Value::Array(results));
                    }
                }
                run.completed_at = Some(Utc::now());
            }
        });

        Ok(chain_id)
    }

    fn schedule(&self, config: ScheduleConfig) -> Result<(), CoreError> {
        parse_cron(&config.cron)?;
        let mut schedules = self.inner.schedules.lock().expect("schedules lock poisoned");
        tracing::info!(job = %config.job, cron = %config.cron, enabled = config.enabled, "Trigger registered");
        schedules.insert(config.job.clone(), config);
        Ok(())
    }

    fn unschedule(&self, job: &str) {
        let removed = self
            .inner
            .schedules
            .lock()
            .expect("schedules lock poisoned")
            .remove(job)
            .is_some();
        if removed {
            tracing::info!(job = %job, "Trigger removed");
        }
    }

    fn schedules(&self) -> Vec<ScheduleConfig> {
        self.inner
            .schedules
            .lock()
            .expect("schedules lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    fn pause_all(&self) {
        self.inner.paused.store(true, Ordering::SeqCst);
        tracing::info!("Runner paused");
    }

    fn resume_all(&self) {
        self.inner.paused.store(false, Ordering::SeqCst);
        tracing::info!("Runner resumed");
    }

    async fn status(&self, run_id: Uuid) -> Option<RunOutcome> {
        self.inner
            .runs
            .read()
            .expect("runs lock poisoned")
            .get(&run_id)
            .cloned()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
