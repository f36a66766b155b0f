//! The queue-owning orchestrator.
//!
//! One coordinating loop, a bounded set of per-job workers, live progress
//! bookkeeping, and a crash-recoverable queue snapshot. A single mutex
//! guards the in-memory queue + progress + active-worker map; durable
//! writes (snapshot, ledger) always happen outside that lock.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use forager_core::admission::{ResourceState, ResourceStatus};
use forager_core::job_state::JobState;
use forager_core::progress::JobProgress;
use forager_core::types::Timestamp;
use forager_monitor::ResourceMonitor;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::catalog::JobCatalog;
use crate::engine::isolation::IsolationBoundary;
use crate::engine::snapshot::SnapshotStore;
use crate::ledger::Ledger;

/// Orchestrator tuning knobs.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Bound on simultaneously running workers.
    pub max_concurrent: usize,
    /// Interval between coordinating-loop ticks.
    pub tick_interval: Duration,
    /// Extra back-off applied when admission is denied.
    pub denied_backoff: Duration,
    /// Daemon-wide retry limit (catalog entries may override).
    pub max_retries: u32,
    /// Delay before a failed job re-enters the queue.
    pub retry_delay: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 1,
            tick_interval: Duration::from_secs(5),
            denied_backoff: Duration::from_secs(30),
            max_retries: 3,
            retry_delay: Duration::from_secs(60),
        }
    }
}

/// In-memory bookkeeping, guarded by one mutex held only for short
/// synchronous sections.
struct Inner {
    queue: VecDeque<String>,
    progress: HashMap<String, JobProgress>,
    active: HashMap<String, JoinHandle<()>>,
}

/// What one tick of the coordinating loop decided to do.
enum TickPlan {
    /// No slots or nothing queued.
    Sleep,
    /// Admission denied; back off without dequeuing.
    Denied,
    /// Start these jobs, already popped from the queue.
    Start(Vec<String>),
}

/// Owns the queue, the worker pool, and all live progress.
pub struct Orchestrator {
    inner: Mutex<Inner>,
    snapshot: SnapshotStore,
    monitor: Arc<ResourceMonitor>,
    ledger: Arc<dyn Ledger>,
    boundary: Arc<dyn IsolationBoundary>,
    catalog: JobCatalog,
    config: OrchestratorConfig,
    started_at: Timestamp,
    running: AtomicBool,
    items_total: AtomicI64,
    bytes_total: AtomicI64,
    errors_total: AtomicI64,
}

impl Orchestrator {
    /// Build the orchestrator and rebuild in-memory state from the
    /// persisted snapshot.
    ///
    /// Jobs that were active when the previous process died are NOT
    /// resumed as running — they re-enter at the head of the queue and go
    /// through the normal admission path, which prevents double-starts.
    pub fn new(
        snapshot: SnapshotStore,
        monitor: Arc<ResourceMonitor>,
        ledger: Arc<dyn Ledger>,
        boundary: Arc<dyn IsolationBoundary>,
        catalog: JobCatalog,
        config: OrchestratorConfig,
    ) -> Arc<Self> {
        let persisted = snapshot.load();

        let mut queue: VecDeque<String> = VecDeque::new();
        for job in persisted.active.iter().chain(persisted.queue.iter()) {
            if !catalog.contains(job) {
                tracing::warn!(job = %job, "Dropping unknown job from persisted queue");
                continue;
            }
            if !queue.contains(job) {
                queue.push_back(job.clone());
            }
        }

        let progress = queue
            .iter()
            .map(|job| (job.clone(), JobProgress::queued(job.clone())))
            .collect();

        Arc::new(Self {
            inner: Mutex::new(Inner {
                queue,
                progress,
                active: HashMap::new(),
            }),
            snapshot,
            monitor,
            ledger,
            boundary,
            catalog,
            config,
            started_at: Utc::now(),
            running: AtomicBool::new(true),
            items_total: AtomicI64::new(0),
            bytes_total: AtomicI64::new(0),
            errors_total: AtomicI64::new(0),
        })
    }

    // -----------------------------------------------------------------------
    // Queue management
    // -----------------------------------------------------------------------

    /// Add a job to the execution queue.
    ///
    /// Idempotent: a job already queued or running is not added again and
    /// `false` is returned. Every successful enqueue is flushed to the
    /// snapshot before returning.
    pub async fn enqueue(&self, job: &str, priority: bool) -> bool {
        if !self.catalog.contains(job) {
            tracing::warn!(job = %job, "Refusing to enqueue unknown job");
            return false;
        }

        let position = {
            let mut inner = self.lock();
            if inner.queue.iter().any(|j| j == job) || inner.active.contains_key(job) {
                return false;
            }

            if priority {
                inner.queue.push_front(job.to_string());
            } else {
                inner.queue.push_back(job.to_string());
            }

            match inner.progress.get_mut(job) {
                Some(progress) => progress.set_state(JobState::Queued),
                None => {
                    inner
                        .progress
                        .insert(job.to_string(), JobProgress::queued(job));
                }
            }

            inner.queue.iter().position(|j| j == job).unwrap_or(0) + 1
        };

        self.persist().await;
        tracing::info!(job = %job, position, "Added to queue");
        true
    }

    /// Remove a queued job. Running jobs are untouched; use
    /// [`Orchestrator::cancel`] for those.
    pub async fn remove(&self, job: &str) -> bool {
        let removed = {
            let mut inner = self.lock();
            let before = inner.queue.len();
            inner.queue.retain(|j| j != job);
            if inner.queue.len() < before {
                inner.progress.remove(job);
                true
            } else {
                false
            }
        };

        if removed {
            self.persist().await;
            tracing::info!(job = %job, "Removed from queue");
        }
        removed
    }

    /// Enqueue every enabled catalog job. Returns the names accepted.
    pub async fn add_all_enabled(&self) -> Vec<String> {
        let mut accepted = Vec::new();
        for job in self.catalog.enabled_names() {
            if self.enqueue(&job, false).await {
                accepted.push(job);
            }
        }
        accepted
    }

    /// Cancel a job: synchronous removal if queued, best-effort abort if
    /// running. The job leaves active bookkeeping immediately even if the
    /// isolation boundary takes longer to die.
    pub async fn cancel(&self, job: &str) -> bool {
        if self.remove(job).await {
            return true;
        }

        let handle = {
            let mut inner = self.lock();
            let handle = inner.active.remove(job);
            if handle.is_some() {
                if let Some(progress) = inner.progress.get_mut(job) {
                    progress.error = Some("cancelled by operator".to_string());
                    progress.set_state(JobState::Failed);
                }
            }
            handle
        };

        match handle {
            Some(handle) => {
                handle.abort();
                self.persist().await;
                tracing::info!(job = %job, "Cancelled running job");
                true
            }
            None => false,
        }
    }

    // -----------------------------------------------------------------------
    // Read surface
    // -----------------------------------------------------------------------

    pub fn queued_jobs(&self) -> Vec<String> {
        self.lock().queue.iter().cloned().collect()
    }

    pub fn progress(&self, job: &str) -> Option<JobProgress> {
        self.lock().progress.get(job).cloned()
    }

    /// Read-only snapshot for the status surface. Always includes the
    /// current admission reason so operators can see why nothing runs.
    pub fn status_snapshot(&self) -> DaemonStatus {
        let resources = self.monitor.status();

        let (queue, active_jobs, progress) = {
            let inner = self.lock();

            let queue: Vec<String> = inner.queue.iter().cloned().collect();

            let active_jobs: Vec<ActiveJobView> = inner
                .active
                .keys()
                .filter_map(|job| inner.progress.get(job))
                .map(|p| ActiveJobView {
                    job: p.job.clone(),
                    message: p.status_message(),
                    items: p.items_collected,
                })
                .collect();

            let progress: HashMap<String, ProgressSummary> = inner
                .progress
                .iter()
                .map(|(job, p)| {
                    (
                        job.clone(),
                        ProgressSummary {
                            state: p.state,
                            message: p.status_message(),
                            items: p.items_collected,
                            bytes: p.bytes_downloaded,
                        },
                    )
                })
                .collect();

            (queue, active_jobs, progress)
        };

        DaemonStatus {
            running: self.running.load(Ordering::SeqCst),
            concurrent_limit: self.config.max_concurrent,
            active_count: active_jobs.len(),
            active_jobs,
            queue_length: queue.len(),
            queue,
            resources,
            today: TodayTotals {
                items: self.items_total.load(Ordering::SeqCst),
                bytes: self.bytes_total.load(Ordering::SeqCst),
                errors: self.errors_total.load(Ordering::SeqCst),
            },
            uptime_seconds: (Utc::now() - self.started_at).num_seconds(),
            progress,
        }
    }

    // -----------------------------------------------------------------------
    // Main loop
    // -----------------------------------------------------------------------

    /// Run the coordinating loop until the token is cancelled.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.tick_interval);
        tracing::info!(
            max_concurrent = self.config.max_concurrent,
            tick_ms = self.config.tick_interval.as_millis() as u64,
            "Orchestrator started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Orchestrator shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.reap_finished();
                    match self.plan_tick() {
                        TickPlan::Sleep => {}
                        TickPlan::Denied => {
                            // Back off without dequeuing; the head job keeps
                            // its paused state for visibility.
                            tokio::select! {
                                _ = cancel.cancelled() => break,
                                _ = tokio::time::sleep(self.config.denied_backoff) => {}
                            }
                        }
                        TickPlan::Start(jobs) => {
                            for job in jobs {
                                let worker = tokio::spawn(
                                    Arc::clone(&self).run_job(job.clone()),
                                );
                                self.lock().active.insert(job, worker);
                            }
                            self.persist().await;
                        }
                    }
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        self.persist().await;
    }

    /// Drop handles of workers that already finished. Their terminal
    /// bookkeeping was done by the workers themselves.
    fn reap_finished(&self) {
        self.lock().active.retain(|_, handle| !handle.is_finished());
    }

    /// Decide what this tick does. Pops jobs only when slots exist AND
    /// admission is granted; a denial marks the head job paused and leaves
    /// the queue untouched.
    fn plan_tick(&self) -> TickPlan {
        let slots = {
            let inner = self.lock();
            if inner.queue.is_empty() {
                return TickPlan::Sleep;
            }
            let slots = self
                .config
                .max_concurrent
                .saturating_sub(inner.active.len());
            if slots == 0 {
                return TickPlan::Sleep;
            }
            slots
        };

        let status = self.monitor.status();
        if !status.can_admit {
            let paused = match status.state {
                ResourceState::LowRam => JobState::PausedLowRam,
                _ => JobState::PausedBlocked,
            };
            {
                let mut inner = self.lock();
                if let Some(head) = inner.queue.front().cloned() {
                    if let Some(progress) = inner.progress.get_mut(&head) {
                        progress.set_state(paused);
                    }
                }
            }
            tracing::info!(reason = %status.reason, "Waiting for resources");
            return TickPlan::Denied;
        }

        let mut started = Vec::new();
        {
            let mut inner = self.lock();
            for _ in 0..slots {
                match inner.queue.pop_front() {
                    Some(job) => started.push(job),
                    None => break,
                }
            }
        }

        if started.is_empty() {
            TickPlan::Sleep
        } else {
            TickPlan::Start(started)
        }
    }

    // -----------------------------------------------------------------------
    // Per-job worker
    // -----------------------------------------------------------------------

    /// Run one job to a terminal state inside the isolation boundary.
    ///
    /// Progress for the job is funneled exclusively through this worker,
    /// so updates can never regress out of order.
    async fn run_job(self: Arc<Self>, job: String) {
        let Some(spec) = self.catalog.get(&job).cloned() else {
            // Catalog membership was checked at enqueue; reaching this
            // means the catalog changed under us.
            Arc::clone(&self)
                .finish_failed(&job, "job missing from catalog".to_string())
                .await;
            return;
        };

        tracing::info!(job = %job, "Starting job");
        self.with_progress(&job, |p| p.set_state(JobState::Starting));

        let ledger_id = match self.ledger.start(&job).await {
            Ok(id) => id,
            Err(e) => {
                // Storage failure is fatal to the operation, never to the
                // daemon: the job is marked failed and the loop moves on.
                tracing::error!(job = %job, error = %e, "Ledger write failed");
                Arc::clone(&self)
                    .finish_failed(&job, format!("ledger write failed: {e:#}"))
                    .await;
                return;
            }
        };

        self.with_progress(&job, |p| p.set_state(JobState::Running));

        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let run = self.boundary.run(&job, &spec, events_tx);
        tokio::pin!(run);

        let mut events_open = true;
        let result = loop {
            tokio::select! {
                event = events_rx.recv(), if events_open => {
                    match event {
                        Some(event) => self.with_progress(&job, |p| p.apply(&event)),
                        None => events_open = false,
                    }
                }
                result = &mut run => break result,
            }
        };

        // Drain any events that raced the exit.
        while let Ok(event) = events_rx.try_recv() {
            self.with_progress(&job, |p| p.apply(&event));
        }

        let (items, bytes) = {
            let inner = self.lock();
            inner
                .progress
                .get(&job)
                .map(|p| (p.items_collected as i64, p.bytes_downloaded as i64))
                .unwrap_or((0, 0))
        };

        match result {
            Ok(()) => {
                self.with_progress(&job, |p| p.set_state(JobState::Completed));
                self.items_total.fetch_add(items, Ordering::SeqCst);
                self.bytes_total.fetch_add(bytes, Ordering::SeqCst);

                if let Err(e) = self.ledger.complete(ledger_id, items, bytes, None).await {
                    tracing::error!(job = %job, error = %e, "Ledger completion failed");
                }
                tracing::info!(job = %job, items, bytes, "Job completed");
                self.detach_worker(&job).await;
            }
            Err(e) => {
                let message = e.to_string();
                if let Err(e) = self
                    .ledger
                    .complete(ledger_id, items, bytes, Some(&message))
                    .await
                {
                    tracing::error!(job = %job, error = %e, "Ledger completion failed");
                }
                Arc::clone(&self).finish_failed(&job, message).await;
            }
        }
    }

    /// Reconcile a failure: schedule a retry if the budget allows,
    /// otherwise mark the job failed for good.
    async fn finish_failed(self: Arc<Self>, job: &str, message: String) {
        self.errors_total.fetch_add(1, Ordering::SeqCst);

        let max_retries = self
            .catalog
            .get(job)
            .and_then(|spec| spec.max_retries)
            .unwrap_or(self.config.max_retries);

        let retry_count = {
            let inner = self.lock();
            inner.progress.get(job).map(|p| p.retry_count).unwrap_or(0)
        };

        if retry_count < max_retries {
            self.with_progress(job, |p| {
                p.error = Some(message.clone());
                p.retry_count += 1;
                p.set_state(JobState::WaitingRetry);
            });
            tracing::warn!(
                job = %job,
                error = %message,
                attempt = retry_count + 1,
                max_retries,
                "Job failed, will retry",
            );

            let this = Arc::clone(&self);
            let job_name = job.to_string();
            let delay = self.config.retry_delay;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                this.enqueue(&job_name, false).await;
            });
        } else {
            self.with_progress(job, |p| {
                p.error = Some(message.clone());
                p.set_state(JobState::Failed);
            });
            tracing::error!(job = %job, error = %message, "Job failed, retries exhausted");
        }

        self.detach_worker(job).await;
    }

    /// Remove this worker from active bookkeeping and flush the snapshot.
    async fn detach_worker(&self, job: &str) {
        self.lock().active.remove(job);
        self.persist().await;
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("orchestrator lock poisoned")
    }

    fn with_progress(&self, job: &str, f: impl FnOnce(&mut JobProgress)) {
        let mut inner = self.lock();
        let progress = inner
            .progress
            .entry(job.to_string())
            .or_insert_with(|| JobProgress::new(job));
        f(progress);
    }

    /// Flush queue + active ids to the snapshot, outside the lock.
    async fn persist(&self) {
        let (queue, active) = {
            let inner = self.lock();
            (
                inner.queue.iter().cloned().collect::<Vec<_>>(),
                inner.active.keys().cloned().collect::<Vec<_>>(),
            )
        };
        self.snapshot.save(queue, active).await;
    }
}

// ---------------------------------------------------------------------------
// Status surface payloads
// ---------------------------------------------------------------------------

/// One running job as shown on the status surface.
#[derive(Debug, Clone, Serialize)]
pub struct ActiveJobView {
    pub job: String,
    pub message: String,
    pub items: u64,
}

/// Compact per-job progress as shown on the status surface.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressSummary {
    pub state: JobState,
    pub message: String,
    pub items: u64,
    pub bytes: u64,
}

/// Daemon-lifetime totals.
#[derive(Debug, Clone, Serialize)]
pub struct TodayTotals {
    pub items: i64,
    pub bytes: i64,
    pub errors: i64,
}

/// Read-only snapshot of the whole daemon.
#[derive(Debug, Clone, Serialize)]
pub struct DaemonStatus {
    pub running: bool,
    pub concurrent_limit: usize,
    pub active_count: usize,
    pub active_jobs: Vec<ActiveJobView>,
    pub queue: Vec<String>,
    pub queue_length: usize,
    pub resources: ResourceStatus,
    pub today: TodayTotals,
    pub uptime_seconds: i64,
    pub progress: HashMap<String, ProgressSummary>,
}
