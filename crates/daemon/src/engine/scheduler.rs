//! Cron scheduler sub-loop.
//!
//! Evaluates the catalog's cron triggers once per tick and enqueues due
//! jobs. Each trigger fires at most once per matching minute via the
//! fired-minute tracker, so the tick interval can be well under a minute.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use cron::Schedule;
use forager_core::schedule::{fires_within_minute, parse_cron, FiredMinuteTracker};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::catalog::JobCatalog;
use crate::engine::orchestrator::Orchestrator;

/// How often triggers are evaluated.
const SCHEDULER_POLL: Duration = Duration::from_secs(30);

/// Spawn the scheduler loop. Triggers are parsed once up front; the
/// catalog rejects invalid expressions at load time.
pub fn spawn(
    orchestrator: Arc<Orchestrator>,
    catalog: &JobCatalog,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    spawn_with_poll(orchestrator, catalog, cancel, SCHEDULER_POLL)
}

pub fn spawn_with_poll(
    orchestrator: Arc<Orchestrator>,
    catalog: &JobCatalog,
    cancel: CancellationToken,
    poll: Duration,
) -> JoinHandle<()> {
    let triggers: Vec<(String, Schedule)> = catalog
        .scheduled()
        .into_iter()
        .filter_map(|(job, cron_expr)| match parse_cron(&cron_expr) {
            Ok(schedule) => Some((job, schedule)),
            Err(e) => {
                tracing::warn!(job = %job, error = %e, "Skipping invalid cron trigger");
                None
            }
        })
        .collect();

    tokio::spawn(async move {
        let mut fired = FiredMinuteTracker::new();
        let mut ticker = tokio::time::interval(poll);
        tracing::info!(triggers = triggers.len(), "Scheduler started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Scheduler stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let now = Utc::now();
                    for (job, schedule) in &triggers {
                        if !fires_within_minute(schedule, now) {
                            continue;
                        }
                        if !fired.should_fire(job, now) {
                            continue;
                        }
                        tracing::info!(job = %job, "Scheduled run");
                        orchestrator.enqueue(job, false).await;
                    }
                }
            }
        }
    })
}
