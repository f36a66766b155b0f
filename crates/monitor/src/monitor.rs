//! The resource monitor: admission decisions, manual override, and the
//! background watch loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use forager_core::admission::{AdmissionPolicy, ResourceState, ResourceStatus};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::probe::SystemProbe;

/// Default interval between polls in `wait_until_admittable` and `watch`.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Monitors host resources and gates admission of new work.
///
/// All methods take `&self`; the monitor is shared behind an [`Arc`]
/// between the daemon engine, the runtime adapter, and job contexts.
pub struct ResourceMonitor {
    policy: AdmissionPolicy,
    probe: Mutex<Box<dyn SystemProbe>>,
    paused: AtomicBool,
    last_state: Mutex<ResourceState>,
    poll_interval: Duration,
}

impl ResourceMonitor {
    pub fn new(policy: AdmissionPolicy, probe: impl SystemProbe + 'static) -> Self {
        Self {
            policy,
            probe: Mutex::new(Box::new(probe)),
            paused: AtomicBool::new(false),
            last_state: Mutex::new(ResourceState::Available),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Sample the host and evaluate the admission policy.
    ///
    /// Never panics and never returns an error: a failed sample produces a
    /// denying status whose reason explains the failure.
    pub fn status(&self) -> ResourceStatus {
        let sample = {
            let mut probe = self.probe.lock().expect("probe lock poisoned");
            probe.sample()
        };

        match sample {
            Ok(sample) => self.policy.evaluate(
                self.paused.load(Ordering::SeqCst),
                &sample.memory,
                sample.cpu_percent,
                &sample.processes,
            ),
            Err(e) => {
                tracing::warn!(error = %e, "Resource sampling failed, denying admission");
                ResourceStatus::unavailable(format!("Resource sampling failed: {e}"))
            }
        }
    }

    /// Quick check whether new work may start.
    pub fn can_admit(&self) -> bool {
        self.status().can_admit
    }

    /// Manually pause admission. Takes precedence over automatic sampling.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
        tracing::info!("Admission manually paused");
    }

    /// Resume from a manual pause.
    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
        tracing::info!("Admission manually resumed");
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Run the background watch loop until the token is cancelled.
    ///
    /// `on_transition(old, new)` fires only when the resource state
    /// changes, and is invoked outside the monitor's internal locks.
    pub fn watch<F>(
        self: Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
        on_transition: F,
    ) -> JoinHandle<()>
    where
        F: Fn(ResourceState, ResourceState) + Send + Sync + 'static,
    {
        let monitor = self;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            tracing::info!(
                interval_ms = interval.as_millis() as u64,
                "Resource monitoring started",
            );

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::info!("Resource monitoring stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let status = monitor.status();
                        let transition = {
                            let mut last = monitor
                                .last_state
                                .lock()
                                .expect("state lock poisoned");
                            let old = *last;
                            if status.state != old {
                                *last = status.state;
                                Some(old)
                            } else {
                                None
                            }
                        };

                        if let Some(old) = transition {
                            tracing::info!(
                                old = old.as_str(),
                                new = status.state.as_str(),
                                reason = %status.reason,
                                "Resource state changed",
                            );
                            on_transition(old, status.state);
                        }
                    }
                }
            }
        })
    }

    /// Block until admission is granted or the timeout elapses.
    ///
    /// Returns `true` when admittable, `false` on timeout. Polls at the
    /// monitor's configured interval.
    pub async fn wait_until_admittable(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| tokio::time::Instant::now() + t);

        loop {
            let status = self.status();
            if status.can_admit {
                return true;
            }

            let sleep_for = match deadline {
                Some(deadline) => {
                    let remaining = deadline
                        .saturating_duration_since(tokio::time::Instant::now());
                    if remaining.is_zero() {
                        return false;
                    }
                    remaining.min(self.poll_interval)
                }
                None => self.poll_interval,
            };

            tracing::debug!(reason = %status.reason, "Waiting for resources");
            tokio::time::sleep(sleep_for).await;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use forager_core::admission::ProcessInfo;

    use super::*;
    use crate::probe::ManualProbe;

    const GIB: u64 = 1024 * 1024 * 1024;

    fn policy() -> AdmissionPolicy {
        AdmissionPolicy::new(
            GIB,
            &["ollama".to_string()],
            &[r"python\s+.*\bvlm\b".to_string()],
        )
        .unwrap()
    }

    fn monitor_with(probe: &ManualProbe) -> Arc<ResourceMonitor> {
        Arc::new(
            ResourceMonitor::new(policy(), probe.clone())
                .with_poll_interval(Duration::from_millis(10)),
        )
    }

    #[tokio::test]
    async fn admits_with_headroom() {
        let probe = ManualProbe::new(4 * GIB, 8 * GIB);
        let monitor = monitor_with(&probe);
        assert!(monitor.can_admit());
    }

    #[tokio::test]
    async fn admission_flips_with_available_ram() {
        let probe = ManualProbe::new(4 * GIB, 8 * GIB);
        let monitor = monitor_with(&probe);

        assert!(monitor.can_admit());
        probe.set_available_ram(GIB / 2);
        assert!(!monitor.can_admit());
        assert!(monitor.status().reason.contains("RAM too low"));
        probe.set_available_ram(2 * GIB);
        assert!(monitor.can_admit());
    }

    #[tokio::test]
    async fn manual_pause_overrides_sampling() {
        let probe = ManualProbe::new(4 * GIB, 8 * GIB);
        let monitor = monitor_with(&probe);

        monitor.pause();
        let status = monitor.status();
        assert!(!status.can_admit);
        assert_eq!(status.reason, "Manually paused");

        monitor.resume();
        assert!(monitor.can_admit());
    }

    #[tokio::test]
    async fn blocking_process_denies() {
        let probe = ManualProbe::new(4 * GIB, 8 * GIB);
        let monitor = monitor_with(&probe);

        probe.set_processes(vec![ProcessInfo {
            name: "ollama".to_string(),
            exe: "/usr/local/bin/ollama".to_string(),
            cmdline: "ollama serve".to_string(),
            is_zombie: false,
        }]);

        let status = monitor.status();
        assert!(!status.can_admit);
        assert_eq!(status.blocking_processes, vec!["ollama"]);
    }

    #[tokio::test]
    async fn sampling_failure_fails_closed() {
        let probe = ManualProbe::new(4 * GIB, 8 * GIB);
        let monitor = monitor_with(&probe);

        probe.set_failure(Some("permission denied"));
        let status = monitor.status();
        assert!(!status.can_admit);
        assert_eq!(status.state, ResourceState::Unknown);
        assert!(status.reason.contains("permission denied"));

        probe.set_failure(None);
        assert!(monitor.can_admit());
    }

    #[tokio::test]
    async fn wait_until_admittable_times_out() {
        let probe = ManualProbe::new(0, 8 * GIB);
        let monitor = monitor_with(&probe);

        let admitted = monitor
            .wait_until_admittable(Some(Duration::from_millis(50)))
            .await;
        assert!(!admitted);
    }

    #[tokio::test]
    async fn wait_until_admittable_returns_when_ram_frees_up() {
        let probe = ManualProbe::new(0, 8 * GIB);
        let monitor = monitor_with(&probe);

        let waiter = {
            let monitor = Arc::clone(&monitor);
            tokio::spawn(async move {
                monitor
                    .wait_until_admittable(Some(Duration::from_secs(5)))
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(30)).await;
        probe.set_available_ram(4 * GIB);

        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn watch_fires_callback_only_on_transitions() {
        let probe = ManualProbe::new(4 * GIB, 8 * GIB);
        let monitor = monitor_with(&probe);

        let transitions: Arc<StdMutex<Vec<(ResourceState, ResourceState)>>> =
            Arc::new(StdMutex::new(Vec::new()));
        let seen = Arc::clone(&transitions);

        let cancel = CancellationToken::new();
        let handle = Arc::clone(&monitor).watch(
            Duration::from_millis(10),
            cancel.clone(),
            move |old, new| {
                seen.lock().unwrap().push((old, new));
            },
        );

        // Several ticks in the same state: no transitions.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(transitions.lock().unwrap().is_empty());

        probe.set_available_ram(0);
        tokio::time::sleep(Duration::from_millis(50)).await;

        probe.set_available_ram(4 * GIB);
        tokio::time::sleep(Duration::from_millis(50)).await;

        cancel.cancel();
        handle.await.unwrap();

        let recorded = transitions.lock().unwrap();
        assert_eq!(
            recorded.as_slice(),
            &[
                (ResourceState::Available, ResourceState::LowRam),
                (ResourceState::LowRam, ResourceState::Available),
            ]
        );
    }
}
