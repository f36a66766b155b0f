//! Isolation boundaries for job execution.
//!
//! A boundary guarantees resource reclamation on exit, independent of the
//! code inside it. [`ProcessBoundary`] spawns the job as a child process —
//! memory leaks die with the child. [`InProcessBoundary`] runs registered
//! async closures and exists for embedded deployments and engine tests.
//!
//! Process-isolated jobs report progress as newline-delimited JSON
//! [`ProgressEvent`]s on stdout; any other output is logged at debug and
//! ignored.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use forager_core::progress::ProgressEvent;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

use crate::catalog::JobSpec;

/// Maximum stderr captured per run, used in crash diagnostics.
const MAX_STDERR_BYTES: usize = 64 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum BoundaryError {
    #[error("no command configured for this job")]
    NoCommand,

    #[error("unknown job: {0}")]
    UnknownJob(String),

    #[error("failed to spawn worker: {0}")]
    Spawn(std::io::Error),

    #[error("worker I/O error: {0}")]
    Io(std::io::Error),

    /// The worker died without reporting success — the synthetic failure
    /// recorded when the boundary itself crashed.
    #[error("worker exited with code {code}{}", stderr_suffix(.stderr))]
    Exited { code: i32, stderr: String },

    /// An in-process job body returned an error.
    #[error("{0}")]
    Job(String),
}

fn stderr_suffix(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(": {trimmed}")
    }
}

/// An execution context for one job run.
///
/// `run` resolves to `Ok(())` only when the job finished successfully;
/// every other exit is reconciled into a [`BoundaryError`]. Progress events
/// are streamed through `events` while the job runs.
#[async_trait]
pub trait IsolationBoundary: Send + Sync {
    async fn run(
        &self,
        job: &str,
        spec: &JobSpec,
        events: mpsc::UnboundedSender<ProgressEvent>,
    ) -> Result<(), BoundaryError>;
}

// ---------------------------------------------------------------------------
// Process boundary
// ---------------------------------------------------------------------------

/// Runs jobs as child processes.
///
/// The parameter bag is piped to the child's stdin as JSON. Cancellation
/// is handled by dropping the future: `kill_on_drop(true)` takes the child
/// down with it.
pub struct ProcessBoundary;

#[async_trait]
impl IsolationBoundary for ProcessBoundary {
    async fn run(
        &self,
        job: &str,
        spec: &JobSpec,
        events: mpsc::UnboundedSender<ProgressEvent>,
    ) -> Result<(), BoundaryError> {
        let (program, args) = spec
            .command
            .split_first()
            .ok_or(BoundaryError::NoCommand)?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(BoundaryError::Spawn)?;

        // Write the parameter bag to stdin, then close it. Best-effort: a
        // job that does not read stdin closes it early.
        if let Some(mut stdin) = child.stdin.take() {
            let payload = serde_json::to_vec(&spec.args).unwrap_or_default();
            let _ = stdin.write_all(&payload).await;
            drop(stdin);
        }

        // Stream stdout lines as progress events while the child runs.
        let stdout = child.stdout.take();
        let job_name = job.to_string();
        let stdout_task = tokio::spawn(async move {
            let Some(stdout) = stdout else { return };
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                match serde_json::from_str::<ProgressEvent>(&line) {
                    Ok(event) => {
                        let _ = events.send(event);
                    }
                    Err(_) => {
                        tracing::debug!(job = %job_name, line = %line, "Worker output");
                    }
                }
            }
        });

        // Capture a bounded stderr tail for crash diagnostics.
        let stderr = child.stderr.take();
        let stderr_task = tokio::spawn(async move {
            let mut tail = String::new();
            let Some(stderr) = stderr else { return tail };
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if tail.len() + line.len() < MAX_STDERR_BYTES {
                    if !tail.is_empty() {
                        tail.push('\n');
                    }
                    tail.push_str(&line);
                }
            }
            tail
        });

        let status = child.wait().await.map_err(BoundaryError::Io)?;
        let _ = stdout_task.await;
        let stderr_tail = stderr_task.await.unwrap_or_default();

        if status.success() {
            Ok(())
        } else {
            Err(BoundaryError::Exited {
                code: status.code().unwrap_or(-1),
                stderr: stderr_tail,
            })
        }
    }
}

// ---------------------------------------------------------------------------
// In-process boundary
// ---------------------------------------------------------------------------

/// An in-process job body: parameter bag in, progress events out.
pub type InProcessJob = Arc<
    dyn Fn(
            serde_json::Value,
            mpsc::UnboundedSender<ProgressEvent>,
        ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>
        + Send
        + Sync,
>;

/// Runs registered async closures on the daemon's own runtime.
///
/// No memory-reclamation guarantee — intended for embedded deployments and
/// tests where process spawning is unwanted.
#[derive(Default)]
pub struct InProcessBoundary {
    jobs: RwLock<HashMap<String, InProcessJob>>,
}

impl InProcessBoundary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job body. Re-registering a name replaces it.
    pub fn register(&self, name: &str, job: InProcessJob) {
        self.jobs
            .write()
            .expect("jobs lock poisoned")
            .insert(name.to_string(), job);
    }
}

#[async_trait]
impl IsolationBoundary for InProcessBoundary {
    async fn run(
        &self,
        job: &str,
        spec: &JobSpec,
        events: mpsc::UnboundedSender<ProgressEvent>,
    ) -> Result<(), BoundaryError> {
        let body = self
            .jobs
            .read()
            .expect("jobs lock poisoned")
            .get(job)
            .cloned()
            .ok_or_else(|| BoundaryError::UnknownJob(job.to_string()))?;

        body(spec.args.clone(), events)
            .await
            .map_err(|e| BoundaryError::Job(format!("{e:#}")))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(command: &[&str]) -> JobSpec {
        JobSpec {
            command: command.iter().map(|s| s.to_string()).collect(),
            args: serde_json::Value::Null,
            enabled: true,
            schedule: None,
            max_retries: None,
        }
    }

    #[tokio::test]
    async fn process_boundary_streams_events_and_succeeds() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let boundary = ProcessBoundary;

        let result = boundary
            .run(
                "echoer",
                &spec(&[
                    "sh",
                    "-c",
                    r#"echo '{"type":"items","count":5}'; echo not-an-event"#,
                ]),
                tx,
            )
            .await;

        assert!(result.is_ok());
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, ProgressEvent::Items { count: 5 }));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn process_boundary_reconciles_nonzero_exit() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let boundary = ProcessBoundary;

        let err = boundary
            .run("dier", &spec(&["sh", "-c", "echo oops >&2; exit 3"]), tx)
            .await
            .unwrap_err();

        match err {
            BoundaryError::Exited { code, stderr } => {
                assert_eq!(code, 3);
                assert!(stderr.contains("oops"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn process_boundary_rejects_empty_command() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = ProcessBoundary.run("x", &spec(&[]), tx).await.unwrap_err();
        assert!(matches!(err, BoundaryError::NoCommand));
    }

    #[tokio::test]
    async fn in_process_boundary_runs_registered_job() {
        let boundary = InProcessBoundary::new();
        boundary.register(
            "emitter",
            Arc::new(|_args, events| {
                Box::pin(async move {
                    events.send(ProgressEvent::Items { count: 2 })?;
                    Ok(())
                })
            }),
        );

        let (tx, mut rx) = mpsc::unbounded_channel();
        boundary.run("emitter", &spec(&[]), tx).await.unwrap();
        assert!(matches!(
            rx.recv().await,
            Some(ProgressEvent::Items { count: 2 })
        ));
    }

    #[tokio::test]
    async fn in_process_boundary_surfaces_job_errors() {
        let boundary = InProcessBoundary::new();
        boundary.register(
            "broken",
            Arc::new(|_args, _events| {
                Box::pin(async move { Err(anyhow::anyhow!("rate limited")) })
            }),
        );

        let (tx, _rx) = mpsc::unbounded_channel();
        let err = boundary.run("broken", &spec(&[]), tx).await.unwrap_err();
        assert!(err.to_string().contains("rate limited"));
    }

    #[tokio::test]
    async fn in_process_boundary_unknown_job() {
        let boundary = InProcessBoundary::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = boundary.run("ghost", &spec(&[]), tx).await.unwrap_err();
        assert!(matches!(err, BoundaryError::UnknownJob(_)));
    }
}
