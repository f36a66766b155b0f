//! The persisted queue snapshot.
//!
//! A small JSON document — queued ids in order, ids that were active at
//! save time, and a save timestamp — rewritten after every queue change.
//! This is the only cross-restart state the engine owns; everything else
//! is rebuilt from it (and the database) on boot.

use std::path::{Path, PathBuf};

use chrono::Utc;
use forager_core::types::Timestamp;
use serde::{Deserialize, Serialize};

/// On-disk snapshot document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueSnapshot {
    #[serde(default)]
    pub queue: Vec<String>,
    #[serde(default)]
    pub active: Vec<String>,
    #[serde(default)]
    pub saved_at: Option<Timestamp>,
}

/// Loads and rewrites the snapshot file.
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the snapshot, degrading to an empty one when the file is
    /// missing or unreadable. A corrupt snapshot must not keep the daemon
    /// from booting.
    pub fn load(&self) -> QueueSnapshot {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => match serde_json::from_str::<QueueSnapshot>(&raw) {
                Ok(snapshot) => {
                    tracing::info!(
                        queued = snapshot.queue.len(),
                        active = snapshot.active.len(),
                        "Loaded queue snapshot",
                    );
                    snapshot
                }
                Err(e) => {
                    tracing::warn!(path = %self.path.display(), error = %e, "Corrupt queue snapshot, starting empty");
                    QueueSnapshot::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => QueueSnapshot::default(),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Cannot read queue snapshot, starting empty");
                QueueSnapshot::default()
            }
        }
    }

    /// Rewrite the snapshot. Called after every enqueue/dequeue, outside
    /// the engine's bookkeeping lock.
    pub async fn save(&self, queue: Vec<String>, active: Vec<String>) {
        let snapshot = QueueSnapshot {
            queue,
            active,
            saved_at: Some(Utc::now()),
        };

        let payload = match serde_json::to_vec_pretty(&snapshot) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(error = %e, "Could not serialize queue snapshot");
                return;
            }
        };

        if let Err(e) = tokio::fs::write(&self.path, payload).await {
            tracing::warn!(path = %self.path.display(), error = %e, "Could not save queue snapshot");
        }
    }
}
