use std::sync::Arc;

use forager_monitor::ResourceMonitor;
use tokio_util::sync::CancellationToken;

use crate::config::DaemonConfig;
use crate::engine::Orchestrator;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: forager_db::DbPool,
    /// Daemon configuration.
    pub config: Arc<DaemonConfig>,
    /// The queue-owning orchestrator.
    pub orchestrator: Arc<Orchestrator>,
    /// Resource monitor (admission control + manual pause).
    pub monitor: Arc<ResourceMonitor>,
    /// Cancelled by `POST /stop` to shut the daemon down.
    pub shutdown: CancellationToken,
}
