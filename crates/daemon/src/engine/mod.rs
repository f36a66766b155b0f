//! The orchestration engine.
//!
//! Contains the queue-owning orchestrator and its tick loop, the isolation
//! boundaries jobs execute inside, the persisted queue snapshot, and the
//! cron scheduler sub-loop.

pub mod isolation;
pub mod orchestrator;
pub mod scheduler;
pub mod snapshot;

pub use isolation::{BoundaryError, InProcessBoundary, IsolationBoundary, ProcessBoundary};
pub use orchestrator::{Orchestrator, OrchestratorConfig};
