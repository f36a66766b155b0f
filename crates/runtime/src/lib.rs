//! Pluggable job execution runtime.
//!
//! [`runner::JobRunner`] is the uniform contract any concurrency backend
//! can implement: register named jobs, run them now or asynchronously,
//! chain them, schedule them on cron triggers, and trip a global breaker.
//! [`local::LocalRunner`] is the provided tokio backend; the concrete
//! backend is chosen at startup and injected, never discovered at runtime.

pub mod context;
pub mod local;
pub mod runner;

pub use context::JobContext;
pub use local::LocalRunner;
pub use runner::{JobFn, JobOptions, JobRunner, RunOutcome, RunStatus, RuntimeError};
