//! Request handlers for the status/control surface.
//!
//! Handlers delegate to the orchestrator, monitor, and repositories and
//! map errors via [`crate::error::AppError`]. There is no authentication:
//! deployers must restrict network exposure.

pub mod progress;
pub mod queue;
pub mod stats;
pub mod status;
