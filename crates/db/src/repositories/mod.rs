//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async CRUD methods
//! that accept `&PgPool` as the first argument.

pub mod content_repo;
pub mod job_repo;
pub mod progress_repo;
pub mod stats_repo;

pub use content_repo::ContentRepo;
pub use job_repo::JobRepo;
pub use progress_repo::ProgressRepo;
pub use stats_repo::StatsRepo;
