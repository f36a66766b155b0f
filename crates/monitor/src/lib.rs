//! Host resource monitoring and admission control.
//!
//! [`ResourceMonitor`] samples the host through a [`probe::SystemProbe`]
//! and applies the pure admission policy from `forager-core`. Sampling is
//! injected so the monitor is fully testable without touching the host.

pub mod monitor;
pub mod probe;

pub use monitor::ResourceMonitor;
pub use probe::{HostSample, ManualProbe, ProbeError, SysinfoProbe, SystemProbe};
