//! Host sampling probes.
//!
//! [`SysinfoProbe`] is the production implementation. [`ManualProbe`] is a
//! deterministic probe whose sample is controlled by the caller — used in
//! tests and by embedders that want to feed their own samples in.

use std::sync::{Arc, Mutex};

use forager_core::admission::{MemorySample, ProcessInfo};
use sysinfo::{ProcessStatus, ProcessesToUpdate, System};

/// One full host sample: memory, CPU, and the process table.
#[derive(Debug, Clone)]
pub struct HostSample {
    pub memory: MemorySample,
    pub cpu_percent: f32,
    pub processes: Vec<ProcessInfo>,
}

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("host sampling unavailable: {0}")]
    Unavailable(String),
}

/// Source of host samples. `sample` takes `&mut self` because real probes
/// keep refresh state between calls.
pub trait SystemProbe: Send {
    fn sample(&mut self) -> Result<HostSample, ProbeError>;
}

/// Probe backed by the `sysinfo` crate.
pub struct SysinfoProbe {
    sys: System,
}

impl SysinfoProbe {
    pub fn new() -> Self {
        Self {
            sys: System::new_all(),
        }
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemProbe for SysinfoProbe {
    fn sample(&mut self) -> Result<HostSample, ProbeError> {
        self.sys.refresh_memory();
        self.sys.refresh_cpu_all();
        self.sys.refresh_processes(ProcessesToUpdate::All, true);

        let total_bytes = self.sys.total_memory();
        if total_bytes == 0 {
            // No memory statistics on this platform; admission must fail
            // closed rather than treat 0 available as meaningful.
            return Err(ProbeError::Unavailable(
                "memory statistics not reported".to_string(),
            ));
        }

        let processes = self
            .sys
            .processes()
            .values()
            .map(|proc| ProcessInfo {
                name: proc.name().to_string_lossy().into_owned(),
                exe: proc
                    .exe()
                    .map(|p| p.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                cmdline: proc
                    .cmd()
                    .iter()
                    .map(|arg| arg.to_string_lossy())
                    .collect::<Vec<_>>()
                    .join(" "),
                is_zombie: matches!(proc.status(), ProcessStatus::Zombie),
            })
            .collect();

        Ok(HostSample {
            memory: MemorySample {
                available_bytes: self.sys.available_memory(),
                total_bytes,
            },
            cpu_percent: self.sys.global_cpu_usage(),
            processes,
        })
    }
}

/// A probe returning a caller-controlled sample.
///
/// Cloning shares the underlying sample, so a test can hold one handle,
/// hand a clone to the monitor, and mutate the sample mid-test.
#[derive(Clone)]
pub struct ManualProbe {
    inner: Arc<Mutex<ManualState>>,
}

struct ManualState {
    sample: HostSample,
    fail: Option<String>,
}

impl ManualProbe {
    pub fn new(available_bytes: u64, total_bytes: u64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ManualState {
                sample: HostSample {
                    memory: MemorySample {
                        available_bytes,
                        total_bytes,
                    },
                    cpu_percent: 0.0,
                    processes: Vec::new(),
                },
                fail: None,
            })),
        }
    }

    pub fn set_available_ram(&self, bytes: u64) {
        self.inner.lock().unwrap().sample.memory.available_bytes = bytes;
    }

    pub fn set_processes(&self, processes: Vec<ProcessInfo>) {
        self.inner.lock().unwrap().sample.processes = processes;
    }

    /// Make subsequent samples fail with the given message; pass `None`
    /// to restore normal sampling.
    pub fn set_failure(&self, message: Option<&str>) {
        self.inner.lock().unwrap().fail = message.map(str::to_string);
    }
}

impl SystemProbe for ManualProbe {
    fn sample(&mut self) -> Result<HostSample, ProbeError> {
        let state = self.inner.lock().unwrap();
        match &state.fail {
            Some(message) => Err(ProbeError::Unavailable(message.clone())),
            None => Ok(state.sample.clone()),
        }
    }
}
