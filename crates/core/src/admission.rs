//! Admission policy evaluation.
//!
//! Pure logic — no host sampling here. The caller (normally the monitor
//! crate's probe) is responsible for collecting memory, CPU, and process
//! samples and passing them in.
//!
//! The policy is evaluated in a fixed order: manual pause, then blocking
//! processes, then the free-RAM floor. The first rule that denies wins and
//! supplies the human-readable reason exposed on the status surface.

use regex::Regex;
use serde::Serialize;

use crate::error::CoreError;

/// Commands whose presence in a process command line means the process is
/// merely *talking about* a blocked name (grep, process listings) rather
/// than being the blocked program itself.
const BENIGN_WRAPPERS: [&str; 4] = ["grep", "ps ", "pgrep", "killall"];

/// Shell binaries; a blocked name appearing inside a shell invocation is
/// not the blocked program itself.
const SHELLS: [&str; 3] = ["/bin/zsh", "/bin/bash", "/bin/sh"];

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Coarse state of host resources, recomputed on every poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceState {
    /// Good to admit new work.
    Available,
    /// Available memory is below the configured floor.
    LowRam,
    /// A configured blocking process is running.
    Blocked,
    /// Manually paused by an operator.
    Paused,
    /// Sampling failed; admission is denied until a sample succeeds.
    Unknown,
}

impl ResourceState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::LowRam => "low_ram",
            Self::Blocked => "blocked",
            Self::Paused => "paused",
            Self::Unknown => "unknown",
        }
    }
}

/// Host memory sample in bytes.
#[derive(Debug, Clone, Copy)]
pub struct MemorySample {
    pub available_bytes: u64,
    pub total_bytes: u64,
}

/// One running process as seen by the probe.
///
/// `name` and `exe` are matched case-insensitively; callers should pass
/// them through as reported by the OS.
#[derive(Debug, Clone)]
pub struct ProcessInfo {
    pub name: String,
    pub exe: String,
    pub cmdline: String,
    pub is_zombie: bool,
}

/// Result of one admission evaluation. Ephemeral — never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceStatus {
    pub state: ResourceState,
    pub available_ram_bytes: u64,
    pub total_ram_bytes: u64,
    pub cpu_percent: f32,
    pub blocking_processes: Vec<String>,
    pub can_admit: bool,
    pub reason: String,
}

impl ResourceStatus {
    /// Fail-closed status used when sampling errors out.
    pub fn unavailable(reason: String) -> Self {
        Self {
            state: ResourceState::Unknown,
            available_ram_bytes: 0,
            total_ram_bytes: 0,
            cpu_percent: 0.0,
            blocking_processes: Vec::new(),
            can_admit: false,
            reason,
        }
    }
}

/// Configured admission rules.
pub struct AdmissionPolicy {
    min_free_ram_bytes: u64,
    block_names: Vec<String>,
    block_cmdline_patterns: Vec<Regex>,
}

impl AdmissionPolicy {
    /// Build a policy from a RAM floor, a list of exact process names to
    /// block on, and a list of command-line regex patterns.
    ///
    /// Names are matched case-insensitively. Invalid patterns fail the
    /// whole construction — a misconfigured policy should fail fast.
    pub fn new(
        min_free_ram_bytes: u64,
        block_names: &[String],
        cmdline_patterns: &[String],
    ) -> Result<Self, CoreError> {
        let block_cmdline_patterns = cmdline_patterns
            .iter()
            .map(|p| {
                Regex::new(&format!("(?i){p}")).map_err(|e| {
                    CoreError::Validation(format!("invalid blocking pattern \"{p}\": {e}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            min_free_ram_bytes,
            block_names: block_names.iter().map(|n| n.to_lowercase()).collect(),
            block_cmdline_patterns,
        })
    }

    pub fn min_free_ram_bytes(&self) -> u64 {
        self.min_free_ram_bytes
    }

    /// Evaluate the policy against one set of samples.
    ///
    /// Order: manual pause, blocking processes, RAM floor. The reason string
    /// of the first denying rule is surfaced verbatim to operators.
    pub fn evaluate(
        &self,
        manually_paused: bool,
        memory: &MemorySample,
        cpu_percent: f32,
        processes: &[ProcessInfo],
    ) -> ResourceStatus {
        let blocking = self.find_blocking(processes);

        let (state, can_admit, reason) = if manually_paused {
            (ResourceState::Paused, false, "Manually paused".to_string())
        } else if !blocking.is_empty() {
            (
                ResourceState::Blocked,
                false,
                format!("Blocked by: {}", blocking.join(", ")),
            )
        } else if memory.available_bytes < self.min_free_ram_bytes {
            (
                ResourceState::LowRam,
                false,
                format!(
                    "RAM too low: {:.1}GB < {:.1}GB",
                    memory.available_bytes as f64 / GIB,
                    self.min_free_ram_bytes as f64 / GIB,
                ),
            )
        } else {
            (
                ResourceState::Available,
                true,
                "Resources available".to_string(),
            )
        };

        ResourceStatus {
            state,
            available_ram_bytes: memory.available_bytes,
            total_ram_bytes: memory.total_bytes,
            cpu_percent,
            blocking_processes: blocking,
            can_admit,
            reason,
        }
    }

    /// Find processes matching the block rules.
    ///
    /// Zombie/defunct processes never match. An exact name match is ignored
    /// when the command line is a benign wrapper (grep, ps, pgrep, killall)
    /// or the executable is a shell — the name merely appears inside another
    /// command. Command-line patterns only apply to processes with a real
    /// argument vector.
    pub fn find_blocking(&self, processes: &[ProcessInfo]) -> Vec<String> {
        let mut blocking: Vec<String> = Vec::new();

        for proc in processes {
            if proc.is_zombie {
                continue;
            }

            let name = proc.name.to_lowercase();
            let exe = proc.exe.to_lowercase();
            let cmdline = proc.cmdline.to_lowercase();

            if self.block_names.contains(&name) {
                if BENIGN_WRAPPERS.iter().any(|w| cmdline.contains(w)) {
                    continue;
                }
                if SHELLS.iter().any(|s| exe.contains(s)) {
                    continue;
                }
                blocking.push(name);
                continue;
            }

            // A blocked name can hide behind a renamed process: match the
            // executable path itself (e.g. ".../bin/ollama").
            if let Some(matched) = self
                .block_names
                .iter()
                .find(|n| exe.contains(&format!("bin/{n}")))
            {
                blocking.push(matched.clone());
                continue;
            }

            if !proc.cmdline.trim().is_empty()
                && self
                    .block_cmdline_patterns
                    .iter()
                    .any(|p| p.is_match(&proc.cmdline))
            {
                blocking.push(if name.is_empty() {
                    "unknown".to_string()
                } else {
                    name
                });
            }
        }

        blocking.sort();
        blocking.dedup();
        blocking
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> AdmissionPolicy {
        AdmissionPolicy::new(
            1024 * 1024 * 1024, // 1 GiB floor
            &["ollama".to_string(), "mlx_vlm".to_string()],
            &[r"python\s+.*\bvlm\b".to_string()],
        )
        .unwrap()
    }

    fn proc(name: &str, exe: &str, cmdline: &str) -> ProcessInfo {
        ProcessInfo {
            name: name.to_string(),
            exe: exe.to_string(),
            cmdline: cmdline.to_string(),
            is_zombie: false,
        }
    }

    fn mem(available_gb: f64) -> MemorySample {
        MemorySample {
            available_bytes: (available_gb * GIB) as u64,
            total_bytes: (8.0 * GIB) as u64,
        }
    }

    #[test]
    fn admits_with_headroom_and_no_blockers() {
        let status = policy().evaluate(false, &mem(4.0), 10.0, &[]);
        assert!(status.can_admit);
        assert_eq!(status.state, ResourceState::Available);
        assert_eq!(status.reason, "Resources available");
    }

    #[test]
    fn manual_pause_takes_precedence_over_everything() {
        let procs = vec![proc("ollama", "/usr/local/bin/ollama", "ollama serve")];
        let status = policy().evaluate(true, &mem(0.1), 99.0, &procs);
        assert_eq!(status.state, ResourceState::Paused);
        assert_eq!(status.reason, "Manually paused");
        assert!(!status.can_admit);
    }

    #[test]
    fn blocking_process_beats_low_ram() {
        let procs = vec![proc("ollama", "/usr/local/bin/ollama", "ollama serve")];
        let status = policy().evaluate(false, &mem(0.1), 10.0, &procs);
        assert_eq!(status.state, ResourceState::Blocked);
        assert_eq!(status.blocking_processes, vec!["ollama"]);
        assert!(status.reason.contains("Blocked by: ollama"));
    }

    #[test]
    fn low_ram_denies_with_actual_vs_floor() {
        let status = policy().evaluate(false, &mem(0.5), 10.0, &[]);
        assert_eq!(status.state, ResourceState::LowRam);
        assert!(!status.can_admit);
        assert!(status.reason.contains("RAM too low: 0.5GB < 1.0GB"));
    }

    #[test]
    fn admission_is_monotonic_around_the_floor() {
        let p = policy();
        assert!(p.evaluate(false, &mem(1.5), 0.0, &[]).can_admit);
        assert!(!p.evaluate(false, &mem(0.9), 0.0, &[]).can_admit);
        assert!(p.evaluate(false, &mem(1.5), 0.0, &[]).can_admit);
    }

    #[test]
    fn zombies_never_block() {
        let mut z = proc("ollama", "/usr/local/bin/ollama", "ollama serve");
        z.is_zombie = true;
        assert!(policy().find_blocking(&[z]).is_empty());
    }

    #[test]
    fn grep_for_a_blocked_name_does_not_block() {
        let procs = vec![
            proc("ollama", "/usr/bin/grep", "grep ollama"),
            proc("ollama", "/bin/zsh", "zsh -c 'which ollama'"),
        ];
        assert!(policy().find_blocking(&procs).is_empty());
    }

    #[test]
    fn exe_path_match_catches_renamed_process() {
        let procs = vec![proc("serve", "/opt/homebrew/bin/ollama", "serve")];
        assert_eq!(policy().find_blocking(&procs), vec!["ollama"]);
    }

    #[test]
    fn cmdline_pattern_matches_vlm_server() {
        let procs = vec![proc(
            "python3",
            "/usr/bin/python3",
            "python3 -m serve --vlm --port 9000",
        )];
        assert_eq!(policy().find_blocking(&procs), vec!["python3"]);
    }

    #[test]
    fn duplicate_blockers_are_deduplicated() {
        let procs = vec![
            proc("ollama", "/usr/local/bin/ollama", "ollama serve"),
            proc("ollama", "/usr/local/bin/ollama", "ollama runner"),
        ];
        assert_eq!(policy().find_blocking(&procs), vec!["ollama"]);
    }

    #[test]
    fn invalid_pattern_fails_construction() {
        let err = AdmissionPolicy::new(0, &[], &["(unclosed".to_string()]);
        assert!(err.is_err());
    }

    #[test]
    fn unavailable_status_fails_closed() {
        let status = ResourceStatus::unavailable("probe exploded".to_string());
        assert!(!status.can_admit);
        assert_eq!(status.state, ResourceState::Unknown);
    }
}
