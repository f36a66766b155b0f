//! Job lifecycle states and the transition table.
//!
//! This module lives in `core` (zero internal deps) so it can be used by
//! both the daemon engine and any future worker or CLI tooling.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a job as tracked by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Idle,
    Queued,
    Starting,
    Running,
    /// Admission denied on the RAM floor while this job was next in line
    /// (or mid-run).
    PausedLowRam,
    /// Admission denied because a configured blocking process is running.
    PausedBlocked,
    Completed,
    Failed,
    /// Failed with retries remaining; re-queued after the backoff.
    WaitingRetry,
}

impl JobState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Queued => "queued",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::PausedLowRam => "paused_low_ram",
            Self::PausedBlocked => "paused_blocked",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::WaitingRetry => "waiting_retry",
        }
    }

    /// Terminal states accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

pub mod state_machine {
    use super::JobState::{self, *};

    /// Returns the set of valid target states reachable from `from`.
    ///
    /// Terminal states return an empty slice. The paused states sit between
    /// `Queued`/`Running` and execution: a queued head job is marked paused
    /// for visibility while admission is denied, and resumes through
    /// `Starting`; a running job pauses in place and resumes to `Running`.
    pub fn valid_transitions(from: JobState) -> &'static [JobState] {
        match from {
            Idle => &[Queued],
            Queued => &[Starting, PausedLowRam, PausedBlocked],
            Starting => &[Running, Failed],
            Running => &[Completed, Failed, WaitingRetry, PausedLowRam, PausedBlocked],
            PausedLowRam => &[Queued, Starting, Running],
            PausedBlocked => &[Queued, Starting, Running],
            WaitingRetry => &[Queued],
            Completed | Failed => &[],
        }
    }

    /// Check whether a transition from `from` to `to` is valid.
    pub fn can_transition(from: JobState, to: JobState) -> bool {
        valid_transitions(from).contains(&to)
    }

    /// Validate a transition, returning a descriptive error for invalid ones.
    pub fn validate_transition(from: JobState, to: JobState) -> Result<(), String> {
        if can_transition(from, to) {
            Ok(())
        } else {
            Err(format!(
                "Invalid transition: {} -> {}",
                from.as_str(),
                to.as_str()
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::state_machine::*;
    use super::JobState::*;

    // -----------------------------------------------------------------------
    // Valid transitions
    // -----------------------------------------------------------------------

    #[test]
    fn idle_to_queued() {
        assert!(can_transition(Idle, Queued));
    }

    #[test]
    fn queued_to_starting() {
        assert!(can_transition(Queued, Starting));
    }

    #[test]
    fn queued_to_paused_low_ram() {
        assert!(can_transition(Queued, PausedLowRam));
    }

    #[test]
    fn queued_to_paused_blocked() {
        assert!(can_transition(Queued, PausedBlocked));
    }

    #[test]
    fn starting_to_running() {
        assert!(can_transition(Starting, Running));
    }

    #[test]
    fn running_to_completed() {
        assert!(can_transition(Running, Completed));
    }

    #[test]
    fn running_to_failed() {
        assert!(can_transition(Running, Failed));
    }

    #[test]
    fn running_to_waiting_retry() {
        assert!(can_transition(Running, WaitingRetry));
    }

    #[test]
    fn running_pauses_and_resumes() {
        assert!(can_transition(Running, PausedLowRam));
        assert!(can_transition(PausedLowRam, Running));
    }

    #[test]
    fn paused_head_job_can_start_once_admitted() {
        assert!(can_transition(PausedLowRam, Starting));
        assert!(can_transition(PausedBlocked, Starting));
    }

    #[test]
    fn waiting_retry_loops_to_queued() {
        assert!(can_transition(WaitingRetry, Queued));
    }

    // -----------------------------------------------------------------------
    // Terminal states
    // -----------------------------------------------------------------------

    #[test]
    fn completed_has_no_transitions() {
        assert!(valid_transitions(Completed).is_empty());
        assert!(Completed.is_terminal());
    }

    #[test]
    fn failed_has_no_transitions() {
        assert!(valid_transitions(Failed).is_empty());
        assert!(Failed.is_terminal());
    }

    // -----------------------------------------------------------------------
    // Invalid transitions
    // -----------------------------------------------------------------------

    #[test]
    fn completed_to_running_invalid() {
        assert!(!can_transition(Completed, Running));
    }

    #[test]
    fn queued_to_completed_invalid() {
        assert!(!can_transition(Queued, Completed));
    }

    #[test]
    fn idle_to_running_invalid() {
        assert!(!can_transition(Idle, Running));
    }

    #[test]
    fn validate_transition_err_is_descriptive() {
        let err = validate_transition(Completed, Running).unwrap_err();
        assert!(err.contains("completed"));
        assert!(err.contains("running"));
    }
}
