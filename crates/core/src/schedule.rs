//! Cron trigger parsing and fired-minute bookkeeping.
//!
//! Triggers use real cron expressions. A trigger fires at most once per
//! matching minute: [`FiredMinuteTracker`] records (job, minute) keys so the
//! scheduler loop can tick more often than once a minute without double
//! firing.

use std::collections::HashSet;
use std::str::FromStr;

use chrono::{Timelike, Utc};
use cron::Schedule;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::Timestamp;

/// Minutes a fired key is retained before being pruned.
const FIRED_RETENTION_MINUTES: i64 = 5;

/// A cron trigger for a named job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    pub job: String,
    pub cron: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// Parse a cron expression, accepting the classic five-field form.
///
/// The parser wants a seconds field; `"0 2 * * *"` is normalized to
/// `"0 0 2 * * *"` so operator-facing config can stay in the familiar
/// five-field notation.
pub fn parse_cron(expr: &str) -> Result<Schedule, CoreError> {
    let expr = expr.trim();
    let normalized = if expr.split_whitespace().count() == 5 {
        format!("0 {expr}")
    } else {
        expr.to_string()
    };

    Schedule::from_str(&normalized)
        .map_err(|e| CoreError::Validation(format!("invalid cron expression \"{expr}\": {e}")))
}

/// Whether `schedule` fires within the minute containing `now`.
pub fn fires_within_minute(schedule: &Schedule, now: Timestamp) -> bool {
    match now.with_second(0).and_then(|t| t.with_nanosecond(0)) {
        Some(minute_start) => schedule.includes(minute_start),
        None => false,
    }
}

/// Tracks which (job, minute) pairs have already fired.
///
/// Updated in place by the scheduler loop; old keys are pruned so the set
/// stays bounded no matter how long the daemon runs.
#[derive(Debug, Default)]
pub struct FiredMinuteTracker {
    fired: HashSet<(String, i64)>,
}

impl FiredMinuteTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a firing for `job` in the minute containing `now`.
    ///
    /// Returns `true` the first time in a given minute, `false` afterwards.
    pub fn should_fire(&mut self, job: &str, now: Timestamp) -> bool {
        let minute = now.timestamp() / 60;
        self.prune(minute);
        self.fired.insert((job.to_string(), minute))
    }

    fn prune(&mut self, current_minute: i64) {
        self.fired
            .retain(|(_, minute)| current_minute - minute <= FIRED_RETENTION_MINUTES);
    }
}

/// Convenience: the next few upcoming fire times, for status display.
pub fn upcoming(schedule: &Schedule, count: usize) -> Vec<Timestamp> {
    schedule.upcoming(Utc).take(count).collect()
}
