//! Live per-job progress tracking.
//!
//! [`JobProgress`] is the in-memory view exposed over the status surface;
//! it is created on enqueue and mutated only by the job's own worker, so
//! updates can never regress out of order. [`ProgressEvent`] is the unit of
//! progress streamed out of an isolation boundary — process-isolated jobs
//! emit these as newline-delimited JSON on stdout.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::job_state::JobState;
use crate::types::Timestamp;

const MIB: f64 = 1024.0 * 1024.0;

/// One unit of progress reported by a running job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    Page {
        page: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        total: Option<u32>,
    },
    Items { count: u64 },
    Bytes { count: u64 },
    Url { url: String },
    Message { text: String },
}

/// Real-time progress of a job.
#[derive(Debug, Clone, Serialize)]
pub struct JobProgress {
    pub job: String,
    pub state: JobState,
    pub started_at: Option<Timestamp>,
    pub current_page: u32,
    pub total_pages: Option<u32>,
    pub items_collected: u64,
    pub bytes_downloaded: u64,
    pub current_url: String,
    pub last_activity: Option<Timestamp>,
    pub error: Option<String>,
    pub retry_count: u32,
}

impl JobProgress {
    pub fn new(job: impl Into<String>) -> Self {
        Self {
            job: job.into(),
            state: JobState::Idle,
            started_at: None,
            current_page: 0,
            total_pages: None,
            items_collected: 0,
            bytes_downloaded: 0,
            current_url: String::new(),
            last_activity: None,
            error: None,
            retry_count: 0,
        }
    }

    pub fn queued(job: impl Into<String>) -> Self {
        let mut p = Self::new(job);
        p.state = JobState::Queued;
        p
    }

    /// Move to a new state, stamping the activity clock. Entering `Starting`
    /// resets the per-run counters but keeps `retry_count`.
    pub fn set_state(&mut self, state: JobState) {
        if state == JobState::Starting {
            self.started_at = Some(Utc::now());
            self.current_page = 0;
            self.items_collected = 0;
            self.bytes_downloaded = 0;
            self.current_url.clear();
            self.error = None;
        }
        self.state = state;
        self.touch();
    }

    /// Fold one progress event into the counters.
    pub fn apply(&mut self, event: &ProgressEvent) {
        match event {
            ProgressEvent::Page { page, total } => {
                self.current_page = *page;
                if total.is_some() {
                    self.total_pages = *total;
                }
            }
            ProgressEvent::Items { count } => self.items_collected = *count,
            ProgressEvent::Bytes { count } => self.bytes_downloaded = *count,
            ProgressEvent::Url { url } => self.current_url = url.clone(),
            ProgressEvent::Message { .. } => {}
        }
        self.touch();
    }

    fn touch(&mut self) {
        self.last_activity = Some(Utc::now());
    }

    /// Human-readable one-liner for dashboards.
    pub fn status_message(&self) -> String {
        match self.state {
            JobState::Idle => "Idle".to_string(),
            JobState::Queued => "Queued, waiting for turn".to_string(),
            JobState::Starting => "Starting up...".to_string(),
            JobState::Running => {
                let pages = match self.total_pages {
                    Some(total) => format!("page {}/{total}", self.current_page),
                    None => format!("page {}", self.current_page),
                };
                format!(
                    "Running: {pages}, {} items, {:.1}MB",
                    self.items_collected,
                    self.bytes_downloaded as f64 / MIB,
                )
            }
            JobState::PausedLowRam => "Paused: Low RAM".to_string(),
            JobState::PausedBlocked => "Paused: blocking process running".to_string(),
            JobState::Completed => format!("Completed: {} items", self.items_collected),
            JobState::Failed => format!(
                "Failed: {}",
                self.error.as_deref().unwrap_or("unknown error")
            ),
            JobState::WaitingRetry => {
                format!("Waiting to retry (attempt {})", self.retry_count)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_accumulate() {
        let mut p = JobProgress::queued("ao3");
        p.set_state(JobState::Starting);
        p.set_state(JobState::Running);
        p.apply(&ProgressEvent::Page {
            page: 3,
            total: Some(10),
        });
        p.apply(&ProgressEvent::Items { count: 42 });
        p.apply(&ProgressEvent::Bytes { count: 2 * 1024 * 1024 });
        p.apply(&ProgressEvent::Url {
            url: "https://example.org/p3".to_string(),
        });

        assert_eq!(p.current_page, 3);
        assert_eq!(p.total_pages, Some(10));
        assert_eq!(p.items_collected, 42);
        assert_eq!(p.current_url, "https://example.org/p3");
        assert_eq!(p.status_message(), "Running: page 3/10, 42 items, 2.0MB");
    }

    #[test]
    fn starting_resets_counters_but_keeps_retry_count() {
        let mut p = JobProgress::queued("nifty");
        p.retry_count = 2;
        p.items_collected = 100;
        p.error = Some("boom".to_string());
        p.set_state(JobState::Starting);

        assert_eq!(p.items_collected, 0);
        assert!(p.error.is_none());
        assert_eq!(p.retry_count, 2);
        assert!(p.started_at.is_some());
    }

    #[test]
    fn failed_message_carries_error() {
        let mut p = JobProgress::new("wwd");
        p.error = Some("connection reset".to_string());
        p.state = JobState::Failed;
        assert_eq!(p.status_message(), "Failed: connection reset");
    }

    #[test]
    fn event_json_round_trip() {
        let line = r#"{"type":"items","count":7}"#;
        let event: ProgressEvent = serde_json::from_str(line).unwrap();
        let mut p = JobProgress::new("x");
        p.apply(&event);
        assert_eq!(p.items_collected, 7);
    }
}
