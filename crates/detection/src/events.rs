//! Job lifecycle events emitted by the detection job managers.
//!
//! Published on a [`tokio::sync::broadcast`] channel; subscribers (logs,
//! UI progress bars) receive every transition of every job.

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEventKind {
    /// The backend accepted the job. `cached` means it was already complete.
    Submitted { cached: bool },

    /// A poll raised progress or processed count.
    Progress { percent: f64, processed_count: u64 },

    Completed,

    /// Submission or polling failed; the job is in its terminal error state.
    Failed { error: String },

    /// Local handle cleared; a remote discard was requested if a handle existed.
    Invalidated,
}

/// A lifecycle transition of one detector's job.
#[derive(Debug, Clone, Serialize)]
pub struct JobEvent {
    /// Detector name, e.g. `"movement"` or `"code"`.
    pub detector: &'static str,
    pub cache_key: Option<String>,
    pub kind: JobEventKind,
    /// When the transition was applied (UTC).
    pub timestamp: DateTime<Utc>,
}

impl JobEvent {
    pub fn new(detector: &'static str, cache_key: Option<String>, kind: JobEventKind) -> Self {
        Self {
            detector,
            cache_key,
            kind,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serializes_with_tagged_kind() {
        let event = JobEvent::new(
            "movement",
            Some("mv-1".into()),
            JobEventKind::Progress {
                percent: 12.5,
                processed_count: 25,
            },
        );
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["detector"], "movement");
        assert_eq!(value["kind"]["type"], "progress");
        assert_eq!(value["kind"]["processed_count"], 25);
    }

    #[test]
    fn invalidated_without_handle_serializes_null_key() {
        let event = JobEvent::new("code", None, JobEventKind::Invalidated);
        let value = serde_json::to_value(&event).unwrap();
        assert!(value["cache_key"].is_null());
        assert_eq!(value["kind"]["type"], "invalidated");
    }
}
