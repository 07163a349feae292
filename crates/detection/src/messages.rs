//! Detection backend wire types.
//!
//! Every endpoint speaks JSON. Status fields are lowercase snake-case
//! strings (`"in_progress"`, `"not_found"`, ...).

use roisync_core::types::{PixelRect, Size};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Job submission
// ---------------------------------------------------------------------------

/// Body of `POST /{kind}/jobs`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmitRequest {
    pub video_path: String,
    /// Analysed area in source pixels.
    pub roi: PixelRect,
    /// Dual-area mode: trigger sub-region, analysed alongside `roi`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger_roi: Option<PixelRect>,
    pub sampling_rate_hz: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitStatus {
    /// Results were already cached; no polling needed.
    Completed,
    InProgress,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SubmitResponse {
    /// Handle for every later status/query/invalidate call.
    pub cache_key: String,
    pub status: SubmitStatus,
}

// ---------------------------------------------------------------------------
// Status polling
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Completed,
    InProgress,
    NotFound,
}

/// Body of `GET /{kind}/jobs/{cache_key}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StatusResponse {
    pub status: JobStatus,
    /// Approximate percentage, 0-100. May be noisy.
    #[serde(default)]
    pub progress: f64,
    /// Samples analysed so far.
    #[serde(default)]
    pub processed_count: u64,
    #[serde(default)]
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// Per-frame queries
// ---------------------------------------------------------------------------

/// Body of `POST /{kind}/jobs/{cache_key}/detections`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameQuery {
    pub timestamp: f64,
    pub display: Size,
    pub source: Size,
    pub roi: PixelRect,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QueryResponse<T> {
    pub success: bool,
    #[serde(default = "Vec::new")]
    pub detections: Vec<T>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Body of `POST /code/jobs/{cache_key}/trigger`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TriggerQuery {
    pub timestamp: f64,
    pub display: Size,
    pub source: Size,
    pub region: PixelRect,
    pub target_text: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TriggerResponse {
    pub success: bool,
    #[serde(default)]
    pub detected: bool,
    #[serde(default)]
    pub text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use roisync_core::detection::{MovementDetection, QrDetection};

    #[test]
    fn parse_cached_submit_response() {
        let json = r#"{"cache_key":"mv-9f2c","status":"completed"}"#;
        let resp: SubmitResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.cache_key, "mv-9f2c");
        assert_eq!(resp.status, SubmitStatus::Completed);
    }

    #[test]
    fn parse_in_progress_status() {
        let json = r#"{"status":"in_progress","progress":42.5,"processed_count":85}"#;
        let resp: StatusResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.status, JobStatus::InProgress);
        assert_eq!(resp.processed_count, 85);
        assert!(resp.error.is_none());
    }

    #[test]
    fn parse_not_found_status_with_defaults() {
        let json = r#"{"status":"not_found","error":"expired"}"#;
        let resp: StatusResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.status, JobStatus::NotFound);
        assert_eq!(resp.progress, 0.0);
        assert_eq!(resp.error.as_deref(), Some("expired"));
    }

    #[test]
    fn parse_unknown_status_returns_error() {
        let json = r#"{"status":"exploded"}"#;
        assert!(serde_json::from_str::<StatusResponse>(json).is_err());
    }

    #[test]
    fn parse_movement_query_response() {
        let json = r#"{"success":true,"detections":[{"points":[{"x":1.0,"y":2.0}],"confidence":0.7}]}"#;
        let resp: QueryResponse<MovementDetection> = serde_json::from_str(json).unwrap();
        assert!(resp.success);
        assert_eq!(resp.detections[0].points.len(), 1);
    }

    #[test]
    fn parse_failed_code_query_without_detections() {
        let json = r#"{"success":false,"error":"frame not analysed yet"}"#;
        let resp: QueryResponse<QrDetection> = serde_json::from_str(json).unwrap();
        assert!(!resp.success);
        assert!(resp.detections.is_empty());
    }

    #[test]
    fn submit_request_omits_absent_trigger_roi() {
        let req = SubmitRequest {
            video_path: "/videos/a.mp4".into(),
            roi: PixelRect::new(0, 0, 100, 50),
            trigger_roi: None,
            sampling_rate_hz: 5.0,
        };
        let value = serde_json::to_value(&req).unwrap();
        assert!(value.get("trigger_roi").is_none());
        assert_eq!(value["roi"]["width"], 100);
    }

    #[test]
    fn parse_trigger_response() {
        let json = r#"{"success":true,"detected":true,"text":"START"}"#;
        let resp: TriggerResponse = serde_json::from_str(json).unwrap();
        assert!(resp.detected);
        assert_eq!(resp.text.as_deref(), Some("START"));
    }
}
