//! Backend seam for the detection services.
//!
//! [`DetectionBackend`] is implemented by the HTTP client in
//! [`crate::api`] and by in-memory fakes in tests.

use async_trait::async_trait;

use crate::kind::DetectorKind;
use crate::messages::{
    FrameQuery, QueryResponse, StatusResponse, SubmitRequest, SubmitResponse, TriggerQuery,
    TriggerResponse,
};

/// Errors from the detection backend boundary.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The HTTP request itself failed (network, DNS, TLS, decode).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The backend returned a non-2xx status code.
    #[error("Detection API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The configured base URL cannot address a job route.
    #[error("Invalid detection API URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// One detector's analysis service.
#[async_trait]
pub trait DetectionBackend<K: DetectorKind>: Send + Sync {
    /// Start (or look up) an analysis job for the given area.
    async fn submit_job(&self, request: &SubmitRequest) -> Result<SubmitResponse, BackendError>;

    async fn poll_status(&self, cache_key: &str) -> Result<StatusResponse, BackendError>;

    /// Detections at one timestamp. The backend does its own caching.
    async fn query_detections(
        &self,
        cache_key: &str,
        query: &FrameQuery,
    ) -> Result<QueryResponse<K::Detection>, BackendError>;

    /// Ask the backend to discard a cache entry.
    async fn invalidate_cache(&self, cache_key: &str) -> Result<(), BackendError>;
}

/// Trigger-text lookup restricted to a sub-region (dual-area mode).
#[async_trait]
pub trait TriggerBackend: Send + Sync {
    async fn query_trigger(
        &self,
        cache_key: &str,
        query: &TriggerQuery,
    ) -> Result<TriggerResponse, BackendError>;
}
