//! REST client for the detection service HTTP endpoints.
//!
//! Wraps job submission, status polling, per-frame queries, trigger
//! queries, and cache invalidation using [`reqwest`]. One
//! [`DetectionApi`] is bound to one detector kind; its routes live under
//! `{api_url}/{K::ROUTE_PREFIX}`.

use std::marker::PhantomData;

use async_trait::async_trait;

use crate::backend::{BackendError, DetectionBackend, TriggerBackend};
use crate::kind::{Code, DetectorKind};
use crate::messages::{
    FrameQuery, QueryResponse, StatusResponse, SubmitRequest, SubmitResponse, TriggerQuery,
    TriggerResponse,
};

/// HTTP client for one detector kind on a detection service.
pub struct DetectionApi<K> {
    client: reqwest::Client,
    api_url: String,
    _kind: PhantomData<fn() -> K>,
}

impl<K: DetectorKind> DetectionApi<K> {
    /// Create a new API client.
    ///
    /// * `api_url` - Base HTTP URL, e.g. `http://host:8000/api`.
    pub fn new(api_url: String) -> Self {
        Self::with_client(reqwest::Client::new(), api_url)
    }

    /// Create an API client reusing an existing [`reqwest::Client`]
    /// (both detector kinds can share one connection pool).
    pub fn with_client(client: reqwest::Client, api_url: String) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            _kind: PhantomData,
        }
    }

    pub fn jobs_url(&self) -> String {
        format!("{}/{}/jobs", self.api_url, K::ROUTE_PREFIX)
    }

    /// URL of one job, optionally followed by an action segment.
    ///
    /// The cache key is opaque and is percent-encoded as a single path
    /// segment.
    pub fn job_url(&self, cache_key: &str, action: Option<&str>) -> Result<reqwest::Url, BackendError> {
        let jobs_url = self.jobs_url();
        let invalid = |reason: String| BackendError::InvalidUrl {
            url: jobs_url.clone(),
            reason,
        };
        let mut url = reqwest::Url::parse(&jobs_url).map_err(|e| invalid(e.to_string()))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| invalid("cannot be a base URL".to_string()))?;
            segments.push(cache_key);
            if let Some(action) = action {
                segments.push(action);
            }
        }
        Ok(url)
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`BackendError::Api`]
    /// containing the status and body text on failure.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, BackendError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(BackendError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, BackendError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl<K: DetectorKind> DetectionBackend<K> for DetectionApi<K> {
    async fn submit_job(&self, request: &SubmitRequest) -> Result<SubmitResponse, BackendError> {
        let response = self
            .client
            .post(self.jobs_url())
            .json(request)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    async fn poll_status(&self, cache_key: &str) -> Result<StatusResponse, BackendError> {
        let response = self.client.get(self.job_url(cache_key, None)?).send().await?;

        Self::parse_response(response).await
    }

    async fn query_detections(
        &self,
        cache_key: &str,
        query: &FrameQuery,
    ) -> Result<QueryResponse<K::Detection>, BackendError> {
        let response = self
            .client
            .post(self.job_url(cache_key, Some("detections"))?)
            .json(query)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    async fn invalidate_cache(&self, cache_key: &str) -> Result<(), BackendError> {
        let response = self.client.delete(self.job_url(cache_key, None)?).send().await?;

        Self::ensure_success(response).await?;
        Ok(())
    }
}

#[async_trait]
impl TriggerBackend for DetectionApi<Code> {
    async fn query_trigger(
        &self,
        cache_key: &str,
        query: &TriggerQuery,
    ) -> Result<TriggerResponse, BackendError> {
        let response = self
            .client
            .post(self.job_url(cache_key, Some("trigger"))?)
            .json(query)
            .send()
            .await?;

        Self::parse_response(response).await
    }
}
