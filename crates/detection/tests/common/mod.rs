//! Scripted in-memory detection backend shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use roisync_core::types::PixelRect;
use roisync_detection::backend::{BackendError, DetectionBackend};
use roisync_detection::job::JobRequest;
use roisync_detection::kind::DetectorKind;
use roisync_detection::messages::{
    FrameQuery, JobStatus, QueryResponse, StatusResponse, SubmitRequest, SubmitResponse,
    SubmitStatus,
};

/// Backend whose answers are queued up front.
///
/// Status responses are consumed in order; the last one repeats once the
/// queue is down to a single entry.
pub struct ScriptedBackend<K: DetectorKind> {
    pub submits: Mutex<VecDeque<Result<SubmitResponse, BackendError>>>,
    pub statuses: Mutex<VecDeque<Result<StatusResponse, u16>>>,
    pub query: Mutex<Result<QueryResponse<K::Detection>, u16>>,
    pub submit_delay: Option<Duration>,
    pub invalidate_fails: bool,
    pub invalidated: Mutex<Vec<String>>,
    pub submit_requests: Mutex<Vec<SubmitRequest>>,
    pub poll_calls: AtomicUsize,
    _kind: PhantomData<fn() -> K>,
}

impl<K: DetectorKind> ScriptedBackend<K> {
    pub fn new() -> Self {
        Self {
            submits: Mutex::new(VecDeque::new()),
            statuses: Mutex::new(VecDeque::new()),
            query: Mutex::new(Err(503)),
            submit_delay: None,
            invalidate_fails: false,
            invalidated: Mutex::new(Vec::new()),
            submit_requests: Mutex::new(Vec::new()),
            poll_calls: AtomicUsize::new(0),
            _kind: PhantomData,
        }
    }

    pub fn accept(self, cache_key: &str, status: SubmitStatus) -> Self {
        self.submits.lock().unwrap().push_back(Ok(SubmitResponse {
            cache_key: cache_key.to_string(),
            status,
        }));
        self
    }

    pub fn reject(self, status: u16) -> Self {
        self.submits.lock().unwrap().push_back(Err(api_error(status)));
        self
    }

    pub fn status(self, status: Result<StatusResponse, u16>) -> Self {
        self.statuses.lock().unwrap().push_back(status);
        self
    }

    pub fn query(self, response: Result<QueryResponse<K::Detection>, u16>) -> Self {
        *self.query.lock().unwrap() = response;
        self
    }

    pub fn poll_calls(&self) -> usize {
        self.poll_calls.load(Ordering::SeqCst)
    }

    pub fn invalidated(&self) -> Vec<String> {
        self.invalidated.lock().unwrap().clone()
    }

    pub fn submit_count(&self) -> usize {
        self.submit_requests.lock().unwrap().len()
    }
}

#[async_trait]
impl<K: DetectorKind> DetectionBackend<K> for ScriptedBackend<K> {
    async fn submit_job(&self, request: &SubmitRequest) -> Result<SubmitResponse, BackendError> {
        self.submit_requests.lock().unwrap().push(request.clone());
        if let Some(delay) = self.submit_delay {
            tokio::time::sleep(delay).await;
        }
        self.submits
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(api_error(500)))
    }

    async fn poll_status(&self, _cache_key: &str) -> Result<StatusResponse, BackendError> {
        self.poll_calls.fetch_add(1, Ordering::SeqCst);
        let mut statuses = self.statuses.lock().unwrap();
        let next = if statuses.len() > 1 {
            statuses.pop_front()
        } else {
            statuses.front().cloned()
        };
        match next {
            Some(Ok(status)) => Ok(status),
            Some(Err(code)) => Err(api_error(code)),
            None => Err(api_error(404)),
        }
    }

    async fn query_detections(
        &self,
        _cache_key: &str,
        _query: &FrameQuery,
    ) -> Result<QueryResponse<K::Detection>, BackendError> {
        self.query.lock().unwrap().clone().map_err(api_error)
    }

    async fn invalidate_cache(&self, cache_key: &str) -> Result<(), BackendError> {
        self.invalidated.lock().unwrap().push(cache_key.to_string());
        if self.invalidate_fails {
            return Err(api_error(502));
        }
        Ok(())
    }
}

pub fn api_error(status: u16) -> BackendError {
    BackendError::Api {
        status,
        body: "scripted failure".to_string(),
    }
}

pub fn in_progress(progress: f64, processed_count: u64) -> Result<StatusResponse, u16> {
    Ok(StatusResponse {
        status: JobStatus::InProgress,
        progress,
        processed_count,
        error: None,
    })
}

pub fn completed(processed_count: u64) -> Result<StatusResponse, u16> {
    Ok(StatusResponse {
        status: JobStatus::Completed,
        progress: 100.0,
        processed_count,
        error: None,
    })
}

pub fn not_found() -> Result<StatusResponse, u16> {
    Ok(StatusResponse {
        status: JobStatus::NotFound,
        progress: 0.0,
        processed_count: 0,
        error: None,
    })
}

pub fn request() -> JobRequest {
    JobRequest {
        video_path: "/videos/bench-01.mp4".to_string(),
        roi: PixelRect::new(100, 80, 640, 360),
        trigger_roi: None,
        sampling_rate_hz: 5.0,
    }
}
