//! In-memory detection service and session harness for integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use roisync_core::roi::AreaMode;
use roisync_detection::backend::{BackendError, DetectionBackend, TriggerBackend};
use roisync_detection::job::DetectionJobManager;
use roisync_detection::kind::{Code, DetectorKind, Movement};
use roisync_detection::messages::{
    FrameQuery, JobStatus, QueryResponse, StatusResponse, SubmitRequest, SubmitResponse,
    SubmitStatus, TriggerQuery, TriggerResponse,
};
use roisync_session::config::SessionConfig;
use roisync_session::session::AnalysisSession;
use roisync_session::video::SimulatedVideo;

// ---------------------------------------------------------------------------
// Fake backend
// ---------------------------------------------------------------------------

pub struct FakeState<K: DetectorKind> {
    pub submit_status: SubmitStatus,
    pub status: StatusResponse,
    /// `None` makes every frame query fail with a 503.
    pub detections: Option<Vec<K::Detection>>,
    pub trigger: Option<TriggerResponse>,
    pub submits: Vec<SubmitRequest>,
    pub invalidated: Vec<String>,
    pub trigger_queries: Vec<TriggerQuery>,
    issued: u32,
}

pub struct FakeBackend<K: DetectorKind> {
    state: Mutex<FakeState<K>>,
}

impl<K: DetectorKind> FakeBackend<K> {
    /// A backend whose jobs complete on submission and answer every query
    /// with no detections.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(FakeState {
                submit_status: SubmitStatus::Completed,
                status: StatusResponse {
                    status: JobStatus::Completed,
                    progress: 100.0,
                    processed_count: 0,
                    error: None,
                },
                detections: Some(Vec::new()),
                trigger: None,
                submits: Vec::new(),
                invalidated: Vec::new(),
                trigger_queries: Vec::new(),
                issued: 0,
            }),
        })
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState<K>> {
        self.state.lock().unwrap()
    }

    /// Jobs stay in progress with `processed_count` samples analysed.
    pub fn running(&self, processed_count: u64) {
        let mut state = self.state();
        state.submit_status = SubmitStatus::InProgress;
        state.status = StatusResponse {
            status: JobStatus::InProgress,
            progress: 10.0,
            processed_count,
            error: None,
        };
    }

    /// The status endpoint stops recognising the job.
    pub fn lose_job(&self) {
        self.state().status = StatusResponse {
            status: JobStatus::NotFound,
            progress: 0.0,
            processed_count: 0,
            error: None,
        };
    }

    pub fn submits(&self) -> Vec<SubmitRequest> {
        self.state().submits.clone()
    }

    pub fn invalidated(&self) -> Vec<String> {
        self.state().invalidated.clone()
    }
}

#[async_trait]
impl<K: DetectorKind> DetectionBackend<K> for FakeBackend<K> {
    async fn submit_job(&self, request: &SubmitRequest) -> Result<SubmitResponse, BackendError> {
        let mut state = self.state();
        state.submits.push(request.clone());
        state.issued += 1;
        Ok(SubmitResponse {
            cache_key: format!("{}-{}", K::NAME, state.issued),
            status: state.submit_status,
        })
    }

    async fn poll_status(&self, _cache_key: &str) -> Result<StatusResponse, BackendError> {
        Ok(self.state().status.clone())
    }

    async fn query_detections(
        &self,
        _cache_key: &str,
        _query: &FrameQuery,
    ) -> Result<QueryResponse<K::Detection>, BackendError> {
        match &self.state().detections {
            Some(detections) => Ok(QueryResponse {
                success: true,
                detections: detections.clone(),
                error: None,
            }),
            None => Err(BackendError::Api {
                status: 503,
                body: "frame not analysed".to_string(),
            }),
        }
    }

    async fn invalidate_cache(&self, cache_key: &str) -> Result<(), BackendError> {
        self.state().invalidated.push(cache_key.to_string());
        Ok(())
    }
}

#[async_trait]
impl TriggerBackend for FakeBackend<Code> {
    async fn query_trigger(
        &self,
        _cache_key: &str,
        query: &TriggerQuery,
    ) -> Result<TriggerResponse, BackendError> {
        let mut state = self.state();
        state.trigger_queries.push(query.clone());
        Ok(state.trigger.clone().unwrap_or(TriggerResponse {
            success: true,
            detected: false,
            text: None,
        }))
    }
}

// ---------------------------------------------------------------------------
// Session harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub session: AnalysisSession,
    pub movement: Arc<FakeBackend<Movement>>,
    pub code: Arc<FakeBackend<Code>>,
    pub video: Arc<SimulatedVideo>,
}

pub fn config(mode: AreaMode) -> SessionConfig {
    let mode = match mode {
        AreaMode::Single => "single",
        AreaMode::Dual => "dual",
    };
    SessionConfig::from_lookup(|name| {
        let value = match name {
            "DETECTION_API_URL" => "http://detector.test/api",
            "VIDEO_PATH" => "/videos/station-4.mp4",
            "AREA_MODE" => mode,
            "TRIGGER_TEXT" => "START",
            _ => return None,
        };
        Some(value.to_string())
    })
    .unwrap()
}

pub fn harness(mode: AreaMode) -> Harness {
    let movement = FakeBackend::<Movement>::new();
    let code = FakeBackend::<Code>::new();
    let video = Arc::new(SimulatedVideo::new(120.0));

    let trigger: Option<Arc<dyn TriggerBackend>> = match mode {
        AreaMode::Dual => Some(code.clone() as Arc<dyn TriggerBackend>),
        AreaMode::Single => None,
    };
    let session = AnalysisSession::new(
        &config(mode),
        Arc::new(DetectionJobManager::<Movement>::new(movement.clone())),
        Arc::new(DetectionJobManager::<Code>::new(code.clone())),
        trigger,
        video.clone(),
    )
    .unwrap();

    Harness {
        session,
        movement,
        code,
        video,
    }
}
