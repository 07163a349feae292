//! Lifecycle of one server-side analysis job per detector kind.
//!
//! [`DetectionJobManager`] submits a job, polls its status on a fixed
//! interval from a spawned task, holds the resulting cache handle, and
//! tears the handle down on invalidation. Failures never escape as
//! errors from `submit`; they land in [`DetectionJob::error`].
//!
//! A generation counter fences stale responses: anything that arrives
//! after `invalidate()` or a newer `submit()` is dropped.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use roisync_core::geometry::DisplayMapping;
use roisync_core::playback::ProgressReport;
use roisync_core::types::PixelRect;
use serde::Serialize;
use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;

use crate::backend::{BackendError, DetectionBackend};
use crate::events::{JobEvent, JobEventKind};
use crate::kind::DetectorKind;
use crate::messages::{FrameQuery, JobStatus, StatusResponse, SubmitRequest, SubmitStatus};

/// Default interval between status probes.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Shorter poll intervals are raised to this.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Broadcast channel capacity for job events.
const EVENT_CHANNEL_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// Job state
// ---------------------------------------------------------------------------

/// Local view of one detector's job.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DetectionJob {
    pub cache_key: Option<String>,
    pub is_processing: bool,
    /// 0-100, never decreases while the same job is held.
    pub progress: f64,
    /// Never decreases while the same job is held.
    pub processed_count: u64,
    pub completed: bool,
    pub error: Option<String>,
}

/// What the poll loop should do after applying a status response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStep {
    Continue,
    Completed,
    Failed,
}

impl DetectionJob {
    /// True for the reset state: no handle, nothing running, nothing finished.
    pub fn is_empty(&self) -> bool {
        self.cache_key.is_none() && !self.is_processing && !self.completed && self.error.is_none()
    }

    /// Fold a progress observation in, discarding regressions.
    ///
    /// Returns `true` if anything moved forward.
    pub fn observe_progress(&mut self, progress: f64, processed_count: u64) -> bool {
        let progress = if progress.is_finite() {
            progress.clamp(0.0, 100.0)
        } else {
            0.0
        };
        let advanced = progress > self.progress || processed_count > self.processed_count;
        self.progress = self.progress.max(progress);
        self.processed_count = self.processed_count.max(processed_count);
        advanced
    }

    pub fn mark_completed(&mut self) {
        self.is_processing = false;
        self.completed = true;
        self.progress = 100.0;
        self.error = None;
    }

    pub fn mark_failed(&mut self, error: String) {
        self.is_processing = false;
        self.error = Some(error);
    }

    /// Apply one status response from the poll loop.
    pub fn apply_status(&mut self, status: &StatusResponse) -> PollStep {
        match status.status {
            JobStatus::InProgress => {
                self.observe_progress(status.progress, status.processed_count);
                PollStep::Continue
            }
            JobStatus::Completed => {
                self.observe_progress(status.progress, status.processed_count);
                self.mark_completed();
                PollStep::Completed
            }
            JobStatus::NotFound => {
                self.mark_failed(
                    status
                        .error
                        .clone()
                        .unwrap_or_else(|| "Analysis job not found".to_string()),
                );
                PollStep::Failed
            }
        }
    }

    fn report(&self) -> ProgressReport {
        ProgressReport {
            processed_count: self.processed_count,
            active: self.cache_key.is_some() && self.error.is_none(),
            completed: self.completed,
        }
    }
}

/// Geometry and parameters of a job submission.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRequest {
    pub video_path: String,
    /// Primary area in source pixels.
    pub roi: PixelRect,
    pub trigger_roi: Option<PixelRect>,
    pub sampling_rate_hz: f64,
}

impl From<&JobRequest> for SubmitRequest {
    fn from(req: &JobRequest) -> Self {
        Self {
            video_path: req.video_path.clone(),
            roi: req.roi,
            trigger_roi: req.trigger_roi,
            sampling_rate_hz: req.sampling_rate_hz,
        }
    }
}

/// Errors from per-frame queries.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// No cache handle is held yet (not submitted, or invalidated).
    #[error("No {0} analysis job is available")]
    NotReady(&'static str),

    /// The backend answered but reported `success: false`.
    #[error("Query unsuccessful: {0}")]
    Unsuccessful(String),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

struct JobSlot {
    job: DetectionJob,
    request: Option<JobRequest>,
    generation: u64,
    /// Cancels the running poll task, if any.
    poller: Option<CancellationToken>,
}

impl JobSlot {
    fn stop_poller(&mut self) {
        if let Some(token) = self.poller.take() {
            token.cancel();
        }
    }
}

/// Owns the lifecycle of one detector's analysis job.
pub struct DetectionJobManager<K: DetectorKind> {
    backend: Arc<dyn DetectionBackend<K>>,
    slot: Arc<RwLock<JobSlot>>,
    poll_interval: Duration,
    event_tx: broadcast::Sender<JobEvent>,
    /// Master token; every poll task runs under a child of it.
    cancel: CancellationToken,
}

impl<K: DetectorKind> DetectionJobManager<K> {
    pub fn new(backend: Arc<dyn DetectionBackend<K>>) -> Self {
        Self::with_poll_interval(backend, DEFAULT_POLL_INTERVAL)
    }

    /// `poll_interval` is clamped to at least [`MIN_POLL_INTERVAL`].
    pub fn with_poll_interval(backend: Arc<dyn DetectionBackend<K>>, poll_interval: Duration) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            backend,
            slot: Arc::new(RwLock::new(JobSlot {
                job: DetectionJob::default(),
                request: None,
                generation: 0,
                poller: None,
            })),
            poll_interval: poll_interval.max(MIN_POLL_INTERVAL),
            event_tx,
            cancel: CancellationToken::new(),
        }
    }

    pub fn detector(&self) -> &'static str {
        K::NAME
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Subscribe to this manager's job events.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.event_tx.subscribe()
    }

    pub async fn snapshot(&self) -> DetectionJob {
        self.slot.read().await.job.clone()
    }

    pub async fn cache_key(&self) -> Option<String> {
        self.slot.read().await.job.cache_key.clone()
    }

    pub async fn is_completed(&self) -> bool {
        self.slot.read().await.job.completed
    }

    /// Submit a job and return its cache handle.
    ///
    /// Ignored (returns `None`) while another submission or its polling is
    /// outstanding. On failure the job enters its terminal error state and
    /// `None` is returned; calling again retries.
    pub async fn submit(&self, request: JobRequest) -> Option<String> {
        let generation = {
            let mut slot = self.slot.write().await;
            if slot.job.is_processing {
                tracing::debug!(detector = K::NAME, "Submit ignored, job already outstanding");
                return None;
            }
            slot.stop_poller();
            slot.generation += 1;
            slot.job = DetectionJob {
                is_processing: true,
                ..Default::default()
            };
            slot.request = Some(request.clone());
            slot.generation
        };

        tracing::info!(
            detector = K::NAME,
            roi = ?request.roi,
            sampling_rate_hz = request.sampling_rate_hz,
            "Submitting analysis job",
        );
        let result = self.backend.submit_job(&SubmitRequest::from(&request)).await;

        let mut slot = self.slot.write().await;
        if slot.generation != generation {
            // Invalidated (or resubmitted) while the request was in flight.
            if let Ok(resp) = result {
                tracing::debug!(
                    detector = K::NAME,
                    cache_key = %resp.cache_key,
                    "Discarding superseded submission",
                );
                self.discard_remote(resp.cache_key);
            }
            return None;
        }

        match result {
            Ok(resp) => {
                let cached = resp.status == SubmitStatus::Completed;
                slot.job.cache_key = Some(resp.cache_key.clone());
                self.publish(Some(&resp.cache_key), JobEventKind::Submitted { cached });

                if cached {
                    slot.job.mark_completed();
                    tracing::info!(
                        detector = K::NAME,
                        cache_key = %resp.cache_key,
                        "Analysis already cached",
                    );
                    self.publish(Some(&resp.cache_key), JobEventKind::Completed);
                } else {
                    self.spawn_poller(&mut slot, resp.cache_key.clone(), generation);
                }
                Some(resp.cache_key)
            }
            Err(e) => {
                let error = format!("Job submission failed: {e}");
                tracing::error!(detector = K::NAME, error = %e, "Job submission failed");
                slot.job.mark_failed(error.clone());
                self.publish(None, JobEventKind::Failed { error });
                None
            }
        }
    }

    /// Clear the local handle immediately and ask the backend to discard
    /// its cache entry without waiting for the answer.
    pub async fn invalidate(&self) {
        let cache_key = {
            let mut slot = self.slot.write().await;
            slot.stop_poller();
            slot.generation += 1;
            slot.request = None;
            let key = slot.job.cache_key.take();
            slot.job = DetectionJob::default();
            key
        };

        tracing::debug!(detector = K::NAME, cache_key = ?cache_key, "Job invalidated");
        self.publish(cache_key.as_deref(), JobEventKind::Invalidated);

        if let Some(key) = cache_key {
            self.discard_remote(key);
        }
    }

    /// Detections at `timestamp`. Never cached locally.
    pub async fn query_at(
        &self,
        timestamp: f64,
        mapping: &DisplayMapping,
    ) -> Result<Vec<K::Detection>, QueryError> {
        let (cache_key, roi) = {
            let slot = self.slot.read().await;
            match (&slot.job.cache_key, &slot.request) {
                (Some(key), Some(req)) => (key.clone(), req.roi),
                _ => return Err(QueryError::NotReady(K::NAME)),
            }
        };

        let query = FrameQuery {
            timestamp,
            display: mapping.display(),
            source: mapping.source(),
            roi,
        };
        let resp = self.backend.query_detections(&cache_key, &query).await?;
        if !resp.success {
            return Err(QueryError::Unsuccessful(
                resp.error.unwrap_or_else(|| "no detections available".to_string()),
            ));
        }
        Ok(resp.detections)
    }

    /// Probe the status endpoint for an up-to-date processed count.
    ///
    /// The answer is folded into local state monotonically. On probe
    /// failure the cached figures are returned. Jobs that finished or
    /// failed are not probed.
    pub async fn progress_report(&self) -> ProgressReport {
        let (cache_key, generation, cached) = {
            let slot = self.slot.read().await;
            (slot.job.cache_key.clone(), slot.generation, slot.job.report())
        };
        let Some(cache_key) = cache_key else {
            return cached;
        };
        if cached.completed || !cached.active {
            return cached;
        }

        match self.backend.poll_status(&cache_key).await {
            Ok(status) => {
                let mut slot = self.slot.write().await;
                if slot.generation != generation {
                    return slot.job.report();
                }
                slot.job.observe_progress(status.progress, status.processed_count);
                let mut report = slot.job.report();
                // Terminal transitions stay with the poll loop; only expose
                // completion so the frontier can open up early.
                report.completed |= status.status == JobStatus::Completed;
                report
            }
            Err(e) => {
                tracing::debug!(
                    detector = K::NAME,
                    cache_key = %cache_key,
                    error = %e,
                    "Progress probe failed, using cached count",
                );
                cached
            }
        }
    }

    // ---- private helpers ----

    fn publish(&self, cache_key: Option<&str>, kind: JobEventKind) {
        // A send error only means nobody is subscribed.
        let _ = self
            .event_tx
            .send(JobEvent::new(K::NAME, cache_key.map(str::to_string), kind));
    }

    /// Fire-and-forget remote cache discard.
    fn discard_remote(&self, cache_key: String) {
        let backend = Arc::clone(&self.backend);
        tokio::spawn(async move {
            if let Err(e) = backend.invalidate_cache(&cache_key).await {
                tracing::debug!(
                    detector = K::NAME,
                    cache_key = %cache_key,
                    error = %e,
                    "Remote cache invalidation failed (ignored)",
                );
            }
        });
    }

    fn spawn_poller(&self, slot: &mut JobSlot, cache_key: String, generation: u64) {
        let token = self.cancel.child_token();
        slot.poller = Some(token.clone());

        let poller = Poller::<K> {
            backend: Arc::clone(&self.backend),
            slot: Arc::clone(&self.slot),
            event_tx: self.event_tx.clone(),
            cache_key,
            generation,
            interval: self.poll_interval,
        };
        tokio::spawn(async move { poller.run(token).await });
    }
}

impl<K: DetectorKind> Drop for DetectionJobManager<K> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Anything that can report analysis progress to the playback coordinator.
#[async_trait]
pub trait AnalysisProgress: Send + Sync {
    fn detector(&self) -> &'static str;

    async fn progress_report(&self) -> ProgressReport;
}

#[async_trait]
impl<K: DetectorKind> AnalysisProgress for DetectionJobManager<K> {
    fn detector(&self) -> &'static str {
        K::NAME
    }

    async fn progress_report(&self) -> ProgressReport {
        DetectionJobManager::progress_report(self).await
    }
}

// ---------------------------------------------------------------------------
// Poll task
// ---------------------------------------------------------------------------

struct Poller<K: DetectorKind> {
    backend: Arc<dyn DetectionBackend<K>>,
    slot: Arc<RwLock<JobSlot>>,
    event_tx: broadcast::Sender<JobEvent>,
    cache_key: String,
    generation: u64,
    interval: Duration,
}

impl<K: DetectorKind> Poller<K> {
    async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        // The first tick completes immediately; the first probe waits one interval.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!(detector = K::NAME, cache_key = %self.cache_key, "Polling stopped");
                    return;
                }
                _ = ticker.tick() => {}
            }

            let result = self.backend.poll_status(&self.cache_key).await;

            let mut slot = self.slot.write().await;
            if slot.generation != self.generation || cancel.is_cancelled() {
                return;
            }

            let (step, event) = match result {
                Ok(status) => {
                    let before = (slot.job.progress, slot.job.processed_count);
                    let step = slot.job.apply_status(&status);
                    let event = match step {
                        PollStep::Continue
                            if (slot.job.progress, slot.job.processed_count) != before =>
                        {
                            Some(JobEventKind::Progress {
                                percent: slot.job.progress,
                                processed_count: slot.job.processed_count,
                            })
                        }
                        PollStep::Continue => None,
                        PollStep::Completed => Some(JobEventKind::Completed),
                        PollStep::Failed => Some(JobEventKind::Failed {
                            error: slot.job.error.clone().unwrap_or_default(),
                        }),
                    };
                    (step, event)
                }
                Err(e) => {
                    let error = format!("Status polling failed: {e}");
                    slot.job.mark_failed(error.clone());
                    (PollStep::Failed, Some(JobEventKind::Failed { error }))
                }
            };

            match step {
                PollStep::Continue => tracing::debug!(
                    detector = K::NAME,
                    cache_key = %self.cache_key,
                    progress = slot.job.progress,
                    processed_count = slot.job.processed_count,
                    "Analysis progress",
                ),
                PollStep::Completed => tracing::info!(
                    detector = K::NAME,
                    cache_key = %self.cache_key,
                    "Analysis completed",
                ),
                PollStep::Failed => tracing::warn!(
                    detector = K::NAME,
                    cache_key = %self.cache_key,
                    error = ?slot.job.error,
                    "Analysis failed",
                ),
            }

            if step != PollStep::Continue {
                slot.poller = None;
            }
            drop(slot);

            if let Some(kind) = event {
                let _ = self
                    .event_tx
                    .send(JobEvent::new(K::NAME, Some(self.cache_key.clone()), kind));
            }
            if step != PollStep::Continue {
                return;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
