//! One analysis session: ROI editing, both detection jobs, the playback
//! buffer, and the render model handed to the overlay.
//!
//! The ROI store never talks to the jobs itself; every mutation reports
//! whether analysis must be invalidated and the session carries that out.

use std::sync::Arc;

use roisync_core::detection::MergedDetectionFrame;
use roisync_core::error::CoreError;
use roisync_core::geometry::DisplayMapping;
use roisync_core::playback::{BufferDecision, PlaybackBufferState};
use roisync_core::roi::{AreaMode, Roi, RoiKind, RoiMutation, RoiPatch, RoiStore};
use roisync_core::types::{Point, Rect, RoiId, Size};
use roisync_detection::api::DetectionApi;
use roisync_detection::backend::TriggerBackend;
use roisync_detection::job::{AnalysisProgress, DetectionJobManager, JobRequest};
use roisync_detection::kind::{Code, Movement};
use serde::Serialize;

use crate::config::SessionConfig;
use crate::merger::{DetectionMerger, FrameFence, MergeError, Ticket, TriggerTarget};
use crate::playback::PlaybackCoordinator;
use crate::video::VideoElement;

/// What the overlay draws for the current tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderModel {
    pub rois: Vec<Roi>,
    /// `None` whenever playback is not running.
    pub merged_frame: Option<MergedDetectionFrame>,
    pub is_waiting_for_analysis: bool,
}

// ---------------------------------------------------------------------------
// Frame requests
// ---------------------------------------------------------------------------

/// A fenced merge query that can be resolved off the session.
pub struct FrameRequest {
    ticket: Ticket,
    timestamp: f64,
    mapping: DisplayMapping,
    trigger: Option<TriggerTarget>,
    merger: Arc<DetectionMerger>,
}

impl FrameRequest {
    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    pub async fn resolve(self) -> FrameResponse {
        let result = self
            .merger
            .merge_at(self.timestamp, &self.mapping, self.trigger.as_ref())
            .await;
        FrameResponse {
            ticket: self.ticket,
            result,
        }
    }
}

pub struct FrameResponse {
    ticket: Ticket,
    pub result: Result<MergedDetectionFrame, MergeError>,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

pub struct AnalysisSession {
    video_path: String,
    sampling_rate_hz: f64,
    trigger_text: String,
    mapping: DisplayMapping,
    rois: RoiStore,
    movement: Arc<DetectionJobManager<Movement>>,
    code: Arc<DetectionJobManager<Code>>,
    playback: PlaybackCoordinator,
    merger: Arc<DetectionMerger>,
    fence: FrameFence,
    merged: Option<MergedDetectionFrame>,
}

impl AnalysisSession {
    pub fn new(
        config: &SessionConfig,
        movement: Arc<DetectionJobManager<Movement>>,
        code: Arc<DetectionJobManager<Code>>,
        trigger: Option<Arc<dyn TriggerBackend>>,
        video: Arc<dyn VideoElement>,
    ) -> Result<Self, CoreError> {
        let mapping = DisplayMapping::new(config.display, config.source)?;

        let sources: Vec<Arc<dyn AnalysisProgress>> = vec![movement.clone(), code.clone()];
        let playback = PlaybackCoordinator::new(video, sources, config.buffer_config());

        let mut merger = DetectionMerger::new(movement.clone(), code.clone());
        if let Some(backend) = trigger {
            merger = merger.with_trigger_backend(backend);
        }

        Ok(Self {
            video_path: config.video_path.clone(),
            sampling_rate_hz: config.sampling_rate_hz,
            trigger_text: config.trigger_text.clone(),
            mapping,
            rois: RoiStore::new(config.area_mode),
            movement,
            code,
            playback,
            merger: Arc::new(merger),
            fence: FrameFence::new(),
            merged: None,
        })
    }

    /// Build a session talking to the HTTP detection service in `config`.
    ///
    /// Both detectors share one connection pool. Trigger queries are
    /// enabled in dual-area mode only.
    pub fn connect(config: &SessionConfig, video: Arc<dyn VideoElement>) -> Result<Self, CoreError> {
        let client = reqwest::Client::new();
        let movement_api = Arc::new(DetectionApi::<Movement>::with_client(
            client.clone(),
            config.api_url.clone(),
        ));
        let code_api = Arc::new(DetectionApi::<Code>::with_client(client, config.api_url.clone()));

        let movement = Arc::new(DetectionJobManager::<Movement>::with_poll_interval(
            movement_api,
            config.poll_interval,
        ));
        let code = Arc::new(DetectionJobManager::<Code>::with_poll_interval(
            code_api.clone(),
            config.poll_interval,
        ));
        let trigger = match config.area_mode {
            AreaMode::Dual => Some(code_api as Arc<dyn TriggerBackend>),
            AreaMode::Single => None,
        };

        Self::new(config, movement, code, trigger, video)
    }

    pub fn movement(&self) -> &Arc<DetectionJobManager<Movement>> {
        &self.movement
    }

    pub fn code(&self) -> &Arc<DetectionJobManager<Code>> {
        &self.code
    }

    pub fn rois(&self) -> &RoiStore {
        &self.rois
    }

    pub fn mapping(&self) -> DisplayMapping {
        self.mapping
    }

    pub fn playback_state(&self) -> PlaybackBufferState {
        self.playback.state()
    }

    // ---- ROI editing ----

    /// Add an ROI from a completed drag gesture in display space.
    pub fn create_roi(&mut self, rect: Rect, role_hint: Option<RoiKind>) -> Option<Roi> {
        let roi = self.rois.create(rect, role_hint);
        match &roi {
            Some(roi) => tracing::debug!(roi_id = roi.id, kind = ?roi.kind, "ROI created"),
            None => tracing::debug!(?rect, ?role_hint, "ROI creation rejected"),
        }
        roi
    }

    pub async fn update_roi(&mut self, id: RoiId, patch: RoiPatch) -> Result<(), CoreError> {
        let mutation = self.rois.update(id, patch)?;
        tracing::debug!(roi_id = id, "ROI updated");
        self.apply_mutation(mutation).await;
        Ok(())
    }

    pub async fn delete_roi(&mut self, id: RoiId) -> Result<(), CoreError> {
        let mutation = self.rois.delete(id)?;
        tracing::debug!(roi_id = id, "ROI deleted");
        self.apply_mutation(mutation).await;
        Ok(())
    }

    pub fn select_roi(&mut self, id: Option<RoiId>) -> bool {
        self.rois.select(id)
    }

    /// Start dragging whichever ROI is under `pointer`.
    ///
    /// Clicking empty space clears the selection and returns `None`.
    pub fn begin_drag(&mut self, pointer: Point) -> Option<RoiId> {
        let Some(id) = self.rois.hit_test(pointer) else {
            self.rois.select(None);
            return None;
        };
        self.rois.begin_drag(id, pointer).ok()?;
        Some(id)
    }

    /// Move the dragged ROI. A no-op when nothing is being dragged.
    pub async fn drag_to(&mut self, pointer: Point) -> Result<(), CoreError> {
        let Some(result) = self.rois.drag_to(pointer) else {
            return Ok(());
        };
        self.apply_mutation(result?).await;
        Ok(())
    }

    pub fn end_drag(&mut self) {
        self.rois.end_drag();
    }

    /// The display surface changed size. ROIs are rescaled in place; the
    /// analysed source area is unchanged, so no job is invalidated.
    pub fn resize_display(&mut self, size: Size) -> Result<(), CoreError> {
        let mapping = DisplayMapping::new(size, self.mapping.source())?;
        self.rois.rescale(self.mapping.display(), size);
        self.mapping = mapping;
        tracing::debug!(width = size.width, height = size.height, "Display resized");
        Ok(())
    }

    // ---- analysis ----

    /// Submit both detection jobs for the current areas.
    ///
    /// Returns `false` without a primary area, or in dual-area mode without
    /// a trigger area.
    pub async fn start_analysis(&self) -> bool {
        let Some(primary) = self.rois.primary_area() else {
            tracing::debug!("No primary area, analysis not started");
            return false;
        };
        let roi = self.mapping.to_source_rect(primary.rect());

        let trigger_roi = match self.rois.mode() {
            AreaMode::Single => None,
            AreaMode::Dual => match self.rois.trigger_area() {
                Some(trigger) => Some(self.mapping.to_source_rect(trigger.rect())),
                None => {
                    tracing::debug!("No trigger area, analysis not started");
                    return false;
                }
            },
        };

        let movement_request = JobRequest {
            video_path: self.video_path.clone(),
            roi,
            trigger_roi: None,
            sampling_rate_hz: self.sampling_rate_hz,
        };
        let code_request = JobRequest {
            trigger_roi,
            ..movement_request.clone()
        };

        let (movement_key, code_key) = tokio::join!(
            self.movement.submit(movement_request),
            self.code.submit(code_request),
        );
        tracing::info!(
            video_path = %self.video_path,
            movement_key = ?movement_key,
            code_key = ?code_key,
            "Analysis started",
        );
        true
    }

    // ---- playback ----

    pub async fn play(&mut self) -> bool {
        self.playback.play().await
    }

    pub async fn pause(&mut self) {
        self.playback.pause().await;
        self.clear_frame();
    }

    /// Forward a pause notification from the video element.
    pub fn on_video_paused(&mut self) -> bool {
        let by_user = self.playback.on_video_paused();
        self.clear_frame();
        by_user
    }

    /// One playback tick: gate on analysis progress, then refresh the
    /// merged frame if still playing.
    pub async fn on_time_update(&mut self, current_time: f64) -> BufferDecision {
        let decision = self.playback.on_time_update(current_time).await;

        if self.playback.is_playing() {
            let response = self.frame_request(current_time).resolve().await;
            self.apply_frame(response);
        } else {
            self.clear_frame();
        }
        decision
    }

    pub async fn recheck_buffer(&mut self) -> BufferDecision {
        self.playback.recheck().await
    }

    /// Start a fenced merge query for `timestamp`.
    pub fn frame_request(&mut self, timestamp: f64) -> FrameRequest {
        FrameRequest {
            ticket: self.fence.issue(),
            timestamp,
            mapping: self.mapping,
            trigger: self.trigger_target(),
            merger: Arc::clone(&self.merger),
        }
    }

    /// Apply a resolved merge query.
    ///
    /// Returns `false` if a later-issued response was already applied or
    /// the request was invalidated.
    pub fn apply_frame(&mut self, response: FrameResponse) -> bool {
        if !self.fence.accept(response.ticket) {
            tracing::trace!("Discarding superseded frame");
            return false;
        }
        if !self.playback.is_playing() {
            self.merged = None;
            return true;
        }
        self.merged = match response.result {
            Ok(frame) => Some(frame),
            Err(e) => {
                tracing::debug!(error = %e, "No detections for frame");
                None
            }
        };
        true
    }

    pub fn render_model(&self) -> RenderModel {
        RenderModel {
            rois: self.rois.rois().to_vec(),
            merged_frame: if self.playback.is_playing() {
                self.merged.clone()
            } else {
                None
            },
            is_waiting_for_analysis: self.playback.is_waiting_for_analysis(),
        }
    }

    // ---- private helpers ----

    async fn apply_mutation(&mut self, mutation: RoiMutation) {
        if !mutation.requires_invalidation() {
            return;
        }
        tracing::info!("Analysed area changed, invalidating analysis");
        tokio::join!(self.movement.invalidate(), self.code.invalidate());
        self.playback.reset_waiting();
        self.fence.invalidate();
        self.merged = None;
    }

    fn clear_frame(&mut self) {
        self.merged = None;
        self.fence.invalidate();
    }

    fn trigger_target(&self) -> Option<TriggerTarget> {
        if self.rois.mode() != AreaMode::Dual {
            return None;
        }
        self.rois.trigger_area().map(|trigger| TriggerTarget {
            region: self.mapping.to_source_rect(trigger.rect()),
            target_text: self.trigger_text.clone(),
        })
    }
}
