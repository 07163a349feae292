//! Async driver for the playback buffer state machine.
//!
//! [`PlaybackCoordinator`] probes every analysis job for its processed
//! count on each tick, feeds the resulting frontier to
//! [`PlaybackBuffer`], and carries out the decision on the video element.
//! It is the only component that pauses the video programmatically.

use std::sync::Arc;

use futures::future::join_all;
use roisync_core::playback::{
    AnalysisFrontier, BufferConfig, BufferDecision, PlaybackBuffer, PlaybackBufferState,
    ProgressReport,
};
use roisync_detection::job::AnalysisProgress;

use crate::video::VideoElement;

pub struct PlaybackCoordinator {
    video: Arc<dyn VideoElement>,
    sources: Vec<Arc<dyn AnalysisProgress>>,
    buffer: PlaybackBuffer,
}

impl PlaybackCoordinator {
    pub fn new(
        video: Arc<dyn VideoElement>,
        sources: Vec<Arc<dyn AnalysisProgress>>,
        config: BufferConfig,
    ) -> Self {
        Self {
            video,
            sources,
            buffer: PlaybackBuffer::new(config),
        }
    }

    pub fn video(&self) -> &Arc<dyn VideoElement> {
        &self.video
    }

    pub fn state(&self) -> PlaybackBufferState {
        self.buffer.snapshot()
    }

    pub fn is_playing(&self) -> bool {
        self.buffer.is_playing()
    }

    pub fn is_waiting_for_analysis(&self) -> bool {
        self.buffer.is_waiting_for_analysis()
    }

    /// User pressed play. Returns `false` if playback was already running.
    pub async fn play(&mut self) -> bool {
        if !self.buffer.user_play() {
            return false;
        }
        tracing::debug!(current_time = self.video.current_time(), "Playback started by user");
        self.video.play().await;
        true
    }

    /// User pressed pause. Cancels any analysis wait.
    pub async fn pause(&mut self) {
        self.buffer.user_pause();
        tracing::debug!(current_time = self.video.current_time(), "Playback paused by user");
        self.video.pause().await;
    }

    /// Handle a pause notification from the video element.
    ///
    /// Returns `true` when the pause was the user's own (native controls).
    pub fn on_video_paused(&mut self) -> bool {
        let by_user = self.buffer.observe_pause();
        if by_user {
            tracing::debug!("Pause from video controls");
        }
        by_user
    }

    /// Evaluate one playback tick.
    ///
    /// Job status is only probed while playing or waiting for analysis.
    pub async fn on_time_update(&mut self, current_time: f64) -> BufferDecision {
        if !self.buffer.is_playing() && !self.buffer.is_waiting_for_analysis() {
            return BufferDecision::Ignored;
        }

        let frontier = self.frontier().await;
        let decision = self.buffer.evaluate(current_time, frontier);

        match decision {
            BufferDecision::PauseForAnalysis => {
                tracing::info!(
                    current_time,
                    max_analyzed_time = ?frontier.seconds(),
                    buffer_seconds = self.buffer.config().buffer_seconds,
                    "Playback outran analysis, pausing",
                );
                let already_paused = self.video.is_paused();
                self.video.pause().await;
                if already_paused {
                    self.buffer.system_pause_unannounced();
                }
            }
            BufferDecision::StillWaiting => tracing::debug!(
                current_time,
                max_analyzed_time = ?frontier.seconds(),
                "Waiting for analysis",
            ),
            BufferDecision::AnalysisCaughtUp => tracing::info!(
                current_time,
                max_analyzed_time = ?frontier.seconds(),
                "Analysis caught up, ready to resume",
            ),
            BufferDecision::Continue | BufferDecision::Ignored => {}
        }
        decision
    }

    /// Re-evaluate at the video's current position; the keep-polling entry
    /// point while waiting for analysis.
    pub async fn recheck(&mut self) -> BufferDecision {
        let current_time = self.video.current_time();
        self.on_time_update(current_time).await
    }

    /// Drop any analysis wait after the analysed area changed.
    pub fn reset_waiting(&mut self) {
        if self.buffer.is_waiting_for_analysis() {
            tracing::debug!("Analysis wait cleared");
        }
        self.buffer.reset_waiting();
    }

    // ---- private helpers ----

    async fn frontier(&self) -> AnalysisFrontier {
        let reports: Vec<ProgressReport> =
            join_all(self.sources.iter().map(|s| s.progress_report())).await;

        for (source, report) in self.sources.iter().zip(&reports) {
            tracing::trace!(
                detector = source.detector(),
                processed_count = report.processed_count,
                completed = report.completed,
                "Progress probe",
            );
        }
        AnalysisFrontier::from_reports(&reports, self.buffer.config())
    }
}
