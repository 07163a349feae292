//! Playback buffer state machine.
//!
//! Decides, per playback tick, whether the video has run too close to the
//! analysis frontier. Playback is paused automatically when it does, but
//! is never resumed automatically: once analysis catches up the waiting
//! flag clears and the player stays stopped until the user presses play.
//!
//! This module is pure; the async driver that probes job status and
//! commands the video element lives in `roisync-session`.

use serde::Serialize;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Safety margin kept between playback position and analysis frontier.
pub const DEFAULT_BUFFER_SECONDS: f64 = 10.0;

/// Samples per second the backend analyses.
pub const DEFAULT_SAMPLING_RATE_HZ: f64 = 5.0;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufferConfig {
    pub buffer_seconds: f64,
    pub seconds_per_processed_frame: f64,
}

impl BufferConfig {
    /// Derive the per-sample duration from a sampling rate.
    pub fn from_sampling_rate(sampling_rate_hz: f64, buffer_seconds: f64) -> Self {
        Self {
            buffer_seconds,
            seconds_per_processed_frame: 1.0 / sampling_rate_hz,
        }
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self::from_sampling_rate(DEFAULT_SAMPLING_RATE_HZ, DEFAULT_BUFFER_SECONDS)
    }
}

// ---------------------------------------------------------------------------
// Frontier
// ---------------------------------------------------------------------------

/// `max(processed counts) * seconds_per_processed_frame`.
pub fn max_analyzed_time(processed_counts: &[u64], seconds_per_processed_frame: f64) -> f64 {
    processed_counts.iter().copied().max().unwrap_or(0) as f64 * seconds_per_processed_frame
}

/// Status of one analysis job as seen by the coordinator on a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgressReport {
    pub processed_count: u64,
    /// A job handle exists and the job has not failed.
    pub active: bool,
    pub completed: bool,
}

/// How far playback may safely run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AnalysisFrontier {
    /// Nothing to wait for: a job finished the whole video, or no job runs.
    Unbounded,
    /// Seconds of video analysed so far by the furthest job.
    Until(f64),
}

impl AnalysisFrontier {
    pub fn from_reports(reports: &[ProgressReport], config: &BufferConfig) -> Self {
        if reports.iter().any(|r| r.completed) || !reports.iter().any(|r| r.active) {
            return Self::Unbounded;
        }
        let counts: Vec<u64> = reports
            .iter()
            .filter(|r| r.active)
            .map(|r| r.processed_count)
            .collect();
        Self::Until(max_analyzed_time(&counts, config.seconds_per_processed_frame))
    }

    pub fn seconds(&self) -> Option<f64> {
        match self {
            Self::Unbounded => None,
            Self::Until(t) => Some(*t),
        }
    }

    /// True when `current_time > frontier - buffer`.
    pub fn is_outrun_by(&self, current_time: f64, buffer_seconds: f64) -> bool {
        match self {
            Self::Unbounded => false,
            Self::Until(max) => current_time > max - buffer_seconds,
        }
    }
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    Idle,
    Playing,
    WaitingForAnalysis,
    PausedByUser,
}

/// What the driver must do after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferDecision {
    /// Keep playing.
    Continue,
    /// Pause the video now; the pause is system-initiated.
    PauseForAnalysis,
    /// Still too close to the frontier; keep polling.
    StillWaiting,
    /// Analysis caught up. The waiting flag is cleared; playback stays paused.
    AnalysisCaughtUp,
    /// Not playing and not waiting; nothing to evaluate.
    Ignored,
}

/// Snapshot exposed to the render layer and logs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PlaybackBufferState {
    pub state: PlaybackState,
    pub current_time: f64,
    /// `None` while the frontier is unbounded.
    pub max_analyzed_time: Option<f64>,
    pub is_playing: bool,
    pub is_waiting_for_analysis: bool,
}

#[derive(Debug, Clone)]
pub struct PlaybackBuffer {
    config: BufferConfig,
    state: PlaybackState,
    current_time: f64,
    frontier: AnalysisFrontier,
    /// System pauses commanded whose pause notification has not arrived yet.
    pending_system_pauses: u32,
}

impl PlaybackBuffer {
    pub fn new(config: BufferConfig) -> Self {
        Self {
            config,
            state: PlaybackState::Idle,
            current_time: 0.0,
            frontier: AnalysisFrontier::Unbounded,
            pending_system_pauses: 0,
        }
    }

    pub fn config(&self) -> &BufferConfig {
        &self.config
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    pub fn is_waiting_for_analysis(&self) -> bool {
        self.state == PlaybackState::WaitingForAnalysis
    }

    /// User pressed play. Returns `false` if already playing.
    pub fn user_play(&mut self) -> bool {
        if self.state == PlaybackState::Playing {
            return false;
        }
        self.state = PlaybackState::Playing;
        true
    }

    /// User pressed pause. Overrides any analysis wait.
    pub fn user_pause(&mut self) {
        self.state = PlaybackState::PausedByUser;
    }

    /// Feed a pause notification from the video element.
    ///
    /// Returns `true` when the pause came from the user (through native
    /// controls), `false` when it echoes a system-initiated pause.
    pub fn observe_pause(&mut self) -> bool {
        if self.pending_system_pauses > 0 {
            self.pending_system_pauses -= 1;
            return false;
        }
        if self.state != PlaybackState::PausedByUser {
            self.user_pause();
        }
        true
    }

    /// Evaluate a tick at `current_time` against a freshly computed frontier.
    pub fn evaluate(&mut self, current_time: f64, frontier: AnalysisFrontier) -> BufferDecision {
        self.current_time = current_time;
        self.frontier = frontier;
        let outrun = frontier.is_outrun_by(current_time, self.config.buffer_seconds);

        match self.state {
            PlaybackState::Playing if outrun => {
                self.state = PlaybackState::WaitingForAnalysis;
                self.pending_system_pauses += 1;
                BufferDecision::PauseForAnalysis
            }
            PlaybackState::Playing => BufferDecision::Continue,
            PlaybackState::WaitingForAnalysis if outrun => BufferDecision::StillWaiting,
            PlaybackState::WaitingForAnalysis => {
                self.state = PlaybackState::Idle;
                BufferDecision::AnalysisCaughtUp
            }
            PlaybackState::Idle | PlaybackState::PausedByUser => BufferDecision::Ignored,
        }
    }

    /// The system pause just commanded will never be announced, because
    /// the video was already paused.
    pub fn system_pause_unannounced(&mut self) {
        self.pending_system_pauses = self.pending_system_pauses.saturating_sub(1);
    }

    /// Drop any analysis wait, e.g. after the analysed ROI changed.
    pub fn reset_waiting(&mut self) {
        if self.state == PlaybackState::WaitingForAnalysis {
            self.state = PlaybackState::Idle;
        }
        self.frontier = AnalysisFrontier::Unbounded;
    }

    pub fn snapshot(&self) -> PlaybackBufferState {
        PlaybackBufferState {
            state: self.state,
            current_time: self.current_time,
            max_analyzed_time: self.frontier.seconds(),
            is_playing: self.is_playing(),
            is_waiting_for_analysis: self.is_waiting_for_analysis(),
        }
    }
}

impl Default for PlaybackBuffer {
    fn default() -> Self {
        Self::new(BufferConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
