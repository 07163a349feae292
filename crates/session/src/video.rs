//! Video element seam.
//!
//! [`VideoElement`] is what the playback coordinator commands. The host
//! forwards the element's own pause notifications to the session so
//! user-initiated and system-initiated pauses can be told apart.
//!
//! [`SimulatedVideo`] is a headless clock used by the monitor binary and
//! the tests; it advances with tokio time, so paused-clock tests drive it
//! deterministically.

use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::time::Instant;

/// Notifications raised by a video element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoEvent {
    Playing,
    Paused,
    Ended,
}

#[async_trait]
pub trait VideoElement: Send + Sync {
    /// Playback position in seconds.
    fn current_time(&self) -> f64;

    fn duration(&self) -> f64;

    fn is_paused(&self) -> bool;

    async fn play(&self);

    async fn pause(&self);
}

// ---------------------------------------------------------------------------
// Simulated video
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Clock {
    /// Position accumulated up to the last pause or seek.
    position: f64,
    /// Set while playing.
    started_at: Option<Instant>,
}

/// Real-time clock standing in for a decoded video.
pub struct SimulatedVideo {
    duration: f64,
    clock: Mutex<Clock>,
    event_tx: broadcast::Sender<VideoEvent>,
}

impl SimulatedVideo {
    pub fn new(duration: f64) -> Self {
        let (event_tx, _) = broadcast::channel(64);
        Self {
            duration,
            clock: Mutex::new(Clock {
                position: 0.0,
                started_at: None,
            }),
            event_tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<VideoEvent> {
        self.event_tx.subscribe()
    }

    /// Jump to `seconds`, clamped to the video length.
    pub fn seek(&self, seconds: f64) {
        let mut clock = self.lock();
        clock.position = seconds.clamp(0.0, self.duration);
        if clock.started_at.is_some() {
            clock.started_at = Some(Instant::now());
        }
    }

    /// True once the clock has reached the end of the video.
    pub fn has_ended(&self) -> bool {
        self.current_time() >= self.duration
    }

    // ---- private helpers ----

    fn lock(&self) -> std::sync::MutexGuard<'_, Clock> {
        // The clock holds plain numbers, so a poisoned lock is still usable.
        self.clock.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn position(&self, clock: &Clock) -> f64 {
        let elapsed = clock
            .started_at
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        (clock.position + elapsed).min(self.duration)
    }

    fn notify(&self, event: VideoEvent) {
        let _ = self.event_tx.send(event);
    }
}

#[async_trait]
impl VideoElement for SimulatedVideo {
    fn current_time(&self) -> f64 {
        let clock = self.lock();
        self.position(&clock)
    }

    fn duration(&self) -> f64 {
        self.duration
    }

    fn is_paused(&self) -> bool {
        self.lock().started_at.is_none()
    }

    async fn play(&self) {
        {
            let mut clock = self.lock();
            if clock.started_at.is_some() {
                return;
            }
            if clock.position >= self.duration {
                self.notify(VideoEvent::Ended);
                return;
            }
            clock.started_at = Some(Instant::now());
        }
        self.notify(VideoEvent::Playing);
    }

    async fn pause(&self) {
        {
            let mut clock = self.lock();
            if clock.started_at.is_none() {
                return;
            }
            let position = self.position(&clock);
            clock.position = position;
            clock.started_at = None;
        }
        self.notify(VideoEvent::Paused);
    }
}
