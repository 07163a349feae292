//! `roisync-monitor` -- headless analysis session runner.
//!
//! Draws the configured areas, starts both detection jobs, and plays a
//! simulated video in real time while logging each merged frame and every
//! buffer transition. Stops at the end of the video or on Ctrl-C.
//!
//! # Environment variables
//!
//! | Variable            | Required | Default     | Description                          |
//! |---------------------|----------|-------------|--------------------------------------|
//! | `DETECTION_API_URL` | yes      | --          | Detection service base URL           |
//! | `VIDEO_PATH`        | yes      | --          | Video path as known to the service   |
//! | `PRIMARY_ROI`       | yes      | --          | `x,y,w,h` in display units           |
//! | `TRIGGER_ROI`       | dual     | --          | `x,y,w,h` in display units           |
//! | `AREA_MODE`         | no       | `single`    | `single` or `dual`                   |
//!
//! See [`SessionConfig::from_env`] for the remaining tuning variables.

use std::sync::Arc;
use std::time::Duration;

use roisync_core::playback::BufferDecision;
use roisync_core::roi::{AreaMode, RoiKind};
use roisync_session::config::SessionConfig;
use roisync_session::session::AnalysisSession;
use roisync_session::video::{SimulatedVideo, VideoElement, VideoEvent};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Playback tick, standing in for the video element's time-update events.
const TICK_INTERVAL: Duration = Duration::from_millis(250);

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "roisync_session=debug,roisync_detection=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = SessionConfig::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid configuration");
        std::process::exit(1);
    });

    tracing::info!(
        api_url = %config.api_url,
        video_path = %config.video_path,
        area_mode = ?config.area_mode,
        sampling_rate_hz = config.sampling_rate_hz,
        "Starting roisync-monitor",
    );

    let video = Arc::new(SimulatedVideo::new(config.video_duration_secs));
    let mut session = AnalysisSession::connect(&config, video.clone()).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to create session");
        std::process::exit(1);
    });

    let cancel = CancellationToken::new();
    spawn_event_log(&session, cancel.clone());
    spawn_ctrl_c(cancel.clone());

    draw_areas(&mut session, &config);
    if !session.start_analysis().await {
        tracing::error!("PRIMARY_ROI (and TRIGGER_ROI in dual mode) must describe valid areas");
        std::process::exit(1);
    }

    run(&mut session, &video, &cancel).await;

    cancel.cancel();
    tracing::info!(position = video.current_time(), "roisync-monitor stopped");
}

/// Drive playback until the video ends or shutdown is requested.
async fn run(session: &mut AnalysisSession, video: &SimulatedVideo, cancel: &CancellationToken) {
    let mut video_events = video.subscribe();
    let mut ticker = tokio::time::interval(TICK_INTERVAL);
    session.play().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Shutdown requested");
                break;
            }
            event = video_events.recv() => {
                if let Ok(VideoEvent::Paused) = event {
                    session.on_video_paused();
                }
                continue;
            }
            _ = ticker.tick() => {}
        }

        if video.has_ended() {
            tracing::info!(duration = video.duration(), "End of video");
            break;
        }

        let decision = if session.render_model().is_waiting_for_analysis {
            session.recheck_buffer().await
        } else {
            session.on_time_update(video.current_time()).await
        };

        // Headless runner: press play on the operator's behalf.
        if decision == BufferDecision::AnalysisCaughtUp {
            session.play().await;
        }

        let model = session.render_model();
        if let Some(frame) = &model.merged_frame {
            tracing::debug!(
                timestamp = frame.timestamp,
                movement_points = frame.movement_points.len(),
                movement_confidence = frame.movement_confidence,
                qr_detections = frame.qr_detections.len(),
                trigger_detected = frame.trigger_detected,
                "Frame",
            );
        }
        tracing::trace!(
            model = %serde_json::to_string(&model).unwrap_or_default(),
            "Render model",
        );
    }

    session.pause().await;
}

fn draw_areas(session: &mut AnalysisSession, config: &SessionConfig) {
    if config.area_mode == AreaMode::Dual {
        if let Some(rect) = config.trigger_roi {
            session.create_roi(rect, Some(RoiKind::TriggerArea));
        }
    }
    if let Some(rect) = config.primary_roi {
        session.create_roi(rect, Some(RoiKind::PrimaryArea));
    }
}

/// Log every job lifecycle event from both detectors.
fn spawn_event_log(session: &AnalysisSession, cancel: CancellationToken) {
    let mut movement_rx = session.movement().subscribe();
    let mut code_rx = session.code().subscribe();

    tokio::spawn(async move {
        loop {
            let received = tokio::select! {
                _ = cancel.cancelled() => return,
                r = movement_rx.recv() => r,
                r = code_rx.recv() => r,
            };
            match received {
                Ok(event) => tracing::info!(
                    detector = event.detector,
                    cache_key = ?event.cache_key,
                    kind = ?event.kind,
                    "Job event",
                ),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Job event log lagged");
                }
                Err(RecvError::Closed) => return,
            }
        }
    });
}

fn spawn_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            return;
        }
        cancel.cancel();
    });
}
