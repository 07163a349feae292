//! Detector kinds.
//!
//! Each kind is a zero-sized marker fixing its name, its backend route
//! prefix, and the per-frame detection payload, so job handling is
//! written once and instantiated per kind.

use std::fmt::Debug;

use roisync_core::detection::{MovementDetection, QrDetection};
use serde::de::DeserializeOwned;
use serde::Serialize;

pub trait DetectorKind: Send + Sync + 'static {
    /// Per-frame detection returned by the query endpoint.
    type Detection: DeserializeOwned + Serialize + Clone + Debug + Send + Sync + 'static;

    /// Short name used in logs and events.
    const NAME: &'static str;

    /// Path segment under the API base URL.
    const ROUTE_PREFIX: &'static str;
}

/// Hand/motion detector.
#[derive(Debug, Clone, Copy, Default)]
pub struct Movement;

impl DetectorKind for Movement {
    type Detection = MovementDetection;
    const NAME: &'static str = "movement";
    const ROUTE_PREFIX: &'static str = "movement";
}

/// QR-code detector. Also answers trigger queries in dual-area mode.
#[derive(Debug, Clone, Copy, Default)]
pub struct Code;

impl DetectorKind for Code {
    type Detection = QrDetection;
    const NAME: &'static str = "code";
    const ROUTE_PREFIX: &'static str = "code";
}
