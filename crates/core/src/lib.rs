//! Pure domain logic for ROI-synchronised dual detection.
//!
//! No I/O and no async: coordinate mapping, the ROI store, detection
//! result shapes, and the playback buffer state machine.

pub mod detection;
pub mod error;
pub mod geometry;
pub mod playback;
pub mod roi;
pub mod types;
