//! Per-frame detection shapes and the merged render frame.
//!
//! Coordinates in these types are in display space: the backend is given
//! both display and source dimensions with every query and answers in
//! display units.

use serde::{Deserialize, Serialize};

use crate::types::{Point, Rect};

/// Hand/motion detector output for one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementDetection {
    #[serde(default)]
    pub points: Vec<Point>,
    #[serde(default)]
    pub confidence: f64,
}

/// One decoded QR code within the analysed area.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QrDetection {
    pub text: String,
    pub bbox: Rect,
    #[serde(default)]
    pub confidence: f64,
}

/// Answer to a trigger query against the trigger sub-region.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriggerResult {
    pub detected: bool,
    pub text: Option<String>,
}

/// Everything the render layer needs to annotate one timestamp.
///
/// Recomputed per rendered timestamp and never persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergedDetectionFrame {
    pub timestamp: f64,
    pub movement_points: Vec<Point>,
    pub movement_confidence: f64,
    pub qr_detections: Vec<QrDetection>,
    pub trigger_detected: bool,
    pub trigger_text: Option<String>,
}

impl MergedDetectionFrame {
    /// Stitch whichever constituent results are available.
    ///
    /// A `None` input means that query failed or was not issued; the
    /// corresponding fields stay empty.
    pub fn from_parts(
        timestamp: f64,
        movement: Option<Vec<MovementDetection>>,
        codes: Option<Vec<QrDetection>>,
        trigger: Option<TriggerResult>,
    ) -> Self {
        let movement = movement.unwrap_or_default();
        let movement_confidence = movement
            .iter()
            .map(|m| m.confidence)
            .fold(0.0_f64, f64::max);
        let movement_points = movement.into_iter().flat_map(|m| m.points).collect();
        let trigger = trigger.unwrap_or_default();

        Self {
            timestamp,
            movement_points,
            movement_confidence,
            qr_detections: codes.unwrap_or_default(),
            trigger_detected: trigger.detected,
            trigger_text: if trigger.detected { trigger.text } else { None },
        }
    }

    pub fn is_empty(&self) -> bool {
        self.movement_points.is_empty() && self.qr_detections.is_empty() && !self.trigger_detected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn qr(text: &str) -> QrDetection {
        QrDetection {
            text: text.to_string(),
            bbox: Rect::new(1.0, 2.0, 30.0, 30.0),
            confidence: 0.9,
        }
    }

    #[test]
    fn movement_points_concatenate_and_confidence_is_max() {
        let frame = MergedDetectionFrame::from_parts(
            1.0,
            Some(vec![
                MovementDetection {
                    points: vec![Point::new(1.0, 1.0)],
                    confidence: 0.4,
                },
                MovementDetection {
                    points: vec![Point::new(2.0, 2.0), Point::new(3.0, 3.0)],
                    confidence: 0.8,
                },
            ]),
            None,
            None,
        );
        assert_eq!(frame.movement_points.len(), 3);
        assert!((frame.movement_confidence - 0.8).abs() < f64::EPSILON);
        assert!(frame.qr_detections.is_empty());
    }

    #[test]
    fn missing_movement_keeps_codes() {
        let frame = MergedDetectionFrame::from_parts(2.0, None, Some(vec![qr("A1")]), None);
        assert!(frame.movement_points.is_empty());
        assert_eq!(frame.movement_confidence, 0.0);
        assert_eq!(frame.qr_detections, vec![qr("A1")]);
        assert!(!frame.is_empty());
    }

    #[test]
    fn trigger_text_only_when_detected() {
        let frame = MergedDetectionFrame::from_parts(
            0.0,
            None,
            None,
            Some(TriggerResult {
                detected: false,
                text: Some("stale".into()),
            }),
        );
        assert!(!frame.trigger_detected);
        assert!(frame.trigger_text.is_none());
        assert!(frame.is_empty());
    }

    #[test]
    fn movement_detection_tolerates_missing_fields() {
        let m: MovementDetection = serde_json::from_str("{}").unwrap();
        assert!(m.points.is_empty());
        assert_eq!(m.confidence, 0.0);
    }
}
