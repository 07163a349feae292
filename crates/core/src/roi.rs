//! Region-of-interest store.
//!
//! Holds the user-drawn ROI rectangles (always in display space), their
//! roles, and the current selection/drag state. The store never talks to
//! other components: every mutation returns a [`RoiMutation`] telling the
//! caller whether downstream analysis caches must be invalidated.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{Point, Rect, RoiId, Size};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Smallest accepted width/height of a drawn ROI, in display units.
pub const MIN_ROI_SIZE: f64 = 10.0;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Role of an ROI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoiKind {
    /// The area both detectors analyse.
    PrimaryArea,
    /// Dual-area mode only: the sub-region scanned for the trigger code.
    TriggerArea,
    MovementArea,
    GenericDetection,
}

impl RoiKind {
    pub fn default_label(self) -> &'static str {
        match self {
            Self::PrimaryArea => "Primary Area",
            Self::TriggerArea => "Trigger Area",
            Self::MovementArea => "Movement Area",
            Self::GenericDetection => "Detection Area",
        }
    }

    pub fn default_color(self) -> &'static str {
        match self {
            Self::PrimaryArea => "#2196f3",
            Self::TriggerArea => "#ff9800",
            Self::MovementArea => "#4caf50",
            Self::GenericDetection => "#9c27b0",
        }
    }

    /// Whether changes to an ROI of this kind affect submitted analysis jobs.
    pub fn feeds_analysis(self) -> bool {
        matches!(self, Self::PrimaryArea | Self::TriggerArea)
    }
}

/// Operating mode deciding how roles are assigned on creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AreaMode {
    /// At most one primary area; role hints are honoured.
    #[default]
    Single,
    /// First ROI is the trigger area, second the primary area, then full.
    Dual,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Roi {
    pub id: RoiId,
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
    pub kind: RoiKind,
    pub label: String,
    pub color: String,
    pub completed: bool,
}

impl Roi {
    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.w, self.h)
    }
}

/// Partial update merged into an existing ROI. Size is fixed after creation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoiPatch {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub label: Option<String>,
    pub color: Option<String>,
    pub completed: Option<bool>,
}

impl RoiPatch {
    pub fn position(x: f64, y: f64) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            ..Default::default()
        }
    }
}

/// Outcome of a mutating store operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoiMutation {
    /// Nothing downstream depends on the changed ROI.
    Local,
    /// An analysis-feeding ROI changed: both job caches and the playback
    /// waiting state must be reset.
    InvalidateAnalysis,
}

impl RoiMutation {
    fn for_kind(kind: RoiKind) -> Self {
        if kind.feeds_analysis() {
            Self::InvalidateAnalysis
        } else {
            Self::Local
        }
    }

    pub fn requires_invalidation(self) -> bool {
        self == Self::InvalidateAnalysis
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct DragState {
    id: RoiId,
    /// Pointer position relative to the ROI origin at grab time.
    grab_offset: Point,
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct RoiStore {
    mode: AreaMode,
    rois: Vec<Roi>,
    next_id: RoiId,
    selected: Option<RoiId>,
    drag: Option<DragState>,
}

impl RoiStore {
    pub fn new(mode: AreaMode) -> Self {
        Self {
            mode,
            rois: Vec::new(),
            next_id: 1,
            selected: None,
            drag: None,
        }
    }

    pub fn mode(&self) -> AreaMode {
        self.mode
    }

    pub fn rois(&self) -> &[Roi] {
        &self.rois
    }

    pub fn get(&self, id: RoiId) -> Option<&Roi> {
        self.rois.iter().find(|r| r.id == id)
    }

    pub fn first_of_kind(&self, kind: RoiKind) -> Option<&Roi> {
        self.rois.iter().find(|r| r.kind == kind)
    }

    pub fn primary_area(&self) -> Option<&Roi> {
        self.first_of_kind(RoiKind::PrimaryArea)
    }

    pub fn trigger_area(&self) -> Option<&Roi> {
        self.first_of_kind(RoiKind::TriggerArea)
    }

    pub fn selected(&self) -> Option<RoiId> {
        self.selected
    }

    /// Add an ROI from a completed drag gesture.
    ///
    /// Returns `None` (store unchanged) when the rectangle is below
    /// [`MIN_ROI_SIZE`] or when the role-assignment policy forbids another
    /// ROI of the resolved kind.
    pub fn create(&mut self, rect: Rect, role_hint: Option<RoiKind>) -> Option<Roi> {
        let rect = Rect::from_corners(
            rect.origin(),
            Point::new(rect.x + rect.width, rect.y + rect.height),
        );
        if rect.width < MIN_ROI_SIZE || rect.height < MIN_ROI_SIZE {
            return None;
        }

        let kind = self.assign_kind(role_hint)?;

        let roi = Roi {
            id: self.next_id,
            x: rect.x,
            y: rect.y,
            w: rect.width,
            h: rect.height,
            kind,
            label: kind.default_label().to_string(),
            color: kind.default_color().to_string(),
            completed: true,
        };
        self.next_id += 1;
        self.rois.push(roi.clone());
        Some(roi)
    }

    /// Merge `patch` into the ROI with the given id.
    pub fn update(&mut self, id: RoiId, patch: RoiPatch) -> Result<RoiMutation, CoreError> {
        let roi = self
            .rois
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(CoreError::RoiNotFound(id))?;

        if let Some(x) = patch.x {
            roi.x = x;
        }
        if let Some(y) = patch.y {
            roi.y = y;
        }
        if let Some(label) = patch.label {
            roi.label = label;
        }
        if let Some(color) = patch.color {
            roi.color = color;
        }
        if let Some(completed) = patch.completed {
            roi.completed = completed;
        }

        Ok(RoiMutation::for_kind(roi.kind))
    }

    /// Remove the ROI. Removing an analysis-feeding ROI always asks for
    /// invalidation, whether or not a job handle currently exists.
    pub fn delete(&mut self, id: RoiId) -> Result<RoiMutation, CoreError> {
        let idx = self
            .rois
            .iter()
            .position(|r| r.id == id)
            .ok_or(CoreError::RoiNotFound(id))?;
        let removed = self.rois.remove(idx);

        if self.selected == Some(id) {
            self.selected = None;
        }
        if self.drag.map(|d| d.id) == Some(id) {
            self.drag = None;
        }

        Ok(RoiMutation::for_kind(removed.kind))
    }

    /// Select an ROI, or clear the selection with `None`.
    ///
    /// Returns `false` (selection unchanged) for an unknown id.
    pub fn select(&mut self, id: Option<RoiId>) -> bool {
        match id {
            Some(id) if self.get(id).is_none() => false,
            other => {
                self.selected = other;
                true
            }
        }
    }

    /// Return the topmost ROI containing `p`, preferring later ROIs.
    pub fn hit_test(&self, p: Point) -> Option<RoiId> {
        self.rois.iter().rev().find(|r| r.rect().contains(p)).map(|r| r.id)
    }

    // ---- drag-move ----

    /// Start moving an ROI; also selects it.
    pub fn begin_drag(&mut self, id: RoiId, pointer: Point) -> Result<(), CoreError> {
        let roi = self.get(id).ok_or(CoreError::RoiNotFound(id))?;
        self.drag = Some(DragState {
            id,
            grab_offset: Point::new(pointer.x - roi.x, pointer.y - roi.y),
        });
        self.selected = Some(id);
        Ok(())
    }

    /// Move the dragged ROI so the grab point follows the pointer.
    ///
    /// Returns `None` when no drag is in progress.
    pub fn drag_to(&mut self, pointer: Point) -> Option<Result<RoiMutation, CoreError>> {
        let drag = self.drag?;
        let patch = RoiPatch::position(
            pointer.x - drag.grab_offset.x,
            pointer.y - drag.grab_offset.y,
        );
        Some(self.update(drag.id, patch))
    }

    pub fn end_drag(&mut self) {
        self.drag = None;
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    /// Rescale every ROI after the display surface changed size.
    ///
    /// Source-space geometry is unchanged, so this never invalidates.
    pub fn rescale(&mut self, from: Size, to: Size) {
        let sx = to.width / from.width;
        let sy = to.height / from.height;
        for roi in &mut self.rois {
            roi.x *= sx;
            roi.w *= sx;
            roi.y *= sy;
            roi.h *= sy;
        }
    }

    // ---- private helpers ----

    fn assign_kind(&self, role_hint: Option<RoiKind>) -> Option<RoiKind> {
        match self.mode {
            AreaMode::Dual => {
                match (self.trigger_area().is_some(), self.primary_area().is_some()) {
                    (false, _) => Some(RoiKind::TriggerArea),
                    (true, false) => Some(RoiKind::PrimaryArea),
                    (true, true) => None,
                }
            }
            AreaMode::Single => match role_hint.unwrap_or(RoiKind::PrimaryArea) {
                RoiKind::PrimaryArea if self.primary_area().is_some() => None,
                RoiKind::TriggerArea => None,
                kind => Some(kind),
            },
        }
    }
}

impl Default for RoiStore {
    fn default() -> Self {
        Self::new(AreaMode::default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
