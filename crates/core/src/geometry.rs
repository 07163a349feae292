//! Display-space / source-space coordinate mapping.
//!
//! The drawing surface is defined to occupy exactly the displayed video
//! area with zero insets: no letterboxing, no offset, no aspect-ratio
//! correction. Scale factors are computed independently per axis.
//! Values entering source space are rounded to the nearest pixel;
//! values entering display space stay real-valued.

use crate::error::CoreError;
use crate::types::{PixelPoint, PixelRect, Point, Rect, Size};

/// Per-axis multipliers taking display units to source pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleFactors {
    pub x: f64,
    pub y: f64,
}

/// Compute `source / display` for each axis.
///
/// Callers must guarantee nonzero display dimensions; see
/// [`DisplayMapping::new`] for a checked constructor.
pub fn scale_factors(display: Size, source: Size) -> ScaleFactors {
    ScaleFactors {
        x: source.width / display.width,
        y: source.height / display.height,
    }
}

pub fn to_source_point(p: Point, display: Size, source: Size) -> PixelPoint {
    let s = scale_factors(display, source);
    PixelPoint {
        x: (p.x * s.x).round() as i64,
        y: (p.y * s.y).round() as i64,
    }
}

pub fn to_display_point(p: PixelPoint, display: Size, source: Size) -> Point {
    let s = scale_factors(display, source);
    Point::new(p.x as f64 / s.x, p.y as f64 / s.y)
}

/// Map a display-space rectangle onto the source pixel grid.
///
/// Origin and extent are rounded independently, matching what the
/// analysis backend receives as the ROI.
pub fn to_source_rect(r: Rect, display: Size, source: Size) -> PixelRect {
    let s = scale_factors(display, source);
    PixelRect {
        x: (r.x * s.x).round() as i64,
        y: (r.y * s.y).round() as i64,
        width: (r.width * s.x).round() as i64,
        height: (r.height * s.y).round() as i64,
    }
}

pub fn to_display_rect(r: PixelRect, display: Size, source: Size) -> Rect {
    let s = scale_factors(display, source);
    Rect::new(
        r.x as f64 / s.x,
        r.y as f64 / s.y,
        r.width as f64 / s.x,
        r.height as f64 / s.y,
    )
}

/// A validated `(display, source)` pair.
///
/// Holding one of these is the caller-side guarantee that neither surface
/// has a zero or non-finite dimension.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayMapping {
    display: Size,
    source: Size,
}

impl DisplayMapping {
    pub fn new(display: Size, source: Size) -> Result<Self, CoreError> {
        if !display.is_usable() {
            return Err(CoreError::Validation(format!(
                "Display size must be positive, got {}x{}",
                display.width, display.height
            )));
        }
        if !source.is_usable() {
            return Err(CoreError::Validation(format!(
                "Source size must be positive, got {}x{}",
                source.width, source.height
            )));
        }
        Ok(Self { display, source })
    }

    pub fn display(&self) -> Size {
        self.display
    }

    pub fn source(&self) -> Size {
        self.source
    }

    pub fn to_source_rect(&self, r: Rect) -> PixelRect {
        to_source_rect(r, self.display, self.source)
    }

    pub fn to_display_rect(&self, r: PixelRect) -> Rect {
        to_display_rect(r, self.display, self.source)
    }

    pub fn to_source_point(&self, p: Point) -> PixelPoint {
        to_source_point(p, self.display, self.source)
    }

    pub fn to_display_point(&self, p: PixelPoint) -> Point {
        to_display_point(p, self.display, self.source)
    }
}
