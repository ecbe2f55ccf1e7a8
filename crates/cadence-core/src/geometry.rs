//! View-space geometry for hit testing.
//!
//! The sequencer view is measured in timeline frames along x and channels
//! along y, so everything here is double precision.

use glam::DVec2;
use serde::{Deserialize, Serialize};

/// 2D point in view space (x = timeline frame, y = channel).
pub type ViewPoint = DVec2;

/// Axis-aligned rectangle in view space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    /// Create a new rectangle.
    #[inline]
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Create a rectangle from two arbitrary corners (drag start and end).
    pub fn from_corners(a: ViewPoint, b: ViewPoint) -> Self {
        let min = a.min(b);
        let max = a.max(b);
        Self {
            x: min.x,
            y: min.y,
            width: max.x - min.x,
            height: max.y - min.y,
        }
    }

    /// Minimum corner.
    #[inline]
    pub fn min(self) -> ViewPoint {
        ViewPoint::new(self.x, self.y)
    }

    /// Maximum corner.
    #[inline]
    pub fn max(self) -> ViewPoint {
        ViewPoint::new(self.x + self.width, self.y + self.height)
    }

    /// Check if a point is inside the rectangle, edges included.
    ///
    /// Box selection treats a key sitting exactly on the border as inside.
    #[inline]
    pub fn contains(self, point: ViewPoint) -> bool {
        point.x >= self.x
            && point.x <= self.x + self.width
            && point.y >= self.y
            && point.y <= self.y + self.height
    }
}
