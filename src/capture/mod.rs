//! Screen capture for the navigation engine.
//!
//! This module provides:
//! - `ScreenRegion`, a rectangle on the multi-monitor virtual screen
//! - The `ScreenCapture` trait the engine captures through
//! - `ScreenCaptureBackend`, the xcap-based implementation

pub mod screen;

use anyhow::Result;
use image::RgbaImage;
use serde::{Deserialize, Serialize};

pub use screen::ScreenCaptureBackend;

/// A rectangle in absolute virtual-screen pixels. `x2`/`y2` are exclusive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenRegion {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl ScreenRegion {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> u32 {
        (self.x2 - self.x1).max(0) as u32
    }

    pub fn height(&self) -> u32 {
        (self.y2 - self.y1).max(0) as u32
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Returns true if the absolute point lies inside the region.
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x1 && x < self.x2 && y >= self.y1 && y < self.y2
    }

    /// Overlap of two regions, if any.
    pub fn intersect(&self, other: &ScreenRegion) -> Option<ScreenRegion> {
        let r = ScreenRegion {
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
            x2: self.x2.min(other.x2),
            y2: self.y2.min(other.y2),
        };
        (!r.is_empty()).then_some(r)
    }
}

impl std::fmt::Display for ScreenRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})-({}, {})", self.x1, self.y1, self.x2, self.y2)
    }
}

/// Grabs a rectangular area of the screen.
pub trait ScreenCapture: Send + Sync {
    fn capture_region(&self, region: &ScreenRegion) -> Result<RgbaImage>;
}
