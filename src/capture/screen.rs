//! Region capture across all monitors using xcap.

use anyhow::{anyhow, Context, Result};
use image::{RgbaImage, imageops};
use tracing::debug;

use super::{ScreenCapture, ScreenRegion};

/// Captures regions of the virtual screen.
///
/// Every monitor intersecting the requested region is captured and the
/// overlapping part is composited into one image. Areas not covered by any
/// monitor stay transparent black.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScreenCaptureBackend;

impl ScreenCaptureBackend {
    pub fn new() -> Self {
        Self
    }
}

impl ScreenCapture for ScreenCaptureBackend {
    fn capture_region(&self, region: &ScreenRegion) -> Result<RgbaImage> {
        if region.is_empty() {
            return Err(anyhow!("Capture region {} is empty", region));
        }

        let monitors = xcap::Monitor::all().context("Failed to enumerate monitors")?;
        let mut canvas = RgbaImage::new(region.width(), region.height());
        let mut covered = false;

        for monitor in monitors {
            let x = monitor.x().context("Failed to read monitor x")?;
            let y = monitor.y().context("Failed to read monitor y")?;
            let width = monitor.width().context("Failed to read monitor width")?;
            let height = monitor.height().context("Failed to read monitor height")?;
            let bounds = ScreenRegion::new(x, y, x + width as i32, y + height as i32);

            let Some(overlap) = bounds.intersect(region) else {
                continue;
            };

            let shot = monitor
                .capture_image()
                .with_context(|| format!("Failed to capture monitor at {}", bounds))?;
            let (w, h) = (shot.width(), shot.height());
            let shot = RgbaImage::from_raw(w, h, shot.into_raw())
                .ok_or_else(|| anyhow!("Monitor capture returned a malformed buffer"))?;

            let part = imageops::crop_imm(
                &shot,
                (overlap.x1 - bounds.x1) as u32,
                (overlap.y1 - bounds.y1) as u32,
                overlap.width(),
                overlap.height(),
            )
            .to_image();
            imageops::replace(
                &mut canvas,
                &part,
                (overlap.x1 - region.x1) as i64,
                (overlap.y1 - region.y1) as i64,
            );
            covered = true;

            debug!("Captured {} from monitor at {}", overlap, bounds);
        }

        if !covered {
            return Err(anyhow!("Region {} is not on any monitor", region));
        }

        Ok(canvas)
    }
}
