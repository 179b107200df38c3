//! Locates step icons inside the minimap.
//!
//! Matching is zero-mean normalized cross-correlation summed over the RGB
//! channels. Scores are in [-1, 1]; negative scores are reported as 0.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Local;
use image::RgbaImage;
use tracing::{debug, warn};

use super::step::NavigationStep;
use crate::capture::{ScreenCapture, ScreenRegion};
use crate::error::{NavError, NavResult};

/// Where an icon was found, in absolute screen coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MatchResult {
    pub screen_x: i32,
    pub screen_y: i32,
    pub confidence: f32,
}

/// Best placement of a template inside an image.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TemplateHit {
    /// Top-left corner of the matched window
    pub x: u32,
    pub y: u32,
    pub score: f32,
}

/// Scores every placement of `template` in `image` and returns the best one.
///
/// Returns None when the template is empty or larger than the image. Flat
/// windows or a flat template score 0.
pub fn match_template(image: &RgbaImage, template: &RgbaImage) -> Option<TemplateHit> {
    let (iw, ih) = image.dimensions();
    let (tw, th) = template.dimensions();
    if tw == 0 || th == 0 || tw > iw || th > ih {
        return None;
    }

    let n = (tw * th) as f64;

    // Zero-mean template per channel
    let mut t_centered = vec![[0f64; 3]; (tw * th) as usize];
    let mut t_energy = 0f64;
    for c in 0..3 {
        let mean = template.pixels().map(|p| p[c] as f64).sum::<f64>() / n;
        for (i, p) in template.pixels().enumerate() {
            let v = p[c] as f64 - mean;
            t_centered[i][c] = v;
            t_energy += v * v;
        }
    }

    let sums = IntegralImage::new(image);
    let mut best = TemplateHit {
        x: 0,
        y: 0,
        score: f32::MIN,
    };

    for y in 0..=(ih - th) {
        for x in 0..=(iw - tw) {
            let mut num = 0f64;
            for ty in 0..th {
                for tx in 0..tw {
                    let p = image.get_pixel(x + tx, y + ty);
                    let t = &t_centered[(ty * tw + tx) as usize];
                    num += t[0] * p[0] as f64 + t[1] * p[1] as f64 + t[2] * p[2] as f64;
                }
            }

            let w_energy = sums.window_energy(x, y, tw, th);
            let denom = (t_energy * w_energy).sqrt();
            let score = if denom > 1e-6 {
                (num / denom).clamp(-1.0, 1.0) as f32
            } else {
                0.0
            };

            if score > best.score {
                best = TemplateHit { x, y, score };
            }
        }
    }

    best.score = best.score.max(0.0);
    Some(best)
}

/// Per-channel summed-area tables of values and squared values.
struct IntegralImage {
    width: u32,
    sum: Vec<[f64; 3]>,
    sq: Vec<[f64; 3]>,
}

impl IntegralImage {
    fn new(image: &RgbaImage) -> Self {
        let (w, h) = image.dimensions();
        let stride = (w + 1) as usize;
        let mut sum = vec![[0f64; 3]; stride * (h + 1) as usize];
        let mut sq = vec![[0f64; 3]; stride * (h + 1) as usize];

        for y in 0..h as usize {
            for x in 0..w as usize {
                let p = image.get_pixel(x as u32, y as u32);
                let at = (y + 1) * stride + x + 1;
                for c in 0..3 {
                    let v = p[c] as f64;
                    sum[at][c] = v + sum[at - 1][c] + sum[at - stride][c] - sum[at - stride - 1][c];
                    sq[at][c] = v * v + sq[at - 1][c] + sq[at - stride][c] - sq[at - stride - 1][c];
                }
            }
        }
        Self { width: w, sum, sq }
    }

    fn rect(table: &[[f64; 3]], stride: usize, x: u32, y: u32, w: u32, h: u32, c: usize) -> f64 {
        let (x0, y0) = (x as usize, y as usize);
        let (x1, y1) = (x0 + w as usize, y0 + h as usize);
        table[y1 * stride + x1][c] - table[y0 * stride + x1][c] - table[y1 * stride + x0][c]
            + table[y0 * stride + x0][c]
    }

    /// Sum over channels of the window's squared deviation from its mean.
    fn window_energy(&self, x: u32, y: u32, w: u32, h: u32) -> f64 {
        let stride = (self.width + 1) as usize;
        let n = (w * h) as f64;
        (0..3)
            .map(|c| {
                let s = Self::rect(&self.sum, stride, x, y, w, h, c);
                let sq = Self::rect(&self.sq, stride, x, y, w, h, c);
                (sq - s * s / n).max(0.0)
            })
            .sum()
    }
}

/// Finds step icons in live minimap captures.
pub struct TemplateMatcher {
    capture: Arc<dyn ScreenCapture>,
    debug_dir: Option<PathBuf>,
}

impl TemplateMatcher {
    pub fn new(capture: Arc<dyn ScreenCapture>) -> Self {
        Self {
            capture,
            debug_dir: None,
        }
    }

    /// Saves every minimap capture to `dir`.
    pub fn with_debug_dir(mut self, dir: PathBuf) -> Self {
        self.debug_dir = Some(dir);
        self
    }

    /// Best placement of the step icon regardless of threshold.
    pub fn find(
        &self,
        step: &NavigationStep,
        minimap: Option<&ScreenRegion>,
    ) -> NavResult<MatchResult> {
        let template = step
            .template
            .as_ref()
            .ok_or_else(|| NavError::detection(&step.name, "no icon template loaded"))?;
        let region = minimap
            .filter(|r| !r.is_empty())
            .ok_or_else(|| NavError::configuration("minimap region is not configured"))?;

        let capture = self
            .capture
            .capture_region(region)
            .map_err(NavError::capture)?;
        self.save_debug(step, &capture);

        let hit = match_template(&capture, template).ok_or_else(|| {
            NavError::detection(
                &step.name,
                format!(
                    "template {}x{} is larger than the minimap capture {}x{}",
                    template.width(),
                    template.height(),
                    capture.width(),
                    capture.height()
                ),
            )
        })?;

        Ok(MatchResult {
            screen_x: region.x1 + (hit.x + template.width() / 2) as i32,
            screen_y: region.y1 + (hit.y + template.height() / 2) as i32,
            confidence: hit.score,
        })
    }

    /// The icon position if it matches with at least `threshold` confidence.
    pub fn locate(
        &self,
        step: &NavigationStep,
        minimap: Option<&ScreenRegion>,
        threshold: f32,
    ) -> Option<MatchResult> {
        match self.find(step, minimap) {
            Ok(m) if m.confidence >= threshold => {
                debug!(
                    "Found {} at ({}, {}) confidence {:.3}",
                    step, m.screen_x, m.screen_y, m.confidence
                );
                Some(m)
            }
            Ok(m) => {
                debug!(
                    "{} best confidence {:.3} below {:.2}",
                    step, m.confidence, threshold
                );
                None
            }
            Err(e) => {
                warn!("{}", e);
                None
            }
        }
    }

    /// One-shot detection with a human readable outcome.
    pub fn preview(
        &self,
        step: &NavigationStep,
        minimap: Option<&ScreenRegion>,
        threshold: f32,
    ) -> NavResult<String> {
        let m = self.find(step, minimap)?;
        Ok(if m.confidence >= threshold {
            format!(
                "Found '{}' at ({}, {}) with confidence {:.2}",
                step.name, m.screen_x, m.screen_y, m.confidence
            )
        } else {
            format!(
                "'{}' not found: best confidence {:.2} is below {:.2}",
                step.name, m.confidence, threshold
            )
        })
    }

    fn save_debug(&self, step: &NavigationStep, capture: &RgbaImage) {
        let Some(dir) = &self.debug_dir else {
            return;
        };
        let timestamp = Local::now().format("%Y%m%d_%H%M%S%3f");
        let path = dir.join(format!("minimap_step{}_{}.png", step.id, timestamp));
        if let Err(e) = std::fs::create_dir_all(dir).map_err(anyhow::Error::from).and_then(|_| {
            capture.save(&path)?;
            Ok(())
        }) {
            warn!("Failed to save minimap debug capture: {:#}", e);
        }
    }
}
