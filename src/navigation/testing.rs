//! Capture and input fakes for tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use image::{imageops, Rgba, RgbaImage};

use super::input::InputController;
use super::step::NavigationStep;
use crate::capture::{ScreenCapture, ScreenRegion};

/// Deterministic RGB noise.
pub fn noise_image(width: u32, height: u32, seed: u64) -> RgbaImage {
    let mut state = seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) | 1;
    let mut next = move || {
        // xorshift64*
        state ^= state >> 12;
        state ^= state << 25;
        state ^= state >> 27;
        (state.wrapping_mul(0x2545_F491_4F6C_DD1D) >> 56) as u8
    };
    RgbaImage::from_fn(width, height, |_, _| Rgba([next(), next(), next(), 255]))
}

pub fn crop(img: &RgbaImage, x: u32, y: u32, w: u32, h: u32) -> RgbaImage {
    imageops::crop_imm(img, x, y, w, h).to_image()
}

/// An active step with an in-memory template and no wait.
pub fn step_with_template(id: u32, template: RgbaImage) -> NavigationStep {
    NavigationStep {
        id,
        name: format!("Step {}", id),
        icon_path: None,
        template: Some(Arc::new(template)),
        target_coordinate: None,
        wait: Duration::ZERO,
        active: true,
    }
}

/// Returns the same image for every region.
pub struct StaticCapture {
    image: RgbaImage,
    calls: AtomicUsize,
}

impl StaticCapture {
    pub fn new(image: RgbaImage) -> Self {
        Self {
            image,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ScreenCapture for StaticCapture {
    fn capture_region(&self, _region: &ScreenRegion) -> Result<RgbaImage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.image.clone())
    }
}

pub struct FailingCapture;

impl ScreenCapture for FailingCapture {
    fn capture_region(&self, region: &ScreenRegion) -> Result<RgbaImage> {
        Err(anyhow!("no monitor covers {}", region))
    }
}

/// Capture backend that panics, standing in for a crashing driver.
pub struct PanickingCapture;

impl ScreenCapture for PanickingCapture {
    fn capture_region(&self, region: &ScreenRegion) -> Result<RgbaImage> {
        panic!("capture backend crashed on {}", region)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputAction {
    Click(i32, i32),
    Move(i32, i32),
    Key(u16),
}

/// Records input instead of sending it. Clicks can be made to fail.
#[derive(Default)]
pub struct RecordingInput {
    actions: Mutex<Vec<InputAction>>,
    failing_clicks: AtomicUsize,
}

impl RecordingInput {
    /// The next `n` clicks report failure.
    pub fn fail_next_clicks(&self, n: usize) {
        self.failing_clicks.store(n, Ordering::SeqCst);
    }

    pub fn actions(&self) -> Vec<InputAction> {
        self.actions.lock().unwrap().clone()
    }

    pub fn clicks(&self) -> Vec<(i32, i32)> {
        self.actions()
            .into_iter()
            .filter_map(|a| match a {
                InputAction::Click(x, y) => Some((x, y)),
                _ => None,
            })
            .collect()
    }
}

impl InputController for RecordingInput {
    fn click(&self, x: i32, y: i32) -> bool {
        let failing = self.failing_clicks.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_clicks.store(failing - 1, Ordering::SeqCst);
            return false;
        }
        self.actions.lock().unwrap().push(InputAction::Click(x, y));
        true
    }

    fn move_to(&self, x: i32, y: i32) -> bool {
        self.actions.lock().unwrap().push(InputAction::Move(x, y));
        true
    }

    fn press_key(&self, key: u16) -> bool {
        self.actions.lock().unwrap().push(InputAction::Key(key));
        true
    }

    fn screen_center(&self) -> (i32, i32) {
        (960, 540)
    }
}
