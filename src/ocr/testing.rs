//! OCR fakes for tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{anyhow, Result};
use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::{GrayImage, Rgba, RgbaImage};

use super::engine::{OcrEngine, OcrRequest};

pub const TEXT: Rgba<u8> = Rgba([40, 40, 40, 255]);
pub const BACKGROUND: Rgba<u8> = Rgba([200, 200, 200, 255]);

/// Renders `text` with the 8x8 bitmap font, each font pixel `scale` screen
/// pixels wide, surrounded by a `margin` pixel border.
pub fn render_text(text: &str, scale: u32, margin: u32) -> RgbaImage {
    let cell = 8 * scale;
    let width = 2 * margin + cell * text.chars().count() as u32;
    let height = 2 * margin + cell;
    let mut img = RgbaImage::from_pixel(width, height, BACKGROUND);

    for (i, ch) in text.chars().enumerate() {
        let Some(glyph) = BASIC_FONTS.get(ch) else {
            continue;
        };
        for (row, bits) in glyph.iter().enumerate() {
            for col in 0..8u32 {
                if bits & (1 << col) == 0 {
                    continue;
                }
                let x0 = margin + i as u32 * cell + col * scale;
                let y0 = margin + row as u32 * scale;
                for dy in 0..scale {
                    for dx in 0..scale {
                        img.put_pixel(x0 + dx, y0 + dy, TEXT);
                    }
                }
            }
        }
    }
    img
}

/// Reads text rendered by `render_text` back, glyph cell by glyph cell.
///
/// `pixel` and `margin` are in the coordinates of the image the engine
/// receives, so they include any upscaling.
pub struct GlyphOcr {
    pub pixel: u32,
    pub margin: u32,
}

impl GlyphOcr {
    fn read_cell(&self, img: &GrayImage, index: u32, ink_is_dark: bool) -> [u8; 8] {
        let mut rows = [0u8; 8];
        for (row, bits) in rows.iter_mut().enumerate() {
            for col in 0..8u32 {
                let x = self.margin + index * 8 * self.pixel + col * self.pixel + self.pixel / 2;
                let y = self.margin + row as u32 * self.pixel + self.pixel / 2;
                let v = img.get_pixel(x, y)[0];
                if (v < 128) == ink_is_dark {
                    *bits |= 1 << col;
                }
            }
        }
        rows
    }
}

impl OcrEngine for GlyphOcr {
    fn recognize(&self, img: &GrayImage, request: &OcrRequest) -> Result<String> {
        let cell = 8 * self.pixel;
        let usable = img.width().saturating_sub(2 * self.margin);
        if cell == 0 || img.height() < 2 * self.margin + cell {
            return Ok(String::new());
        }

        let mean = img.pixels().map(|p| p[0] as u64).sum::<u64>() as f64
            / (img.width() as u64 * img.height() as u64) as f64;
        let ink_is_dark = mean > 127.0;

        let alphabet: Vec<char> = match request.whitelist {
            Some(chars) => chars.chars().collect(),
            None => (' '..='~').collect(),
        };

        let mut text = String::new();
        for index in 0..usable / cell {
            let rows = self.read_cell(img, index, ink_is_dark);
            if rows == [0u8; 8] {
                text.push(' ');
                continue;
            }
            if let Some(ch) = alphabet.iter().find(|&&c| BASIC_FONTS.get(c) == Some(rows)) {
                text.push(*ch);
            }
        }
        Ok(text.trim().to_string())
    }
}

/// Returns scripted responses in order, repeating the last one.
pub struct ScriptedOcr {
    responses: Mutex<VecDeque<String>>,
    last: Mutex<String>,
    calls: AtomicUsize,
}

impl ScriptedOcr {
    pub fn new(responses: &[&str]) -> Self {
        Self {
            responses: Mutex::new(responses.iter().map(|s| s.to_string()).collect()),
            last: Mutex::new(String::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Always answers `text`.
    pub fn always(text: &str) -> Self {
        Self::new(&[text])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl OcrEngine for ScriptedOcr {
    fn recognize(&self, _img: &GrayImage, _request: &OcrRequest) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut responses = self.responses.lock().map_err(|_| anyhow!("poisoned"))?;
        let mut last = self.last.lock().map_err(|_| anyhow!("poisoned"))?;
        if let Some(next) = responses.pop_front() {
            *last = next;
        }
        Ok(last.clone())
    }
}

/// Always fails, like a missing Tesseract install.
pub struct FailingOcr;

impl OcrEngine for FailingOcr {
    fn recognize(&self, _img: &GrayImage, _request: &OcrRequest) -> Result<String> {
        Err(anyhow!("tesseract unavailable"))
    }
}
