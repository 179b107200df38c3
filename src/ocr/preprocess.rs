//! Image preprocessing strategies for coordinate OCR.
//!
//! Each strategy turns the upscaled grayscale region into one or more
//! candidate images. The extractor OCRs candidates in order and stops at the
//! first acceptable reading, so strategies are listed cheapest first.

use image::{imageops, GrayImage, Luma};
use imageproc::contrast::{adaptive_threshold, otsu_level, threshold, ThresholdType};
use imageproc::distance_transform::Norm;
use imageproc::edges::canny;
use imageproc::filter::{gaussian_blur_f32, sharpen3x3};
use imageproc::morphology::{close, dilate, open};

use super::engine::{OcrRequest, PageSegMode};

/// A named way of preparing the coordinate region for OCR.
pub trait PreprocessStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Candidate images, OCR'd in order.
    fn prepare(&self, gray: &GrayImage) -> Vec<GrayImage>;

    /// OCR passes run against every candidate.
    fn passes(&self) -> Vec<OcrRequest> {
        vec![OcrRequest::restricted(PageSegMode::Block)]
    }
}

/// The full strategy chain in the order it is tried.
pub fn default_strategies() -> Vec<Box<dyn PreprocessStrategy>> {
    vec![
        Box::new(Grayscale),
        Box::new(AdaptiveThreshold),
        Box::new(ThresholdSweep),
        Box::new(ContrastEnhancement),
        Box::new(MorphologicalCleanup),
        Box::new(GaussianSharpen),
        Box::new(EdgeEnhancement),
    ]
}

/// Plain grayscale, tried in several page segmentation modes.
pub struct Grayscale;

impl PreprocessStrategy for Grayscale {
    fn name(&self) -> &'static str {
        "grayscale"
    }

    fn prepare(&self, gray: &GrayImage) -> Vec<GrayImage> {
        vec![gray.clone()]
    }

    fn passes(&self) -> Vec<OcrRequest> {
        vec![
            OcrRequest::restricted(PageSegMode::Block),
            OcrRequest::restricted(PageSegMode::SingleLine),
            OcrRequest::restricted(PageSegMode::SingleWord),
            OcrRequest::restricted(PageSegMode::RawLine),
            OcrRequest::unrestricted(PageSegMode::Block),
        ]
    }
}

/// Local-mean threshold for uneven backgrounds.
pub struct AdaptiveThreshold;

/// Below this mean brightness the region is treated as a dark background.
const DARK_BACKGROUND_MEAN: f64 = 100.0;

impl PreprocessStrategy for AdaptiveThreshold {
    fn name(&self) -> &'static str {
        "adaptive_threshold"
    }

    fn prepare(&self, gray: &GrayImage) -> Vec<GrayImage> {
        // block radius 5 (11x11 window), offset 2
        let mut bin = adaptive_threshold(gray, 5, 2);
        if mean_brightness(gray) >= DARK_BACKGROUND_MEAN {
            imageops::invert(&mut bin);
        }
        vec![bin]
    }
}

/// Fixed global cutoffs, each cleaned with a small close/open.
pub struct ThresholdSweep;

const SWEEP_CUTOFFS: [u8; 6] = [100, 120, 140, 160, 180, 200];

impl PreprocessStrategy for ThresholdSweep {
    fn name(&self) -> &'static str {
        "threshold_sweep"
    }

    fn prepare(&self, gray: &GrayImage) -> Vec<GrayImage> {
        SWEEP_CUTOFFS
            .iter()
            .map(|&level| {
                let bin = threshold(gray, level, ThresholdType::Binary);
                open(&close(&bin, Norm::LInf, 1), Norm::LInf, 1)
            })
            .collect()
    }
}

/// CLAHE followed by a linear stretch and Otsu.
pub struct ContrastEnhancement;

const CLAHE_CLIP_LIMIT: f32 = 3.0;
const CLAHE_TILES: u32 = 8;

impl PreprocessStrategy for ContrastEnhancement {
    fn name(&self) -> &'static str {
        "contrast_enhancement"
    }

    fn prepare(&self, gray: &GrayImage) -> Vec<GrayImage> {
        let mut enhanced = clahe(gray, CLAHE_CLIP_LIMIT, CLAHE_TILES);
        for p in enhanced.pixels_mut() {
            p[0] = (p[0] as f32 * 1.8 + 50.0).round().min(255.0) as u8;
        }
        vec![otsu_binarize(&enhanced)]
    }
}

/// Otsu on the inverted image, then close/open at growing kernel sizes.
pub struct MorphologicalCleanup;

const CLEANUP_RADII: [u8; 3] = [0, 1, 2];

impl PreprocessStrategy for MorphologicalCleanup {
    fn name(&self) -> &'static str {
        "morphological_cleanup"
    }

    fn prepare(&self, gray: &GrayImage) -> Vec<GrayImage> {
        let level = otsu_level(gray);
        let bin = threshold(gray, level, ThresholdType::BinaryInverted);
        CLEANUP_RADII
            .iter()
            .map(|&k| {
                let mut processed = open(&close(&bin, Norm::LInf, k), Norm::LInf, k);
                imageops::invert(&mut processed);
                processed
            })
            .collect()
    }
}

/// Light blur to remove compression noise, then sharpen and Otsu.
pub struct GaussianSharpen;

impl PreprocessStrategy for GaussianSharpen {
    fn name(&self) -> &'static str {
        "gaussian_sharpen"
    }

    fn prepare(&self, gray: &GrayImage) -> Vec<GrayImage> {
        let blurred = gaussian_blur_f32(gray, 0.8);
        vec![otsu_binarize(&sharpen3x3(&blurred))]
    }
}

/// Canny edges merged into the source to thicken glyph outlines.
pub struct EdgeEnhancement;

impl PreprocessStrategy for EdgeEnhancement {
    fn name(&self) -> &'static str {
        "edge_enhancement"
    }

    fn prepare(&self, gray: &GrayImage) -> Vec<GrayImage> {
        let edges = dilate(&canny(gray, 50.0, 150.0), Norm::LInf, 1);
        let combined = GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
            Luma([gray.get_pixel(x, y)[0] | edges.get_pixel(x, y)[0]])
        });
        vec![otsu_binarize(&combined)]
    }
}

fn otsu_binarize(gray: &GrayImage) -> GrayImage {
    let level = otsu_level(gray);
    threshold(gray, level, ThresholdType::Binary)
}

pub fn mean_brightness(gray: &GrayImage) -> f64 {
    let count = gray.width() as u64 * gray.height() as u64;
    if count == 0 {
        return 0.0;
    }
    let sum: u64 = gray.pixels().map(|p| p[0] as u64).sum();
    sum as f64 / count as f64
}

/// Contrast limited adaptive histogram equalization.
///
/// The image is split into a `tiles x tiles` grid (fewer when the image is
/// smaller than that). Each tile gets a clipped, equalized mapping and pixels
/// blend the mappings of the four nearest tile centers bilinearly.
pub fn clahe(gray: &GrayImage, clip_limit: f32, tiles: u32) -> GrayImage {
    let (w, h) = gray.dimensions();
    if w == 0 || h == 0 {
        return gray.clone();
    }
    let nx = tiles.min(w).max(1);
    let ny = tiles.min(h).max(1);

    let tile_span = |i: u32, n: u32, len: u32| (i * len / n, (i + 1) * len / n);

    let mut luts: Vec<[u8; 256]> = Vec::with_capacity((nx * ny) as usize);
    for ty in 0..ny {
        let (y0, y1) = tile_span(ty, ny, h);
        for tx in 0..nx {
            let (x0, x1) = tile_span(tx, nx, w);

            let mut hist = [0u32; 256];
            for y in y0..y1 {
                for x in x0..x1 {
                    hist[gray.get_pixel(x, y)[0] as usize] += 1;
                }
            }
            let count = (x1 - x0) * (y1 - y0);
            luts.push(clipped_equalization(&mut hist, count, clip_limit));
        }
    }

    let tile_w = w as f32 / nx as f32;
    let tile_h = h as f32 / ny as f32;
    let neighbours = |pos: u32, size: f32, n: u32| {
        let f = (pos as f32 + 0.5) / size - 0.5;
        let i0 = f.floor().clamp(0.0, (n - 1) as f32) as u32;
        let i1 = (i0 + 1).min(n - 1);
        let a = (f - i0 as f32).clamp(0.0, 1.0);
        (i0, i1, a)
    };

    GrayImage::from_fn(w, h, |x, y| {
        let v = gray.get_pixel(x, y)[0] as usize;
        let (tx0, tx1, ax) = neighbours(x, tile_w, nx);
        let (ty0, ty1, ay) = neighbours(y, tile_h, ny);
        let at = |tx: u32, ty: u32| luts[(ty * nx + tx) as usize][v] as f32;

        let top = at(tx0, ty0) * (1.0 - ax) + at(tx1, ty0) * ax;
        let bottom = at(tx0, ty1) * (1.0 - ax) + at(tx1, ty1) * ax;
        Luma([(top * (1.0 - ay) + bottom * ay).round().clamp(0.0, 255.0) as u8])
    })
}

fn clipped_equalization(hist: &mut [u32; 256], count: u32, clip_limit: f32) -> [u8; 256] {
    let mut lut = [0u8; 256];
    if count == 0 {
        return lut;
    }

    let limit = ((clip_limit * count as f32 / 256.0) as u32).max(1);
    let mut excess = 0u32;
    for bin in hist.iter_mut() {
        if *bin > limit {
            excess += *bin - limit;
            *bin = limit;
        }
    }
    let bonus = excess / 256;
    let remainder = (excess % 256) as usize;
    for (i, bin) in hist.iter_mut().enumerate() {
        *bin += bonus + u32::from(i < remainder);
    }

    let mut cdf = 0u32;
    for (i, bin) in hist.iter().enumerate() {
        cdf += bin;
        lut[i] = ((cdf as f32 * 255.0 / count as f32).round()).min(255.0) as u8;
    }
    lut
}
