//! Coordinate extraction from the on-screen position text.
//!
//! The region is converted to grayscale and upscaled, then every
//! preprocessing strategy is tried in order. Each candidate image is OCR'd,
//! parsed, and the first coordinate passing the acceptance gate wins. When
//! all strategies fail and an expected position is known, a fuzzy pass
//! corrects digit look-alikes in unrestricted OCR output.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Local;
use image::{imageops, GrayImage, RgbaImage};
use tracing::{debug, info, warn};

use super::engine::{OcrEngine, OcrRequest, PageSegMode};
use super::parse::{corrected_readings, CoordinateParser};
use super::preprocess::{default_strategies, PreprocessStrategy};
use crate::coordinate::Coordinate;
use crate::navigation::config::OcrConfig;

/// Name reported for readings recovered by look-alike correction.
pub const FUZZY_STRATEGY: &str = "fuzzy_correction";

/// A successful reading and the strategy that produced it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Extraction {
    pub coordinate: Coordinate,
    pub strategy: &'static str,
}

pub struct CoordinateExtractor {
    engine: Arc<dyn OcrEngine>,
    strategies: Vec<Box<dyn PreprocessStrategy>>,
    parser: CoordinateParser,
    config: OcrConfig,
    debug_dir: Option<PathBuf>,
}

impl CoordinateExtractor {
    pub fn new(engine: Arc<dyn OcrEngine>, config: OcrConfig) -> Result<Self> {
        Ok(Self {
            engine,
            strategies: default_strategies(),
            parser: CoordinateParser::new().context("Failed to compile coordinate patterns")?,
            config,
            debug_dir: None,
        })
    }

    /// Replaces the strategy chain.
    pub fn with_strategies(mut self, strategies: Vec<Box<dyn PreprocessStrategy>>) -> Self {
        self.strategies = strategies;
        self
    }

    /// Directory for debug images, used when `debug_images` is enabled.
    pub fn with_debug_dir(mut self, dir: PathBuf) -> Self {
        self.debug_dir = Some(dir);
        self
    }

    pub fn parser(&self) -> &CoordinateParser {
        &self.parser
    }

    pub fn config(&self) -> &OcrConfig {
        &self.config
    }

    /// Reads the position rendered in `region`.
    ///
    /// `expected` narrows acceptance to readings near it and enables the
    /// fuzzy fallback. Returns None when nothing plausible was read.
    pub fn extract(&self, region: &RgbaImage, expected: Option<&Coordinate>) -> Option<Extraction> {
        if region.width() == 0 || region.height() == 0 {
            warn!("Coordinate region is empty");
            return None;
        }

        let gray = self.prepare_gray(region);

        for strategy in &self.strategies {
            let passes = strategy.passes();
            for variant in strategy.prepare(&gray) {
                for request in &passes {
                    let Some(text) = self.recognize(&variant, request, strategy.name()) else {
                        continue;
                    };
                    if let Some(coordinate) = self.first_accepted(&text, expected) {
                        info!(
                            "OCR strategy '{}' read {} from '{}'",
                            strategy.name(),
                            coordinate,
                            text
                        );
                        self.save_debug(strategy.name(), region, &variant);
                        return Some(Extraction {
                            coordinate,
                            strategy: strategy.name(),
                        });
                    }
                }
            }
        }

        if let Some(expected) = expected {
            if let Some(coordinate) = self.fuzzy_fallback(&gray, expected) {
                info!("Fuzzy correction read {} (expected {})", coordinate, expected);
                self.save_debug(FUZZY_STRATEGY, region, &gray);
                return Some(Extraction {
                    coordinate,
                    strategy: FUZZY_STRATEGY,
                });
            }
        }

        warn!("All coordinate extraction strategies failed");
        None
    }

    /// Acceptance gate: inside the configured range and, when a position is
    /// expected, within `expected_max_deviation` of it on both axes.
    pub fn passes_gate(&self, candidate: &Coordinate, expected: Option<&Coordinate>) -> bool {
        if !self.config.coordinate_range.is_valid(candidate) {
            return false;
        }
        match expected {
            Some(e) if candidate.max_axis_delta(e) > self.config.expected_max_deviation => {
                debug!("{} too far from expected {}", candidate, e);
                false
            }
            _ => true,
        }
    }

    fn first_accepted(&self, text: &str, expected: Option<&Coordinate>) -> Option<Coordinate> {
        self.parser
            .candidates(text, self.config.default_z)
            .into_iter()
            .find(|c| self.passes_gate(c, expected))
    }

    fn recognize(&self, img: &GrayImage, request: &OcrRequest, strategy: &str) -> Option<String> {
        match self.engine.recognize(img, request) {
            Ok(text) => {
                debug!(
                    "OCR text ({}, psm {}): '{}'",
                    strategy,
                    request.psm.as_arg(),
                    text
                );
                Some(text)
            }
            Err(e) => {
                debug!("OCR pass failed ({}): {:#}", strategy, e);
                None
            }
        }
    }

    fn prepare_gray(&self, region: &RgbaImage) -> GrayImage {
        let gray = imageops::grayscale(region);
        let factor = self.config.upscale.max(1);
        if factor == 1 {
            return gray;
        }
        imageops::resize(
            &gray,
            gray.width() * factor,
            gray.height() * factor,
            imageops::FilterType::CatmullRom,
        )
    }

    fn fuzzy_fallback(&self, gray: &GrayImage, expected: &Coordinate) -> Option<Coordinate> {
        let tolerance = self.config.fuzzy_tolerance;
        let range = &self.config.coordinate_range;
        let near = |c: &Coordinate| range.is_valid(c) && c.max_axis_delta(expected) <= tolerance;

        for psm in [PageSegMode::Block, PageSegMode::SingleLine] {
            let request = OcrRequest::unrestricted(psm);
            let Some(text) = self.recognize(gray, &request, FUZZY_STRATEGY) else {
                continue;
            };

            for reading in corrected_readings(&text) {
                let found = self
                    .parser
                    .candidates(&reading, self.config.default_z)
                    .into_iter()
                    .find(|c| near(c))
                    .or_else(|| {
                        self.parser
                            .nearest_pair(&reading, expected, tolerance, self.config.default_z)
                            .filter(|c| near(c))
                    });
                if found.is_some() {
                    debug!("Fuzzy reading '{}' -> '{}'", text, reading);
                    return found;
                }
            }
        }
        None
    }

    fn save_debug(&self, strategy: &str, raw: &RgbaImage, processed: &GrayImage) {
        if !self.config.debug_images {
            return;
        }
        let Some(dir) = &self.debug_dir else {
            return;
        };
        let timestamp = Local::now().format("%Y%m%d_%H%M%S%3f");
        let result = std::fs::create_dir_all(dir)
            .map_err(anyhow::Error::from)
            .and_then(|_| {
                raw.save(dir.join(format!("coord_raw_{}.png", timestamp)))?;
                processed.save(dir.join(format!("coord_{}_{}.png", strategy, timestamp)))?;
                Ok(())
            });
        if let Err(e) = result {
            warn!("Failed to save OCR debug images: {:#}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::testing::{render_text, FailingOcr, GlyphOcr, ScriptedOcr};

    const SCALE: u32 = 3;
    const MARGIN: u32 = 6;

    fn extractor(engine: Arc<dyn OcrEngine>) -> CoordinateExtractor {
        CoordinateExtractor::new(engine, OcrConfig::default()).unwrap()
    }

    fn glyph_engine(upscale: u32) -> Arc<dyn OcrEngine> {
        Arc::new(GlyphOcr {
            pixel: SCALE * upscale,
            margin: MARGIN * upscale,
        })
    }

    #[test]
    fn test_gate() {
        let ex = extractor(Arc::new(FailingOcr));
        assert!(!ex.passes_gate(&Coordinate::new(500, 500, 6), None));
        assert!(ex.passes_gate(&Coordinate::new(9999, 9999, 6), None));
        assert!(!ex.passes_gate(&Coordinate::new(3958, 3644, 21), None));

        let expected = Coordinate::new(3958, 3644, 6);
        assert!(ex.passes_gate(&Coordinate::new(4058, 3544, 6), Some(&expected)));
        assert!(!ex.passes_gate(&Coordinate::new(4059, 3644, 6), Some(&expected)));
    }

    #[test]
    fn test_reads_rendered_coordinates() {
        let img = render_text("(3958,3644,6)", SCALE, MARGIN);
        let ex = extractor(glyph_engine(2));
        let result = ex.extract(&img, None).unwrap();
        assert_eq!(result.coordinate, Coordinate::new(3958, 3644, 6));
        assert_eq!(result.strategy, "grayscale");
    }

    #[test]
    fn test_some_strategy_reads_rendered_text_without_upscale() {
        let img = render_text("(3958,3644,6)", SCALE, MARGIN);
        let gray = imageops::grayscale(&img);
        let engine = glyph_engine(1);
        let parser = CoordinateParser::new().unwrap();
        let expected = Coordinate::new(3958, 3644, 6);

        let readers: Vec<&str> = default_strategies()
            .iter()
            .filter(|s| {
                s.prepare(&gray).iter().any(|variant| {
                    s.passes().iter().any(|req| {
                        engine
                            .recognize(variant, req)
                            .ok()
                            .and_then(|text| parser.parse(&text, 6))
                            == Some(expected)
                    })
                })
            })
            .map(|s| s.name())
            .collect();
        assert!(readers.contains(&"grayscale"), "readers: {:?}", readers);
    }

    #[test]
    fn test_extraction_is_idempotent() {
        let img = render_text("(4120,1875,3)", SCALE, MARGIN);
        let ex = extractor(glyph_engine(2));
        let first = ex.extract(&img, None);
        let second = ex.extract(&img, None);
        assert_eq!(first, second);
        assert_eq!(first.unwrap().coordinate, Coordinate::new(4120, 1875, 3));
    }

    #[test]
    fn test_expected_rejects_distant_reading() {
        let img = render_text("(3958,3644,6)", SCALE, MARGIN);
        let ex = extractor(glyph_engine(2));
        let far = Coordinate::new(5000, 5000, 6);
        assert_eq!(ex.extract(&img, Some(&far)), None);
    }

    #[test]
    fn test_out_of_range_text_is_rejected() {
        let ocr = Arc::new(ScriptedOcr::always("(0500,0500,6)"));
        let ex = extractor(ocr);
        assert_eq!(ex.extract(&RgbaImage::new(30, 10), None), None);
    }

    #[test]
    fn test_fuzzy_fallback_corrects_lookalikes() {
        // Letters break every restricted parse, correction recovers the digits
        let ocr = Arc::new(ScriptedOcr::always("(395B,36A4,G)"));
        let ex = extractor(ocr);
        let expected = Coordinate::new(3958, 3644, 6);
        let result = ex.extract(&RgbaImage::new(30, 10), Some(&expected)).unwrap();
        assert_eq!(result.strategy, FUZZY_STRATEGY);
        assert_eq!(result.coordinate, Coordinate::new(3958, 3644, 6));
    }

    #[test]
    fn test_fuzzy_fallback_b_as_three() {
        let ocr = Arc::new(ScriptedOcr::always("(39S8,B644,6)"));
        let ex = extractor(ocr);
        let expected = Coordinate::new(3958, 3644, 6);
        let result = ex.extract(&RgbaImage::new(30, 10), Some(&expected)).unwrap();
        assert_eq!(result.coordinate, Coordinate::new(3958, 3644, 6));
        assert_eq!(result.strategy, FUZZY_STRATEGY);
    }

    #[test]
    fn test_fuzzy_requires_expected() {
        let ocr = Arc::new(ScriptedOcr::always("(39S8,B644,6)"));
        let ex = extractor(ocr);
        assert_eq!(ex.extract(&RgbaImage::new(30, 10), None), None);
    }

    #[test]
    fn test_fuzzy_nearest_pair() {
        // After correction the first two groups are (1024,3961); the closest
        // consecutive pair to the expected position is (3961,3640)
        let ocr = Arc::new(ScriptedOcr::always("1O24 3961 364O"));
        let ex = extractor(ocr);
        let expected = Coordinate::new(3958, 3644, 6);
        let result = ex.extract(&RgbaImage::new(30, 10), Some(&expected)).unwrap();
        assert_eq!(result.strategy, FUZZY_STRATEGY);
        assert_eq!(result.coordinate, Coordinate::new(3961, 3640, 6));
    }

    #[test]
    fn test_engine_failures_yield_none() {
        let ex = extractor(Arc::new(FailingOcr));
        let expected = Coordinate::new(3958, 3644, 6);
        assert_eq!(ex.extract(&RgbaImage::new(30, 10), Some(&expected)), None);
    }

    #[test]
    fn test_debug_images_written() {
        let dir = tempfile::tempdir().unwrap();
        let config = OcrConfig {
            debug_images: true,
            ..OcrConfig::default()
        };
        let ex = CoordinateExtractor::new(glyph_engine(2), config)
            .unwrap()
            .with_debug_dir(dir.path().to_path_buf());
        let img = render_text("(3958,3644,6)", SCALE, MARGIN);
        assert!(ex.extract(&img, None).is_some());

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert!(names.iter().any(|n| n.starts_with("coord_grayscale_")));
        assert!(names.iter().any(|n| n.starts_with("coord_raw_")));
    }
}
