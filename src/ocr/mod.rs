//! Coordinate OCR.
//!
//! This module provides:
//! - The `OcrEngine` trait and the Tesseract CLI backend
//! - Tesseract discovery
//! - Preprocessing strategies and coordinate text parsing
//! - `CoordinateExtractor`, which chains them with fuzzy correction

pub mod engine;
pub mod extract;
pub mod parse;
pub mod preprocess;
pub mod setup;

#[cfg(test)]
pub mod testing;

pub use engine::{OcrEngine, OcrRequest, PageSegMode, TesseractEngine, COORDINATE_WHITELIST};
pub use extract::{CoordinateExtractor, Extraction};
pub use parse::CoordinateParser;
pub use preprocess::{default_strategies, PreprocessStrategy};
pub use setup::{locate_tesseract, TesseractPaths};
