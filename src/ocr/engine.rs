use anyhow::{anyhow, Context, Result};
use image::GrayImage;
use std::path::PathBuf;
use std::process::Command;
use tempfile::NamedTempFile;
use tracing::debug;

use super::setup::TesseractPaths;

/// Characters the coordinate overlay can contain.
pub const COORDINATE_WHITELIST: &str = "0123456789,():[]";

/// Tesseract page segmentation modes used for coordinate text.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PageSegMode {
    /// Single uniform block of text (6)
    Block,
    /// Single text line (7)
    SingleLine,
    /// Single word (8)
    SingleWord,
    /// Raw line, bypassing Tesseract-specific hacks (13)
    RawLine,
}

impl PageSegMode {
    pub fn as_arg(self) -> &'static str {
        match self {
            PageSegMode::Block => "6",
            PageSegMode::SingleLine => "7",
            PageSegMode::SingleWord => "8",
            PageSegMode::RawLine => "13",
        }
    }
}

/// Parameters for one recognition pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OcrRequest {
    /// Restricts output to these characters when set
    pub whitelist: Option<&'static str>,
    pub psm: PageSegMode,
}

impl OcrRequest {
    /// A pass restricted to coordinate characters.
    pub fn restricted(psm: PageSegMode) -> Self {
        Self {
            whitelist: Some(COORDINATE_WHITELIST),
            psm,
        }
    }

    /// A pass with the full character set.
    pub fn unrestricted(psm: PageSegMode) -> Self {
        Self {
            whitelist: None,
            psm,
        }
    }
}

/// Turns an image into text.
pub trait OcrEngine: Send + Sync {
    fn recognize(&self, img: &GrayImage, request: &OcrRequest) -> Result<String>;
}

/// Runs the `tesseract` executable on a temporary PNG and reads stdout.
#[derive(Debug, Clone)]
pub struct TesseractEngine {
    executable: PathBuf,
    tessdata: Option<PathBuf>,
}

impl TesseractEngine {
    pub fn new(paths: TesseractPaths) -> Self {
        Self {
            executable: paths.executable,
            tessdata: paths.tessdata,
        }
    }
}

impl OcrEngine for TesseractEngine {
    fn recognize(&self, img: &GrayImage, request: &OcrRequest) -> Result<String> {
        // Save image to temporary file
        let temp_input = NamedTempFile::with_suffix(".png")
            .context("Failed to create temporary OCR input")?;
        img.save(temp_input.path())
            .context("Failed to write temporary OCR input")?;

        let mut cmd = Command::new(&self.executable);
        cmd.arg(temp_input.path()).arg("stdout");
        if let Some(tessdata) = &self.tessdata {
            cmd.arg("--tessdata-dir").arg(tessdata);
        }
        cmd.arg("-l").arg("eng").arg("--psm").arg(request.psm.as_arg());
        if let Some(whitelist) = request.whitelist {
            cmd.arg("-c")
                .arg(format!("tessedit_char_whitelist={}", whitelist));
        }

        let output = cmd
            .output()
            .with_context(|| format!("Failed to run {}", self.executable.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("Tesseract failed: {}", stderr.trim()));
        }

        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        debug!("tesseract psm {} -> '{}'", request.psm.as_arg(), text);
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_psm_args() {
        assert_eq!(PageSegMode::Block.as_arg(), "6");
        assert_eq!(PageSegMode::SingleLine.as_arg(), "7");
        assert_eq!(PageSegMode::SingleWord.as_arg(), "8");
        assert_eq!(PageSegMode::RawLine.as_arg(), "13");
    }

    #[test]
    fn test_request_constructors() {
        let r = OcrRequest::restricted(PageSegMode::SingleLine);
        assert_eq!(r.whitelist, Some(COORDINATE_WHITELIST));
        assert_eq!(OcrRequest::unrestricted(PageSegMode::Block).whitelist, None);
    }

    #[test]
    fn test_missing_executable_is_an_error() {
        let engine = TesseractEngine::new(TesseractPaths {
            executable: PathBuf::from("/nonexistent/tesseract-binary"),
            tessdata: None,
        });
        let img = GrayImage::new(4, 4);
        let err = engine
            .recognize(&img, &OcrRequest::restricted(PageSegMode::Block))
            .unwrap_err();
        assert!(err.to_string().contains("Failed to run"));
    }
}
