//! Persistence of step icon templates.
//!
//! Icons are PNG files named `step_<id>_<timestamp>.png` in one directory.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use image::RgbaImage;
use tracing::{debug, info, warn};

use crate::capture::{ScreenCapture, ScreenRegion};
use crate::error::{NavError, NavResult};

const ICON_PREFIX: &str = "step_";

/// Details about a stored icon.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IconInfo {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub file_size: u64,
}

#[derive(Clone, Debug)]
pub struct IconService {
    dir: PathBuf,
}

impl IconService {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes a new icon for the step and returns its path.
    pub fn save_step_icon(&self, step_id: u32, icon: &RgbaImage) -> NavResult<PathBuf> {
        if icon.width() == 0 || icon.height() == 0 {
            return Err(NavError::Capture("icon image is empty".to_string()));
        }
        fs::create_dir_all(&self.dir)?;
        let timestamp = Local::now().format("%Y%m%d_%H%M%S%3f");
        let path = self
            .dir
            .join(format!("{}{}_{}.png", ICON_PREFIX, step_id, timestamp));
        icon.save(&path)?;
        info!(
            "Saved icon for step {} ({}x{}) to {}",
            step_id,
            icon.width(),
            icon.height(),
            path.display()
        );
        Ok(path)
    }

    /// Captures `region` from the screen and saves it as the step's icon.
    pub fn capture_step_icon(
        &self,
        capture: &dyn ScreenCapture,
        step_id: u32,
        region: &ScreenRegion,
    ) -> NavResult<(PathBuf, RgbaImage)> {
        let icon = capture.capture_region(region).map_err(NavError::capture)?;
        let path = self.save_step_icon(step_id, &icon)?;
        Ok((path, icon))
    }

    /// Deletes an icon file. Returns false if it did not exist.
    pub fn delete_icon(&self, path: &Path) -> NavResult<bool> {
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(path)?;
        debug!("Deleted icon {}", path.display());
        Ok(true)
    }

    /// Removes `step_*.png` files not referenced by any step.
    pub fn cleanup_unused(&self, in_use: &[PathBuf]) -> NavResult<Vec<PathBuf>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut removed = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let is_icon = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(ICON_PREFIX) && n.ends_with(".png"));
            if !is_icon || in_use.iter().any(|p| p == &path) {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => removed.push(path),
                Err(e) => warn!("Failed to remove unused icon {}: {}", path.display(), e),
            }
        }

        if !removed.is_empty() {
            info!("Removed {} unused icon(s)", removed.len());
        }
        Ok(removed)
    }

    /// Reads dimensions and file size of an icon.
    pub fn icon_info(&self, path: &Path) -> NavResult<IconInfo> {
        let file_size = fs::metadata(path)?.len();
        let (width, height) = image::image_dimensions(path)?;
        Ok(IconInfo {
            path: path.to_path_buf(),
            width,
            height,
            file_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn icon() -> RgbaImage {
        RgbaImage::from_fn(6, 4, |x, y| Rgba([x as u8 * 40, y as u8 * 60, 90, 255]))
    }

    #[test]
    fn test_save_and_info() {
        let dir = tempfile::tempdir().unwrap();
        let service = IconService::new(dir.path().join("icons"));
        let path = service.save_step_icon(7, &icon()).unwrap();

        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("step_7_"));
        assert!(name.ends_with(".png"));

        let info = service.icon_info(&path).unwrap();
        assert_eq!((info.width, info.height), (6, 4));
        assert!(info.file_size > 0);
    }

    #[test]
    fn test_save_rejects_empty_icon() {
        let dir = tempfile::tempdir().unwrap();
        let service = IconService::new(dir.path());
        assert!(service.save_step_icon(1, &RgbaImage::new(0, 0)).is_err());
    }

    #[test]
    fn test_delete_icon() {
        let dir = tempfile::tempdir().unwrap();
        let service = IconService::new(dir.path());
        let path = service.save_step_icon(1, &icon()).unwrap();
        assert!(service.delete_icon(&path).unwrap());
        assert!(!path.exists());
        assert!(!service.delete_icon(&path).unwrap());
    }

    #[test]
    fn test_cleanup_unused_keeps_referenced_and_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let service = IconService::new(dir.path());
        let keep = service.save_step_icon(1, &icon()).unwrap();
        let orphan = dir.path().join("step_9_old.png");
        icon().save(&orphan).unwrap();
        let foreign = dir.path().join("notes.txt");
        fs::write(&foreign, "x").unwrap();

        let removed = service.cleanup_unused(&[keep.clone()]).unwrap();
        assert_eq!(removed, vec![orphan.clone()]);
        assert!(keep.exists());
        assert!(foreign.exists());
        assert!(!orphan.exists());
    }

    #[test]
    fn test_cleanup_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let service = IconService::new(dir.path().join("nope"));
        assert!(service.cleanup_unused(&[]).unwrap().is_empty());
    }
}
