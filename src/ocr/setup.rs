use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::paths::get_tesseract_dir;

#[cfg(windows)]
const EXECUTABLE_NAME: &str = "tesseract.exe";
#[cfg(not(windows))]
const EXECUTABLE_NAME: &str = "tesseract";

#[cfg(windows)]
const COMMON_INSTALL_DIRS: &[&str] = &[
    r"C:\Program Files\Tesseract-OCR",
    r"C:\Program Files (x86)\Tesseract-OCR",
];
#[cfg(not(windows))]
const COMMON_INSTALL_DIRS: &[&str] = &["/usr/local/bin", "/usr/bin", "/opt/homebrew/bin"];

#[derive(Debug, Clone)]
pub struct TesseractPaths {
    pub executable: PathBuf,
    /// None lets Tesseract use its compiled-in default
    pub tessdata: Option<PathBuf>,
}

/// Locates Tesseract, preferring an explicit override from config.
pub fn locate_tesseract(override_path: Option<&Path>) -> Result<TesseractPaths> {
    let executable = match override_path {
        Some(path) if path.exists() => path.to_path_buf(),
        Some(path) => {
            return Err(anyhow!(
                "Configured Tesseract path does not exist: {}",
                path.display()
            ));
        }
        None => find_tesseract_executable()?,
    };
    let tessdata = find_tessdata_dir();

    info!("Using Tesseract at {}", executable.display());
    if let Some(dir) = &tessdata {
        debug!("Using tessdata at {}", dir.display());
    }

    Ok(TesseractPaths {
        executable,
        tessdata,
    })
}

/// Finds the Tesseract executable, checking our local dir first, then system
pub fn find_tesseract_executable() -> Result<PathBuf> {
    let local_exe = get_tesseract_dir().join(EXECUTABLE_NAME);
    if local_exe.exists() {
        return Ok(local_exe);
    }

    // Check PATH
    if let Ok(output) = std::process::Command::new("tesseract")
        .arg("--version")
        .output()
    {
        if output.status.success() {
            return Ok(PathBuf::from("tesseract"));
        }
    }

    // Check common paths
    for dir in COMMON_INSTALL_DIRS {
        let p = Path::new(dir).join(EXECUTABLE_NAME);
        if p.exists() {
            return Ok(p);
        }
    }

    Err(anyhow!(
        "Tesseract not found. Install Tesseract-OCR, add it to PATH, copy it to {} \
         or set ocr.tesseract_path in config.json",
        get_tesseract_dir().display()
    ))
}

/// Finds a tessdata directory containing `eng.traineddata`.
pub fn find_tessdata_dir() -> Option<PathBuf> {
    let local_tessdata = get_tesseract_dir().join("tessdata");
    if has_eng_data(&local_tessdata) {
        return Some(local_tessdata);
    }

    // Check TESSDATA_PREFIX environment variable
    if let Ok(prefix) = std::env::var("TESSDATA_PREFIX") {
        let p = PathBuf::from(&prefix);
        if has_eng_data(&p) {
            return Some(p);
        }
        let p = p.join("tessdata");
        if has_eng_data(&p) {
            return Some(p);
        }
    }

    COMMON_INSTALL_DIRS
        .iter()
        .map(|dir| Path::new(dir).join("tessdata"))
        .find(|p| has_eng_data(p))
}

fn has_eng_data(dir: &Path) -> bool {
    dir.join("eng.traineddata").exists()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_must_exist() {
        let err = locate_tesseract(Some(Path::new("/definitely/not/here/tesseract"))).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_override_is_used() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let paths = locate_tesseract(Some(file.path())).unwrap();
        assert_eq!(paths.executable, file.path());
    }

    #[test]
    fn test_has_eng_data() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!has_eng_data(dir.path()));
        std::fs::write(dir.path().join("eng.traineddata"), b"").unwrap();
        assert!(has_eng_data(dir.path()));
    }
}
