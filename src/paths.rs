use std::path::PathBuf;
use std::sync::OnceLock;

static EXE_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Returns the directory containing the executable.
pub fn get_exe_dir() -> &'static PathBuf {
    EXE_DIR.get_or_init(|| {
        std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."))
    })
}

/// Returns the default config path: `<exe_dir>/config.json`
pub fn get_config_path() -> PathBuf {
    get_exe_dir().join("config.json")
}

/// Returns the logs directory: `<exe_dir>/logs/`
pub fn get_logs_dir() -> PathBuf {
    get_exe_dir().join("logs")
}

/// Returns the step icon directory: `<exe_dir>/assets/navigation_icons/`
pub fn get_icons_dir() -> PathBuf {
    get_exe_dir().join("assets").join("navigation_icons")
}

/// Returns the OCR debug image directory: `<exe_dir>/debug_images/`
pub fn get_debug_images_dir() -> PathBuf {
    get_exe_dir().join("debug_images")
}

/// Returns the directory for a locally installed Tesseract.
pub fn get_tesseract_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("minimap-navigator")
        .join("tesseract")
}

/// Ensures all output directories exist. Call at startup.
pub fn ensure_directories() -> std::io::Result<()> {
    std::fs::create_dir_all(get_logs_dir())?;
    std::fs::create_dir_all(get_icons_dir())?;
    std::fs::create_dir_all(get_debug_images_dir())?;
    Ok(())
}
