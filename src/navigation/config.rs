//! Configuration types for navigation.
//!
//! Loads settings from config.json at startup. Provides screen regions, the
//! step list, matching thresholds, OCR tuning and timing parameters.
//! Every field has a serde default so partial files load.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::capture::ScreenRegion;
use crate::coordinate::CoordinateRange;

/// A step as persisted in config.json.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepDefinition {
    pub id: u32,
    #[serde(default)]
    pub name: String,
    /// Template image file, relative paths resolve against the icons directory
    #[serde(default)]
    pub icon_path: Option<String>,
    /// Expected position after the step, e.g. "(3958,3644,6)"
    #[serde(default)]
    pub target_coordinate: Option<String>,
    #[serde(default = "default_wait_seconds")]
    pub wait_seconds: f64,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl StepDefinition {
    pub fn new(id: u32, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id,
            name: if name.is_empty() {
                format!("Step {}", id)
            } else {
                name
            },
            icon_path: None,
            target_coordinate: None,
            wait_seconds: default_wait_seconds(),
            enabled: true,
        }
    }
}

/// Template matching thresholds (0.0 to 1.0).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// Used while executing steps
    #[serde(default = "default_execute_threshold")]
    pub execute_threshold: f32,
    /// Used for one-shot detection previews
    #[serde(default = "default_preview_threshold")]
    pub preview_threshold: f32,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            execute_threshold: default_execute_threshold(),
            preview_threshold: default_preview_threshold(),
        }
    }
}

/// Coordinate OCR tuning.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OcrConfig {
    /// Integer upscale factor applied before OCR (1 disables)
    #[serde(default = "default_upscale")]
    pub upscale: u32,
    /// Max per-axis difference from the expected position a reading may have
    #[serde(default = "default_expected_max_deviation")]
    pub expected_max_deviation: i32,
    /// Max per-axis difference for readings recovered by fuzzy correction
    #[serde(default = "default_fuzzy_tolerance")]
    pub fuzzy_tolerance: i32,
    /// z assumed when only x and y could be read
    #[serde(default = "default_z")]
    pub default_z: i32,
    #[serde(default)]
    pub coordinate_range: CoordinateRange,
    /// Explicit Tesseract executable, skips discovery
    #[serde(default)]
    pub tesseract_path: Option<PathBuf>,
    /// Save preprocessed images to the debug directory
    #[serde(default)]
    pub debug_images: bool,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            upscale: default_upscale(),
            expected_max_deviation: default_expected_max_deviation(),
            fuzzy_tolerance: default_fuzzy_tolerance(),
            default_z: default_z(),
            coordinate_range: CoordinateRange::default(),
            tesseract_path: None,
            debug_images: false,
        }
    }
}

/// Delays in milliseconds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimingConfig {
    /// After the icon was not found
    #[serde(default = "default_locate_retry_delay")]
    pub locate_retry_delay: u64,
    /// After validation failed, before retrying the whole step
    #[serde(default = "default_validation_retry_delay")]
    pub validation_retry_delay: u64,
    /// Between coordinate reads within one validation
    #[serde(default = "default_validation_attempt_delay")]
    pub validation_attempt_delay: u64,
    /// Between steps of a pass
    #[serde(default = "default_between_steps")]
    pub between_steps: u64,
    /// After a successful pass, before restarting
    #[serde(default = "default_pass_cooldown")]
    pub pass_cooldown: u64,
    /// After a failed pass, before restarting
    #[serde(default = "default_failure_cooldown")]
    pub failure_cooldown: u64,
    /// After a click, before moving the pointer away
    #[serde(default = "default_click_settle")]
    pub click_settle: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            locate_retry_delay: default_locate_retry_delay(),
            validation_retry_delay: default_validation_retry_delay(),
            validation_attempt_delay: default_validation_attempt_delay(),
            between_steps: default_between_steps(),
            pass_cooldown: default_pass_cooldown(),
            failure_cooldown: default_failure_cooldown(),
            click_settle: default_click_settle(),
        }
    }
}

/// Converts a millisecond config value.
pub fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

/// Whether the navigator restarts after a completed pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopMode {
    #[default]
    Continuous,
    SinglePass,
}

/// Complete navigation configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NavigationConfig {
    /// Screen rectangle containing the minimap
    #[serde(default)]
    pub minimap_region: Option<ScreenRegion>,
    /// Screen rectangle where the position text is rendered
    #[serde(default)]
    pub coordinate_region: Option<ScreenRegion>,
    #[serde(default = "default_true")]
    pub coordinate_validation_enabled: bool,
    /// Max distance between target and read position for a step to pass
    #[serde(default = "default_coordinate_tolerance")]
    pub coordinate_tolerance: f64,
    #[serde(default)]
    pub steps: Vec<StepDefinition>,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    /// Retries after the first attempt of a step
    #[serde(default = "default_step_retries")]
    pub step_retries: u32,
    /// Coordinate reads per validation
    #[serde(default = "default_validation_attempts")]
    pub validation_attempts: u32,
    /// Move the pointer away after clicking so it does not hide the minimap
    #[serde(default = "default_true")]
    pub recenter_pointer: bool,
    /// Where to move the pointer; screen center when unset
    #[serde(default)]
    pub neutral_point: Option<(i32, i32)>,
    #[serde(default)]
    pub loop_mode: LoopMode,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            minimap_region: None,
            coordinate_region: None,
            coordinate_validation_enabled: true,
            coordinate_tolerance: default_coordinate_tolerance(),
            steps: Vec::new(),
            matching: MatchingConfig::default(),
            ocr: OcrConfig::default(),
            timing: TimingConfig::default(),
            step_retries: default_step_retries(),
            validation_attempts: default_validation_attempts(),
            recenter_pointer: true,
            neutral_point: None,
            loop_mode: LoopMode::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

pub(crate) fn default_wait_seconds() -> f64 {
    3.0
}

fn default_execute_threshold() -> f32 {
    0.7
}

fn default_preview_threshold() -> f32 {
    0.6
}

fn default_upscale() -> u32 {
    2
}

fn default_expected_max_deviation() -> i32 {
    100
}

fn default_fuzzy_tolerance() -> i32 {
    50
}

fn default_z() -> i32 {
    6
}

fn default_coordinate_tolerance() -> f64 {
    10.0
}

fn default_step_retries() -> u32 {
    2
}

fn default_validation_attempts() -> u32 {
    5
}

fn default_locate_retry_delay() -> u64 {
    1000
}

fn default_validation_retry_delay() -> u64 {
    2000
}

fn default_validation_attempt_delay() -> u64 {
    500
}

fn default_between_steps() -> u64 {
    1000
}

fn default_pass_cooldown() -> u64 {
    1000
}

fn default_failure_cooldown() -> u64 {
    5000
}

fn default_click_settle() -> u64 {
    100
}

/// Loads configuration from `path` or returns defaults.
///
/// A missing or unreadable file is logged and never fatal.
pub fn load_config(path: &Path) -> NavigationConfig {
    info!("Looking for config at: {}", path.display());

    if !path.exists() {
        info!("{} not found. Using default config.", path.display());
        return NavigationConfig::default();
    }

    match fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(config) => {
                info!("Config loaded from {}", path.display());
                config
            }
            Err(e) => {
                warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                NavigationConfig::default()
            }
        },
        Err(e) => {
            warn!("Failed to read {}: {}. Using defaults.", path.display(), e);
            NavigationConfig::default()
        }
    }
}

/// Writes the configuration as pretty JSON.
pub fn save_config(config: &NavigationConfig, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(config).context("Failed to serialize config")?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Config saved to {}", path.display());
    Ok(())
}
