//! Confirms arrival after a step by reading the on-screen position.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::config::{ms, NavigationConfig};
use super::step::NavigationStep;
use crate::capture::{ScreenCapture, ScreenRegion};
use crate::coordinate::Coordinate;
use crate::error::{NavError, NavResult};
use crate::ocr::{CoordinateExtractor, Extraction};

/// Outcome of a position check.
#[derive(Clone, Debug, PartialEq)]
pub struct ValidationResult {
    pub success: bool,
    /// Distance between the last reading and the target, if both were known
    pub distance: Option<f64>,
    /// Readings taken; 0 when validation was skipped
    pub attempts: u32,
    pub last_seen: Option<Coordinate>,
}

impl ValidationResult {
    /// Success without reading anything.
    pub fn skipped() -> Self {
        Self {
            success: true,
            distance: None,
            attempts: 0,
            last_seen: None,
        }
    }
}

/// Compares a reading to a target on the (x, y) plane.
pub fn check_distance(current: &Coordinate, target: &Coordinate, tolerance: f64) -> ValidationResult {
    let distance = current.distance_to(target);
    ValidationResult {
        success: distance <= tolerance,
        distance: Some(distance),
        attempts: 1,
        last_seen: Some(*current),
    }
}

pub struct StepValidator {
    capture: Arc<dyn ScreenCapture>,
    extractor: Arc<CoordinateExtractor>,
    region: Option<ScreenRegion>,
    enabled: bool,
    tolerance: f64,
    attempts: u32,
    attempt_delay: Duration,
}

impl StepValidator {
    pub fn new(
        capture: Arc<dyn ScreenCapture>,
        extractor: Arc<CoordinateExtractor>,
        config: &NavigationConfig,
    ) -> Self {
        Self {
            capture,
            extractor,
            region: config.coordinate_region.filter(|r| !r.is_empty()),
            enabled: config.coordinate_validation_enabled,
            tolerance: config.coordinate_tolerance,
            attempts: config.validation_attempts.max(1),
            attempt_delay: ms(config.timing.validation_attempt_delay),
        }
    }

    /// Checks whether the player arrived at the step's target.
    ///
    /// Disabled validation, a step without target, an unparseable target or
    /// a missing coordinate region all count as success. The stop flag is
    /// checked between attempts.
    pub fn validate(&self, step: &NavigationStep, stop: &AtomicBool) -> ValidationResult {
        if !self.enabled {
            return ValidationResult::skipped();
        }
        let Some(target_text) = &step.target_coordinate else {
            return ValidationResult::skipped();
        };
        let parser = self.extractor.parser();
        let Some(target) = parser.parse(target_text, self.extractor.config().default_z) else {
            warn!(
                "Target '{}' of {} is not a coordinate, skipping validation",
                target_text, step
            );
            return ValidationResult::skipped();
        };
        let Some(region) = &self.region else {
            warn!(
                "Coordinate region not configured, skipping validation for {}",
                step
            );
            return ValidationResult::skipped();
        };

        let mut result = ValidationResult {
            success: false,
            distance: None,
            attempts: 0,
            last_seen: None,
        };

        for attempt in 1..=self.attempts {
            if attempt > 1 {
                if stop.load(Ordering::SeqCst) {
                    debug!("Stop requested during validation of {}", step);
                    break;
                }
                std::thread::sleep(self.attempt_delay);
            }
            result.attempts = attempt;

            let Some(reading) = self.read_region(region, Some(&target)) else {
                debug!("Attempt {}: no coordinate reading for {}", attempt, step);
                continue;
            };

            let check = check_distance(&reading.coordinate, &target, self.tolerance);
            result.distance = check.distance;
            result.last_seen = check.last_seen;
            if check.success {
                info!(
                    "{} reached {} (target {}, distance {:.1}, attempt {})",
                    step,
                    reading.coordinate,
                    target,
                    check.distance.unwrap_or_default(),
                    attempt
                );
                result.success = true;
                return result;
            }
            debug!(
                "Attempt {}: {} is {:.1} from target {}",
                attempt,
                reading.coordinate,
                check.distance.unwrap_or_default(),
                target
            );
        }

        warn!(
            "{} did not reach {} after {} attempt(s), last seen {:?}",
            step, target, result.attempts, result.last_seen
        );
        result
    }

    /// One reading of the coordinate region.
    pub fn read_current(&self, expected: Option<&Coordinate>) -> NavResult<Option<Extraction>> {
        let region = self
            .region
            .as_ref()
            .ok_or_else(|| NavError::configuration("coordinate region is not configured"))?;
        let image = self
            .capture
            .capture_region(region)
            .map_err(NavError::capture)?;
        Ok(self.extractor.extract(&image, expected))
    }

    fn read_region(&self, region: &ScreenRegion, expected: Option<&Coordinate>) -> Option<Extraction> {
        match self.capture.capture_region(region) {
            Ok(image) => self.extractor.extract(&image, expected),
            Err(e) => {
                warn!("Failed to capture coordinate region: {:#}", e);
                None
            }
        }
    }
}
