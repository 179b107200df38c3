//! Navigation runner - owns the step collection and the worker thread.
//!
//! `Navigator` is the control surface: it validates preconditions, snapshots
//! the ready steps and spawns the loop. `NavigationEngine` runs the loop on
//! the worker thread and executes individual steps.

use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::Result;
use image::RgbaImage;
use tracing::{debug, error, info, warn};

use super::config::{ms, LoopMode, NavigationConfig, StepDefinition};
use super::icons::IconService;
use super::input::InputController;
use super::matcher::{MatchResult, TemplateMatcher};
use super::state::{EventSink, NavEvent, NavigationPhase, NavigationStatus};
use super::step::NavigationStep;
use super::validator::StepValidator;
use crate::capture::{ScreenCapture, ScreenRegion};
use crate::coordinate::Coordinate;
use crate::error::{NavError, NavResult};
use crate::ocr::{CoordinateExtractor, Extraction, OcrEngine};

/// Granularity of interruptible sleeps.
const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// External services the engine drives.
#[derive(Clone)]
pub struct Collaborators {
    pub capture: Arc<dyn ScreenCapture>,
    pub input: Arc<dyn InputController>,
    pub ocr: Arc<dyn OcrEngine>,
    pub events: Arc<dyn EventSink>,
}

/// Flags and status shared between the caller and the worker.
#[derive(Default)]
struct RunState {
    running: AtomicBool,
    stop: AtomicBool,
    status: Mutex<NavigationStatus>,
}

enum PassOutcome {
    Completed,
    Aborted(String),
    Stopped,
}

/// Executes steps and passes. Lives on the worker thread during a run.
pub struct NavigationEngine {
    config: NavigationConfig,
    matcher: TemplateMatcher,
    validator: StepValidator,
    input: Arc<dyn InputController>,
    events: Arc<dyn EventSink>,
    state: RunState,
}

impl NavigationEngine {
    pub fn new(config: NavigationConfig, collaborators: Collaborators) -> Result<Self> {
        let mut extractor = CoordinateExtractor::new(collaborators.ocr, config.ocr.clone())?;
        let mut matcher = TemplateMatcher::new(Arc::clone(&collaborators.capture));
        if config.ocr.debug_images {
            let dir = crate::paths::get_debug_images_dir();
            extractor = extractor.with_debug_dir(dir.clone());
            matcher = matcher.with_debug_dir(dir);
        }
        let validator = StepValidator::new(
            Arc::clone(&collaborators.capture),
            Arc::new(extractor),
            &config,
        );

        Ok(Self {
            config,
            matcher,
            validator,
            input: collaborators.input,
            events: collaborators.events,
            state: RunState::default(),
        })
    }

    pub fn config(&self) -> &NavigationConfig {
        &self.config
    }

    pub fn status(&self) -> NavigationStatus {
        self.state
            .status
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    fn stop_requested(&self) -> bool {
        self.state.stop.load(Ordering::SeqCst)
    }

    fn update_status(&self, f: impl FnOnce(&mut NavigationStatus)) {
        if let Ok(mut status) = self.state.status.lock() {
            f(&mut status);
        }
    }

    fn set_phase(&self, phase: NavigationPhase) {
        self.update_status(|s| s.phase = phase);
    }

    /// Sleeps in slices. Returns false if a stop was requested meanwhile.
    fn sleep_interruptible(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.stop_requested() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep(SLEEP_SLICE.min(deadline - now));
        }
    }

    /// Runs passes over `steps` until stopped, or once in single-pass mode.
    pub fn run(&self, steps: &[NavigationStep]) {
        self.events.emit(NavEvent::Started { steps: steps.len() });
        let timing = &self.config.timing;
        let mut pass = 0;

        while !self.stop_requested() {
            pass += 1;
            self.update_status(|s| {
                s.pass_count = pass;
                s.phase = NavigationPhase::Running;
                s.current_step_index = None;
                s.current_step = None;
            });
            self.events.emit(NavEvent::PassStarted { pass });

            match self.run_pass(steps) {
                PassOutcome::Completed => {
                    self.set_phase(NavigationPhase::PassComplete);
                    self.events.emit(NavEvent::PassCompleted { pass });
                    if self.config.loop_mode == LoopMode::SinglePass {
                        break;
                    }
                    if !self.sleep_interruptible(ms(timing.pass_cooldown)) {
                        break;
                    }
                }
                PassOutcome::Aborted(step) => {
                    self.events.emit(NavEvent::PassAborted { pass, step });
                    if !self.sleep_interruptible(ms(timing.failure_cooldown)) {
                        break;
                    }
                }
                PassOutcome::Stopped => break,
            }
        }

        self.set_phase(NavigationPhase::Stopped);
        self.events.emit(NavEvent::Stopped);
    }

    fn run_pass(&self, steps: &[NavigationStep]) -> PassOutcome {
        for (index, step) in steps.iter().enumerate() {
            if self.stop_requested() {
                return PassOutcome::Stopped;
            }
            if index > 0 && !self.sleep_interruptible(ms(self.config.timing.between_steps)) {
                return PassOutcome::Stopped;
            }
            self.update_status(|s| {
                s.current_step_index = Some(index);
                s.current_step = Some(step.to_string());
            });

            if !self.execute_step(step) {
                if self.stop_requested() {
                    return PassOutcome::Stopped;
                }
                return PassOutcome::Aborted(step.to_string());
            }
        }
        PassOutcome::Completed
    }

    /// Locates, clicks and validates one step with retries.
    ///
    /// Returns false once every attempt failed or a stop was requested.
    pub fn execute_step(&self, step: &NavigationStep) -> bool {
        let timing = &self.config.timing;
        let attempts = self.config.step_retries + 1;

        for attempt in 1..=attempts {
            if attempt > 1 && self.stop_requested() {
                return false;
            }
            self.events.emit(NavEvent::StepStarted {
                step: step.to_string(),
                attempt,
                attempts,
            });

            self.set_phase(NavigationPhase::Locating);
            let Some(hit) = self.matcher.locate(
                step,
                self.config.minimap_region.as_ref(),
                self.config.matching.execute_threshold,
            ) else {
                self.events.emit(NavEvent::IconNotFound {
                    step: step.to_string(),
                    attempt,
                });
                if attempt < attempts {
                    self.sleep_interruptible(ms(timing.locate_retry_delay));
                }
                continue;
            };
            self.events.emit(NavEvent::IconFound {
                step: step.to_string(),
                x: hit.screen_x,
                y: hit.screen_y,
                confidence: hit.confidence,
            });

            self.set_phase(NavigationPhase::Clicking);
            if !self.click(step, &hit) {
                debug!(
                    "{}",
                    NavError::InputInjection(format!(
                        "click at ({}, {}) for {}",
                        hit.screen_x, hit.screen_y, step
                    ))
                );
                self.events.emit(NavEvent::ClickFailed {
                    step: step.to_string(),
                });
                continue;
            }

            self.set_phase(NavigationPhase::Waiting);
            thread::sleep(step.wait);

            self.set_phase(NavigationPhase::Validating);
            let result = self.validator.validate(step, &self.state.stop);
            if result.success {
                self.set_phase(NavigationPhase::StepSuccess);
                self.events.emit(NavEvent::StepSucceeded {
                    step: step.to_string(),
                });
                return true;
            }

            let reason = match (result.last_seen, result.distance) {
                (Some(seen), Some(distance)) => {
                    format!("read {} at distance {:.1}", seen, distance)
                }
                _ => "no coordinate reading".to_string(),
            };
            debug!("{}", NavError::validation(&step.name, reason));
            self.events.emit(NavEvent::ValidationFailed {
                step: step.to_string(),
                distance: result.distance,
            });
            if attempt < attempts {
                self.sleep_interruptible(ms(timing.validation_retry_delay));
            }
        }

        self.set_phase(NavigationPhase::StepFailure);
        self.events.emit(NavEvent::StepFailed {
            step: step.to_string(),
        });
        false
    }

    /// Clicks the match, retrying a failed injection once, then moves the
    /// pointer off the minimap.
    fn click(&self, step: &NavigationStep, hit: &MatchResult) -> bool {
        let settle = ms(self.config.timing.click_settle);
        if !self.input.click(hit.screen_x, hit.screen_y) {
            warn!(
                "Click on {} at ({}, {}) failed, retrying",
                step, hit.screen_x, hit.screen_y
            );
            thread::sleep(settle);
            if !self.input.click(hit.screen_x, hit.screen_y) {
                return false;
            }
        }

        if self.config.recenter_pointer {
            thread::sleep(settle);
            let (x, y) = self
                .config
                .neutral_point
                .unwrap_or_else(|| self.input.screen_center());
            if !self.input.move_to(x, y) {
                debug!("Failed to move pointer to ({}, {})", x, y);
            }
        }
        true
    }

    /// Marks the run as finished. Called by the worker on every exit path.
    fn finish(&self) {
        self.update_status(|s| *s = NavigationStatus::default());
        self.state.running.store(false, Ordering::SeqCst);
    }
}

/// Fields of a step that `update_step` can change. `None` leaves a field as is.
#[derive(Clone, Debug, Default)]
pub struct StepUpdate {
    pub name: Option<String>,
    /// `Some(None)` clears the target
    pub target_coordinate: Option<Option<String>>,
    pub wait: Option<Duration>,
}

/// Owns the steps and controls the navigation thread.
pub struct Navigator {
    engine: Arc<NavigationEngine>,
    capture: Arc<dyn ScreenCapture>,
    icons: IconService,
    steps: Mutex<Vec<NavigationStep>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Navigator {
    /// Builds the navigator, loading every configured step's template.
    pub fn new(
        config: NavigationConfig,
        collaborators: Collaborators,
        icons: IconService,
    ) -> Result<Self> {
        let steps = config
            .steps
            .iter()
            .map(|def| NavigationStep::from_definition(def, icons.dir()))
            .collect::<Vec<_>>();
        let ready = steps.iter().filter(|s| s.is_ready()).count();
        info!("Loaded {} steps ({} ready)", steps.len(), ready);

        let capture = Arc::clone(&collaborators.capture);
        Ok(Self {
            engine: Arc::new(NavigationEngine::new(config, collaborators)?),
            capture,
            icons,
            steps: Mutex::new(steps),
            worker: Mutex::new(None),
        })
    }

    pub fn engine(&self) -> &NavigationEngine {
        &self.engine
    }

    pub fn is_navigating(&self) -> bool {
        self.engine.state.running.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> NavigationStatus {
        let mut status = self.engine.status();
        status.is_navigating = self.is_navigating();
        status
    }

    /// Starts navigating on a background thread and returns immediately.
    pub fn start(&self) -> NavResult<()> {
        if self.engine.state.running.swap(true, Ordering::SeqCst) {
            return Err(NavError::AlreadyRunning);
        }

        let steps = match self.ready_snapshot() {
            Ok(steps) => steps,
            Err(e) => {
                self.engine.state.running.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };

        // Reap a previous worker that already finished
        if let Some(handle) = self.lock_worker().take() {
            let _ = handle.join();
        }

        self.engine.state.stop.store(false, Ordering::SeqCst);
        self.engine.update_status(|s| {
            *s = NavigationStatus {
                is_navigating: true,
                phase: NavigationPhase::Running,
                ..Default::default()
            }
        });
        info!("Starting navigation with {} ready steps", steps.len());

        let engine = Arc::clone(&self.engine);
        let spawned = thread::Builder::new()
            .name("navigation".to_string())
            .spawn(move || {
                let result = panic::catch_unwind(AssertUnwindSafe(|| engine.run(&steps)));
                if let Err(payload) = result {
                    let message = panic_message(payload.as_ref());
                    error!("Navigation thread panicked: {}", message);
                    engine.events.emit(NavEvent::Error { message });
                }
                engine.finish();
                info!("Navigation thread finished");
            });

        match spawned {
            Ok(handle) => {
                *self.lock_worker() = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.engine.finish();
                Err(NavError::Io(e))
            }
        }
    }

    /// Requests a stop and waits up to `timeout` for the worker to exit.
    ///
    /// Returns true if the worker is gone.
    pub fn stop(&self, timeout: Duration) -> bool {
        self.engine.state.stop.store(true, Ordering::SeqCst);
        let deadline = Instant::now() + timeout;
        while self.is_navigating() {
            if Instant::now() >= deadline {
                warn!("Navigation thread did not stop within {:?}", timeout);
                return false;
            }
            thread::sleep(Duration::from_millis(10));
        }
        if let Some(handle) = self.lock_worker().take() {
            let _ = handle.join();
        }
        true
    }

    /// Blocks until the current run ends on its own.
    pub fn wait(&self) {
        if let Some(handle) = self.lock_worker().take() {
            let _ = handle.join();
        }
    }

    fn ready_snapshot(&self) -> NavResult<Vec<NavigationStep>> {
        let steps = self.lock_steps();
        if steps.is_empty() {
            return Err(NavError::configuration("no navigation steps configured"));
        }
        if self
            .engine
            .config
            .minimap_region
            .is_none_or(|r| r.is_empty())
        {
            return Err(NavError::configuration("minimap region is not configured"));
        }
        let ready: Vec<_> = steps.iter().filter(|s| s.is_ready()).cloned().collect();
        if ready.is_empty() {
            return Err(NavError::configuration(
                "no step is enabled with a loaded icon",
            ));
        }
        Ok(ready)
    }

    fn lock_steps(&self) -> MutexGuard<'_, Vec<NavigationStep>> {
        self.steps.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_worker(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.worker.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Locks the steps for an edit, rejecting it while navigating.
    fn edit_steps(&self) -> NavResult<MutexGuard<'_, Vec<NavigationStep>>> {
        let steps = self.lock_steps();
        if self.is_navigating() {
            return Err(NavError::Busy);
        }
        Ok(steps)
    }

    pub fn steps(&self) -> Vec<NavigationStep> {
        self.lock_steps().clone()
    }

    pub fn step_definitions(&self) -> Vec<StepDefinition> {
        self.lock_steps()
            .iter()
            .map(|s| s.to_definition(self.icons.dir()))
            .collect()
    }

    /// The configuration with the current step list, ready to save.
    pub fn to_config(&self) -> NavigationConfig {
        NavigationConfig {
            steps: self.step_definitions(),
            ..self.engine.config.clone()
        }
    }

    /// Appends a step without icon. Returns its id.
    pub fn add_step(
        &self,
        name: &str,
        target_coordinate: Option<String>,
        wait: Duration,
    ) -> NavResult<u32> {
        let mut steps = self.edit_steps()?;
        let id = steps.iter().map(|s| s.id).max().unwrap_or(0) + 1;
        let mut def = StepDefinition::new(id, name);
        def.target_coordinate = target_coordinate;
        def.wait_seconds = wait.as_secs_f64();
        let step = NavigationStep::from_definition(&def, self.icons.dir());
        info!("Added {}", step);
        steps.push(step);
        Ok(id)
    }

    /// Removes a step and deletes its icon file.
    pub fn remove_step(&self, id: u32) -> NavResult<()> {
        let mut steps = self.edit_steps()?;
        let index = steps
            .iter()
            .position(|s| s.id == id)
            .ok_or(NavError::UnknownStep(id))?;
        let step = steps.remove(index);
        self.delete_step_icon(&step);
        info!("Removed {}", step);
        Ok(())
    }

    /// Removes every step and deletes their icons. Ids start over at 1.
    pub fn clear_steps(&self) -> NavResult<usize> {
        let mut steps = self.edit_steps()?;
        let removed = steps.len();
        for step in steps.drain(..) {
            self.delete_step_icon(&step);
        }
        info!("Cleared {} step(s)", removed);
        Ok(removed)
    }

    fn delete_step_icon(&self, step: &NavigationStep) {
        if let Some(path) = &step.icon_path {
            if let Err(e) = self.icons.delete_icon(path) {
                warn!("Failed to delete icon of {}: {}", step, e);
            }
        }
    }

    pub fn set_step_enabled(&self, id: u32, enabled: bool) -> NavResult<()> {
        let mut steps = self.edit_steps()?;
        let step = find_mut(&mut steps, id)?;
        step.active = enabled;
        debug!("{} {}", step, if enabled { "enabled" } else { "disabled" });
        Ok(())
    }

    pub fn update_step(&self, id: u32, update: StepUpdate) -> NavResult<()> {
        let mut steps = self.edit_steps()?;
        let step = find_mut(&mut steps, id)?;
        if let Some(name) = update.name {
            step.name = if name.is_empty() {
                format!("Step {}", id)
            } else {
                name
            };
        }
        if let Some(target) = update.target_coordinate {
            step.target_coordinate = target.filter(|t| !t.trim().is_empty());
        }
        if let Some(wait) = update.wait {
            step.wait = wait;
        }
        Ok(())
    }

    /// Saves `icon` as the step's template, replacing and deleting the old one.
    pub fn assign_icon(&self, id: u32, icon: &RgbaImage) -> NavResult<PathBuf> {
        let mut steps = self.edit_steps()?;
        let step = find_mut(&mut steps, id)?;
        let path = self.icons.save_step_icon(id, icon)?;
        self.replace_icon(step, path.clone(), icon.clone());
        Ok(path)
    }

    /// Captures `region` from the screen as the step's new template.
    pub fn capture_icon(&self, id: u32, region: &ScreenRegion) -> NavResult<PathBuf> {
        let mut steps = self.edit_steps()?;
        let step = find_mut(&mut steps, id)?;
        let (path, icon) = self
            .icons
            .capture_step_icon(self.capture.as_ref(), id, region)?;
        self.replace_icon(step, path.clone(), icon);
        Ok(path)
    }

    fn replace_icon(&self, step: &mut NavigationStep, path: PathBuf, icon: RgbaImage) {
        if let Some(old) = step.icon_path.replace(path) {
            if let Err(e) = self.icons.delete_icon(&old) {
                warn!("Failed to delete previous icon of {}: {}", step, e);
            }
        }
        step.template = Some(Arc::new(icon));
    }

    /// One-shot detection of a step icon at the preview threshold.
    pub fn preview(&self, id: u32) -> NavResult<String> {
        let step = self
            .lock_steps()
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or(NavError::UnknownStep(id))?;
        self.engine.matcher.preview(
            &step,
            self.engine.config.minimap_region.as_ref(),
            self.engine.config.matching.preview_threshold,
        )
    }

    /// Reads the coordinate region once.
    pub fn read_coordinates(&self, expected: Option<&Coordinate>) -> NavResult<Option<Extraction>> {
        self.engine.validator.read_current(expected)
    }

    /// Deletes icon files no step refers to.
    pub fn cleanup_unused_icons(&self) -> NavResult<Vec<PathBuf>> {
        let in_use: Vec<PathBuf> = self
            .lock_steps()
            .iter()
            .filter_map(|s| s.icon_path.clone())
            .collect();
        self.icons.cleanup_unused(&in_use)
    }
}

impl Drop for Navigator {
    fn drop(&mut self) {
        if self.is_navigating() {
            self.stop(Duration::from_secs(5));
        }
    }
}

fn find_mut(steps: &mut [NavigationStep], id: u32) -> NavResult<&mut NavigationStep> {
    steps
        .iter_mut()
        .find(|s| s.id == id)
        .ok_or(NavError::UnknownStep(id))
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
