use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use image::RgbaImage;
use tracing::{debug, warn};

use super::config::{default_wait_seconds, StepDefinition};

/// A navigation waypoint with its loaded icon template.
#[derive(Clone, Debug)]
pub struct NavigationStep {
    pub id: u32,
    pub name: String,
    pub icon_path: Option<PathBuf>,
    /// Shared with running passes, never mutated in place
    pub template: Option<Arc<RgbaImage>>,
    pub target_coordinate: Option<String>,
    pub wait: Duration,
    pub active: bool,
}

impl NavigationStep {
    /// Builds a step from its persisted form and tries to load the template.
    pub fn from_definition(def: &StepDefinition, icons_dir: &Path) -> Self {
        let mut step = Self {
            id: def.id,
            name: def.name.clone(),
            icon_path: def.icon_path.as_deref().map(|p| resolve_icon_path(p, icons_dir)),
            template: None,
            target_coordinate: def
                .target_coordinate
                .clone()
                .filter(|t| !t.trim().is_empty()),
            wait: step_wait(def),
            active: def.enabled,
        };
        step.load_template();
        step
    }

    /// The persisted form. Icons inside `icons_dir` are stored by file name.
    pub fn to_definition(&self, icons_dir: &Path) -> StepDefinition {
        StepDefinition {
            id: self.id,
            name: self.name.clone(),
            icon_path: self.icon_path.as_ref().map(|p| {
                p.strip_prefix(icons_dir)
                    .unwrap_or(p)
                    .to_string_lossy()
                    .to_string()
            }),
            target_coordinate: self.target_coordinate.clone(),
            wait_seconds: self.wait.as_secs_f64(),
            enabled: self.active,
        }
    }

    /// Loads the template from `icon_path`. Returns whether one is loaded.
    pub fn load_template(&mut self) -> bool {
        let Some(path) = &self.icon_path else {
            self.template = None;
            return false;
        };
        if !path.exists() {
            debug!("Template file does not exist for step {}: {}", self.id, path.display());
            self.template = None;
            return false;
        }
        match image::open(path) {
            Ok(img) => {
                self.template = Some(Arc::new(img.to_rgba8()));
                true
            }
            Err(e) => {
                warn!("Failed to load template for step {}: {}", self.id, e);
                self.template = None;
                false
            }
        }
    }

    /// Active with a loaded template.
    pub fn is_ready(&self) -> bool {
        self.active && self.template.is_some()
    }
}

impl std::fmt::Display for NavigationStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (#{})", self.name, self.id)
    }
}

/// The step delay from its persisted seconds. Values a `Duration` cannot
/// hold fall back to the default delay.
fn step_wait(def: &StepDefinition) -> Duration {
    Duration::try_from_secs_f64(def.wait_seconds.max(0.0)).unwrap_or_else(|_| {
        warn!(
            "Step {} has an invalid wait of {}s, using {}s",
            def.id,
            def.wait_seconds,
            default_wait_seconds()
        );
        Duration::from_secs_f64(default_wait_seconds())
    })
}

fn resolve_icon_path(path: &str, icons_dir: &Path) -> PathBuf {
    let p = Path::new(path);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        icons_dir.join(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_ready_requires_template_and_active() {
        let dir = tempfile::tempdir().unwrap();
        let icon = dir.path().join("step_1_x.png");
        RgbaImage::from_pixel(4, 4, Rgba([10, 20, 30, 255]))
            .save(&icon)
            .unwrap();

        let mut def = StepDefinition::new(1, "Bridge");
        def.icon_path = Some("step_1_x.png".to_string());
        let step = NavigationStep::from_definition(&def, dir.path());
        assert!(step.is_ready());
        assert_eq!(step.icon_path.as_deref(), Some(icon.as_path()));

        def.enabled = false;
        assert!(!NavigationStep::from_definition(&def, dir.path()).is_ready());

        def.enabled = true;
        def.icon_path = Some("missing.png".to_string());
        assert!(!NavigationStep::from_definition(&def, dir.path()).is_ready());
    }

    #[test]
    fn test_definition_keeps_relative_icon_names() {
        let dir = tempfile::tempdir().unwrap();
        let mut def = StepDefinition::new(2, "Gate");
        def.icon_path = Some("step_2_y.png".to_string());
        def.target_coordinate = Some("(3958,3644,6)".to_string());
        def.wait_seconds = 1.5;

        let step = NavigationStep::from_definition(&def, dir.path());
        assert_eq!(step.wait, Duration::from_millis(1500));
        assert_eq!(step.to_definition(dir.path()), def);
    }

    #[test]
    fn test_unrepresentable_wait_uses_default() {
        let mut def = StepDefinition::new(4, "Far");
        def.wait_seconds = 1e20;
        let step = NavigationStep::from_definition(&def, Path::new("."));
        assert_eq!(step.wait, Duration::from_secs(3));

        def.wait_seconds = f64::INFINITY;
        let step = NavigationStep::from_definition(&def, Path::new("."));
        assert_eq!(step.wait, Duration::from_secs(3));

        def.wait_seconds = -2.0;
        let step = NavigationStep::from_definition(&def, Path::new("."));
        assert_eq!(step.wait, Duration::ZERO);
    }

    #[test]
    fn test_blank_target_is_none() {
        let mut def = StepDefinition::new(3, "");
        def.target_coordinate = Some("  ".to_string());
        let step = NavigationStep::from_definition(&def, Path::new("."));
        assert_eq!(step.target_coordinate, None);
        assert_eq!(step.to_string(), "Step 3 (#3)");
    }
}
