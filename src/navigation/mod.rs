//! Minimap navigation.
//!
//! This module provides:
//! - Configuration and step types
//! - Icon template persistence and matching
//! - Position validation through coordinate OCR
//! - The navigation thread and its control surface

pub mod config;
pub mod icons;
pub mod input;
pub mod matcher;
pub mod runner;
pub mod state;
pub mod step;
pub mod validator;

#[cfg(test)]
pub mod testing;

pub use config::{load_config, save_config, LoopMode, NavigationConfig, StepDefinition};
pub use icons::{IconInfo, IconService};
pub use input::{platform_input, InputController};
pub use matcher::{match_template, MatchResult, TemplateMatcher};
pub use runner::{Collaborators, NavigationEngine, Navigator, StepUpdate};
pub use state::{
    ChannelSink, EventSink, FanoutSink, NavEvent, NavigationPhase, NavigationStatus, TracingSink,
};
pub use step::NavigationStep;
pub use validator::{check_distance, StepValidator, ValidationResult};
