//! Error types for the navigation engine.
//!
//! Collaborators (capture, OCR, config) return `anyhow::Result` with context;
//! the engine surface maps them into `NavError`.

use std::io;

use thiserror::Error;

/// Errors surfaced by the navigation engine.
#[derive(Error, Debug)]
pub enum NavError {
    /// Navigation cannot start with the current configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A navigation run is already active.
    #[error("Navigation is already running")]
    AlreadyRunning,

    /// The step collection cannot be edited while navigating.
    #[error("Cannot modify steps while navigation is running")]
    Busy,

    /// A step icon could not be located.
    #[error("Detection failed for step '{step}': {message}")]
    Detection { step: String, message: String },

    /// The position after a step did not match its target.
    #[error("Validation failed for step '{step}': {message}")]
    Validation { step: String, message: String },

    /// Pointer or keyboard input was not delivered.
    #[error("Input injection failed: {0}")]
    InputInjection(String),

    /// Screen capture failed.
    #[error("Capture failed: {0}")]
    Capture(String),

    /// No step with the given id exists.
    #[error("Unknown step id {0}")]
    UnknownStep(u32),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl NavError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create a detection error.
    pub fn detection(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Detection {
            step: step.into(),
            message: message.into(),
        }
    }

    /// Create a validation error.
    pub fn validation(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            step: step.into(),
            message: message.into(),
        }
    }

    /// Create a capture error from any displayable failure (keeps the context chain).
    pub fn capture(err: impl std::fmt::Display) -> Self {
        Self::Capture(format!("{:#}", err))
    }
}

/// Result type for engine operations.
pub type NavResult<T> = Result<T, NavError>;
