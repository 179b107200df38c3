//! Navigation run state and progress events.
//!
//! A run moves through: Running → {Locating → Clicking → Waiting →
//! Validating} → StepSuccess / StepFailure → PassComplete, and restarts
//! until stopped.

use std::fmt;
use std::sync::mpsc::{channel, Receiver, Sender};

use chrono::{DateTime, Local};
use tracing::{error, info, warn};

/// Where the navigator currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NavigationPhase {
    /// Not navigating
    #[default]
    Idle,
    /// Run started, between steps
    Running,
    /// Searching the minimap for the step icon
    Locating,
    /// Clicking the icon
    Clicking,
    /// Waiting the step delay
    Waiting,
    /// Reading coordinates to confirm arrival
    Validating,
    StepSuccess,
    StepFailure,
    /// All steps of a pass succeeded
    PassComplete,
    /// Run ended on request
    Stopped,
}

impl fmt::Display for NavigationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NavigationPhase::Idle => write!(f, "Idle"),
            NavigationPhase::Running => write!(f, "Running"),
            NavigationPhase::Locating => write!(f, "Locating icon"),
            NavigationPhase::Clicking => write!(f, "Clicking"),
            NavigationPhase::Waiting => write!(f, "Waiting"),
            NavigationPhase::Validating => write!(f, "Validating position"),
            NavigationPhase::StepSuccess => write!(f, "Step succeeded"),
            NavigationPhase::StepFailure => write!(f, "Step failed"),
            NavigationPhase::PassComplete => write!(f, "Pass complete"),
            NavigationPhase::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Snapshot of the run for readers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NavigationStatus {
    pub is_navigating: bool,
    pub phase: NavigationPhase,
    /// Index into the ready steps of the run
    pub current_step_index: Option<usize>,
    pub current_step: Option<String>,
    /// Passes started in this run (1-based)
    pub pass_count: u32,
}

impl NavigationStatus {
    /// Returns a progress string for display.
    pub fn progress_string(&self) -> String {
        match (&self.current_step, self.is_navigating) {
            (Some(step), true) => format!("Pass {} - {} - {}", self.pass_count, step, self.phase),
            _ => self.phase.to_string(),
        }
    }
}

/// User-facing progress of a run.
#[derive(Debug, Clone, PartialEq)]
pub enum NavEvent {
    Started { steps: usize },
    PassStarted { pass: u32 },
    StepStarted { step: String, attempt: u32, attempts: u32 },
    IconFound { step: String, x: i32, y: i32, confidence: f32 },
    IconNotFound { step: String, attempt: u32 },
    ClickFailed { step: String },
    ValidationFailed { step: String, distance: Option<f64> },
    StepSucceeded { step: String },
    StepFailed { step: String },
    PassCompleted { pass: u32 },
    PassAborted { pass: u32, step: String },
    Stopped,
    Error { message: String },
}

impl NavEvent {
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            NavEvent::IconNotFound { .. }
                | NavEvent::ClickFailed { .. }
                | NavEvent::ValidationFailed { .. }
                | NavEvent::StepFailed { .. }
                | NavEvent::PassAborted { .. }
        )
    }
}

impl fmt::Display for NavEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NavEvent::Started { steps } => write!(f, "Navigation started with {} steps", steps),
            NavEvent::PassStarted { pass } => write!(f, "Starting pass {}", pass),
            NavEvent::StepStarted {
                step,
                attempt,
                attempts,
            } => write!(f, "Executing {} (attempt {}/{})", step, attempt, attempts),
            NavEvent::IconFound {
                step,
                x,
                y,
                confidence,
            } => write!(
                f,
                "Found {} at ({}, {}) confidence {:.2}",
                step, x, y, confidence
            ),
            NavEvent::IconNotFound { step, attempt } => {
                write!(f, "Icon for {} not found (attempt {})", step, attempt)
            }
            NavEvent::ClickFailed { step } => write!(f, "Failed to click {}", step),
            NavEvent::ValidationFailed { step, distance } => match distance {
                Some(d) => write!(f, "Position check failed for {} (distance {:.1})", step, d),
                None => write!(f, "Position check failed for {} (no reading)", step),
            },
            NavEvent::StepSucceeded { step } => write!(f, "{} completed", step),
            NavEvent::StepFailed { step } => write!(f, "{} failed after all retries", step),
            NavEvent::PassCompleted { pass } => write!(f, "Pass {} completed", pass),
            NavEvent::PassAborted { pass, step } => {
                write!(f, "Pass {} aborted at {}, restarting after cooldown", pass, step)
            }
            NavEvent::Stopped => write!(f, "Navigation stopped"),
            NavEvent::Error { message } => write!(f, "Navigation error: {}", message),
        }
    }
}

/// Receives progress events from the navigation thread.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: NavEvent);
}

/// Logs events through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: NavEvent) {
        match &event {
            NavEvent::Error { .. } => error!("{}", event),
            e if e.is_failure() => warn!("{}", event),
            _ => info!("{}", event),
        }
    }
}

/// An event with the time it was emitted.
#[derive(Debug, Clone)]
pub struct TimedEvent {
    pub event: NavEvent,
    pub at: DateTime<Local>,
}

/// Forwards events into a channel a UI can poll.
pub struct ChannelSink {
    sender: Sender<TimedEvent>,
}

impl ChannelSink {
    /// Returns the sink and the receiving end.
    ///
    /// The channel is unbounded. Events are dropped once the receiver is gone.
    pub fn new() -> (Self, Receiver<TimedEvent>) {
        let (sender, receiver) = channel();
        (Self { sender }, receiver)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: NavEvent) {
        let _ = self.sender.send(TimedEvent {
            event,
            at: Local::now(),
        });
    }
}

/// Sends every event to each inner sink.
pub struct FanoutSink(pub Vec<Box<dyn EventSink>>);

impl EventSink for FanoutSink {
    fn emit(&self, event: NavEvent) {
        for sink in &self.0 {
            sink.emit(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_display() {
        assert_eq!(format!("{}", NavigationPhase::Idle), "Idle");
        assert_eq!(
            format!("{}", NavigationPhase::Validating),
            "Validating position"
        );
    }

    #[test]
    fn test_progress_string() {
        let mut status = NavigationStatus::default();
        assert_eq!(status.progress_string(), "Idle");
        status.is_navigating = true;
        status.pass_count = 2;
        status.current_step = Some("Bridge".to_string());
        status.phase = NavigationPhase::Clicking;
        assert_eq!(status.progress_string(), "Pass 2 - Bridge - Clicking");
    }

    #[test]
    fn test_channel_sink_send_receive() {
        let (sink, receiver) = ChannelSink::new();
        sink.emit(NavEvent::PassStarted { pass: 1 });

        let received = receiver.recv().expect("Failed to receive");
        assert_eq!(received.event, NavEvent::PassStarted { pass: 1 });
    }

    #[test]
    fn test_channel_sink_keeps_order() {
        let (sink, receiver) = ChannelSink::new();
        for pass in 1..=5 {
            sink.emit(NavEvent::PassCompleted { pass });
        }
        for pass in 1..=5 {
            let received = receiver.recv().expect("Failed to receive");
            assert_eq!(received.event, NavEvent::PassCompleted { pass });
        }
    }

    #[test]
    fn test_channel_closes_when_sink_dropped() {
        let (sink, receiver) = ChannelSink::new();
        sink.emit(NavEvent::Stopped);
        drop(sink);

        assert!(receiver.recv().is_ok());
        assert!(receiver.recv().is_err());
    }

    #[test]
    fn test_emit_after_receiver_dropped_is_silent() {
        let (sink, receiver) = ChannelSink::new();
        drop(receiver);
        sink.emit(NavEvent::Stopped);
    }

    #[test]
    fn test_fanout() {
        let (a, ra) = ChannelSink::new();
        let (b, rb) = ChannelSink::new();
        let fanout = FanoutSink(vec![Box::new(a), Box::new(b)]);
        fanout.emit(NavEvent::Started { steps: 3 });
        assert_eq!(ra.recv().unwrap().event, NavEvent::Started { steps: 3 });
        assert_eq!(rb.recv().unwrap().event, NavEvent::Started { steps: 3 });
    }

    #[test]
    fn test_event_text() {
        let e = NavEvent::ValidationFailed {
            step: "Gate".to_string(),
            distance: Some(14.2),
        };
        assert_eq!(e.to_string(), "Position check failed for Gate (distance 14.2)");
        assert!(e.is_failure());
        assert!(!NavEvent::Stopped.is_failure());
    }
}
