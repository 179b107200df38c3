//! Minimap navigation engine.
//!
//! Clicks through a configured sequence of minimap waypoints and verifies
//! arrival by reading the on-screen position text:
//! - `capture`: region capture of the virtual screen
//! - `ocr`: coordinate extraction through a chain of preprocessing strategies
//! - `navigation`: template matching, step validation and the navigation loop

pub mod capture;
pub mod coordinate;
pub mod error;
pub mod logging;
pub mod navigation;
pub mod ocr;
pub mod paths;

pub use coordinate::{Coordinate, CoordinateRange};
pub use error::{NavError, NavResult};
