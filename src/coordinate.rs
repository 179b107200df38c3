//! In-game position triple and its plausibility bounds.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A position as rendered by the game: `(x,y,z)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coordinate {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Coordinate {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance on the (x, y) plane. z is ignored.
    pub fn distance_to(&self, other: &Coordinate) -> f64 {
        let dx = (self.x - other.x) as f64;
        let dy = (self.y - other.y) as f64;
        (dx * dx + dy * dy).sqrt()
    }

    /// Largest per-axis (x, y) difference to `other`.
    pub fn max_axis_delta(&self, other: &Coordinate) -> i32 {
        (self.x - other.x).abs().max((self.y - other.y).abs())
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{},{})", self.x, self.y, self.z)
    }
}

/// Bounds a reading must fall in to be considered plausible.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CoordinateRange {
    #[serde(default = "default_min_xy")]
    pub min_xy: i32,
    #[serde(default = "default_max_xy")]
    pub max_xy: i32,
    #[serde(default = "default_min_z")]
    pub min_z: i32,
    #[serde(default = "default_max_z")]
    pub max_z: i32,
}

fn default_min_xy() -> i32 {
    1000
}

fn default_max_xy() -> i32 {
    9999
}

fn default_min_z() -> i32 {
    1
}

fn default_max_z() -> i32 {
    20
}

impl Default for CoordinateRange {
    fn default() -> Self {
        Self {
            min_xy: default_min_xy(),
            max_xy: default_max_xy(),
            min_z: default_min_z(),
            max_z: default_max_z(),
        }
    }
}

impl CoordinateRange {
    /// Returns true if every component lies within the inclusive bounds.
    pub fn is_valid(&self, c: &Coordinate) -> bool {
        let xy = self.min_xy..=self.max_xy;
        xy.contains(&c.x) && xy.contains(&c.y) && (self.min_z..=self.max_z).contains(&c.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_range_bounds() {
        let range = CoordinateRange::default();
        assert!(range.is_valid(&Coordinate::new(1000, 9999, 1)));
        assert!(range.is_valid(&Coordinate::new(3958, 3644, 20)));
        assert!(!range.is_valid(&Coordinate::new(999, 5000, 6)));
        assert!(!range.is_valid(&Coordinate::new(5000, 10000, 6)));
        assert!(!range.is_valid(&Coordinate::new(5000, 5000, 0)));
        assert!(!range.is_valid(&Coordinate::new(5000, 5000, 21)));
    }

    #[test]
    fn test_distance_ignores_z() {
        let a = Coordinate::new(5005, 5008, 3);
        let b = Coordinate::new(5000, 5000, 9);
        assert!((a.distance_to(&b) - 89f64.sqrt()).abs() < 1e-9);
        assert_eq!(a.max_axis_delta(&b), 8);
    }

    #[test]
    fn test_display() {
        assert_eq!(Coordinate::new(3958, 3644, 6).to_string(), "(3958,3644,6)");
    }
}
