//! Derived geometry facts: bounding boxes and per-session summaries.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::PrinterSettings;
use crate::params::Parameter;

/// Axis-aligned bounding box of a solid, in millimeters.
///
/// Extents are kept at full precision for volume-fit comparisons; the
/// `Display` impl rounds to one decimal place for user-facing output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// The smallest of the three extents.
    pub fn min_edge(&self) -> f64 {
        self.x.min(self.y).min(self.z)
    }

    /// Checks whether the solid fits the printer build volume, returning
    /// the per-axis overflow in millimeters when it does not.
    pub fn fits_within(&self, printer: &PrinterSettings) -> std::result::Result<(), Overflow> {
        let overflow = Overflow {
            x: (self.x - printer.build_volume_x).max(0.0),
            y: (self.y - printer.build_volume_y).max(0.0),
            z: (self.z - printer.build_volume_z).max(0.0),
        };
        if overflow.x == 0.0 && overflow.y == 0.0 && overflow.z == 0.0 {
            Ok(())
        } else {
            Err(overflow)
        }
    }

    /// Compares against expected extents within a symmetric tolerance.
    pub fn approx_eq(&self, x: f64, y: f64, z: f64, tolerance: f64) -> bool {
        (self.x - x).abs() <= tolerance
            && (self.y - y).abs() <= tolerance
            && (self.z - z).abs() <= tolerance
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1} x {:.1} x {:.1} mm", self.x, self.y, self.z)
    }
}

/// Per-axis build-volume overflow in millimeters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Overflow {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl fmt::Display for Overflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if self.x > 0.0 {
            parts.push(format!("x +{:.1}mm", self.x));
        }
        if self.y > 0.0 {
            parts.push(format!("y +{:.1}mm", self.y));
        }
        if self.z > 0.0 {
            parts.push(format!("z +{:.1}mm", self.z));
        }
        write!(f, "{}", parts.join(", "))
    }
}

/// Geometry facts derived from the current script: the bounding box of the
/// executed solid plus the extracted design parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometrySummary {
    pub bounding_box: BoundingBox,
    pub parameters: Vec<Parameter>,
}
