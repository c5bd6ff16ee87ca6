// src/motion/kinematics/polar.rs
use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use super::KinematicsError;
use crate::motion::trapq::Coord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PolarAxis {
    Radius,
    Angle,
}

/// Polar bed: one motor sets the radius, the other rotates the bed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolarStepper {
    axis: PolarAxis,
}

impl PolarStepper {
    pub fn new(axis: PolarAxis) -> Self {
        Self { axis }
    }

    /// Radius, or angle in radians unwrapped to the turn nearest `last_pos`.
    /// At the pole the angle is undefined and `last_pos` is held.
    #[inline]
    pub fn position_at(&self, c: &Coord, last_pos: f64) -> f64 {
        match self.axis {
            PolarAxis::Radius => c.x.hypot(c.y),
            PolarAxis::Angle => {
                if c.x == 0.0 && c.y == 0.0 {
                    return last_pos;
                }
                let angle = c.y.atan2(c.x);
                angle + 2.0 * PI * ((last_pos - angle) / (2.0 * PI)).round()
            }
        }
    }

    #[inline]
    pub fn velocity_at(&self, c: &Coord, v: &Coord) -> Result<f64, KinematicsError> {
        let r2 = c.x * c.x + c.y * c.y;
        if r2 == 0.0 {
            return Err(KinematicsError::Singularity("polar pole"));
        }
        Ok(match self.axis {
            PolarAxis::Radius => (c.x * v.x + c.y * v.y) / r2.sqrt(),
            PolarAxis::Angle => (c.x * v.y - c.y * v.x) / r2,
        })
    }
}
