// src/motion/kinematics/delta.rs
use super::{GeometryError, KinematicsError};
use crate::motion::trapq::Coord;

/// One tower carriage of a linear delta.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeltaStepper {
    arm2: f64,
    tower_x: f64,
    tower_y: f64,
}

impl DeltaStepper {
    pub fn new(arm_length: f64, tower_x: f64, tower_y: f64) -> Result<Self, GeometryError> {
        if !arm_length.is_finite() || arm_length <= 0.0 {
            return Err(GeometryError::Invalid(format!("delta arm length must be > 0, got {}", arm_length)));
        }
        if !tower_x.is_finite() || !tower_y.is_finite() {
            return Err(GeometryError::Invalid("delta tower position must be finite".to_string()));
        }
        Ok(Self { arm2: arm_length * arm_length, tower_x, tower_y })
    }

    /// Squared horizontal reach left for the arm's vertical component.
    #[inline]
    fn radicand(&self, c: &Coord) -> (f64, f64, f64) {
        let dx = self.tower_x - c.x;
        let dy = self.tower_y - c.y;
        (self.arm2 - dx * dx - dy * dy, dx, dy)
    }

    fn out_of_reach(&self, c: &Coord) -> KinematicsError {
        KinematicsError::OutOfReach { x: c.x, y: c.y, tower_x: self.tower_x, tower_y: self.tower_y }
    }

    /// Carriage height. An XY position beyond the arm's reach is an error;
    /// it is never clamped.
    #[inline]
    pub fn position_at(&self, c: &Coord) -> Result<f64, KinematicsError> {
        let (r, _, _) = self.radicand(c);
        if r < 0.0 {
            return Err(self.out_of_reach(c));
        }
        Ok(r.sqrt() + c.z)
    }

    #[inline]
    pub fn velocity_at(&self, c: &Coord, v: &Coord) -> Result<f64, KinematicsError> {
        let (r, dx, dy) = self.radicand(c);
        if r < 0.0 {
            return Err(self.out_of_reach(c));
        }
        if r == 0.0 {
            return Err(KinematicsError::Singularity("delta arm is horizontal"));
        }
        Ok((dx * v.x + dy * v.y) / r.sqrt() + v.z)
    }
}
