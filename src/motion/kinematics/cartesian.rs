// src/motion/kinematics/cartesian.rs
use super::ActiveAxes;
use crate::motion::trapq::{Axis, Coord};

/// Cartesian kinematics (most common 3D printer type): each stepper drives
/// one axis directly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CartesianStepper {
    axis: Axis,
}

impl CartesianStepper {
    pub fn new(axis: Axis) -> Self {
        Self { axis }
    }

    pub fn axis(&self) -> Axis {
        self.axis
    }

    #[inline]
    pub fn position_at(&self, c: &Coord) -> f64 {
        c.get(self.axis)
    }

    #[inline]
    pub fn velocity_at(&self, v: &Coord) -> f64 {
        v.get(self.axis)
    }

    pub fn active_axes(&self) -> ActiveAxes {
        match self.axis {
            Axis::X => ActiveAxes::X,
            Axis::Y => ActiveAxes::Y,
            Axis::Z => ActiveAxes::Z,
        }
    }
}
