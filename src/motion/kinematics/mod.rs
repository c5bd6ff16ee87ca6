// src/motion/kinematics/mod.rs - Per-geometry actuator position solvers
//
// Every geometry maps a Cartesian toolhead coordinate to the linear
// coordinate of one actuator. The set of machine geometries is closed, so
// dispatch is a plain enum match.

mod cartesian;
mod corexy;
mod delta;
mod extruder;
mod polar;
mod winch;

pub use cartesian::CartesianStepper;
pub use corexy::{CoreXYSign, CoreXYStepper};
pub use delta::DeltaStepper;
pub use extruder::{pa_range_integrate, ExtruderStepper};
pub use polar::{PolarAxis, PolarStepper};
pub use winch::WinchStepper;

use bitflags::bitflags;
use thiserror::Error;

use crate::motion::trapq::{Coord, Move};

bitflags! {
    /// Cartesian axes an actuator position depends on.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ActiveAxes: u8 {
        const X = 1 << 0;
        const Y = 1 << 1;
        const Z = 1 << 2;
    }
}

/// Per-query kinematic failures.
#[derive(Debug, Error, PartialEq)]
pub enum KinematicsError {
    #[error("Position ({x:.3}, {y:.3}) is out of reach of tower at ({tower_x:.3}, {tower_y:.3})")]
    OutOfReach { x: f64, y: f64, tower_x: f64, tower_y: f64 },
    #[error("Kinematic singularity: {0}")]
    Singularity(&'static str),
}

/// Rejected machine geometry.
#[derive(Debug, Error, PartialEq)]
pub enum GeometryError {
    #[error("Invalid geometry: {0}")]
    Invalid(String),
}

/// Kinematics of one actuator.
#[derive(Debug, Clone, PartialEq)]
pub enum StepperKinematics {
    Cartesian(CartesianStepper),
    CoreXY(CoreXYStepper),
    Delta(DeltaStepper),
    Polar(PolarStepper),
    Winch(WinchStepper),
    Extruder(ExtruderStepper),
}

impl StepperKinematics {
    /// Actuator coordinate for toolhead position `c`. `last_pos` is the
    /// previously commanded actuator position (used to keep angles continuous).
    #[inline]
    pub fn position_at(&self, c: &Coord, last_pos: f64) -> Result<f64, KinematicsError> {
        match self {
            StepperKinematics::Cartesian(k) => Ok(k.position_at(c)),
            StepperKinematics::CoreXY(k) => Ok(k.position_at(c)),
            StepperKinematics::Delta(k) => k.position_at(c),
            StepperKinematics::Polar(k) => Ok(k.position_at(c, last_pos)),
            StepperKinematics::Winch(k) => Ok(k.position_at(c)),
            StepperKinematics::Extruder(_) => Ok(c.x),
        }
    }

    /// Actuator velocity for toolhead position `c` moving at `v`.
    #[inline]
    pub fn velocity_at(&self, c: &Coord, v: &Coord) -> Result<f64, KinematicsError> {
        match self {
            StepperKinematics::Cartesian(k) => Ok(k.velocity_at(v)),
            StepperKinematics::CoreXY(k) => Ok(k.velocity_at(v)),
            StepperKinematics::Delta(k) => k.velocity_at(c, v),
            StepperKinematics::Polar(k) => k.velocity_at(c, v),
            StepperKinematics::Winch(k) => k.velocity_at(c, v),
            StepperKinematics::Extruder(_) => Ok(v.x),
        }
    }

    /// Unsmoothed actuator position during move `m`.
    #[inline]
    pub fn calc_position(&self, m: &Move, move_time: f64, last_pos: f64) -> Result<f64, KinematicsError> {
        self.position_at(&m.get_coord(move_time), last_pos)
    }

    pub fn active_axes(&self) -> ActiveAxes {
        match self {
            StepperKinematics::Cartesian(k) => k.active_axes(),
            StepperKinematics::CoreXY(_) | StepperKinematics::Polar(_) => ActiveAxes::X | ActiveAxes::Y,
            StepperKinematics::Delta(_) | StepperKinematics::Winch(_) => ActiveAxes::all(),
            StepperKinematics::Extruder(_) => ActiveAxes::X,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            StepperKinematics::Cartesian(_) => "cartesian",
            StepperKinematics::CoreXY(_) => "corexy",
            StepperKinematics::Delta(_) => "delta",
            StepperKinematics::Polar(_) => "polar",
            StepperKinematics::Winch(_) => "winch",
            StepperKinematics::Extruder(_) => "extruder",
        }
    }
}
