// src/motion/mod.rs - Actuator position pipeline
//
// trapq (moves) -> smoother / shaper (per-axis filters) -> kinematics
// (per-actuator geometry), tied together by the position engine.

pub mod engine;
pub mod integrate;
pub mod kinematics;
pub mod shaper;
pub mod smoother;
pub mod trapq;

pub use engine::{smooth_axis, ActuatorSample, AxisFilter, EngineError, PositionEngine, SharedEngine};
pub use kinematics::{ActiveAxes, GeometryError, KinematicsError, StepperKinematics};
pub use shaper::{init_shaper, ShaperError, ShaperPulses, ShaperType};
pub use smoother::{init_smoother, Smoother, SmootherError, SmootherType};
pub use trapq::{Axis, Coord, Move, MoveError, TrapQ};
