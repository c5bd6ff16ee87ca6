// src/motion/kinematics/corexy.rs
use serde::{Deserialize, Serialize};

use crate::motion::trapq::Coord;

/// Which of the two CoreXY belts a motor drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CoreXYSign {
    /// Motor A = X + Y
    Plus,
    /// Motor B = X - Y
    Minus,
}

/// CoreXY kinematics
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoreXYStepper {
    sign: CoreXYSign,
}

impl CoreXYStepper {
    pub fn new(sign: CoreXYSign) -> Self {
        Self { sign }
    }

    #[inline]
    fn combine(&self, x: f64, y: f64) -> f64 {
        match self.sign {
            CoreXYSign::Plus => x + y,
            CoreXYSign::Minus => x - y,
        }
    }

    #[inline]
    pub fn position_at(&self, c: &Coord) -> f64 {
        self.combine(c.x, c.y)
    }

    #[inline]
    pub fn velocity_at(&self, v: &Coord) -> f64 {
        self.combine(v.x, v.y)
    }
}
