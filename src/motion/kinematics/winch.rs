// src/motion/kinematics/winch.rs
use super::{GeometryError, KinematicsError};
use crate::motion::trapq::Coord;

/// Cable robot: string length from a fixed anchor to the toolhead.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WinchStepper {
    anchor: Coord,
}

impl WinchStepper {
    pub fn new(anchor: Coord) -> Result<Self, GeometryError> {
        if !anchor.is_finite() {
            return Err(GeometryError::Invalid("winch anchor must be finite".to_string()));
        }
        Ok(Self { anchor })
    }

    #[inline]
    fn offset(&self, c: &Coord) -> Coord {
        Coord::new(c.x - self.anchor.x, c.y - self.anchor.y, c.z - self.anchor.z)
    }

    #[inline]
    pub fn position_at(&self, c: &Coord) -> f64 {
        self.offset(c).length()
    }

    #[inline]
    pub fn velocity_at(&self, c: &Coord, v: &Coord) -> Result<f64, KinematicsError> {
        let d = self.offset(c);
        let len = d.length();
        if len == 0.0 {
            return Err(KinematicsError::Singularity("toolhead at winch anchor"));
        }
        Ok((d.x * v.x + d.y * v.y + d.z * v.z) / len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_length() {
        let k = WinchStepper::new(Coord::new(0.0, 0.0, 100.0)).unwrap();
        assert_eq!(k.position_at(&Coord::new(30.0, 40.0, 100.0)), 50.0);
        assert!(WinchStepper::new(Coord::new(f64::INFINITY, 0.0, 0.0)).is_err());
    }
}
