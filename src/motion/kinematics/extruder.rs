// src/motion/kinematics/extruder.rs
//
// Extruder moves already carry pressure advance in their accel/decel
// velocities, which makes the raw filament position jump at phase
// boundaries. When a smooth time is configured the position is averaged
// with the quartic bump kernel over neighbouring moves.

use super::GeometryError;
use crate::motion::integrate::{calc_inv_norm, integrate_weighted};
use crate::motion::trapq::{for_each_piece, Axis, Move};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtruderStepper {
    half_smooth_time: f64,
    inv_norm: Option<f64>,
}

impl ExtruderStepper {
    pub fn new(pressure_advance_smooth_time: f64) -> Result<Self, GeometryError> {
        if !pressure_advance_smooth_time.is_finite() || pressure_advance_smooth_time < 0.0 {
            return Err(GeometryError::Invalid(format!(
                "pressure advance smooth time must be >= 0, got {}",
                pressure_advance_smooth_time
            )));
        }
        let hst = 0.5 * pressure_advance_smooth_time;
        Ok(Self { half_smooth_time: hst, inv_norm: calc_inv_norm(hst) })
    }

    pub fn half_smooth_time(&self) -> f64 {
        self.half_smooth_time
    }

    /// Filament position at `move_time` (local to `moves[idx]`).
    pub fn calc_position(&self, moves: &[Move], idx: usize, move_time: f64) -> f64 {
        let m = &moves[idx];
        match self.inv_norm {
            // Pressure advance smoothing disabled
            None => m.start_pos.x + m.get_distance(move_time),
            Some(inv_norm) => {
                let area = pa_range_integrate(moves, idx, move_time, self.half_smooth_time);
                m.start_pos.x + area * inv_norm
            }
        }
    }

    /// Filament velocity at `move_time`. With smoothing enabled the position
    /// jumps between pieces contribute through the kernel weight at the jump.
    pub fn calc_velocity(&self, moves: &[Move], idx: usize, move_time: f64) -> f64 {
        let m = &moves[idx];
        let Some(inv_norm) = self.inv_norm else {
            return m.get_velocity(move_time);
        };
        let hst = self.half_smooth_time;
        let mut res = 0.0;
        let mut prev_end: Option<f64> = None;
        for_each_piece(moves, idx, Axis::X, move_time - hst, move_time + hst, |p| {
            let (lo, hi) = (p.lo - p.start, p.hi - p.start);
            if let Some(prev) = prev_end {
                let tau = p.lo - move_time;
                let w = tau * tau - hst * hst;
                res += (p.poly.eval(lo) - prev) * w * w;
            }
            res += integrate_weighted(
                p.poly.v,
                2.0 * p.poly.half_accel,
                0.0,
                lo,
                hi,
                p.start - move_time,
                hst,
            );
            prev_end = Some(p.poly.eval(hi));
        });
        res * inv_norm
    }
}

/// Un-normalized integral of the filament position (relative to the start
/// of `moves[idx]`) against the quartic kernel over `[t - hst, t + hst]`.
pub fn pa_range_integrate(moves: &[Move], idx: usize, move_time: f64, hst: f64) -> f64 {
    let base = moves[idx].start_pos.x;
    let mut res = 0.0;
    for_each_piece(moves, idx, Axis::X, move_time - hst, move_time + hst, |p| {
        res += integrate_weighted(
            p.poly.pos - base,
            p.poly.v,
            p.poly.half_accel,
            p.lo - p.start,
            p.hi - p.start,
            p.start - move_time,
            hst,
        );
    });
    res
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extruder_without_smoothing_is_raw() {
        let k = ExtruderStepper::new(0.0).unwrap();
        let m = Move::extruder_fill(0.0, 0.1, 0.2, 0.1, 2.0, 0.0, 10.0, 100.0, 1.0, -1.0).unwrap();
        let moves = [m.clone()];
        assert_eq!(k.calc_position(&moves, 0, 0.05), 2.0 + m.get_distance(0.05));
    }

    #[test]
    fn test_smoothing_constant_extrusion_is_exact() {
        let k = ExtruderStepper::new(0.04).unwrap();
        let m = Move::extruder_fill(0.0, 0.0, 1.0, 0.0, 0.0, 5.0, 5.0, 0.0, 0.0, 0.0).unwrap();
        let moves = [m];
        let pos = k.calc_position(&moves, 0, 0.5);
        assert!((pos - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_negative_smooth_time_rejected() {
        assert!(ExtruderStepper::new(-0.01).is_err());
    }
}
