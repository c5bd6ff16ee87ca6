// src/motion/shaper.rs - Discrete input shapers
//! Input shapers for reducing vibrations and ringing
//!
//! A shaper replaces the commanded position with a weighted sum of the same
//! position sampled at a handful of time offsets. The impulse set is chosen
//! so the resonance of the frame at the configured frequency cancels out.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::motion::trapq::{axis_position_across_moves, axis_velocity_across_moves, Axis, Move};

/// Capacity of a pulse train.
pub const MAX_PULSES: usize = 5;

/// Residual vibration the EI family of shapers tolerates (1/20).
const SHAPER_VIBRATION_REDUCTION: f64 = 20.0;

pub const DEFAULT_DAMPING_RATIO: f64 = 0.1;

#[derive(Debug, Error, PartialEq)]
pub enum ShaperError {
    #[error("Shaper supports at most {MAX_PULSES} pulses, got {0}")]
    TooManyPulses(usize),
    #[error("Shaper amplitude and time lists differ in length ({0} vs {1})")]
    LengthMismatch(usize, usize),
    #[error("Shaper pulses must be finite")]
    NonFinite,
    #[error("Shaper amplitudes sum to zero")]
    ZeroAmplitude,
    #[error("Shaper frequency must be > 0, got {0}")]
    InvalidFrequency(f64),
    #[error("Shaper damping ratio must be in [0, 1), got {0}")]
    InvalidDamping(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pulse {
    pub t: f64,
    pub a: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ShaperPulses {
    num_pulses: usize,
    pulses: [Pulse; MAX_PULSES],
}

impl ShaperPulses {
    pub fn pulses(&self) -> &[Pulse] {
        &self.pulses[..self.num_pulses]
    }

    pub fn is_empty(&self) -> bool {
        self.num_pulses == 0
    }

    /// Earliest and latest time offsets (relative to the query time) the
    /// shaper reads from.
    pub fn time_span(&self) -> (f64, f64) {
        match self.pulses() {
            [] => (0.0, 0.0),
            [first, .., last] => (first.t, last.t),
            [only] => (only.t, only.t),
        }
    }
}

/// Consolidate the impulses `a[i]` at delays `t[i]` into a pulse train.
///
/// Amplitudes are normalized to sum to 1, delays are reversed into sampling
/// offsets and shifted so that constant-velocity motion is reproduced exactly.
pub fn init_shaper(a: &[f64], t: &[f64]) -> Result<ShaperPulses, ShaperError> {
    let n = a.len();
    if n > MAX_PULSES {
        return Err(ShaperError::TooManyPulses(n));
    }
    if t.len() != n {
        return Err(ShaperError::LengthMismatch(n, t.len()));
    }
    if a.iter().chain(t).any(|v| !v.is_finite()) {
        return Err(ShaperError::NonFinite);
    }
    let sum_a: f64 = a.iter().sum();
    if n > 0 && sum_a == 0.0 {
        return Err(ShaperError::ZeroAmplitude);
    }
    let mut sp = ShaperPulses { num_pulses: n, ..Default::default() };
    if n == 0 {
        return Ok(sp);
    }
    let inv_a = 1.0 / sum_a;
    for i in 0..n {
        sp.pulses[n - i - 1] = Pulse { t: -t[i], a: a[i] * inv_a };
    }
    let ts: f64 = sp.pulses().iter().map(|p| p.a * p.t).sum();
    sp.pulses[..n].iter_mut().for_each(|p| p.t -= ts);
    Ok(sp)
}

/// Shaped position of `axis` at `move_time` (local to `moves[idx]`).
#[inline]
pub fn shaper_calc_position(
    moves: &[Move],
    idx: usize,
    axis: Axis,
    move_time: f64,
    sp: &ShaperPulses,
) -> f64 {
    sp.pulses()
        .iter()
        .map(|p| p.a * axis_position_across_moves(moves, idx, axis, move_time + p.t))
        .sum()
}

/// Shaped velocity of `axis` at `move_time` (local to `moves[idx]`).
#[inline]
pub fn shaper_calc_velocity(
    moves: &[Move],
    idx: usize,
    axis: Axis,
    move_time: f64,
    sp: &ShaperPulses,
) -> f64 {
    sp.pulses()
        .iter()
        .map(|p| p.a * axis_velocity_across_moves(moves, idx, axis, move_time + p.t))
        .sum()
}

/// Standard input shaper family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum ShaperType {
    #[serde(rename = "zv")]
    Zv,
    #[serde(rename = "mzv")]
    Mzv,
    #[serde(rename = "zvd")]
    Zvd,
    #[serde(rename = "ei")]
    Ei,
    #[serde(rename = "2hump_ei")]
    TwoHumpEi,
    #[serde(rename = "3hump_ei")]
    ThreeHumpEi,
}

impl ShaperType {
    /// Impulse amplitudes and delays for `shaper_freq` Hz. Returns the number
    /// of impulses used.
    pub fn impulses(
        self,
        shaper_freq: f64,
        damping_ratio: f64,
    ) -> Result<(usize, [f64; MAX_PULSES], [f64; MAX_PULSES]), ShaperError> {
        if !shaper_freq.is_finite() || shaper_freq <= 0.0 {
            return Err(ShaperError::InvalidFrequency(shaper_freq));
        }
        if !damping_ratio.is_finite() || !(0.0..1.0).contains(&damping_ratio) {
            return Err(ShaperError::InvalidDamping(damping_ratio));
        }
        let v_tol = 1.0 / SHAPER_VIBRATION_REDUCTION;
        let df = (1.0 - damping_ratio * damping_ratio).sqrt();
        let k = (-damping_ratio * std::f64::consts::PI / df).exp();
        let t_d = 1.0 / (shaper_freq * df);

        let mut a = [0.0; MAX_PULSES];
        let mut t = [0.0; MAX_PULSES];
        let n = match self {
            ShaperType::Zv => {
                a[..2].copy_from_slice(&[1.0, k]);
                t[..2].copy_from_slice(&[0.0, 0.5 * t_d]);
                2
            }
            ShaperType::Mzv => {
                let k = (-0.75 * damping_ratio * std::f64::consts::PI / df).exp();
                let a1 = 1.0 - 1.0 / 2f64.sqrt();
                let a2 = (2f64.sqrt() - 1.0) * k;
                let a3 = a1 * k * k;
                a[..3].copy_from_slice(&[a1, a2, a3]);
                t[..3].copy_from_slice(&[0.0, 0.375 * t_d, 0.75 * t_d]);
                3
            }
            ShaperType::Zvd => {
                a[..3].copy_from_slice(&[1.0, 2.0 * k, k * k]);
                t[..3].copy_from_slice(&[0.0, 0.5 * t_d, t_d]);
                3
            }
            ShaperType::Ei => {
                let a1 = 0.25 * (1.0 + v_tol);
                let a2 = 0.5 * (1.0 - v_tol) * k;
                let a3 = a1 * k * k;
                a[..3].copy_from_slice(&[a1, a2, a3]);
                t[..3].copy_from_slice(&[0.0, 0.5 * t_d, t_d]);
                3
            }
            ShaperType::TwoHumpEi => {
                let v2 = v_tol * v_tol;
                let x = (v2 * ((1.0 - v2).sqrt() + 1.0)).powf(1.0 / 3.0);
                let a1 = (3.0 * x * x + 2.0 * x + 3.0 * v2) / (16.0 * x);
                let a2 = (0.5 - a1) * k;
                let a3 = a2 * k;
                let a4 = a1 * k * k * k;
                a[..4].copy_from_slice(&[a1, a2, a3, a4]);
                t[..4].copy_from_slice(&[0.0, 0.5 * t_d, t_d, 1.5 * t_d]);
                4
            }
            ShaperType::ThreeHumpEi => {
                let k2 = k * k;
                let a1 = 0.0625 * (1.0 + 3.0 * v_tol + 2.0 * (2.0 * (v_tol + 1.0) * v_tol).sqrt());
                let a2 = 0.25 * (1.0 - v_tol) * k;
                let a3 = (0.5 * (1.0 + v_tol) - 2.0 * a1) * k2;
                let a4 = a2 * k2;
                let a5 = a1 * k2 * k2;
                a.copy_from_slice(&[a1, a2, a3, a4, a5]);
                t.copy_from_slice(&[0.0, 0.5 * t_d, t_d, 1.5 * t_d, 2.0 * t_d]);
                5
            }
        };
        Ok((n, a, t))
    }

    pub fn build(self, shaper_freq: f64, damping_ratio: f64) -> Result<ShaperPulses, ShaperError> {
        let (n, a, t) = self.impulses(shaper_freq, damping_ratio)?;
        let sp = init_shaper(&a[..n], &t[..n])?;
        tracing::debug!(
            "Built {:?} shaper at {:.1}Hz (damping {:.3}): {} pulses spanning {:?}",
            self,
            shaper_freq,
            damping_ratio,
            n,
            sp.time_span()
        );
        Ok(sp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_shaper_reverses_and_centers() {
        let sp = init_shaper(&[1.0, 1.0], &[0.0, 0.02]).unwrap();
        assert_eq!(sp.num_pulses, 2);
        assert_eq!(sp.pulses[0].a, 0.5);
        assert!((sp.pulses[0].t + 0.01).abs() < 1e-15);
        assert!((sp.pulses[1].t - 0.01).abs() < 1e-15);
    }

    #[test]
    fn test_pulses_view_matches_input_count() {
        let sp = init_shaper(&[1.0, 2.0, 1.0], &[0.0, 0.01, 0.02]).unwrap();
        assert_eq!(sp.pulses().len(), 3);
        assert!((sp.time_span().0 + 0.01).abs() < 1e-15);
        assert!((sp.time_span().1 - 0.01).abs() < 1e-15);
        let total: f64 = sp.pulses().iter().map(|p| p.a).sum();
        assert!((total - 1.0).abs() < 1e-15);
    }

    #[test]
    fn test_init_shaper_capacity() {
        assert_eq!(init_shaper(&[1.0; 6], &[0.0; 6]), Err(ShaperError::TooManyPulses(6)));
        assert_eq!(init_shaper(&[1.0, -1.0], &[0.0, 0.1]), Err(ShaperError::ZeroAmplitude));
        assert_eq!(init_shaper(&[1.0], &[0.0, 0.1]), Err(ShaperError::LengthMismatch(1, 2)));
        assert!(init_shaper(&[], &[]).unwrap().is_empty());
    }

    #[test]
    fn test_builtin_shapers_conserve_amplitude() {
        for kind in [
            ShaperType::Zv,
            ShaperType::Mzv,
            ShaperType::Zvd,
            ShaperType::Ei,
            ShaperType::TwoHumpEi,
            ShaperType::ThreeHumpEi,
        ] {
            let sp = kind.build(40.0, DEFAULT_DAMPING_RATIO).unwrap();
            let sum: f64 = sp.pulses().iter().map(|p| p.a).sum();
            let moment: f64 = sp.pulses().iter().map(|p| p.a * p.t).sum();
            assert!((sum - 1.0).abs() < 1e-12, "{:?}", kind);
            assert!(moment.abs() < 1e-12, "{:?}", kind);
        }
    }

    #[test]
    fn test_zv_without_damping_is_half_period_split() {
        let sp = ShaperType::Zv.build(50.0, 0.0).unwrap();
        let (lo, hi) = sp.time_span();
        assert!((hi - lo - 0.01).abs() < 1e-12);
        assert!((sp.pulses[0].a - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_shaper_parameters() {
        assert_eq!(ShaperType::Zv.build(0.0, 0.1), Err(ShaperError::InvalidFrequency(0.0)));
        assert_eq!(ShaperType::Ei.build(40.0, 1.0), Err(ShaperError::InvalidDamping(1.0)));
    }
}
