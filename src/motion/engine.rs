// src/motion/engine.rs - Smoothed/shaped actuator positions
//
// The engine filters the Cartesian axes an actuator depends on (each axis is
// either left alone, smoothed with a kernel, or shaped with a pulse train)
// and feeds the filtered coordinate through the actuator's kinematics.

use std::sync::{Arc, PoisonError, RwLock};

use thiserror::Error;

use crate::motion::integrate::{calc_antiderivatives, diff_antiderivatives, integrate_move};
use crate::motion::kinematics::{ActiveAxes, KinematicsError, StepperKinematics};
use crate::motion::shaper::{shaper_calc_position, shaper_calc_velocity, ShaperPulses};
use crate::motion::smoother::Smoother;
use crate::motion::trapq::{
    axis_position_across_moves, axis_velocity_across_moves, for_each_piece, Axis, Coord, Move,
};

#[derive(Debug, Error, PartialEq)]
pub enum EngineError {
    #[error("Extruder steppers do not accept axis filters")]
    FilterOnExtruder,
}

/// Resonance compensation applied to one Cartesian axis.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum AxisFilter {
    #[default]
    None,
    Smooth(Smoother),
    Shape(ShaperPulses),
}

impl AxisFilter {
    pub fn is_none(&self) -> bool {
        matches!(self, AxisFilter::None)
    }

    /// Time offsets (relative to the query time) the filter reads from.
    pub fn time_span(&self) -> (f64, f64) {
        match self {
            AxisFilter::None => (0.0, 0.0),
            AxisFilter::Smooth(sm) => sm.time_span(),
            AxisFilter::Shape(sp) => sp.time_span(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActuatorSample {
    pub position: f64,
    pub velocity: f64,
}

/// Smoothed position of `axis` at `move_time` (local to `moves[idx]`).
///
/// The kernel window is split at every phase boundary it covers; each piece
/// contributes through its antiderivative difference. When given,
/// `smooth_velocity` receives the derivative of the smoothed position,
/// including the kernel-weighted contribution of any position jump inside
/// the window. A zero-width smoother passes the raw position through.
pub fn smooth_axis(
    moves: &[Move],
    idx: usize,
    axis: Axis,
    move_time: f64,
    sm: &Smoother,
    smooth_velocity: Option<&mut f64>,
) -> f64 {
    if sm.is_identity() {
        if let Some(sv) = smooth_velocity {
            *sv = axis_velocity_across_moves(moves, idx, axis, move_time);
        }
        return axis_position_across_moves(moves, idx, axis, move_time);
    }
    let base = moves[idx].start_pos.get(axis);
    let center = move_time + sm.t_offs;
    let (lo, hi) = (center - sm.hst, center + sm.hst);
    let mut res = 0.0;
    let mut vel = 0.0;
    let mut prev_end: Option<f64> = None;
    for_each_piece(moves, idx, axis, lo, hi, |p| {
        let s = if p.lo == lo && p.hi == hi {
            sm.pm_diff
        } else {
            let a = if p.lo == lo { sm.m_hst } else { calc_antiderivatives(sm, p.lo - center) };
            let b = if p.hi == hi { sm.p_hst } else { calc_antiderivatives(sm, p.hi - center) };
            diff_antiderivatives(&a, &b)
        };
        if let Some(prev) = prev_end {
            vel += (p.poly.eval(p.lo - p.start) - prev) * sm.weight(p.lo - center);
        }
        prev_end = Some(p.poly.eval(p.hi - p.start));
        res += integrate_move(&p.poly, base, center - p.start, &s, Some(&mut vel));
    });
    if let Some(sv) = smooth_velocity {
        *sv = vel;
    }
    base + res
}

/// Position function of one actuator.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionEngine {
    kinematics: StepperKinematics,
    filters: [AxisFilter; 3],
    active: ActiveAxes,
}

impl PositionEngine {
    pub fn new(kinematics: StepperKinematics) -> Self {
        let active = kinematics.active_axes();
        Self { kinematics, filters: Default::default(), active }
    }

    /// Install the filter for `axis`, replacing any previous one. An identity
    /// smoother is stored as no filter.
    pub fn set_filter(&mut self, axis: Axis, filter: AxisFilter) -> Result<(), EngineError> {
        let filter = match filter {
            AxisFilter::Smooth(sm) if sm.is_identity() => AxisFilter::None,
            AxisFilter::Shape(sp) if sp.is_empty() => AxisFilter::None,
            other => other,
        };
        if matches!(self.kinematics, StepperKinematics::Extruder(_)) && !filter.is_none() {
            return Err(EngineError::FilterOnExtruder);
        }
        tracing::debug!("{} stepper: {:?} filter on axis {:?}", self.kinematics.name(), filter, axis);
        self.filters[axis.index()] = filter;
        Ok(())
    }

    pub fn with_filter(mut self, axis: Axis, filter: AxisFilter) -> Result<Self, EngineError> {
        self.set_filter(axis, filter)?;
        Ok(self)
    }

    pub fn kinematics(&self) -> &StepperKinematics {
        &self.kinematics
    }

    pub fn filter(&self, axis: Axis) -> &AxisFilter {
        &self.filters[axis.index()]
    }

    fn active_axes(&self) -> impl Iterator<Item = Axis> + '_ {
        Axis::ALL.into_iter().filter(move |a| self.active.contains(axis_flag(*a)))
    }

    fn is_unfiltered(&self) -> bool {
        self.active_axes().all(|a| self.filters[a.index()].is_none())
    }

    /// Filtered position (and optionally velocity) of one Cartesian axis.
    pub fn axis_position(
        &self,
        moves: &[Move],
        idx: usize,
        axis: Axis,
        move_time: f64,
        velocity: Option<&mut f64>,
    ) -> f64 {
        match &self.filters[axis.index()] {
            AxisFilter::None => {
                if let Some(v) = velocity {
                    *v = axis_velocity_across_moves(moves, idx, axis, move_time);
                }
                axis_position_across_moves(moves, idx, axis, move_time)
            }
            AxisFilter::Smooth(sm) => smooth_axis(moves, idx, axis, move_time, sm, velocity),
            AxisFilter::Shape(sp) => {
                if let Some(v) = velocity {
                    *v = shaper_calc_velocity(moves, idx, axis, move_time, sp);
                }
                shaper_calc_position(moves, idx, axis, move_time, sp)
            }
        }
    }

    /// Actuator position at `move_time` (local to `moves[idx]`). `last_pos`
    /// is the previously commanded actuator position.
    pub fn calc_position(
        &self,
        moves: &[Move],
        idx: usize,
        move_time: f64,
        last_pos: f64,
    ) -> Result<f64, KinematicsError> {
        if let StepperKinematics::Extruder(e) = &self.kinematics {
            return Ok(e.calc_position(moves, idx, move_time));
        }
        let m = &moves[idx];
        if self.is_unfiltered() {
            return self.kinematics.calc_position(m, move_time, last_pos);
        }
        let mut c = m.get_coord(move_time);
        for axis in self.active_axes() {
            if !self.filters[axis.index()].is_none() {
                c.set(axis, self.axis_position(moves, idx, axis, move_time, None));
            }
        }
        self.kinematics.position_at(&c, last_pos)
    }

    /// Actuator position and velocity at `move_time`.
    pub fn calc_sample(
        &self,
        moves: &[Move],
        idx: usize,
        move_time: f64,
        last_pos: f64,
    ) -> Result<ActuatorSample, KinematicsError> {
        if let StepperKinematics::Extruder(e) = &self.kinematics {
            return Ok(ActuatorSample {
                position: e.calc_position(moves, idx, move_time),
                velocity: e.calc_velocity(moves, idx, move_time),
            });
        }
        let m = &moves[idx];
        let mut c = m.get_coord(move_time);
        let mut v = m.get_velocity_coord(move_time);
        for axis in self.active_axes() {
            if !self.filters[axis.index()].is_none() {
                let mut axis_v = 0.0;
                c.set(axis, self.axis_position(moves, idx, axis, move_time, Some(&mut axis_v)));
                v.set(axis, axis_v);
            }
        }
        Ok(ActuatorSample {
            position: self.kinematics.position_at(&c, last_pos)?,
            velocity: self.kinematics.velocity_at(&c, &v)?,
        })
    }

    /// How long before a move starts (`pre_active`) and after it ends
    /// (`post_active`) this actuator can still be moved by it.
    pub fn step_generation_window(&self) -> (f64, f64) {
        if let StepperKinematics::Extruder(e) = &self.kinematics {
            return (e.half_smooth_time(), e.half_smooth_time());
        }
        self.active_axes().fold((0.0f64, 0.0f64), |(pre, post), axis| {
            let (lo, hi) = self.filters[axis.index()].time_span();
            (pre.max(hi), post.max(-lo))
        })
    }

    /// Unfiltered actuator position for a toolhead coordinate.
    pub fn position_at(&self, c: &Coord, last_pos: f64) -> Result<f64, KinematicsError> {
        self.kinematics.position_at(c, last_pos)
    }
}

fn axis_flag(axis: Axis) -> ActiveAxes {
    match axis {
        Axis::X => ActiveAxes::X,
        Axis::Y => ActiveAxes::Y,
        Axis::Z => ActiveAxes::Z,
    }
}

/// Engine configuration shared between query threads. Readers take a
/// snapshot and finish on it even if a new configuration is stored meanwhile.
#[derive(Debug)]
pub struct SharedEngine {
    current: RwLock<Arc<PositionEngine>>,
}

impl SharedEngine {
    pub fn new(engine: PositionEngine) -> Self {
        Self { current: RwLock::new(Arc::new(engine)) }
    }

    pub fn load(&self) -> Arc<PositionEngine> {
        self.current.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Swap in a new configuration, returning the previous one.
    pub fn store(&self, engine: PositionEngine) -> Arc<PositionEngine> {
        let name = engine.kinematics().name();
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let prev = std::mem::replace(&mut *guard, Arc::new(engine));
        tracing::info!("Reconfigured {} stepper position engine", name);
        prev
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motion::kinematics::{CartesianStepper, ExtruderStepper};
    use crate::motion::shaper::ShaperType;
    use crate::motion::smoother::SmootherType;

    fn line() -> Vec<Move> {
        vec![Move::fill(
            0.0,
            0.0,
            1.0,
            0.0,
            Coord::default(),
            Coord::new(1.0, 0.0, 0.0),
            10.0,
            10.0,
            0.0,
        )
        .unwrap()]
    }

    #[test]
    fn test_unfiltered_constant_velocity() {
        let engine = PositionEngine::new(StepperKinematics::Cartesian(CartesianStepper::new(Axis::X)));
        assert_eq!(engine.calc_position(&line(), 0, 0.5, 0.0), Ok(5.0));
    }

    #[test]
    fn test_identity_smoother_is_dropped() {
        let engine = PositionEngine::new(StepperKinematics::Cartesian(CartesianStepper::new(Axis::X)))
            .with_filter(Axis::X, AxisFilter::Smooth(SmootherType::Quartic.build(0.0).unwrap()))
            .unwrap();
        assert!(engine.filter(Axis::X).is_none());
    }

    #[test]
    fn test_extruder_rejects_filters() {
        let mut engine = PositionEngine::new(StepperKinematics::Extruder(ExtruderStepper::new(0.04).unwrap()));
        let sp = ShaperType::Zv.build(40.0, 0.1).unwrap();
        assert_eq!(engine.set_filter(Axis::X, AxisFilter::Shape(sp)), Err(EngineError::FilterOnExtruder));
        assert_eq!(engine.step_generation_window(), (0.02, 0.02));
    }

    #[test]
    fn test_generation_window_ignores_inactive_axes() {
        let sm = SmootherType::Quartic.build(0.04).unwrap();
        let engine = PositionEngine::new(StepperKinematics::Cartesian(CartesianStepper::new(Axis::X)))
            .with_filter(Axis::Y, AxisFilter::Smooth(sm.clone()))
            .unwrap();
        assert_eq!(engine.step_generation_window(), (0.0, 0.0));
        let engine = engine.with_filter(Axis::X, AxisFilter::Smooth(sm)).unwrap();
        assert_eq!(engine.step_generation_window(), (0.02, 0.02));
    }

    #[test]
    fn test_shared_engine_snapshot_survives_swap() {
        let shared = SharedEngine::new(PositionEngine::new(StepperKinematics::Cartesian(
            CartesianStepper::new(Axis::X),
        )));
        let snapshot = shared.load();
        shared.store(PositionEngine::new(StepperKinematics::Cartesian(CartesianStepper::new(Axis::Y))));
        assert_eq!(snapshot.kinematics(), &StepperKinematics::Cartesian(CartesianStepper::new(Axis::X)));
        assert_eq!(shared.load().kinematics(), &StepperKinematics::Cartesian(CartesianStepper::new(Axis::Y)));
    }
}
