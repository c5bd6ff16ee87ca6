// src/motion/trapq.rs - Trapezoidal motion segments and the move queue
//
// A `Move` is one planner-issued trapezoid: an acceleration phase, a cruise
// phase and a deceleration phase, each a quadratic in time. Everything
// downstream only ever borrows moves; nothing here allocates once the queue
// has been filled.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Time tolerance used when checking that queued moves are contiguous.
const TIME_EPSILON: f64 = 1e-9;

#[derive(Debug, Error, PartialEq)]
pub enum MoveError {
    #[error("Invalid move timing: {0}")]
    InvalidTiming(String),
    #[error("Move at {start:.6}s starts before previous move ends at {prev_end:.6}s")]
    OutOfOrder { start: f64, prev_end: f64 },
}

/// Cartesian axis selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize, Serialize)]
pub struct Coord {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Coord {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn get(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }

    pub fn set(&mut self, axis: Axis, value: f64) {
        match axis {
            Axis::X => self.x = value,
            Axis::Y => self.y = value,
            Axis::Z => self.z = value,
        }
    }

    pub fn length(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

/// Velocity/acceleration terms of an accelerating phase: `d(t) = (c1 + c2*t) * t`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MoveAccel {
    pub c1: f64,
    pub c2: f64,
}

impl MoveAccel {
    #[inline]
    fn eval(&self, t: f64) -> f64 {
        (self.c1 + self.c2 * t) * t
    }

    #[inline]
    fn eval_velocity(&self, t: f64) -> f64 {
        self.c1 + 2.0 * self.c2 * t
    }
}

/// The three constant-acceleration pieces of a move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Accel,
    Cruise,
    Decel,
}

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::Accel, Phase::Cruise, Phase::Decel];
}

/// One constant-acceleration piece of a move, in move distance:
/// `d(t) = start_d + start_v*t + half_accel*t^2` for `t` in `[0, duration]`
/// measured from `start_t` (move-local time).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MovePhase {
    pub start_t: f64,
    pub duration: f64,
    pub start_d: f64,
    pub start_v: f64,
    pub half_accel: f64,
}

/// Quadratic position polynomial of one axis over one phase:
/// `pos + v*t + half_accel*t^2`, `t` local to the phase.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AxisPoly {
    pub pos: f64,
    pub v: f64,
    pub half_accel: f64,
}

impl AxisPoly {
    pub fn stationary(pos: f64) -> Self {
        Self { pos, v: 0.0, half_accel: 0.0 }
    }

    #[inline]
    pub fn eval(&self, t: f64) -> f64 {
        self.pos + (self.v + self.half_accel * t) * t
    }
}

/// A planned trapezoidal move.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Move {
    pub print_time: f64,
    pub move_t: f64,
    pub accel_t: f64,
    pub cruise_t: f64,
    pub decel_t: f64,
    pub cruise_start_d: f64,
    pub decel_start_d: f64,
    pub cruise_v: f64,
    pub accel: MoveAccel,
    pub decel: MoveAccel,
    pub start_pos: Coord,
    pub axes_r: Coord,
}

fn check_timing(accel_t: f64, cruise_t: f64, decel_t: f64) -> Result<(), MoveError> {
    for (name, t) in [("accel_t", accel_t), ("cruise_t", cruise_t), ("decel_t", decel_t)] {
        if !t.is_finite() || t < 0.0 {
            return Err(MoveError::InvalidTiming(format!("{} must be finite and >= 0, got {}", name, t)));
        }
    }
    Ok(())
}

impl Move {
    /// Build a toolhead move travelling along `axes_d` from `start_pos`.
    #[allow(clippy::too_many_arguments)]
    pub fn fill(
        print_time: f64,
        accel_t: f64,
        cruise_t: f64,
        decel_t: f64,
        start_pos: Coord,
        axes_d: Coord,
        start_v: f64,
        cruise_v: f64,
        accel: f64,
    ) -> Result<Self, MoveError> {
        check_timing(accel_t, cruise_t, decel_t)?;
        let move_d = axes_d.length();
        let inv_move_d = if move_d > 0.0 { 1.0 / move_d } else { 0.0 };
        let cruise_start_d = accel_t * 0.5 * (cruise_v + start_v);
        Ok(Self {
            print_time,
            move_t: accel_t + cruise_t + decel_t,
            accel_t,
            cruise_t,
            decel_t,
            cruise_start_d,
            decel_start_d: cruise_start_d + cruise_t * cruise_v,
            cruise_v,
            accel: MoveAccel { c1: start_v, c2: 0.5 * accel },
            decel: MoveAccel { c1: cruise_v, c2: -0.5 * accel },
            start_pos,
            axes_r: Coord::new(axes_d.x * inv_move_d, axes_d.y * inv_move_d, axes_d.z * inv_move_d),
        })
    }

    /// Build an extruder move. The pressure advance velocity deltas are
    /// folded into the accel/decel phases; the cruise phase restarts from the
    /// nominal (un-advanced) distance.
    #[allow(clippy::too_many_arguments)]
    pub fn extruder_fill(
        print_time: f64,
        accel_t: f64,
        cruise_t: f64,
        decel_t: f64,
        start_pos: f64,
        start_v: f64,
        cruise_v: f64,
        accel: f64,
        extra_accel_v: f64,
        extra_decel_v: f64,
    ) -> Result<Self, MoveError> {
        let mut m = Self::fill(
            print_time,
            accel_t,
            cruise_t,
            decel_t,
            Coord::new(start_pos, 0.0, 0.0),
            Coord::new(1.0, 0.0, 0.0),
            start_v,
            cruise_v,
            accel,
        )?;
        m.accel.c1 = start_v + extra_accel_v;
        m.decel.c1 = cruise_v + extra_decel_v;
        Ok(m)
    }

    /// A move that holds `pos` for `duration` seconds.
    pub fn stationary(print_time: f64, duration: f64, pos: Coord) -> Result<Self, MoveError> {
        Self::fill(print_time, 0.0, duration, 0.0, pos, Coord::default(), 0.0, 0.0, 0.0)
    }

    pub fn end_time(&self) -> f64 {
        self.print_time + self.move_t
    }

    /// Distance travelled along the move at `move_time`.
    pub fn get_distance(&self, move_time: f64) -> f64 {
        if move_time < self.accel_t {
            return self.accel.eval(move_time);
        }
        let move_time = move_time - self.accel_t;
        if move_time <= self.cruise_t {
            return self.cruise_start_d + self.cruise_v * move_time;
        }
        self.decel_start_d + self.decel.eval(move_time - self.cruise_t)
    }

    pub fn get_velocity(&self, move_time: f64) -> f64 {
        if move_time < self.accel_t {
            return self.accel.eval_velocity(move_time);
        }
        let move_time = move_time - self.accel_t;
        if move_time <= self.cruise_t {
            return self.cruise_v;
        }
        self.decel.eval_velocity(move_time - self.cruise_t)
    }

    pub fn get_coord(&self, move_time: f64) -> Coord {
        let d = self.get_distance(move_time);
        Coord::new(
            self.start_pos.x + self.axes_r.x * d,
            self.start_pos.y + self.axes_r.y * d,
            self.start_pos.z + self.axes_r.z * d,
        )
    }

    pub fn get_velocity_coord(&self, move_time: f64) -> Coord {
        let v = self.get_velocity(move_time);
        Coord::new(self.axes_r.x * v, self.axes_r.y * v, self.axes_r.z * v)
    }

    pub fn end_coord(&self) -> Coord {
        self.get_coord(self.move_t)
    }

    pub fn phase(&self, phase: Phase) -> MovePhase {
        match phase {
            Phase::Accel => MovePhase {
                start_t: 0.0,
                duration: self.accel_t,
                start_d: 0.0,
                start_v: self.accel.c1,
                half_accel: self.accel.c2,
            },
            Phase::Cruise => MovePhase {
                start_t: self.accel_t,
                duration: self.cruise_t,
                start_d: self.cruise_start_d,
                start_v: self.cruise_v,
                half_accel: 0.0,
            },
            Phase::Decel => MovePhase {
                start_t: self.accel_t + self.cruise_t,
                duration: self.decel_t,
                start_d: self.decel_start_d,
                start_v: self.decel.c1,
                half_accel: self.decel.c2,
            },
        }
    }

    pub fn phases(&self) -> [MovePhase; 3] {
        Phase::ALL.map(|p| self.phase(p))
    }

    /// Position polynomial of `axis` over `phase`, local to the phase start.
    pub fn axis_poly(&self, axis: Axis, phase: &MovePhase) -> AxisPoly {
        let r = self.axes_r.get(axis);
        AxisPoly {
            pos: self.start_pos.get(axis) + r * phase.start_d,
            v: r * phase.start_v,
            half_accel: r * phase.half_accel,
        }
    }
}

/// Where a time offset from a given move lands in a move slice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Seek {
    /// Inside `moves[index]` at the given move-local time.
    Inside(usize, f64),
    /// Before the first queued move.
    Before,
    /// After the last queued move.
    After,
}

/// Walk from `moves[idx]` to the move covering `move_time` (which is local
/// to `moves[idx]` and may lie outside it).
pub fn seek(moves: &[Move], mut idx: usize, mut move_time: f64) -> Seek {
    while move_time < 0.0 {
        if idx == 0 {
            return Seek::Before;
        }
        idx -= 1;
        move_time += moves[idx].move_t;
    }
    while move_time > moves[idx].move_t {
        if idx + 1 >= moves.len() {
            return Seek::After;
        }
        move_time -= moves[idx].move_t;
        idx += 1;
    }
    Seek::Inside(idx, move_time)
}

/// Unsmoothed axis position at `move_time` relative to `moves[idx]`,
/// holding still outside the queued range.
pub fn axis_position_across_moves(moves: &[Move], idx: usize, axis: Axis, move_time: f64) -> f64 {
    match seek(moves, idx, move_time) {
        Seek::Inside(i, t) => {
            let m = &moves[i];
            m.start_pos.get(axis) + m.axes_r.get(axis) * m.get_distance(t)
        }
        Seek::Before => moves[0].start_pos.get(axis),
        Seek::After => moves[moves.len() - 1].end_coord().get(axis),
    }
}

/// Unsmoothed axis velocity at `move_time` relative to `moves[idx]`.
pub fn axis_velocity_across_moves(moves: &[Move], idx: usize, axis: Axis, move_time: f64) -> f64 {
    match seek(moves, idx, move_time) {
        Seek::Inside(i, t) => moves[i].axes_r.get(axis) * moves[i].get_velocity(t),
        Seek::Before | Seek::After => 0.0,
    }
}

/// A constant-acceleration piece of the trajectory that overlaps a window.
///
/// All times are relative to the start of the move the window was taken
/// from. `poly` is local to `start`; `[lo, hi]` is the overlap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowPiece {
    pub poly: AxisPoly,
    pub start: f64,
    pub lo: f64,
    pub hi: f64,
}

/// Visit every phase of `moves` overlapping `[lo, hi]` (relative to the
/// start of `moves[idx]`), in time order. Parts of the window outside the
/// queued range are reported as stationary pieces.
pub fn for_each_piece(
    moves: &[Move],
    idx: usize,
    axis: Axis,
    lo: f64,
    hi: f64,
    mut f: impl FnMut(&WindowPiece),
) {
    let mut j = idx;
    let mut off = 0.0;
    while lo < off && j > 0 {
        j -= 1;
        off -= moves[j].move_t;
    }
    if lo < off {
        let pos = moves[0].start_pos.get(axis);
        f(&WindowPiece { poly: AxisPoly::stationary(pos), start: lo, lo, hi: hi.min(off) });
    }
    while j < moves.len() && off < hi {
        let m = &moves[j];
        for phase in m.phases() {
            if phase.duration <= 0.0 {
                continue;
            }
            let start = off + phase.start_t;
            let piece_lo = start.max(lo);
            let piece_hi = (start + phase.duration).min(hi);
            if piece_hi > piece_lo {
                f(&WindowPiece { poly: m.axis_poly(axis, &phase), start, lo: piece_lo, hi: piece_hi });
            }
        }
        off += m.move_t;
        j += 1;
    }
    if j == moves.len() && off < hi {
        let pos = moves[moves.len() - 1].end_coord().get(axis);
        let piece_lo = off.max(lo);
        f(&WindowPiece { poly: AxisPoly::stationary(pos), start: piece_lo, lo: piece_lo, hi });
    }
}

/// Time-ordered queue of planned moves.
#[derive(Debug, Clone, Default)]
pub struct TrapQ {
    moves: Vec<Move>,
}

impl TrapQ {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a move. Gaps after the previous move are filled with a
    /// stationary move so the queue stays contiguous in time.
    pub fn append(&mut self, m: Move) -> Result<(), MoveError> {
        if let Some(prev) = self.moves.last() {
            let prev_end = prev.end_time();
            if m.print_time < prev_end - TIME_EPSILON {
                return Err(MoveError::OutOfOrder { start: m.print_time, prev_end });
            }
            let gap = m.print_time - prev_end;
            if gap > TIME_EPSILON {
                let fill = Move::stationary(prev_end, gap, prev.end_coord())?;
                tracing::debug!("Filling {:.6}s gap before move at {:.6}s", gap, m.print_time);
                self.moves.push(fill);
            }
        }
        self.moves.push(m);
        Ok(())
    }

    pub fn moves(&self) -> &[Move] {
        &self.moves
    }

    pub fn len(&self) -> usize {
        self.moves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    /// Locate the move active at `print_time`. Returns the index and the
    /// move-local time.
    pub fn find(&self, print_time: f64) -> Option<(usize, f64)> {
        let first = self.moves.first()?;
        let last = self.moves.last()?;
        if print_time < first.print_time || print_time > last.end_time() {
            return None;
        }
        let idx = self
            .moves
            .partition_point(|m| m.print_time <= print_time)
            .saturating_sub(1);
        Some((idx, print_time - self.moves[idx].print_time))
    }

    /// Drop moves that ended before `clear_time`. Returns how many were removed.
    pub fn finalize_moves(&mut self, clear_time: f64) -> usize {
        let keep_from = self.moves.partition_point(|m| m.end_time() < clear_time);
        // Always retain the last move so the queue keeps its end position.
        let drop = keep_from.min(self.moves.len().saturating_sub(1));
        self.moves.drain(..drop);
        drop
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trapezoid() -> Move {
        // 0 -> 100 mm/s over 0.1s, cruise 0.2s, decel 0.1s, accel 1000 mm/s^2
        Move::fill(
            1.0,
            0.1,
            0.2,
            0.1,
            Coord::new(10.0, 20.0, 0.0),
            Coord::new(3.0, 4.0, 0.0),
            0.0,
            100.0,
            1000.0,
        )
        .unwrap()
    }

    #[test]
    fn test_move_fill_normalizes_direction() {
        let m = trapezoid();
        assert!((m.axes_r.x - 0.6).abs() < 1e-12);
        assert!((m.axes_r.y - 0.8).abs() < 1e-12);
        assert!((m.move_t - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_distance_is_continuous_across_phases() {
        let m = trapezoid();
        let eps = 1e-9;
        for t in [m.accel_t, m.accel_t + m.cruise_t] {
            let before = m.get_distance(t - eps);
            let after = m.get_distance(t + eps);
            assert!((before - after).abs() < 1e-6, "jump at {}: {} vs {}", t, before, after);
        }
        assert!((m.get_distance(m.move_t) - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_phase_polys_match_get_coord() {
        let m = trapezoid();
        for phase in m.phases() {
            let poly = m.axis_poly(Axis::Y, &phase);
            let t = 0.5 * phase.duration;
            let expected = m.get_coord(phase.start_t + t).y;
            assert!((poly.eval(t) - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn test_extruder_fill_applies_pressure_advance() {
        let m = Move::extruder_fill(0.0, 0.1, 0.1, 0.1, 5.0, 0.0, 10.0, 100.0, 2.0, -2.0).unwrap();
        assert_eq!(m.get_velocity(0.0), 2.0);
        assert_eq!(m.get_velocity(0.15), 10.0);
        assert!((m.get_velocity(0.2 + 1e-12) - 8.0).abs() < 1e-9);
        assert_eq!(m.axes_r, Coord::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn test_negative_duration_rejected() {
        let err = Move::fill(0.0, -0.1, 0.0, 0.0, Coord::default(), Coord::default(), 0.0, 0.0, 0.0);
        assert!(matches!(err, Err(MoveError::InvalidTiming(_))));
    }

    #[test]
    fn test_trapq_fills_gaps_and_rejects_overlap() {
        let mut tq = TrapQ::new();
        let a = Move::fill(0.0, 0.0, 1.0, 0.0, Coord::default(), Coord::new(1.0, 0.0, 0.0), 5.0, 5.0, 0.0).unwrap();
        let b = Move::fill(1.5, 0.0, 1.0, 0.0, Coord::new(5.0, 0.0, 0.0), Coord::new(1.0, 0.0, 0.0), 5.0, 5.0, 0.0).unwrap();
        tq.append(a).unwrap();
        tq.append(b).unwrap();
        assert_eq!(tq.len(), 3);
        assert_eq!(tq.moves()[1].get_coord(0.25).x, 5.0);

        let late = Move::stationary(2.0, 1.0, Coord::default()).unwrap();
        assert!(matches!(tq.append(late), Err(MoveError::OutOfOrder { .. })));
    }

    #[test]
    fn test_trapq_find_and_finalize() {
        let mut tq = TrapQ::new();
        for i in 0..4 {
            let m = Move::stationary(i as f64, 1.0, Coord::new(i as f64, 0.0, 0.0)).unwrap();
            tq.append(m).unwrap();
        }
        assert_eq!(tq.find(2.25), Some((2, 0.25)));
        assert_eq!(tq.find(-1.0), None);
        assert_eq!(tq.finalize_moves(2.5), 2);
        assert_eq!(tq.moves()[0].print_time, 2.0);
    }

    #[test]
    fn test_seek_walks_neighbours() {
        let moves: Vec<Move> = (0..3)
            .map(|i| Move::stationary(i as f64, 1.0, Coord::new(i as f64, 0.0, 0.0)).unwrap())
            .collect();
        assert_eq!(seek(&moves, 1, -0.5), Seek::Inside(0, 0.5));
        assert_eq!(seek(&moves, 1, 1.5), Seek::Inside(2, 0.5));
        assert_eq!(seek(&moves, 0, -0.1), Seek::Before);
        assert_eq!(seek(&moves, 2, 1.1), Seek::After);
        assert_eq!(axis_position_across_moves(&moves, 1, Axis::X, 5.0), 2.0);
    }

    #[test]
    fn test_for_each_piece_covers_window() {
        let moves = vec![trapezoid()];
        let mut pieces = Vec::new();
        for_each_piece(&moves, 0, Axis::X, -0.05, 0.45, |p| pieces.push(*p));
        // stationary before, accel, cruise, decel, stationary after
        assert_eq!(pieces.len(), 5);
        let covered: f64 = pieces.iter().map(|p| p.hi - p.lo).sum();
        assert!((covered - 0.5).abs() < 1e-12);
        assert_eq!(pieces[0].poly, AxisPoly::stationary(10.0));
        assert!((pieces[4].poly.pos - moves[0].end_coord().x).abs() < 1e-12);
        for w in pieces.windows(2) {
            assert!((w[0].hi - w[1].lo).abs() < 1e-12);
        }
    }
}
