// src/motion/integrate.rs - Closed-form integration of motion polynomials against smoothing kernels
//
// Two flavours live here:
//  * the fixed quartic bump `w(t) = (t^2 - hst^2)^2`, used by extruder
//    pressure advance smoothing (`integrate_weighted`);
//  * general polynomial kernels described by a `Smoother`, evaluated as
//    antiderivative triples that callers difference and feed to
//    `integrate_move`.
//
// Nothing in this module allocates or iterates beyond fixed-size Horner loops.

use crate::motion::smoother::Smoother;
use crate::motion::trapq::AxisPoly;

/// Inverse of `∫ (t^2 - hst^2)^2 dt` over `[-hst, hst]`, i.e. `15 / (16 hst^5)`.
///
/// Returns `None` for a degenerate kernel (`hst <= 0`), which callers must
/// treat as "no smoothing".
#[inline]
pub fn calc_inv_norm(hst: f64) -> Option<f64> {
    if hst > 0.0 {
        let hst2 = hst * hst;
        Some(15.0 / (16.0 * hst2 * hst2 * hst))
    } else {
        None
    }
}

/// Antiderivative of `(t^2 - hst^2)^2`.
#[inline]
pub fn iwt0(t: f64, hst2: f64) -> f64 {
    let t2 = t * t;
    t * (hst2 * hst2 + t2 * (-(2.0 / 3.0) * hst2 + t2 * (1.0 / 5.0)))
}

/// Antiderivative of `t * (t^2 - hst^2)^2`.
#[inline]
pub fn iwt1(t: f64, hst2: f64) -> f64 {
    let t2 = t * t;
    t2 * (0.5 * hst2 * hst2 + t2 * (-0.5 * hst2 + t2 * (1.0 / 6.0)))
}

/// Antiderivative of `t^2 * (t^2 - hst^2)^2`.
#[inline]
pub fn iwt2(t: f64, hst2: f64) -> f64 {
    let t2 = t * t;
    t * t2 * ((1.0 / 3.0) * hst2 * hst2 + t2 * (-(2.0 / 5.0) * hst2 + t2 * (1.0 / 7.0)))
}

/// A quadratic `pos + start_v*t + half_accel*t^2` together with an
/// integration range, both on the same time axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CenteredPoly {
    pub pos: f64,
    pub start_v: f64,
    pub half_accel: f64,
    pub start: f64,
    pub end: f64,
}

/// Substitute `tau = t + toff` so a kernel centered at `t = -toff` becomes
/// centered at the origin. The polynomial coefficients pick up closed-form
/// corrections and the range is shifted by `toff`; the integrand value at
/// corresponding points is unchanged.
#[inline]
pub fn center_kernel(
    pos: f64,
    start_v: f64,
    half_accel: f64,
    start: f64,
    end: f64,
    toff: f64,
) -> CenteredPoly {
    CenteredPoly {
        pos: pos + (half_accel * toff - start_v) * toff,
        start_v: start_v - 2.0 * half_accel * toff,
        half_accel,
        start: start + toff,
        end: end + toff,
    }
}

/// `∫[start, end] (pos + start_v*t + half_accel*t^2) * w(t + toff) dt` with
/// `w(tau) = (tau^2 - hst^2)^2` on `|tau| <= hst` and zero elsewhere.
///
/// The result is not normalized; multiply by `calc_inv_norm(hst)` for a
/// weighted average. A degenerate kernel (`hst <= 0` or NaN) integrates to 0.
#[inline]
pub fn integrate_weighted(
    pos: f64,
    start_v: f64,
    half_accel: f64,
    start: f64,
    end: f64,
    toff: f64,
    hst: f64,
) -> f64 {
    if !(hst > 0.0) {
        return 0.0;
    }
    let c = center_kernel(pos, start_v, half_accel, start, end, toff);
    let start = c.start.clamp(-hst, hst);
    let end = c.end.clamp(-hst, hst);
    if start == end {
        return 0.0;
    }
    let hst2 = hst * hst;
    c.pos * (iwt0(end, hst2) - iwt0(start, hst2))
        + c.start_v * (iwt1(end, hst2) - iwt1(start, hst2))
        + c.half_accel * (iwt2(end, hst2) - iwt2(start, hst2))
}

/// Antiderivatives of `W(t)`, `t*W(t)` and `t^2*W(t)` evaluated at one point.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Antiderivatives {
    pub it0: f64,
    pub it1: f64,
    pub it2: f64,
}

impl std::ops::Add for Antiderivatives {
    type Output = Antiderivatives;

    fn add(self, rhs: Antiderivatives) -> Antiderivatives {
        Antiderivatives {
            it0: self.it0 + rhs.it0,
            it1: self.it1 + rhs.it1,
            it2: self.it2 + rhs.it2,
        }
    }
}

#[inline]
fn horner(c: &[f64], t: f64) -> f64 {
    c.iter().rev().fold(0.0, |acc, &ci| acc * t + ci)
}

/// Horner over the even-power coefficients only, in `t^2`.
#[inline]
fn horner_even(c: &[f64], t2: f64) -> f64 {
    c.iter().step_by(2).rev().fold(0.0, |acc, &ci| acc * t2 + ci)
}

/// Evaluate the smoother's antiderivative triple at kernel-local time `t`.
#[inline]
pub fn calc_antiderivatives(sm: &Smoother, t: f64) -> Antiderivatives {
    let n = sm.order();
    let t2 = t * t;
    if sm.is_symmetric() {
        // Odd coefficients are all zero
        return Antiderivatives {
            it0: horner_even(&sm.c0[..n], t2) * t,
            it1: horner_even(&sm.c1[..n], t2) * t2,
            it2: horner_even(&sm.c2[..n], t2) * t2 * t,
        };
    }
    Antiderivatives {
        it0: horner(&sm.c0[..n], t) * t,
        it1: horner(&sm.c1[..n], t) * t2,
        it2: horner(&sm.c2[..n], t) * t2 * t,
    }
}

/// Definite integral triple over `[a, b]` given the evaluations at `a` and `b`.
#[inline]
pub fn diff_antiderivatives(a: &Antiderivatives, b: &Antiderivatives) -> Antiderivatives {
    Antiderivatives {
        it0: b.it0 - a.it0,
        it1: b.it1 - a.it1,
        it2: b.it2 - a.it2,
    }
}

/// Integrate one phase polynomial against a kernel whose center sits at
/// phase-local time `t0`, over the range whose antiderivative difference is
/// `s`. `base` is subtracted from the polynomial to keep the sum small.
///
/// When `smooth_velocity` is given, the matching velocity integral is added
/// to it.
#[inline]
pub fn integrate_move(
    poly: &AxisPoly,
    base: f64,
    t0: f64,
    s: &Antiderivatives,
    smooth_velocity: Option<&mut f64>,
) -> f64 {
    // Re-express the polynomial in kernel-local time tau = t - t0
    let half_accel = poly.half_accel;
    let start_v = poly.v + 2.0 * half_accel * t0;
    let pos = poly.pos - base + (poly.v + half_accel * t0) * t0;
    if let Some(sv) = smooth_velocity {
        *sv += start_v * s.it0 + 2.0 * half_accel * s.it1;
    }
    pos * s.it0 + start_v * s.it1 + half_accel * s.it2
}
