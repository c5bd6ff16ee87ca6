// src/motion/smoother.rs - Polynomial smoothing kernels
//
// A smoother is a finite-support weight `W(tau) = sum w_i tau^i` on
// `[-hst, hst]`, normalized to unit integral. The smoothed position of an axis
// at time `T` is `∫ W(tau) x(T + t_offs + tau) dtau`, where `t_offs` centers
// asymmetric kernels so that constant-velocity motion passes unchanged.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::motion::integrate::{calc_antiderivatives, diff_antiderivatives, Antiderivatives};

/// Maximum number of polynomial coefficients in a kernel.
pub const MAX_SMOOTHER_COEFFS: usize = 10;

#[derive(Debug, Error, PartialEq)]
pub enum SmootherError {
    #[error("Smoother needs between 1 and {MAX_SMOOTHER_COEFFS} coefficients, got {0}")]
    InvalidOrder(usize),
    #[error("Smooth time must be finite and >= 0, got {0}")]
    InvalidSmoothTime(f64),
    #[error("Smoother coefficients must be finite")]
    NonFinite,
    #[error("Smoother kernel must have a positive integral")]
    NonPositiveNorm,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Smoother {
    /// `w_i / (i + 1)`: antiderivative coefficients of `W`.
    pub c0: [f64; MAX_SMOOTHER_COEFFS],
    /// `w_i / (i + 2)`: antiderivative coefficients of `tau * W`.
    pub c1: [f64; MAX_SMOOTHER_COEFFS],
    /// `w_i / (i + 3)`: antiderivative coefficients of `tau^2 * W`.
    pub c2: [f64; MAX_SMOOTHER_COEFFS],
    pub hst: f64,
    pub t_offs: f64,
    pub m_hst: Antiderivatives,
    pub p_hst: Antiderivatives,
    pub pm_diff: Antiderivatives,
    n: usize,
    symm: bool,
}

impl Smoother {
    /// A zero-width smoother; positions pass through untouched.
    pub fn identity() -> Self {
        Self {
            c0: [0.0; MAX_SMOOTHER_COEFFS],
            c1: [0.0; MAX_SMOOTHER_COEFFS],
            c2: [0.0; MAX_SMOOTHER_COEFFS],
            hst: 0.0,
            t_offs: 0.0,
            m_hst: Antiderivatives::default(),
            p_hst: Antiderivatives::default(),
            pm_diff: Antiderivatives::default(),
            n: 0,
            symm: true,
        }
    }

    pub fn is_identity(&self) -> bool {
        self.hst == 0.0
    }

    /// Number of kernel coefficients in use.
    pub fn order(&self) -> usize {
        self.n
    }

    /// Whether the kernel is even, i.e. every odd coefficient is zero.
    pub fn is_symmetric(&self) -> bool {
        self.symm
    }

    /// Kernel weight at kernel-local time `tau` (zero outside the support).
    pub fn weight(&self, tau: f64) -> f64 {
        if tau.abs() > self.hst {
            return 0.0;
        }
        // c0[i] * (i + 1) recovers w_i
        (0..self.n)
            .rev()
            .fold(0.0, |acc, i| acc * tau + self.c0[i] * (i + 1) as f64)
    }

    /// Earliest and latest time offsets (relative to the query time) the
    /// kernel reads from.
    pub fn time_span(&self) -> (f64, f64) {
        (self.t_offs - self.hst, self.t_offs + self.hst)
    }
}

/// Build a smoother from the impulse response polynomial `coeffs` defined on
/// the normalized window `u in [-1/2, 1/2]` and stretched over `t_sm` seconds.
pub fn init_smoother(coeffs: &[f64], t_sm: f64) -> Result<Smoother, SmootherError> {
    let n = coeffs.len();
    if n == 0 || n > MAX_SMOOTHER_COEFFS {
        return Err(SmootherError::InvalidOrder(n));
    }
    if !t_sm.is_finite() || t_sm < 0.0 {
        return Err(SmootherError::InvalidSmoothTime(t_sm));
    }
    if coeffs.iter().any(|c| !c.is_finite()) {
        return Err(SmootherError::NonFinite);
    }
    if t_sm == 0.0 {
        return Ok(Smoother::identity());
    }
    let hst = 0.5 * t_sm;

    // Reflect the impulse response (convolution -> correlation) and scale
    // from u to tau = u * t_sm.
    let mut w = [0.0; MAX_SMOOTHER_COEFFS];
    let inv_t_sm = 1.0 / t_sm;
    let mut scale = 1.0;
    for (i, &c) in coeffs.iter().enumerate() {
        w[i] = if i % 2 == 1 { -c * scale } else { c * scale };
        scale *= inv_t_sm;
    }

    // Only even powers contribute to the integral over a symmetric range
    let mut norm = 0.0;
    let mut hst_pow = hst;
    for (i, wi) in w.iter().enumerate().take(n) {
        if i % 2 == 0 {
            norm += 2.0 * wi * hst_pow / (i + 1) as f64;
        }
        hst_pow *= hst;
    }
    if norm <= 0.0 || !norm.is_finite() {
        return Err(SmootherError::NonPositiveNorm);
    }
    let inv_norm = 1.0 / norm;
    w.iter_mut().for_each(|wi| *wi *= inv_norm);

    // First moment; only odd powers contribute
    let mut moment = 0.0;
    let mut hst_pow = hst * hst;
    for (i, wi) in w.iter().enumerate().take(n) {
        if i % 2 == 1 {
            moment += 2.0 * wi * hst_pow / (i + 2) as f64;
        }
        hst_pow *= hst;
    }
    let symm = w.iter().skip(1).step_by(2).all(|&wi| wi == 0.0);

    let mut sm = Smoother::identity();
    sm.n = n;
    sm.hst = hst;
    sm.t_offs = -moment;
    sm.symm = symm;
    for i in 0..n {
        sm.c0[i] = w[i] / (i + 1) as f64;
        sm.c1[i] = w[i] / (i + 2) as f64;
        sm.c2[i] = w[i] / (i + 3) as f64;
    }
    sm.m_hst = calc_antiderivatives(&sm, -hst);
    sm.p_hst = calc_antiderivatives(&sm, hst);
    sm.pm_diff = diff_antiderivatives(&sm.m_hst, &sm.p_hst);
    tracing::debug!(
        "Built smoother: order {}, hst {:.6}s, t_offs {:.6}s, symmetric {}",
        n,
        hst,
        sm.t_offs,
        symm
    );
    Ok(sm)
}

/// Built-in kernel shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SmootherType {
    Boxcar,
    Parabolic,
    Quartic,
    Triweight,
}

impl SmootherType {
    /// Impulse response coefficients on `u in [-1/2, 1/2]`.
    pub fn coeffs(self) -> &'static [f64] {
        match self {
            SmootherType::Boxcar => &[1.0],
            // 1 - 4u^2
            SmootherType::Parabolic => &[1.0, 0.0, -4.0],
            // (1 - 4u^2)^2
            SmootherType::Quartic => &[1.0, 0.0, -8.0, 0.0, 16.0],
            // (1 - 4u^2)^3
            SmootherType::Triweight => &[1.0, 0.0, -12.0, 0.0, 48.0, 0.0, -64.0],
        }
    }

    pub fn build(self, smooth_time: f64) -> Result<Smoother, SmootherError> {
        init_smoother(self.coeffs(), smooth_time)
    }
}
