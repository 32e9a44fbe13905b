//! Expert distributions.
//!
//! Every mixture component is described, per response dimension, by an
//! [`Expert`]: an immutable parametric distribution with a uniform numerical
//! contract. The E-step and the ECM driver only ever talk to `dyn Expert`, so
//! adding a family means implementing the trait and nothing else.
//!
//! Conventions shared by all families:
//!
//! - out-of-support points have density 0 (`-inf` in log space), never an error
//! - `+inf` has log-density `-inf` and CDF 1
//! - supports lie in `[0, inf)`
//! - discrete families treat interval lower bounds as inclusive
//! - construction validates parameters and fails with a domain error

use std::fmt;
use std::sync::Arc;

use rand::RngCore;

use crate::domain::{ExpertKind, Interval, MStepOptions};
use crate::error::Result;
use crate::math::{log1mexp, log_sub_exp};

pub mod gamma;
pub mod kind;
pub mod lognormal;
pub mod negbin;
pub mod numeric;
pub mod poisson;
pub mod weibull;
pub mod zero_inflated;

pub use gamma::GammaExpert;
pub use lognormal::LogNormalExpert;
pub use negbin::NegativeBinomialExpert;
pub use poisson::PoissonExpert;
pub use weibull::WeibullExpert;
pub use zero_inflated::ZeroInflated;

/// Shared handle to an expert.
pub type ExpertRef = Arc<dyn Expert>;

/// Per-observation weights one expert receives from the E-step.
///
/// - `observed`: responsibility of this component for the observed value
/// - `tail_out`: latent truncated-away mass lying outside this dimension's
///   truncation window
/// - `tail_in`: latent truncated-away mass lying inside this dimension's
///   window (it was truncated by another dimension)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpertWeights {
    pub observed: Vec<f64>,
    pub tail_out: Vec<f64>,
    pub tail_in: Vec<f64>,
}

impl ExpertWeights {
    pub fn zeros(n: usize) -> Self {
        Self {
            observed: vec![0.0; n],
            tail_out: vec![0.0; n],
            tail_in: vec![0.0; n],
        }
    }

    /// Weights for exact, untruncated data: responsibilities only.
    pub fn observed_only(observed: Vec<f64>) -> Self {
        let n = observed.len();
        Self {
            observed,
            tail_out: vec![0.0; n],
            tail_in: vec![0.0; n],
        }
    }

    pub fn len(&self) -> usize {
        self.observed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observed.is_empty()
    }

    /// Total mass across all three parts.
    pub fn total(&self) -> f64 {
        self.observed.iter().sum::<f64>()
            + self.tail_out.iter().sum::<f64>()
            + self.tail_in.iter().sum::<f64>()
    }
}

/// Gamma-kernel log-prior `(shape - 1) ln x - x / scale` on a positive
/// parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GammaPrior {
    pub shape: f64,
    pub scale: f64,
}

impl GammaPrior {
    pub const DEFAULT: GammaPrior = GammaPrior {
        shape: 2.0,
        scale: 10.0,
    };

    pub fn log_kernel(&self, x: f64) -> f64 {
        (self.shape - 1.0) * x.ln() - x / self.scale
    }
}

/// The numerical contract every expert family implements.
pub trait Expert: fmt::Debug + Send + Sync {
    fn kind(&self) -> ExpertKind;

    /// Parameters in the order of `ExpertKind::param_names`.
    fn params(&self) -> Vec<f64>;

    fn n_params(&self) -> usize {
        self.kind().param_count()
    }

    fn is_discrete(&self) -> bool {
        self.kind().is_discrete()
    }

    /// Log density (continuous) or log mass (discrete).
    fn log_density(&self, x: f64) -> f64;

    /// `ln P(Y <= x)`.
    fn log_cdf(&self, x: f64) -> f64;

    /// `ln P(Y > x)`.
    fn log_sf(&self, x: f64) -> f64;

    fn density(&self, x: f64) -> f64 {
        self.log_density(x).exp()
    }

    fn cdf(&self, x: f64) -> f64 {
        self.log_cdf(x).exp()
    }

    /// `ln P(lo <= Y <= hi)`.
    ///
    /// Zero-width intervals of a continuous family have probability 0.
    fn log_interval_prob(&self, lo: f64, hi: f64) -> f64 {
        if lo.is_nan() || hi.is_nan() || hi < lo {
            return f64::NEG_INFINITY;
        }
        if self.is_discrete() {
            let lo = lo.ceil();
            let hi = hi.floor();
            if hi < lo {
                return f64::NEG_INFINITY;
            }
            return log_prob_between(self, lo - 1.0, hi);
        }
        if lo == hi {
            return f64::NEG_INFINITY;
        }
        log_prob_between(self, lo, hi)
    }

    /// Log-likelihood numerator: density for exact values, interval
    /// probability otherwise. Ignores truncation.
    fn observed_loglik(&self, y: &Interval) -> f64 {
        if y.is_exact() {
            self.log_density(y.yl)
        } else {
            self.log_interval_prob(y.yl, y.yu)
        }
    }

    /// `ln P(tl <= Y <= tu)`; exactly 0 when the window covers the support.
    ///
    /// Every family is supported on `[0, inf)`.
    fn truncated_loglik(&self, tl: f64, tu: f64) -> f64 {
        if tl <= 0.0 && tu == f64::INFINITY {
            return 0.0;
        }
        self.log_interval_prob(tl, tu)
    }

    /// `ln(1 - P(tl <= Y <= tu))`.
    fn truncated_tail_loglik(&self, tl: f64, tu: f64) -> f64 {
        log1mexp(self.truncated_loglik(tl, tu))
    }

    /// Log-likelihood of one censored, truncated observation.
    ///
    /// `-inf` (never NaN) when the observation or the truncation window has
    /// zero probability.
    fn censored_loglik(&self, y: &Interval) -> f64 {
        let num = self.observed_loglik(y);
        if num == f64::NEG_INFINITY || num.is_nan() {
            return f64::NEG_INFINITY;
        }
        let den = self.truncated_loglik(y.tl, y.tu);
        if den == f64::NEG_INFINITY || den.is_nan() {
            return f64::NEG_INFINITY;
        }
        num - den
    }

    /// Exposure-scaled copy for families whose rate/size scales with
    /// exposure; `None` means exposure does not change the distribution.
    fn exposurize(&self, _exposure: f64) -> Option<ExpertRef> {
        None
    }

    /// Log-prior used as the penalty term.
    fn log_prior(&self) -> f64 {
        0.0
    }

    /// Return a new expert maximizing the (penalized) expected complete-data
    /// log-likelihood under `weights`.
    fn m_step(
        &self,
        obs: &[Interval],
        exposure: &[f64],
        weights: &ExpertWeights,
        opts: &MStepOptions,
    ) -> Result<ExpertRef>;

    fn simulate(&self, rng: &mut dyn RngCore) -> f64;

    fn mean(&self) -> f64;

    fn variance(&self) -> f64;

    fn quantile(&self, p: f64) -> f64;

    /// `E[min(Y, u)]`.
    fn limited_expected_value(&self, u: f64) -> f64;
}

/// `ln P(a < Y <= b)`.
///
/// CDF differences in the lower half of the distribution, survival
/// differences in the upper half.
pub(crate) fn log_prob_between<E: Expert + ?Sized>(d: &E, a: f64, b: f64) -> f64 {
    if b == f64::INFINITY {
        return d.log_sf(a);
    }
    let lcb = d.log_cdf(b);
    if a == f64::NEG_INFINITY {
        return lcb;
    }
    if lcb < -std::f64::consts::LN_2 {
        log_sub_exp(lcb, d.log_cdf(a))
    } else {
        log_sub_exp(d.log_sf(a), d.log_sf(b))
    }
}

/// Apply exposure to a shared expert, keeping the original when exposure
/// does not matter.
pub fn with_exposure(expert: &ExpertRef, exposure: f64) -> ExpertRef {
    if exposure == 1.0 {
        return Arc::clone(expert);
    }
    expert.exposurize(exposure).unwrap_or_else(|| Arc::clone(expert))
}

/// Smallest integer `k >= 0` with `cdf(k) >= p`.
pub(crate) fn discrete_quantile(cdf: impl Fn(f64) -> f64, p: f64, hint: f64) -> f64 {
    if p <= 0.0 {
        return 0.0;
    }
    if p >= 1.0 {
        return f64::INFINITY;
    }
    let mut hi = hint.ceil().max(1.0);
    while cdf(hi) < p {
        hi *= 2.0;
        if hi > 1e15 {
            return f64::INFINITY;
        }
    }
    let mut lo = -1.0;
    // Invariant: cdf(lo) < p <= cdf(hi).
    while hi - lo > 1.0 {
        let mid = ((lo + hi) / 2.0).floor();
        if cdf(mid) >= p {
            hi = mid;
        } else {
            lo = mid;
        }
    }
    hi
}

/// Quantile of a continuous distribution on `(0, inf)` by bisection on the CDF.
pub(crate) fn continuous_quantile(cdf: impl Fn(f64) -> f64, p: f64, hint: f64) -> f64 {
    if p <= 0.0 {
        return 0.0;
    }
    if p >= 1.0 {
        return f64::INFINITY;
    }
    let mut hi = hint.max(1e-8);
    while cdf(hi) < p {
        hi *= 2.0;
        if !hi.is_finite() {
            return f64::INFINITY;
        }
    }
    let mut lo = 0.0;
    for _ in 0..200 {
        let mid = 0.5 * (lo + hi);
        if cdf(mid) >= p {
            hi = mid;
        } else {
            lo = mid;
        }
        if hi - lo <= 1e-12 * hi.max(1e-300) {
            break;
        }
    }
    0.5 * (lo + hi)
}

/// `E[min(Y, u)]` for a discrete family on the non-negative integers.
pub(crate) fn discrete_limited_expectation<E: Expert + ?Sized>(d: &E, u: f64) -> f64 {
    if u <= 0.0 {
        return u;
    }
    if u == f64::INFINITY {
        return d.mean();
    }
    // Y <= k  <=>  Y < u.
    let k = u.ceil() - 1.0;
    let upper = d.quantile(1.0 - 1e-15).min(k);
    let mut acc = 0.0;
    let mut y = 1.0;
    while y <= upper {
        acc += y * d.density(y);
        y += 1.0;
    }
    acc + u * d.log_sf(k).exp()
}
