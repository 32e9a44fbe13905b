//! Log-normal expert with closed-form censored/truncated M-step.
//!
//! On the log scale the complete data are normal, so the update only needs the
//! conditional first and second moments of `ln Y` over each region. Those are
//! truncated-normal moments computed in [`crate::math::normal`].

use std::sync::Arc;

use rand::RngCore;
use rand_distr::{Distribution, LogNormal};

use crate::domain::{ExpertKind, Interval, MStepOptions};
use crate::error::{LrmoeError, Result};
use crate::experts::{Expert, ExpertRef, ExpertWeights};
use crate::math::normal;

/// Prior: `meanlog ~ N(0, MEANLOG_SD²)`, `sdlog² ~ InvGamma(SHAPE, RATE)`.
const MEANLOG_SD: f64 = 10.0;
const VAR_PRIOR_SHAPE: f64 = 1.0;
const VAR_PRIOR_RATE: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogNormalExpert {
    meanlog: f64,
    sdlog: f64,
}

impl LogNormalExpert {
    pub fn new(meanlog: f64, sdlog: f64) -> Result<Self> {
        if !meanlog.is_finite() {
            return Err(LrmoeError::domain(
                "LogNormal",
                format!("meanlog must be finite, got {meanlog}"),
            ));
        }
        if !(sdlog.is_finite() && sdlog > 0.0) {
            return Err(LrmoeError::domain(
                "LogNormal",
                format!("sdlog must be finite and > 0, got {sdlog}"),
            ));
        }
        Ok(Self { meanlog, sdlog })
    }

    pub fn meanlog(&self) -> f64 {
        self.meanlog
    }

    pub fn sdlog(&self) -> f64 {
        self.sdlog
    }

    /// Standardized log value; `-inf` at 0.
    fn z(&self, x: f64) -> f64 {
        if x <= 0.0 {
            return f64::NEG_INFINITY;
        }
        if x == f64::INFINITY {
            return f64::INFINITY;
        }
        (x.ln() - self.meanlog) / self.sdlog
    }

    /// `(E[ln Y], E[(ln Y)²])` from standard-normal moments `(m1, m2)`.
    fn log_moments(&self, m1: f64, m2: f64) -> (f64, f64) {
        let (mu, s) = (self.meanlog, self.sdlog);
        (mu + s * m1, mu * mu + 2.0 * mu * s * m1 + s * s * m2)
    }
}

/// Weighted sufficient statistics `(W, Σ w E[ln Y], Σ w E[(ln Y)²])`.
#[derive(Debug, Default, Clone, Copy)]
struct LogStats {
    w: f64,
    s1: f64,
    s2: f64,
}

impl LogStats {
    fn add(&mut self, w: f64, (e1, e2): (f64, f64)) {
        self.w += w;
        self.s1 += w * e1;
        self.s2 += w * e2;
    }
}

impl Expert for LogNormalExpert {
    fn kind(&self) -> ExpertKind {
        ExpertKind::LogNormal
    }

    fn params(&self) -> Vec<f64> {
        vec![self.meanlog, self.sdlog]
    }

    fn log_density(&self, x: f64) -> f64 {
        if !(x.is_finite() && x > 0.0) {
            return f64::NEG_INFINITY;
        }
        normal::ln_pdf(self.z(x)) - x.ln() - self.sdlog.ln()
    }

    fn log_cdf(&self, x: f64) -> f64 {
        normal::log_cdf(self.z(x))
    }

    fn log_sf(&self, x: f64) -> f64 {
        normal::log_cdf(-self.z(x))
    }

    fn log_interval_prob(&self, lo: f64, hi: f64) -> f64 {
        if lo.is_nan() || hi.is_nan() || !(lo < hi) {
            return f64::NEG_INFINITY;
        }
        normal::log_interval_mass(self.z(lo), self.z(hi))
    }

    fn log_prior(&self) -> f64 {
        let var = self.sdlog * self.sdlog;
        -self.meanlog * self.meanlog / (2.0 * MEANLOG_SD * MEANLOG_SD)
            - (VAR_PRIOR_SHAPE + 1.0) * var.ln()
            - VAR_PRIOR_RATE / var
    }

    fn m_step(
        &self,
        obs: &[Interval],
        _exposure: &[f64],
        weights: &ExpertWeights,
        opts: &MStepOptions,
    ) -> Result<ExpertRef> {
        let mut st = LogStats::default();
        for (i, y) in obs.iter().enumerate() {
            let wo = weights.observed[i];
            if wo > 0.0 {
                if y.is_exact() {
                    if y.yl > 0.0 && y.yl.is_finite() {
                        let l = y.yl.ln();
                        st.add(wo, (l, l * l));
                    }
                } else if let Some((_, m1, m2)) = normal::interval_moments(self.z(y.yl), self.z(y.yu)) {
                    st.add(wo, self.log_moments(m1, m2));
                }
            }
            let (wt, wi) = (weights.tail_out[i], weights.tail_in[i]);
            if wt > 0.0 {
                if let Some((_, m1, m2)) = normal::complement_moments(self.z(y.tl), self.z(y.tu)) {
                    st.add(wt, self.log_moments(m1, m2));
                }
            }
            if wi > 0.0 {
                if let Some((_, m1, m2)) = normal::interval_moments(self.z(y.tl), self.z(y.tu)) {
                    st.add(wi, self.log_moments(m1, m2));
                }
            }
        }

        let (meanlog, var) = if opts.penalty {
            let old_var = self.sdlog * self.sdlog;
            let mu = st.s1 / (st.w + old_var / (MEANLOG_SD * MEANLOG_SD));
            let ss = st.s2 - 2.0 * mu * st.s1 + mu * mu * st.w;
            (mu, (ss + 2.0 * VAR_PRIOR_RATE) / (st.w + 2.0 * (VAR_PRIOR_SHAPE + 1.0)))
        } else {
            let mu = st.s1 / st.w;
            (mu, (st.s2 - 2.0 * mu * st.s1 + mu * mu * st.w) / st.w)
        };
        Ok(Arc::new(LogNormalExpert::new(meanlog, var.max(0.0).sqrt())?))
    }

    fn simulate(&self, rng: &mut dyn RngCore) -> f64 {
        match LogNormal::new(self.meanlog, self.sdlog) {
            Ok(d) => d.sample(rng),
            Err(_) => f64::NAN,
        }
    }

    fn mean(&self) -> f64 {
        (self.meanlog + 0.5 * self.sdlog * self.sdlog).exp()
    }

    fn variance(&self) -> f64 {
        let s2 = self.sdlog * self.sdlog;
        s2.exp_m1() * (2.0 * self.meanlog + s2).exp()
    }

    fn quantile(&self, p: f64) -> f64 {
        (self.meanlog + self.sdlog * normal::quantile(p)).exp()
    }

    fn limited_expected_value(&self, u: f64) -> f64 {
        if u <= 0.0 {
            return u;
        }
        if u == f64::INFINITY {
            return self.mean();
        }
        let z = self.z(u);
        self.mean() * normal::cdf(z - self.sdlog) + u * normal::log_cdf(-z).exp()
    }
}
