//! Negative binomial expert, `P(Y = k) = C(k + r - 1, k) p^r (1 - p)^k`.
//!
//! Exposure scales the size `r`, so counts over `e` units of exposure are a
//! sum of `e` independent unit-exposure counts.

use std::sync::Arc;

use rand::RngCore;
use rand_distr::{Distribution, Gamma, Poisson};
use statrs::function::beta::beta_reg;
use statrs::function::gamma::ln_gamma;

use crate::domain::{ExpertKind, Interval, MStepOptions};
use crate::error::{LrmoeError, Result};
use crate::experts::numeric::{expit, logit, maximize_expert};
use crate::experts::{
    Expert, ExpertRef, ExpertWeights, GammaPrior, discrete_limited_expectation, discrete_quantile,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NegativeBinomialExpert {
    size: f64,
    prob: f64,
    prior: GammaPrior,
}

impl NegativeBinomialExpert {
    pub fn new(size: f64, prob: f64) -> Result<Self> {
        if !(size.is_finite() && size > 0.0) {
            return Err(LrmoeError::domain(
                "NegativeBinomial",
                format!("size must be finite and > 0, got {size}"),
            ));
        }
        if !(prob > 0.0 && prob <= 1.0) {
            return Err(LrmoeError::domain(
                "NegativeBinomial",
                format!("prob must lie in (0, 1], got {prob}"),
            ));
        }
        Ok(Self {
            size,
            prob,
            prior: GammaPrior::DEFAULT,
        })
    }

    pub fn with_prior(mut self, prior: GammaPrior) -> Self {
        self.prior = prior;
        self
    }

    pub fn size(&self) -> f64 {
        self.size
    }

    pub fn prob(&self) -> f64 {
        self.prob
    }

    fn scaled(&self, exposure: f64) -> Self {
        Self {
            size: self.size * exposure,
            ..*self
        }
    }

    /// Point mass at zero (`p = 1` or zero exposure).
    fn degenerate(&self) -> bool {
        self.prob == 1.0 || self.size == 0.0
    }
}

impl Expert for NegativeBinomialExpert {
    fn kind(&self) -> ExpertKind {
        ExpertKind::NegativeBinomial
    }

    fn params(&self) -> Vec<f64> {
        vec![self.size, self.prob]
    }

    fn is_discrete(&self) -> bool {
        true
    }

    fn log_density(&self, x: f64) -> f64 {
        if !(x.is_finite() && x >= 0.0 && x.fract() == 0.0) {
            return f64::NEG_INFINITY;
        }
        if self.degenerate() {
            return if x == 0.0 { 0.0 } else { f64::NEG_INFINITY };
        }
        let r = self.size;
        ln_gamma(x + r) - ln_gamma(r) - ln_gamma(x + 1.0)
            + r * self.prob.ln()
            + x * (-self.prob).ln_1p()
    }

    fn log_cdf(&self, x: f64) -> f64 {
        if x < 0.0 {
            return f64::NEG_INFINITY;
        }
        if x == f64::INFINITY || self.degenerate() {
            return 0.0;
        }
        beta_reg(self.size, x.floor() + 1.0, self.prob).ln()
    }

    fn log_sf(&self, x: f64) -> f64 {
        if x < 0.0 {
            return 0.0;
        }
        if x == f64::INFINITY || self.degenerate() {
            return f64::NEG_INFINITY;
        }
        beta_reg(x.floor() + 1.0, self.size, 1.0 - self.prob).ln()
    }

    fn exposurize(&self, exposure: f64) -> Option<ExpertRef> {
        Some(Arc::new(self.scaled(exposure)))
    }

    fn log_prior(&self) -> f64 {
        self.prior.log_kernel(self.size)
    }

    fn m_step(
        &self,
        obs: &[Interval],
        exposure: &[f64],
        weights: &ExpertWeights,
        opts: &MStepOptions,
    ) -> Result<ExpertRef> {
        let prior = self.prior;
        // Keep the start inside the open logit domain.
        let start_prob = self.prob.min(1.0 - 1e-10);
        let x0 = [self.size.ln(), logit(start_prob)];
        let next = maximize_expert(
            &x0,
            |x: &[f64]| {
                NegativeBinomialExpert::new(x[0].exp(), expit(x[1])).map(|e| e.with_prior(prior))
            },
            obs,
            exposure,
            weights,
            |e: &NegativeBinomialExpert, v| e.scaled(v),
            opts,
        )?;
        Ok(Arc::new(next))
    }

    fn simulate(&self, rng: &mut dyn RngCore) -> f64 {
        if self.degenerate() {
            return 0.0;
        }
        // Gamma-Poisson mixture.
        let scale = (1.0 - self.prob) / self.prob;
        let rate = match Gamma::new(self.size, scale) {
            Ok(g) => g.sample(rng),
            Err(_) => return 0.0,
        };
        if rate <= 0.0 {
            return 0.0;
        }
        match Poisson::new(rate) {
            Ok(p) => p.sample(rng),
            Err(_) => 0.0,
        }
    }

    fn mean(&self) -> f64 {
        self.size * (1.0 - self.prob) / self.prob
    }

    fn variance(&self) -> f64 {
        self.size * (1.0 - self.prob) / (self.prob * self.prob)
    }

    fn quantile(&self, p: f64) -> f64 {
        if self.degenerate() {
            return 0.0;
        }
        discrete_quantile(|k| self.cdf(k), p, self.mean())
    }

    fn limited_expected_value(&self, u: f64) -> f64 {
        discrete_limited_expectation(self, u)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experts::test_support::total_mass;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn rejects_out_of_domain_parameters() {
        assert!(NegativeBinomialExpert::new(0.0, 0.5).is_err());
        assert!(NegativeBinomialExpert::new(2.0, 0.0).is_err());
        assert!(NegativeBinomialExpert::new(2.0, 1.5).is_err());
        assert!(NegativeBinomialExpert::new(2.0, 1.0).is_ok());
    }

    #[test]
    fn mass_sums_to_one_and_cdf_agrees() {
        let d = NegativeBinomialExpert::new(3.0, 0.4).unwrap();
        assert_relative_eq!(total_mass(&d, 400), 1.0, epsilon = 1e-10);
        let direct: f64 = (0..=5).map(|k| d.density(k as f64)).sum();
        assert_relative_eq!(d.cdf(5.0), direct, max_relative = 1e-10);
        assert_relative_eq!(d.log_sf(5.0).exp(), 1.0 - direct, max_relative = 1e-9);
    }

    #[test]
    fn moments_match_parameterization() {
        let d = NegativeBinomialExpert::new(3.0, 0.4).unwrap();
        assert_relative_eq!(d.mean(), 4.5, epsilon = 1e-12);
        assert_relative_eq!(d.variance(), 11.25, epsilon = 1e-12);
        assert_relative_eq!(d.limited_expected_value(f64::INFINITY), 4.5);
        assert_relative_eq!(d.limited_expected_value(500.0), 4.5, max_relative = 1e-8);
    }

    #[test]
    fn exposure_scales_size() {
        let d: ExpertRef = Arc::new(NegativeBinomialExpert::new(2.0, 0.5).unwrap());
        let scaled = crate::experts::with_exposure(&d, 3.0);
        assert_eq!(scaled.params(), vec![6.0, 0.5]);
    }

    #[test]
    fn numeric_update_recovers_simulated_parameters() {
        let truth = NegativeBinomialExpert::new(4.0, 0.3).unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        let obs: Vec<Interval> = (0..4000).map(|_| Interval::exact(truth.simulate(&mut rng))).collect();
        let n = obs.len();
        let start = NegativeBinomialExpert::new(1.0, 0.5).unwrap();
        let opts = MStepOptions {
            penalty: false,
            newton_steps: 50,
        };
        let fitted = start
            .m_step(&obs, &vec![1.0; n], &ExpertWeights::observed_only(vec![1.0; n]), &opts)
            .unwrap();
        let p = fitted.params();
        assert!((p[0] - 4.0).abs() / 4.0 < 0.15, "size {}", p[0]);
        assert!((p[1] - 0.3).abs() / 0.3 < 0.15, "prob {}", p[1]);
    }

    #[test]
    fn censored_likelihood_is_interval_mass() {
        let d = NegativeBinomialExpert::new(2.0, 0.5).unwrap();
        let y = Interval::new(0.0, 2.0, 4.0, f64::INFINITY).unwrap();
        let direct: f64 = (2..=4).map(|k| d.density(k as f64)).sum();
        assert_relative_eq!(d.censored_loglik(&y), direct.ln(), max_relative = 1e-10);
    }
}
