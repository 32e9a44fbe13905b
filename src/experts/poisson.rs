//! Poisson expert.
//!
//! Closed-form M-step: with `Y ~ Poisson(λ·e)` the complete-data sufficient
//! statistics are `Σ w·E[Y]` and `Σ w·e`. For a censored or truncated region
//! the conditional expectation also has a closed form, via the identity
//! `y·p(y; m) = m·p(y-1; m)`:
//!
//! ```text
//! E[Y | a <= Y <= b] = m · P(a-1 <= Y <= b-1) / P(a <= Y <= b)
//! ```

use std::sync::Arc;

use rand::RngCore;
use rand_distr::{Distribution, Poisson};
use statrs::function::gamma::{gamma_lr, gamma_ur, ln_gamma};

use crate::domain::{ExpertKind, Interval, MStepOptions};
use crate::error::{LrmoeError, Result};
use crate::experts::{
    Expert, ExpertRef, ExpertWeights, GammaPrior, discrete_limited_expectation, discrete_quantile,
};
use crate::math::log1mexp;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoissonExpert {
    lambda: f64,
    prior: GammaPrior,
}

impl PoissonExpert {
    pub fn new(lambda: f64) -> Result<Self> {
        if !(lambda.is_finite() && lambda > 0.0) {
            return Err(LrmoeError::domain(
                "Poisson",
                format!("lambda must be finite and > 0, got {lambda}"),
            ));
        }
        Ok(Self {
            lambda,
            prior: GammaPrior::DEFAULT,
        })
    }

    /// Replace the gamma prior on `lambda`.
    pub fn with_prior(mut self, prior: GammaPrior) -> Self {
        self.prior = prior;
        self
    }

    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    /// Exposure-scaled copy. A zero exposure gives a point mass at 0.
    fn scaled(&self, exposure: f64) -> Self {
        Self {
            lambda: self.lambda * exposure,
            prior: self.prior,
        }
    }

    /// `E[Y | Y in [lo, hi]]`.
    fn region_mean(&self, lo: f64, hi: f64) -> Option<f64> {
        let lp = self.log_interval_prob(lo, hi);
        if !lp.is_finite() {
            return None;
        }
        let shifted = self.log_interval_prob(lo - 1.0, hi - 1.0);
        Some(self.lambda * (shifted - lp).exp())
    }

    /// `E[Y | Y outside [lo, hi]]`.
    fn complement_mean(&self, lo: f64, hi: f64) -> Option<f64> {
        let lq = log1mexp(self.log_interval_prob(lo, hi));
        if !lq.is_finite() {
            return None;
        }
        let shifted = log1mexp(self.log_interval_prob(lo - 1.0, hi - 1.0));
        Some(self.lambda * (shifted - lq).exp())
    }
}

impl Expert for PoissonExpert {
    fn kind(&self) -> ExpertKind {
        ExpertKind::Poisson
    }

    fn params(&self) -> Vec<f64> {
        vec![self.lambda]
    }

    fn is_discrete(&self) -> bool {
        true
    }

    fn log_density(&self, x: f64) -> f64 {
        if !(x.is_finite() && x >= 0.0 && x.fract() == 0.0) {
            return f64::NEG_INFINITY;
        }
        if self.lambda == 0.0 {
            return if x == 0.0 { 0.0 } else { f64::NEG_INFINITY };
        }
        x * self.lambda.ln() - self.lambda - ln_gamma(x + 1.0)
    }

    fn log_cdf(&self, x: f64) -> f64 {
        if x < 0.0 {
            return f64::NEG_INFINITY;
        }
        if x == f64::INFINITY || self.lambda == 0.0 {
            return 0.0;
        }
        gamma_ur(x.floor() + 1.0, self.lambda).ln()
    }

    fn log_sf(&self, x: f64) -> f64 {
        if x < 0.0 {
            return 0.0;
        }
        if x == f64::INFINITY || self.lambda == 0.0 {
            return f64::NEG_INFINITY;
        }
        gamma_lr(x.floor() + 1.0, self.lambda).ln()
    }

    fn exposurize(&self, exposure: f64) -> Option<ExpertRef> {
        Some(Arc::new(self.scaled(exposure)))
    }

    fn log_prior(&self) -> f64 {
        self.prior.log_kernel(self.lambda)
    }

    fn m_step(
        &self,
        obs: &[Interval],
        exposure: &[f64],
        weights: &ExpertWeights,
        opts: &MStepOptions,
    ) -> Result<ExpertRef> {
        let mut sum_y = 0.0;
        let mut sum_e = 0.0;
        for (i, y) in obs.iter().enumerate() {
            let e = exposure[i];
            let d = self.scaled(e);
            let wo = weights.observed[i];
            if wo > 0.0 {
                let ey = if y.is_exact() {
                    Some(y.yl)
                } else {
                    d.region_mean(y.yl, y.yu)
                };
                if let Some(ey) = ey {
                    sum_y += wo * ey;
                    sum_e += wo * e;
                }
            }
            let wt = weights.tail_out[i];
            if wt > 0.0 {
                if let Some(ey) = d.complement_mean(y.tl, y.tu) {
                    sum_y += wt * ey;
                    sum_e += wt * e;
                }
            }
            let wi = weights.tail_in[i];
            if wi > 0.0 {
                if let Some(ey) = d.region_mean(y.tl, y.tu) {
                    sum_y += wi * ey;
                    sum_e += wi * e;
                }
            }
        }

        let lambda = if opts.penalty {
            (sum_y + self.prior.shape - 1.0) / (sum_e + 1.0 / self.prior.scale)
        } else {
            sum_y / sum_e
        };
        Ok(Arc::new(PoissonExpert::new(lambda)?.with_prior(self.prior)))
    }

    fn simulate(&self, rng: &mut dyn RngCore) -> f64 {
        match Poisson::new(self.lambda) {
            Ok(d) => d.sample(rng),
            Err(_) => 0.0,
        }
    }

    fn mean(&self) -> f64 {
        self.lambda
    }

    fn variance(&self) -> f64 {
        self.lambda
    }

    fn quantile(&self, p: f64) -> f64 {
        discrete_quantile(|k| self.cdf(k), p, self.lambda)
    }

    fn limited_expected_value(&self, u: f64) -> f64 {
        if u <= 0.0 {
            return u;
        }
        if u == f64::INFINITY {
            return self.lambda;
        }
        // E[Y 1{Y <= k}] = λ P(Y <= k-1), with k the largest integer below u.
        let k = u.ceil() - 1.0;
        if k > 1e7 {
            return discrete_limited_expectation(self, u);
        }
        self.lambda * self.log_cdf(k - 1.0).exp() + u * self.log_sf(k).exp()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experts::test_support::total_mass;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn naive_interval_prob(m: f64, lo: u64, hi: u64) -> f64 {
        (lo..=hi)
            .map(|k| ((k as f64) * m.ln() - m - ln_gamma(k as f64 + 1.0)).exp())
            .sum::<f64>()
            .ln()
    }

    #[test]
    fn rejects_invalid_rate() {
        assert!(matches!(
            PoissonExpert::new(-1.0),
            Err(LrmoeError::Domain { family: "Poisson", .. })
        ));
        assert!(PoissonExpert::new(0.0).is_err());
        assert!(PoissonExpert::new(f64::NAN).is_err());
    }

    #[test]
    fn mass_sums_to_one_and_off_support_is_zero() {
        let d = PoissonExpert::new(6.0).unwrap();
        assert_relative_eq!(total_mass(&d, 200), 1.0, epsilon = 1e-12);
        assert_eq!(d.density(2.5), 0.0);
        assert_eq!(d.density(-1.0), 0.0);
        assert_eq!(d.log_density(f64::INFINITY), f64::NEG_INFINITY);
        assert_eq!(d.cdf(f64::INFINITY), 1.0);
    }

    #[test]
    fn interval_probability_matches_direct_sum() {
        let d = PoissonExpert::new(6.0).unwrap();
        assert_relative_eq!(
            d.log_interval_prob(3.0, 9.0),
            naive_interval_prob(6.0, 3, 9),
            max_relative = 1e-10
        );
        // Far upper tail stays finite (no 1 - 1 cancellation).
        let tail = d.log_interval_prob(60.0, 61.0);
        assert!(tail.is_finite());
        assert_relative_eq!(tail, naive_interval_prob(6.0, 60, 61), max_relative = 1e-8);
    }

    #[test]
    fn censored_loglik_splits_into_density_minus_truncation() {
        let d = PoissonExpert::new(4.0).unwrap();
        let y = Interval::new(2.0, 5.0, 5.0, 12.0).unwrap();
        assert_relative_eq!(
            d.censored_loglik(&y),
            d.log_density(5.0) - d.truncated_loglik(2.0, 12.0),
            epsilon = 1e-12
        );
        assert_eq!(d.truncated_loglik(0.0, f64::INFINITY), 0.0);
    }

    #[test]
    fn closed_form_update_on_exact_data_is_weighted_mean() {
        let d = PoissonExpert::new(1.0).unwrap();
        let obs: Vec<Interval> = [1.0, 2.0, 3.0, 10.0].iter().map(|&y| Interval::exact(y)).collect();
        let weights = ExpertWeights::observed_only(vec![1.0, 1.0, 1.0, 0.0]);
        let opts = MStepOptions {
            penalty: false,
            newton_steps: 20,
        };
        let next = d.m_step(&obs, &[1.0; 4], &weights, &opts).unwrap();
        assert_relative_eq!(next.params()[0], 2.0, epsilon = 1e-12);

        // Exposure 2 on every row halves the rate.
        let next = d.m_step(&obs, &[2.0; 4], &weights, &opts).unwrap();
        assert_relative_eq!(next.params()[0], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn right_censored_expectation_exceeds_censoring_point() {
        let d = PoissonExpert::new(3.0).unwrap();
        let m = d.region_mean(5.0, f64::INFINITY).unwrap();
        assert!(m > 5.0);
        // Whole support gives the plain mean.
        assert_relative_eq!(d.region_mean(0.0, f64::INFINITY).unwrap(), 3.0, epsilon = 1e-12);
        // Complement of [0, 2] is [3, inf).
        assert_relative_eq!(
            d.complement_mean(0.0, 2.0).unwrap(),
            d.region_mean(3.0, f64::INFINITY).unwrap(),
            epsilon = 1e-10
        );
    }

    #[test]
    fn summary_statistics() {
        let d = PoissonExpert::new(6.0).unwrap();
        assert_eq!(d.mean(), 6.0);
        assert_eq!(d.variance(), 6.0);
        let q = d.quantile(0.5);
        assert!(d.cdf(q) >= 0.5 && d.cdf(q - 1.0) < 0.5);
        assert_relative_eq!(d.limited_expected_value(f64::INFINITY), 6.0);
        assert_relative_eq!(d.limited_expected_value(1000.0), 6.0, epsilon = 1e-9);
        // E[min(Y, 1)] = P(Y >= 1).
        assert_relative_eq!(d.limited_expected_value(1.0), 1.0 - (-6.0f64).exp(), epsilon = 1e-12);
    }

    #[test]
    fn simulation_mean_is_close() {
        let d = PoissonExpert::new(6.0).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let n = 20_000;
        let m: f64 = (0..n).map(|_| d.simulate(&mut rng)).sum::<f64>() / n as f64;
        assert!((m - 6.0).abs() < 0.1, "sample mean {m}");
    }

    #[test]
    fn zero_exposure_is_a_point_mass_at_zero() {
        let d = PoissonExpert::new(6.0).unwrap().scaled(0.0);
        assert_eq!(d.log_density(0.0), 0.0);
        assert_eq!(d.log_density(1.0), f64::NEG_INFINITY);
        assert_eq!(d.log_cdf(0.0), 0.0);
    }
}
