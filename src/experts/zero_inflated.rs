//! Zero-inflation wrapper: a structural zero with probability `p0`, otherwise
//! a draw from the base family.

use std::sync::Arc;

use rand::{Rng, RngCore};

use crate::domain::{ExpertKind, Interval, MStepOptions};
use crate::error::{LrmoeError, Result};
use crate::experts::{Expert, ExpertRef, ExpertWeights};
use crate::fit::estep::split_zero_mass;
use crate::math::log_sum_exp;

/// Updates that would move `p0` within this distance of 0 or 1 are skipped.
pub const ZERO_PROB_EPS: f64 = 1e-8;

#[derive(Debug, Clone)]
pub struct ZeroInflated {
    p0: f64,
    base: ExpertRef,
    kind: ExpertKind,
}

impl ZeroInflated {
    pub fn new(p0: f64, base: ExpertRef) -> Result<Self> {
        if !(0.0..=1.0).contains(&p0) {
            return Err(LrmoeError::domain(
                "ZeroInflated",
                format!("zero probability must lie in [0, 1], got {p0}"),
            ));
        }
        let Some(kind) = base.kind().zero_inflated() else {
            return Err(LrmoeError::domain(
                "ZeroInflated",
                format!("base {} is already zero-inflated", base.kind().display_name()),
            ));
        };
        Ok(Self { p0, base, kind })
    }

    pub fn p0(&self) -> f64 {
        self.p0
    }

    pub fn base(&self) -> &ExpertRef {
        &self.base
    }

    /// `ln(p0·1{zero in region} + (1 - p0)·exp(base_log_prob))`.
    fn mix(&self, contains_zero: bool, base_log_prob: f64) -> f64 {
        let positive = if self.p0 == 1.0 {
            f64::NEG_INFINITY
        } else {
            (-self.p0).ln_1p() + base_log_prob
        };
        if contains_zero {
            log_sum_exp(&[self.p0.ln(), positive])
        } else {
            positive
        }
    }
}

fn near_boundary(p: f64) -> bool {
    p < ZERO_PROB_EPS || p > 1.0 - ZERO_PROB_EPS
}

impl Expert for ZeroInflated {
    fn kind(&self) -> ExpertKind {
        self.kind
    }

    fn params(&self) -> Vec<f64> {
        let mut out = vec![self.p0];
        out.extend(self.base.params());
        out
    }

    fn log_density(&self, x: f64) -> f64 {
        if !(x.is_finite() && x >= 0.0) {
            return f64::NEG_INFINITY;
        }
        self.mix(x == 0.0, self.base.log_density(x))
    }

    fn log_cdf(&self, x: f64) -> f64 {
        if x < 0.0 {
            return f64::NEG_INFINITY;
        }
        self.mix(true, self.base.log_cdf(x))
    }

    fn log_sf(&self, x: f64) -> f64 {
        if x < 0.0 {
            return 0.0;
        }
        self.mix(false, self.base.log_sf(x))
    }

    fn log_interval_prob(&self, lo: f64, hi: f64) -> f64 {
        if lo.is_nan() || hi.is_nan() || hi < lo {
            return f64::NEG_INFINITY;
        }
        self.mix(lo <= 0.0 && hi >= 0.0, self.base.log_interval_prob(lo, hi))
    }

    fn exposurize(&self, exposure: f64) -> Option<ExpertRef> {
        let base = self.base.exposurize(exposure)?;
        Some(Arc::new(Self {
            p0: self.p0,
            base,
            kind: self.kind,
        }))
    }

    fn log_prior(&self) -> f64 {
        self.base.log_prior()
    }

    fn m_step(
        &self,
        obs: &[Interval],
        exposure: &[f64],
        weights: &ExpertWeights,
        opts: &MStepOptions,
    ) -> Result<ExpertRef> {
        let total = weights.total();
        if total <= 0.0 {
            return Ok(Arc::new(self.clone()));
        }
        let (zero, positive) = split_zero_mass(self.p0, &self.base, obs, exposure, weights);
        let p_new = zero.total() / total;
        if near_boundary(self.p0) || near_boundary(p_new) {
            log::debug!(
                "{}: zero probability {:.3e} -> {:.3e} at the boundary, update skipped",
                self.kind.display_name(),
                self.p0,
                p_new
            );
            return Ok(Arc::new(self.clone()));
        }
        let base = self.base.m_step(obs, exposure, &positive, opts)?;
        Ok(Arc::new(ZeroInflated::new(p_new, base)?))
    }

    fn simulate(&self, rng: &mut dyn RngCore) -> f64 {
        if rng.gen_bool(self.p0) {
            0.0
        } else {
            self.base.simulate(rng)
        }
    }

    fn mean(&self) -> f64 {
        (1.0 - self.p0) * self.base.mean()
    }

    fn variance(&self) -> f64 {
        let m = self.base.mean();
        (1.0 - self.p0) * self.base.variance() + self.p0 * (1.0 - self.p0) * m * m
    }

    fn quantile(&self, p: f64) -> f64 {
        if p <= self.p0 {
            return 0.0;
        }
        self.base.quantile((p - self.p0) / (1.0 - self.p0))
    }

    fn limited_expected_value(&self, u: f64) -> f64 {
        if u <= 0.0 {
            return u;
        }
        (1.0 - self.p0) * self.base.limited_expected_value(u)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experts::test_support::total_mass;
    use crate::experts::{GammaExpert, PoissonExpert};
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn zip(p0: f64, lambda: f64) -> ZeroInflated {
        ZeroInflated::new(p0, Arc::new(PoissonExpert::new(lambda).unwrap())).unwrap()
    }

    #[test]
    fn rejects_bad_probability_and_nested_wrappers() {
        let base: ExpertRef = Arc::new(PoissonExpert::new(2.0).unwrap());
        assert!(ZeroInflated::new(1.2, base.clone()).is_err());
        assert!(ZeroInflated::new(-0.1, base.clone()).is_err());
        let inner: ExpertRef = Arc::new(ZeroInflated::new(0.2, base).unwrap());
        assert!(matches!(
            ZeroInflated::new(0.2, inner),
            Err(LrmoeError::Domain { family: "ZeroInflated", .. })
        ));
    }

    #[test]
    fn decomposes_into_point_mass_and_base() {
        let base = PoissonExpert::new(3.0).unwrap();
        for &p in &[0.0, 0.3, 1.0] {
            let d = zip(p, 3.0);
            assert_relative_eq!(d.density(0.0), p + (1.0 - p) * base.density(0.0), epsilon = 1e-12);
            assert_relative_eq!(d.density(4.0), (1.0 - p) * base.density(4.0), epsilon = 1e-12);
            assert_relative_eq!(total_mass(&d, 200), 1.0, epsilon = 1e-10);
            assert!(!d.log_density(2.0).is_nan());
        }
    }

    #[test]
    fn interval_probability_adds_point_mass_only_when_zero_is_covered() {
        let d = zip(0.3, 3.0);
        let base = PoissonExpert::new(3.0).unwrap();
        assert_relative_eq!(
            d.log_interval_prob(0.0, 2.0).exp(),
            0.3 + 0.7 * base.log_interval_prob(0.0, 2.0).exp(),
            epsilon = 1e-12
        );
        assert_relative_eq!(
            d.log_interval_prob(1.0, 2.0).exp(),
            0.7 * base.log_interval_prob(1.0, 2.0).exp(),
            epsilon = 1e-12
        );
        assert_relative_eq!(d.log_sf(0.0).exp(), 0.7 * base.log_sf(0.0).exp(), epsilon = 1e-12);
    }

    #[test]
    fn continuous_base_keeps_zero_as_atom() {
        let d = ZeroInflated::new(0.25, Arc::new(GammaExpert::new(2.0, 1.0).unwrap())).unwrap();
        assert_eq!(d.kind(), ExpertKind::ZiGamma);
        assert_relative_eq!(d.density(0.0), 0.25, epsilon = 1e-12);
        assert_relative_eq!(d.cdf(0.0), 0.25, epsilon = 1e-12);
        assert_eq!(d.quantile(0.2), 0.0);
        assert_relative_eq!(d.mean(), 0.75 * 2.0, epsilon = 1e-12);
        assert_eq!(d.params(), vec![0.25, 2.0, 1.0]);
    }

    #[test]
    fn exact_zero_is_structural_under_unbounded_base_density() {
        // Shape < 1: the base density diverges near 0 but 0 itself is off its support.
        let base: ExpertRef = Arc::new(GammaExpert::new(0.8, 2.0).unwrap());
        let d = ZeroInflated::new(0.3, base.clone()).unwrap();
        assert_relative_eq!(d.log_density(0.0), 0.3f64.ln(), epsilon = 1e-12);

        let obs = vec![Interval::exact(0.0), Interval::exact(1.5)];
        let w = ExpertWeights::observed_only(vec![1.0, 1.0]);
        let (zero, positive) = split_zero_mass(0.3, &base, &obs, &[1.0, 1.0], &w);
        assert_eq!(zero.observed, vec![1.0, 0.0]);
        assert_eq!(positive.observed, vec![0.0, 1.0]);
    }

    #[test]
    fn boundary_probability_skips_update() {
        let d = zip(0.0, 3.0);
        let obs: Vec<Interval> = [0.0, 1.0, 5.0].iter().map(|&v| Interval::exact(v)).collect();
        let next = d
            .m_step(&obs, &[1.0; 3], &ExpertWeights::observed_only(vec![1.0; 3]), &MStepOptions::default())
            .unwrap();
        assert_eq!(next.params(), d.params());
    }

    #[test]
    fn repeated_updates_recover_zero_probability() {
        let truth = zip(0.35, 4.0);
        let mut rng = StdRng::seed_from_u64(21);
        let obs: Vec<Interval> = (0..5000).map(|_| Interval::exact(truth.simulate(&mut rng))).collect();
        let n = obs.len();
        let w = ExpertWeights::observed_only(vec![1.0; n]);
        let opts = MStepOptions {
            penalty: false,
            newton_steps: 20,
        };
        let mut cur: ExpertRef = Arc::new(zip(0.1, 2.0));
        for _ in 0..300 {
            cur = cur.m_step(&obs, &vec![1.0; n], &w, &opts).unwrap();
        }
        let p = cur.params();
        assert!((p[0] - 0.35).abs() < 0.03, "p0 {}", p[0]);
        assert!((p[1] - 4.0).abs() < 0.2, "lambda {}", p[1]);
    }
}
