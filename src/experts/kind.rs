//! Constructing experts from an `ExpertKind`: from a parameter vector, from
//! family defaults, or by the method of moments on a sample.

use std::sync::Arc;

use statrs::function::gamma::gamma;

use crate::domain::ExpertKind;
use crate::error::{LrmoeError, Result};
use crate::experts::{
    ExpertRef, GammaExpert, LogNormalExpert, NegativeBinomialExpert, PoissonExpert, WeibullExpert,
    ZeroInflated,
};

impl ExpertKind {
    /// Rebuild an expert from parameters in `param_names` order.
    pub fn build(self, params: &[f64]) -> Result<ExpertRef> {
        if params.len() != self.param_count() {
            return Err(LrmoeError::ModelSpecification(format!(
                "{} takes {} parameters, got {}",
                self.display_name(),
                self.param_count(),
                params.len()
            )));
        }
        let expert: ExpertRef = match self {
            ExpertKind::Poisson => Arc::new(PoissonExpert::new(params[0])?),
            ExpertKind::NegativeBinomial => Arc::new(NegativeBinomialExpert::new(params[0], params[1])?),
            ExpertKind::Gamma => Arc::new(GammaExpert::new(params[0], params[1])?),
            ExpertKind::LogNormal => Arc::new(LogNormalExpert::new(params[0], params[1])?),
            ExpertKind::Weibull => Arc::new(WeibullExpert::new(params[0], params[1])?),
            zi => {
                let base = zi.base_kind()?.build(&params[1..])?;
                Arc::new(ZeroInflated::new(params[0], base)?)
            }
        };
        Ok(expert)
    }

    /// Family default parameters, used when moment estimates are unusable.
    pub fn default_expert(self) -> Result<ExpertRef> {
        let params: &[f64] = match self {
            ExpertKind::Poisson => &[1.0],
            ExpertKind::NegativeBinomial => &[1.0, 0.5],
            ExpertKind::Gamma | ExpertKind::Weibull => &[1.0, 1.0],
            ExpertKind::LogNormal => &[0.0, 1.0],
            ExpertKind::ZiPoisson => &[0.5, 1.0],
            ExpertKind::ZiNegativeBinomial => &[0.5, 1.0, 0.5],
            ExpertKind::ZiGamma | ExpertKind::ZiWeibull => &[0.5, 1.0, 1.0],
            ExpertKind::ZiLogNormal => &[0.5, 0.0, 1.0],
        };
        self.build(params)
    }

    /// Method-of-moments expert for a sample of representative values.
    ///
    /// Fails with a domain error when the moments do not identify a valid
    /// parameter set (empty sample, zero variance, under-dispersed counts).
    pub fn from_sample(self, sample: &[f64]) -> Result<ExpertRef> {
        if self.base().is_some() {
            return self.zero_inflated_from_sample(sample);
        }

        let (m, v) = sample_moments(sample)
            .ok_or_else(|| LrmoeError::domain(self.display_name(), "sample too small for moments"))?;
        match self {
            ExpertKind::Poisson => self.build(&[m]),
            ExpertKind::NegativeBinomial => {
                if v <= m {
                    return Err(LrmoeError::domain(
                        "NegativeBinomial",
                        format!("sample is not over-dispersed (mean {m}, variance {v})"),
                    ));
                }
                self.build(&[m * m / (v - m), m / v])
            }
            ExpertKind::Gamma => self.build(&[m * m / v, v / m]),
            ExpertKind::LogNormal => {
                if m <= 0.0 {
                    return Err(LrmoeError::domain("LogNormal", format!("sample mean {m} is not positive")));
                }
                let s2 = (v / (m * m)).ln_1p();
                self.build(&[m.ln() - 0.5 * s2, s2.sqrt()])
            }
            ExpertKind::Weibull => {
                let cv = v.sqrt() / m;
                let k = cv.powf(-1.086);
                self.build(&[k, m / gamma(1.0 + 1.0 / k)])
            }
            ExpertKind::ZiPoisson
            | ExpertKind::ZiNegativeBinomial
            | ExpertKind::ZiGamma
            | ExpertKind::ZiLogNormal
            | ExpertKind::ZiWeibull => self.zero_inflated_from_sample(sample),
        }
    }

    /// Zero share from the sample, base family from its positive values.
    fn zero_inflated_from_sample(self, sample: &[f64]) -> Result<ExpertRef> {
        let base = self.base_kind()?;
        if sample.is_empty() {
            return Err(LrmoeError::domain("ZeroInflated", "empty sample"));
        }
        let positives: Vec<f64> = sample.iter().copied().filter(|&v| v > 0.0).collect();
        let p0 = 1.0 - positives.len() as f64 / sample.len() as f64;
        Ok(Arc::new(ZeroInflated::new(p0, base.from_sample(&positives)?)?))
    }

    /// [`ExpertKind::from_sample`] with fallback to [`ExpertKind::default_expert`].
    pub fn init_from_sample(self, sample: &[f64]) -> Result<ExpertRef> {
        match self.from_sample(sample) {
            Ok(e) => Ok(e),
            Err(err) => {
                log::debug!("{} moment init failed ({err}), using defaults", self.display_name());
                match self.base() {
                    // Keep a usable zero share even when the base moments fail.
                    Some(base) => Ok(Arc::new(ZeroInflated::new(zero_share(sample), base.default_expert()?)?)),
                    None => self.default_expert(),
                }
            }
        }
    }

    fn base_kind(self) -> Result<ExpertKind> {
        self.base().ok_or_else(|| {
            LrmoeError::ModelSpecification(format!("{} is not zero-inflated", self.display_name()))
        })
    }
}

/// Mean and (population) variance; `None` for an empty sample.
fn sample_moments(sample: &[f64]) -> Option<(f64, f64)> {
    if sample.is_empty() {
        return None;
    }
    let n = sample.len() as f64;
    let m = sample.iter().sum::<f64>() / n;
    let v = sample.iter().map(|x| (x - m).powi(2)).sum::<f64>() / n;
    Some((m, v))
}

/// Share of zeros clamped away from the boundary so the wrapper can still move.
fn zero_share(sample: &[f64]) -> f64 {
    if sample.is_empty() {
        return 0.5;
    }
    let zeros = sample.iter().filter(|&&v| v <= 0.0).count() as f64;
    (zeros / sample.len() as f64).clamp(0.01, 0.99)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experts::Expert;
    use approx::assert_relative_eq;

    const ALL: [ExpertKind; 10] = [
        ExpertKind::Poisson,
        ExpertKind::NegativeBinomial,
        ExpertKind::Gamma,
        ExpertKind::LogNormal,
        ExpertKind::Weibull,
        ExpertKind::ZiPoisson,
        ExpertKind::ZiNegativeBinomial,
        ExpertKind::ZiGamma,
        ExpertKind::ZiLogNormal,
        ExpertKind::ZiWeibull,
    ];

    #[test]
    fn defaults_rebuild_from_their_params() {
        for kind in ALL {
            let d = kind.default_expert().unwrap();
            assert_eq!(d.kind(), kind);
            let again = kind.build(&d.params()).unwrap();
            assert_eq!(again.params(), d.params());
        }
    }

    #[test]
    fn build_checks_parameter_count_and_domain() {
        assert!(matches!(
            ExpertKind::Gamma.build(&[1.0]),
            Err(LrmoeError::ModelSpecification(_))
        ));
        assert!(matches!(
            ExpertKind::Poisson.build(&[-1.0]),
            Err(LrmoeError::Domain { .. })
        ));
    }

    #[test]
    fn moment_estimates_match_closed_forms() {
        let sample = [1.0, 2.0, 3.0, 4.0, 10.0];
        let (m, v) = sample_moments(&sample).unwrap();
        let g = ExpertKind::Gamma.from_sample(&sample).unwrap();
        assert_relative_eq!(g.mean(), m, max_relative = 1e-12);
        assert_relative_eq!(g.variance(), v, max_relative = 1e-12);
        let ln = ExpertKind::LogNormal.from_sample(&sample).unwrap();
        assert_relative_eq!(ln.mean(), m, max_relative = 1e-12);
        assert_relative_eq!(ln.variance(), v, max_relative = 1e-10);
        let nb = ExpertKind::NegativeBinomial.from_sample(&sample).unwrap();
        assert_relative_eq!(nb.mean(), m, max_relative = 1e-12);
    }

    #[test]
    fn under_dispersed_counts_fall_back_to_defaults() {
        let sample = [3.0, 3.0, 3.0];
        assert!(ExpertKind::NegativeBinomial.from_sample(&sample).is_err());
        let d = ExpertKind::NegativeBinomial.init_from_sample(&sample).unwrap();
        assert_eq!(d.params(), vec![1.0, 0.5]);
        assert_eq!(ExpertKind::Gamma.init_from_sample(&[]).unwrap().params(), vec![1.0, 1.0]);
    }

    #[test]
    fn zero_inflated_init_uses_zero_share() {
        let sample = [0.0, 0.0, 1.0, 2.0, 3.0, 6.0];
        let d = ExpertKind::ZiPoisson.init_from_sample(&sample).unwrap();
        let p = d.params();
        assert_relative_eq!(p[0], 1.0 / 3.0, epsilon = 1e-12);
        assert_relative_eq!(p[1], 3.0, epsilon = 1e-12);
    }

    #[test]
    fn zero_inflated_base_failure_keeps_zero_share() {
        // All-zero sample: no positive values for the base moments.
        let d = ExpertKind::ZiGamma.init_from_sample(&[0.0, 0.0, 0.0]).unwrap();
        assert_eq!(d.kind(), ExpertKind::ZiGamma);
        assert_relative_eq!(d.params()[0], 0.99, epsilon = 1e-12);
        assert_eq!(&d.params()[1..], &[1.0, 1.0]);
        assert!(ExpertKind::ZiGamma.from_sample(&[]).is_err());
    }
}
