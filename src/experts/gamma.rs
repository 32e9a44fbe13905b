//! Gamma expert with shape `k` and scale `theta`.

use std::sync::Arc;

use rand::RngCore;
use rand_distr::{Distribution, Gamma};
use statrs::function::gamma::{gamma_lr, gamma_ur, ln_gamma};

use crate::domain::{ExpertKind, Interval, MStepOptions};
use crate::error::{LrmoeError, Result};
use crate::experts::numeric::maximize_expert;
use crate::experts::{Expert, ExpertRef, ExpertWeights, GammaPrior, continuous_quantile};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GammaExpert {
    shape: f64,
    scale: f64,
    shape_prior: GammaPrior,
    scale_prior: GammaPrior,
}

impl GammaExpert {
    pub fn new(shape: f64, scale: f64) -> Result<Self> {
        if !(shape.is_finite() && shape > 0.0) {
            return Err(LrmoeError::domain(
                "Gamma",
                format!("shape must be finite and > 0, got {shape}"),
            ));
        }
        if !(scale.is_finite() && scale > 0.0) {
            return Err(LrmoeError::domain(
                "Gamma",
                format!("scale must be finite and > 0, got {scale}"),
            ));
        }
        Ok(Self {
            shape,
            scale,
            shape_prior: GammaPrior::DEFAULT,
            scale_prior: GammaPrior::DEFAULT,
        })
    }

    pub fn with_priors(mut self, shape_prior: GammaPrior, scale_prior: GammaPrior) -> Self {
        self.shape_prior = shape_prior;
        self.scale_prior = scale_prior;
        self
    }

    pub fn shape(&self) -> f64 {
        self.shape
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }
}

impl Expert for GammaExpert {
    fn kind(&self) -> ExpertKind {
        ExpertKind::Gamma
    }

    fn params(&self) -> Vec<f64> {
        vec![self.shape, self.scale]
    }

    fn log_density(&self, x: f64) -> f64 {
        // Support is (0, inf): an exact zero belongs to a zero-inflation atom.
        if !(x.is_finite() && x > 0.0) {
            return f64::NEG_INFINITY;
        }
        let norm = -ln_gamma(self.shape) - self.shape * self.scale.ln();
        (self.shape - 1.0) * x.ln() - x / self.scale + norm
    }

    fn log_cdf(&self, x: f64) -> f64 {
        if x <= 0.0 {
            return f64::NEG_INFINITY;
        }
        if x == f64::INFINITY {
            return 0.0;
        }
        gamma_lr(self.shape, x / self.scale).ln()
    }

    fn log_sf(&self, x: f64) -> f64 {
        if x <= 0.0 {
            return 0.0;
        }
        if x == f64::INFINITY {
            return f64::NEG_INFINITY;
        }
        gamma_ur(self.shape, x / self.scale).ln()
    }

    fn log_prior(&self) -> f64 {
        self.shape_prior.log_kernel(self.shape) + self.scale_prior.log_kernel(self.scale)
    }

    fn m_step(
        &self,
        obs: &[Interval],
        exposure: &[f64],
        weights: &ExpertWeights,
        opts: &MStepOptions,
    ) -> Result<ExpertRef> {
        let (sp, cp) = (self.shape_prior, self.scale_prior);
        let next = maximize_expert(
            &[self.shape.ln(), self.scale.ln()],
            |x: &[f64]| GammaExpert::new(x[0].exp(), x[1].exp()).map(|e| e.with_priors(sp, cp)),
            obs,
            exposure,
            weights,
            |e: &GammaExpert, _| *e,
            opts,
        )?;
        Ok(Arc::new(next))
    }

    fn simulate(&self, rng: &mut dyn RngCore) -> f64 {
        match Gamma::new(self.shape, self.scale) {
            Ok(g) => g.sample(rng),
            Err(_) => f64::NAN,
        }
    }

    fn mean(&self) -> f64 {
        self.shape * self.scale
    }

    fn variance(&self) -> f64 {
        self.shape * self.scale * self.scale
    }

    fn quantile(&self, p: f64) -> f64 {
        continuous_quantile(|x| self.cdf(x), p, self.mean())
    }

    fn limited_expected_value(&self, u: f64) -> f64 {
        if u <= 0.0 {
            return u;
        }
        if u == f64::INFINITY {
            return self.mean();
        }
        let t = u / self.scale;
        self.mean() * gamma_lr(self.shape + 1.0, t) + u * gamma_ur(self.shape, t)
    }
}
