//! Weibull expert with shape `k` and scale `lambda`.

use std::sync::Arc;

use rand::RngCore;
use rand_distr::{Distribution, Weibull};
use statrs::function::gamma::{gamma, gamma_lr};

use crate::domain::{ExpertKind, Interval, MStepOptions};
use crate::error::{LrmoeError, Result};
use crate::experts::numeric::maximize_expert;
use crate::experts::{Expert, ExpertRef, ExpertWeights, GammaPrior};
use crate::math::log1mexp;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeibullExpert {
    shape: f64,
    scale: f64,
    shape_prior: GammaPrior,
    scale_prior: GammaPrior,
}

impl WeibullExpert {
    pub fn new(shape: f64, scale: f64) -> Result<Self> {
        if !(shape.is_finite() && shape > 0.0) {
            return Err(LrmoeError::domain(
                "Weibull",
                format!("shape must be finite and > 0, got {shape}"),
            ));
        }
        if !(scale.is_finite() && scale > 0.0) {
            return Err(LrmoeError::domain(
                "Weibull",
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

    /// Cumulative hazard `(x / lambda)^k`.
    fn hazard(&self, x: f64) -> f64 {
        (x / self.scale).powf(self.shape)
    }
}

impl Expert for WeibullExpert {
    fn kind(&self) -> ExpertKind {
        ExpertKind::Weibull
    }

    fn params(&self) -> Vec<f64> {
        vec![self.shape, self.scale]
    }

    fn log_density(&self, x: f64) -> f64 {
        if !(x.is_finite() && x > 0.0) {
            return f64::NEG_INFINITY;
        }
        let k = self.shape;
        k.ln() - self.scale.ln() + (k - 1.0) * (x / self.scale).ln() - self.hazard(x)
    }

    fn log_cdf(&self, x: f64) -> f64 {
        if x <= 0.0 {
            return f64::NEG_INFINITY;
        }
        if x == f64::INFINITY {
            return 0.0;
        }
        log1mexp(-self.hazard(x))
    }

    fn log_sf(&self, x: f64) -> f64 {
        if x <= 0.0 {
            return 0.0;
        }
        -self.hazard(x)
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
            |x: &[f64]| WeibullExpert::new(x[0].exp(), x[1].exp()).map(|e| e.with_priors(sp, cp)),
            obs,
            exposure,
            weights,
            |e: &WeibullExpert, _| *e,
            opts,
        )?;
        Ok(Arc::new(next))
    }

    fn simulate(&self, rng: &mut dyn RngCore) -> f64 {
        match Weibull::new(self.scale, self.shape) {
            Ok(d) => d.sample(rng),
            Err(_) => f64::NAN,
        }
    }

    fn mean(&self) -> f64 {
        self.scale * gamma(1.0 + 1.0 / self.shape)
    }

    fn variance(&self) -> f64 {
        let g1 = gamma(1.0 + 1.0 / self.shape);
        let g2 = gamma(1.0 + 2.0 / self.shape);
        self.scale * self.scale * (g2 - g1 * g1)
    }

    fn quantile(&self, p: f64) -> f64 {
        if p <= 0.0 {
            return 0.0;
        }
        if p >= 1.0 {
            return f64::INFINITY;
        }
        self.scale * (-(-p).ln_1p()).powf(1.0 / self.shape)
    }

    fn limited_expected_value(&self, u: f64) -> f64 {
        if u <= 0.0 {
            return u;
        }
        if u == f64::INFINITY {
            return self.mean();
        }
        let h = self.hazard(u);
        self.mean() * gamma_lr(1.0 + 1.0 / self.shape, h) + u * (-h).exp()
    }
}
