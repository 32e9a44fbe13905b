//! Generic M-step for families without a closed-form update.
//!
//! The expected complete-data log-likelihood of one expert, with component
//! membership as the only latent variable inside the observed region, is
//!
//! ```text
//! Q(θ) = Σ_i observed_i · ln P_θ(obs_i)
//!      + tail_out_i · ln(1 - P_θ(window_i))
//!      + tail_in_i  · ln P_θ(window_i)
//!      (+ ln prior(θ) when penalized)
//! ```
//!
//! `Q` is maximized over an unconstrained parameterization with the bounded
//! L-BFGS maximizer, so the update never lowers `Q` and always terminates.
//! The maximizer sees `Q / Σ weights`, which keeps gradients O(1) whatever
//! the sample size.

use rayon::prelude::*;

use crate::domain::{Interval, MStepOptions};
use crate::error::Result;
use crate::experts::{Expert, ExpertWeights};
use crate::math::{MaximizeOptions, log1mexp, maximize};

/// Weighted expected log-likelihood `Q` (without the prior).
///
/// `at_exposure` produces the exposure-scaled distribution for one row; it is
/// only called when the exposure differs from 1.
pub fn weighted_loglik<E, F>(
    expert: &E,
    obs: &[Interval],
    exposure: &[f64],
    weights: &ExpertWeights,
    at_exposure: F,
) -> f64
where
    E: Expert,
    F: Fn(&E, f64) -> E + Sync,
{
    (0..obs.len())
        .into_par_iter()
        .map(|i| {
            let wo = weights.observed[i];
            let wt = weights.tail_out[i];
            let wi = weights.tail_in[i];
            if wo <= 0.0 && wt <= 0.0 && wi <= 0.0 {
                return 0.0;
            }
            let scaled;
            let d = if exposure[i] == 1.0 {
                expert
            } else {
                scaled = at_exposure(expert, exposure[i]);
                &scaled
            };
            let y = &obs[i];
            let mut acc = 0.0;
            if wo > 0.0 {
                acc += wo * d.observed_loglik(y);
            }
            if wt > 0.0 || wi > 0.0 {
                let lt = d.truncated_loglik(y.tl, y.tu);
                if wt > 0.0 {
                    acc += wt * log1mexp(lt);
                }
                if wi > 0.0 {
                    acc += wi * lt;
                }
            }
            acc
        })
        .sum()
}

/// Maximize `Q` starting from `x0` (the current parameters, unconstrained).
///
/// `build` maps an unconstrained vector back to a validated expert. Points
/// that fail validation evaluate to `-inf` and are never accepted.
pub fn maximize_expert<E, B, F>(
    x0: &[f64],
    build: B,
    obs: &[Interval],
    exposure: &[f64],
    weights: &ExpertWeights,
    at_exposure: F,
    opts: &MStepOptions,
) -> Result<E>
where
    E: Expert,
    B: Fn(&[f64]) -> Result<E>,
    F: Fn(&E, f64) -> E + Sync,
{
    let scale = weights.total().max(f64::MIN_POSITIVE);
    let objective = |x: &[f64]| match build(x) {
        Ok(e) => {
            let mut q = weighted_loglik(&e, obs, exposure, weights, &at_exposure);
            if opts.penalty {
                q += e.log_prior();
            }
            if q.is_nan() { f64::NEG_INFINITY } else { q / scale }
        }
        Err(_) => f64::NEG_INFINITY,
    };

    let solver = MaximizeOptions {
        max_iter: opts.newton_steps,
        ..MaximizeOptions::default()
    };
    let outcome = maximize(objective, x0, &solver);
    if !outcome.converged {
        log::debug!(
            "expert L-BFGS update stopped after {} iterations without converging (Q/W={:.6})",
            outcome.iterations,
            outcome.value
        );
    }
    build(&outcome.x)
}

/// `ln(p / (1 - p))`.
pub fn logit(p: f64) -> f64 {
    p.ln() - (-p).ln_1p()
}

/// Inverse of [`logit`].
pub fn expit(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn logit_and_expit_are_inverse() {
        for &p in &[1e-9, 0.1, 0.5, 0.9, 1.0 - 1e-9] {
            assert_relative_eq!(expit(logit(p)), p, max_relative = 1e-9);
        }
        assert!(expit(-800.0) >= 0.0);
        assert!(expit(800.0) <= 1.0);
    }
}
