//! ECM driver.
//!
//! One iteration:
//!
//! 1. E-step on the current model
//! 2. gating update against the pooled weights
//! 3. every `(dimension, component)` expert updated in parallel
//! 4. E-step on the new model, giving the new (penalized) log-likelihood
//!
//! The loop stops when the relative change of the penalized log-likelihood
//! drops below `tolerance` in an iteration where every expert update
//! succeeded, or at the iteration/time budget. An expert update that fails
//! keeps the old expert and is recorded; it never aborts the fit.

use std::time::Instant;

use nalgebra::DMatrix;
use rayon::prelude::*;

use crate::domain::{FitConfig, FitStatus, FittingResult, MStepOptions, Responses, UpdateFailure};
use crate::error::{LrmoeError, Result};
use crate::experts::{ExpertRef, ExpertWeights};
use crate::fit::FitData;
use crate::fit::estep::{Posterior, e_step};
use crate::gating::GatingOptions;
use crate::model::{ExpertMatrix, Model};

/// Experts whose total weight falls below this are left unchanged.
const MIN_EXPERT_WEIGHT: f64 = 1e-10;

/// Fit an LRMoE model from raw inputs.
///
/// - `responses`: `n × d` censored/truncated observations
/// - `covariates`: `n × p` design matrix (include an intercept column yourself)
/// - `coefficients`: starting gating coefficients, `g × p`
/// - `experts`: starting experts, one row of `g` per response dimension
/// - `exposure`: per-row exposure, 1 when `None`
pub fn fit(
    responses: &Responses,
    covariates: &DMatrix<f64>,
    coefficients: &DMatrix<f64>,
    experts: Vec<Vec<ExpertRef>>,
    exposure: Option<&[f64]>,
    config: &FitConfig,
) -> Result<FittingResult> {
    let data = FitData::new(responses.clone(), covariates.clone(), exposure)?;
    let model = Model::from_parts(coefficients.clone(), experts)?;
    fit_model(&data, model, config)
}

/// Fit starting from a pre-built model.
pub fn fit_model(data: &FitData, model: Model, config: &FitConfig) -> Result<FittingResult> {
    if model.n_dims() != data.n_dims() {
        return Err(LrmoeError::ShapeMismatch(format!(
            "model has {} response dimensions, data has {}",
            model.n_dims(),
            data.n_dims()
        )));
    }
    if model.gating().n_covariates() != data.n_covariates() {
        return Err(LrmoeError::ShapeMismatch(format!(
            "gating expects {} covariates, data has {}",
            model.gating().n_covariates(),
            data.n_covariates()
        )));
    }

    let started = Instant::now();
    let mut model = model;
    let mut posterior = e_step(data, &model)?;
    let mut pll = posterior.loglik() + model.penalty(&config.penalty);
    let mut trace = vec![pll];
    let mut failures = Vec::new();
    let mut status = FitStatus::IterationLimitReached;
    let mut iterations = 0;

    log::debug!(
        "ECM start: n={} dims={} components={} pll={pll:.6}",
        data.n_obs(),
        data.n_dims(),
        model.n_components()
    );

    for iter in 1..=config.max_iterations {
        if let Some(budget) = config.time_budget {
            if started.elapsed() >= budget {
                log::info!("time budget of {budget:?} exhausted after {iterations} iterations");
                break;
            }
        }

        let failed_before = failures.len();
        let next = ecm_step(data, &model, &posterior, config, iter, &mut failures)?;
        let had_failure = failures.len() > failed_before;
        let next_posterior = e_step(data, &next)?;
        let next_pll = next_posterior.loglik() + next.penalty(&config.penalty);

        if next_pll < pll - 1e-8 * pll.abs().max(1.0) {
            log::warn!("iteration {iter}: penalized log-likelihood decreased ({pll:.6} -> {next_pll:.6})");
        }
        let delta = (next_pll - pll).abs();
        log::debug!(
            "iteration {iter}: loglik={:.6} pll={next_pll:.6} delta={delta:.3e}",
            next_posterior.loglik()
        );

        model = next;
        posterior = next_posterior;
        pll = next_pll;
        trace.push(pll);
        iterations = iter;

        // A held-back expert makes a small delta meaningless.
        if delta <= config.tolerance * pll.abs() && !had_failure {
            status = FitStatus::Converged;
            break;
        }
    }

    let loglik = posterior.loglik();
    let n_params = model.n_params();
    let n_obs = data.n_obs();
    let k = n_params as f64;
    let aic = 2.0 * k - 2.0 * loglik;
    let bic = k * (n_obs as f64).ln() - 2.0 * loglik;

    log::info!(
        "ECM finished: status={status:?} iterations={iterations} loglik={loglik:.6} AIC={aic:.3} BIC={bic:.3}"
    );

    Ok(FittingResult {
        model,
        status,
        converged: status == FitStatus::Converged,
        iterations,
        loglik,
        penalized_loglik: pll,
        aic,
        bic,
        n_params,
        n_obs,
        trace,
        failures,
    })
}

/// Conditional maximization steps: gating first, then all experts.
fn ecm_step(
    data: &FitData,
    model: &Model,
    posterior: &Posterior,
    config: &FitConfig,
    iteration: usize,
    failures: &mut Vec<UpdateFailure>,
) -> Result<Model> {
    let gating_opts = GatingOptions {
        newton_steps: config.gating_newton_steps,
        penalty_sd: config.penalty.enabled.then_some(config.penalty.gating_sd),
    };
    let gating = model
        .gating()
        .update(&data.covariates, &posterior.gating_weights(), &gating_opts)?;

    let m_opts = MStepOptions {
        penalty: config.penalty.enabled,
        newton_steps: config.expert_newton_steps,
    };
    let dims = model.n_dims();
    let g = model.n_components();
    let cells: Vec<(usize, usize)> = (0..dims).flat_map(|d| (0..g).map(move |j| (d, j))).collect();

    let updated: Vec<(usize, usize, Result<ExpertRef>)> = cells
        .par_iter()
        .map(|&(d, j)| {
            let current = model.experts().get(d, j);
            let weights: ExpertWeights = posterior.expert_weights(j, d);
            if weights.total() < MIN_EXPERT_WEIGHT {
                return (d, j, Ok(ExpertRef::clone(current)));
            }
            let result = current.m_step(data.responses.dim(d), &data.exposure, &weights, &m_opts);
            (d, j, result)
        })
        .collect();

    let mut rows: Vec<Vec<ExpertRef>> = model.experts().rows().to_vec();
    for (d, j, result) in updated {
        match result {
            Ok(expert) => rows[d][j] = expert,
            Err(err) => {
                log::warn!("iteration {iteration}: update of expert (dim {d}, component {j}) failed: {err}");
                failures.push(UpdateFailure {
                    iteration,
                    dim: d,
                    component: j,
                    message: err.to_string(),
                });
            }
        }
    }

    Model::new(gating, ExpertMatrix::new(rows)?)
}
