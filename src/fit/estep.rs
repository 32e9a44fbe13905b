//! E-step: responsibilities and latent truncated-away mass.
//!
//! For observation `i` and component `j`, with `ln π_ij` from the gating
//! network and experts evaluated at the row's exposure:
//!
//! ```text
//! a_ij = ln π_ij + Σ_d ln P_jd(y_id)           (observed, ignoring truncation)
//! t_ij = Σ_d ln P_jd(tl_id <= Y <= tu_id)       (joint truncation window)
//!
//! z_obs_ij = softmax_j(a_ij)
//! loglik_i = lse_j(a_ij) - lse_j(ln π_ij + t_ij)
//! z_lat_ij = softmax_j(ln π_ij + ln(1 - e^{t_ij}))
//! k_i      = exp(lse_j(ln π_ij + ln(1 - e^{t_ij})) - lse_j(ln π_ij + t_ij))
//! ```
//!
//! `k_i` is the expected number of draws that were truncated away for every
//! observed draw. Their mass `k_i z_lat_ij` is split per dimension into the
//! part outside that dimension's own window (`tail_out`) and the part inside
//! it, truncated by another dimension (`tail_in`).

use nalgebra::DMatrix;
use rayon::prelude::*;

use crate::domain::Interval;
use crate::error::Result;
use crate::experts::{ExpertRef, ExpertWeights, with_exposure};
use crate::fit::FitData;
use crate::math::{log1mexp, log_sum_exp, softmax_into};
use crate::model::Model;

/// E-step output for one model.
#[derive(Debug, Clone)]
pub struct Posterior {
    z_obs: DMatrix<f64>,
    z_lat: DMatrix<f64>,
    latent: Vec<f64>,
    row_loglik: Vec<f64>,
    /// Indexed `[dim]`, each `n × g`.
    tail_out: Vec<DMatrix<f64>>,
    tail_in: Vec<DMatrix<f64>>,
}

#[derive(Debug)]
struct RowPosterior {
    z_obs: Vec<f64>,
    z_lat: Vec<f64>,
    latent: f64,
    loglik: f64,
    /// `dims × g`, row-major.
    tail_out: Vec<f64>,
    tail_in: Vec<f64>,
}

impl Posterior {
    pub fn n_obs(&self) -> usize {
        self.z_obs.nrows()
    }

    /// Observed-data log-likelihood (sum over rows).
    pub fn loglik(&self) -> f64 {
        self.row_loglik.iter().sum()
    }

    pub fn row_loglik(&self) -> &[f64] {
        &self.row_loglik
    }

    /// Responsibilities of the observed draws (`n × g`, rows sum to 1).
    pub fn responsibilities(&self) -> &DMatrix<f64> {
        &self.z_obs
    }

    /// Expected truncated-away draws per observed draw, per row.
    pub fn latent_counts(&self) -> &[f64] {
        &self.latent
    }

    /// Pooled gating weights `z_obs + k·z_lat` (rows sum to `1 + k_i`).
    pub fn gating_weights(&self) -> DMatrix<f64> {
        let mut w = self.z_obs.clone();
        for (i, &k) in self.latent.iter().enumerate() {
            if k > 0.0 {
                for j in 0..w.ncols() {
                    w[(i, j)] += k * self.z_lat[(i, j)];
                }
            }
        }
        w
    }

    /// Weights for the expert of component `j` in dimension `d`.
    pub fn expert_weights(&self, j: usize, d: usize) -> ExpertWeights {
        ExpertWeights {
            observed: self.z_obs.column(j).iter().copied().collect(),
            tail_out: self.tail_out[d].column(j).iter().copied().collect(),
            tail_in: self.tail_in[d].column(j).iter().copied().collect(),
        }
    }
}

/// Run the E-step of `model` on `data`, rows in parallel.
pub fn e_step(data: &FitData, model: &Model) -> Result<Posterior> {
    let log_pi = model.gating().log_weights(&data.covariates)?;
    let n = data.n_obs();
    let g = model.n_components();
    let dims = model.n_dims();

    let rows: Vec<RowPosterior> = (0..n)
        .into_par_iter()
        .map(|i| {
            let lp: Vec<f64> = log_pi.row(i).iter().copied().collect();
            row_posterior(data, model, i, &lp)
        })
        .collect();

    let mut z_obs = DMatrix::zeros(n, g);
    let mut z_lat = DMatrix::zeros(n, g);
    let mut tail_out = vec![DMatrix::zeros(n, g); dims];
    let mut tail_in = vec![DMatrix::zeros(n, g); dims];
    let mut latent = Vec::with_capacity(n);
    let mut row_loglik = Vec::with_capacity(n);
    for (i, row) in rows.into_iter().enumerate() {
        for j in 0..g {
            z_obs[(i, j)] = row.z_obs[j];
            z_lat[(i, j)] = row.z_lat[j];
            for d in 0..dims {
                tail_out[d][(i, j)] = row.tail_out[d * g + j];
                tail_in[d][(i, j)] = row.tail_in[d * g + j];
            }
        }
        latent.push(row.latent);
        row_loglik.push(row.loglik);
    }

    Ok(Posterior {
        z_obs,
        z_lat,
        latent,
        row_loglik,
        tail_out,
        tail_in,
    })
}

fn row_posterior(data: &FitData, model: &Model, i: usize, log_pi: &[f64]) -> RowPosterior {
    let g = log_pi.len();
    let dims = model.n_dims();
    let e = data.exposure[i];

    // Per (d, j): truncation-window log-probability.
    let mut window = vec![0.0; dims * g];
    let mut a = log_pi.to_vec();
    let mut t = vec![0.0; g];
    for j in 0..g {
        for d in 0..dims {
            let expert = with_exposure(model.experts().get(d, j), e);
            let y = data.responses.get(i, d);
            a[j] += expert.observed_loglik(y);
            let w = expert.truncated_loglik(y.tl, y.tu);
            window[d * g + j] = w;
            t[j] += w;
        }
    }

    let mut z_obs = vec![0.0; g];
    let observed_lse = log_sum_exp(&a);
    let kept: Vec<f64> = log_pi.iter().zip(&t).map(|(lp, tj)| lp + tj).collect();
    let kept_lse = log_sum_exp(&kept);
    let loglik = if softmax_into(&a, &mut z_obs) && kept_lse.is_finite() {
        observed_lse - kept_lse
    } else {
        for (z, lp) in z_obs.iter_mut().zip(log_pi) {
            *z = lp.exp();
        }
        f64::NEG_INFINITY
    };

    let mut z_lat = vec![0.0; g];
    let lost: Vec<f64> = log_pi.iter().zip(&t).map(|(lp, tj)| lp + log1mexp(*tj)).collect();
    let latent = if kept_lse.is_finite() && softmax_into(&lost, &mut z_lat) {
        (log_sum_exp(&lost) - kept_lse).exp()
    } else {
        z_lat.fill(0.0);
        0.0
    };

    let mut tail_out = vec![0.0; dims * g];
    let mut tail_in = vec![0.0; dims * g];
    if latent > 0.0 {
        for j in 0..g {
            let mass = latent * z_lat[j];
            // 1 - P(joint window).
            let denom = -t[j].exp_m1();
            if !(mass > 0.0 && denom > 0.0) {
                continue;
            }
            for d in 0..dims {
                let w = window[d * g + j];
                tail_out[d * g + j] = mass * (-w.exp_m1()) / denom;
                tail_in[d * g + j] = (mass * (w.exp() - t[j].exp()) / denom).max(0.0);
            }
        }
    }

    RowPosterior {
        z_obs,
        z_lat,
        latent,
        loglik,
        tail_out,
        tail_in,
    }
}

/// Posterior probability that a region's mass is a structural zero.
///
/// `base_log_prob` is the base family's log-probability of the region.
fn zero_share(p0: f64, base_log_prob: f64) -> f64 {
    if p0 <= 0.0 {
        return 0.0;
    }
    if p0 >= 1.0 {
        return 1.0;
    }
    let lz = p0.ln();
    let den = log_sum_exp(&[lz, (-p0).ln_1p() + base_log_prob]);
    if den == f64::NEG_INFINITY {
        return 0.0;
    }
    (lz - den).exp()
}

/// Split an expert's weights into structural-zero and base parts.
///
/// A region only contributes to the zero part if it contains 0:
/// - observed: `yl <= 0`
/// - `tail_out` (outside the window): `tl > 0`
/// - `tail_in` (inside the window): `tl <= 0`
///
/// Returns `(zero, positive)`; the two add up to `weights` element-wise.
pub fn split_zero_mass(
    p0: f64,
    base: &ExpertRef,
    obs: &[Interval],
    exposure: &[f64],
    weights: &ExpertWeights,
) -> (ExpertWeights, ExpertWeights) {
    let n = obs.len();
    let mut zero = ExpertWeights::zeros(n);
    let mut positive = weights.clone();

    for (i, y) in obs.iter().enumerate() {
        let b = with_exposure(base, exposure[i]);

        let wo = weights.observed[i];
        if wo > 0.0 && y.yl <= 0.0 {
            let lb = if y.is_exact() {
                b.log_density(y.yl)
            } else {
                b.log_interval_prob(y.yl, y.yu)
            };
            let q = zero_share(p0, lb);
            zero.observed[i] = wo * q;
            positive.observed[i] = wo * (1.0 - q);
        }

        let (wt, wi) = (weights.tail_out[i], weights.tail_in[i]);
        if wt <= 0.0 && wi <= 0.0 {
            continue;
        }
        let window = b.truncated_loglik(y.tl, y.tu);
        if wt > 0.0 && y.tl > 0.0 {
            let q = zero_share(p0, log1mexp(window));
            zero.tail_out[i] = wt * q;
            positive.tail_out[i] = wt * (1.0 - q);
        }
        if wi > 0.0 && y.tl <= 0.0 {
            let q = zero_share(p0, window);
            zero.tail_in[i] = wi * q;
            positive.tail_in[i] = wi * (1.0 - q);
        }
    }
    (zero, positive)
}
