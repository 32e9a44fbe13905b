//! Multinomial-logit gating network.
//!
//! Given:
//! - a covariate matrix `X` (`n × p`)
//! - a coefficient matrix `A` (`g × p`), last row held at zero
//!
//! the mixing weights are `π_ij = softmax_j(x_i · α_j)`.
//!
//! The update maximizes the pooled expected log-likelihood
//! `Σ_ij W_ij ln π_ij - Σ α² / (2σ²)` one component at a time with damped
//! Newton (IRLS) steps; every accepted step increases the objective.

use nalgebra::{DMatrix, DVector};

use crate::error::{LrmoeError, Result};
use crate::math::{log_sum_exp, solve_spd};

/// Ridge used when the penalty is disabled, only to keep the Newton system
/// solvable for rank-deficient weights.
const UNPENALIZED_RIDGE: f64 = 1e-8;

/// Step-halving budget per component Newton step.
const MAX_HALVINGS: usize = 30;

#[derive(Debug, Clone, PartialEq)]
pub struct Gating {
    coef: DMatrix<f64>,
}

/// Options for one gating update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GatingOptions {
    /// Sweeps over the non-reference components.
    pub newton_steps: usize,
    /// Prior standard deviation of every coefficient; `None` disables the penalty.
    pub penalty_sd: Option<f64>,
}

impl Gating {
    /// Build from a `components × covariates` matrix.
    ///
    /// The last row is the reference: it is subtracted from every row, which
    /// leaves the weights unchanged.
    pub fn new(mut coef: DMatrix<f64>) -> Result<Self> {
        let (g, p) = coef.shape();
        if g == 0 || p == 0 {
            return Err(LrmoeError::ModelSpecification(format!(
                "gating coefficients must be non-empty, got {g}x{p}"
            )));
        }
        if coef.iter().any(|v| !v.is_finite()) {
            return Err(LrmoeError::ModelSpecification(
                "gating coefficients must be finite".into(),
            ));
        }
        let reference = coef.row(g - 1).clone_owned();
        for mut row in coef.row_iter_mut() {
            row -= &reference;
        }
        Ok(Self { coef })
    }

    /// All-zero coefficients (equal weights).
    pub fn uniform(n_components: usize, n_covariates: usize) -> Result<Self> {
        Self::new(DMatrix::zeros(n_components, n_covariates))
    }

    pub fn coefficients(&self) -> &DMatrix<f64> {
        &self.coef
    }

    pub fn n_components(&self) -> usize {
        self.coef.nrows()
    }

    pub fn n_covariates(&self) -> usize {
        self.coef.ncols()
    }

    /// Free parameters: every row except the reference.
    pub fn n_free_params(&self) -> usize {
        (self.n_components() - 1) * self.n_covariates()
    }

    /// `ln π` for every row of `x` (`n × g`).
    pub fn log_weights(&self, x: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        if x.ncols() != self.n_covariates() {
            return Err(LrmoeError::ShapeMismatch(format!(
                "covariates have {} columns, gating expects {}",
                x.ncols(),
                self.n_covariates()
            )));
        }
        Ok(log_softmax_rows(x * self.coef.transpose()))
    }

    /// Mixing weights for a single covariate row.
    pub fn weights_row(&self, x_row: &[f64]) -> Vec<f64> {
        let scores: Vec<f64> = self
            .coef
            .row_iter()
            .map(|a| a.iter().zip(x_row).map(|(c, v)| c * v).sum())
            .collect();
        let lse = log_sum_exp(&scores);
        scores.iter().map(|s| (s - lse).exp()).collect()
    }

    /// Normal log-prior kernel `-Σ α² / (2 sd²)`.
    pub fn log_prior(&self, sd: f64) -> f64 {
        -self.coef.iter().map(|a| a * a).sum::<f64>() / (2.0 * sd * sd)
    }

    /// One gating update against pooled weights `w` (`n × g`, rows summing to
    /// `1 + k_i`), warm-started from `self`.
    pub fn update(&self, x: &DMatrix<f64>, w: &DMatrix<f64>, opts: &GatingOptions) -> Result<Gating> {
        let (n, p) = x.shape();
        let g = self.n_components();
        if p != self.n_covariates() || w.nrows() != n || w.ncols() != g {
            return Err(LrmoeError::ShapeMismatch(format!(
                "gating update: covariates {n}x{p}, weights {}x{}, coefficients {g}x{}",
                w.nrows(),
                w.ncols(),
                self.n_covariates()
            )));
        }
        let totals: DVector<f64> = DVector::from_iterator(n, w.row_iter().map(|r| r.sum()));
        let ridge = opts.penalty_sd.map_or(UNPENALIZED_RIDGE, |sd| 1.0 / (sd * sd));

        let mut coef = self.coef.clone();
        let mut current = objective(&coef, x, w, &totals, opts.penalty_sd);

        for _ in 0..opts.newton_steps {
            let before = current;
            for j in 0..g.saturating_sub(1) {
                let log_pi = log_softmax_rows(x * coef.transpose());
                let alpha_j = coef.row(j).transpose();

                // grad = Xᵀ(W_j − t⊙π_j) − α_j/σ²,  negH = Xᵀ diag(t π (1−π)) X + I/σ².
                let mut resid = DVector::<f64>::zeros(n);
                let mut xw = x.clone();
                for i in 0..n {
                    let pi = log_pi[(i, j)].exp();
                    resid[i] = w[(i, j)] - totals[i] * pi;
                    let h = (totals[i] * pi * (1.0 - pi)).max(0.0).sqrt();
                    for c in 0..p {
                        xw[(i, c)] *= h;
                    }
                }
                let mut grad = x.transpose() * resid;
                let mut neg_hess = xw.transpose() * &xw;
                for c in 0..p {
                    neg_hess[(c, c)] += ridge;
                }
                if opts.penalty_sd.is_some() {
                    grad -= &alpha_j * ridge;
                }

                let Some(step) = solve_spd(&neg_hess, &grad) else {
                    log::debug!("gating component {j}: Newton system not solvable, step skipped");
                    continue;
                };

                let mut scale = 1.0;
                for _ in 0..=MAX_HALVINGS {
                    let mut trial = coef.clone();
                    let proposed = &alpha_j + &step * scale;
                    trial.set_row(j, &proposed.transpose());
                    let value = objective(&trial, x, w, &totals, opts.penalty_sd);
                    if value.is_finite() && value >= current {
                        coef = trial;
                        current = value;
                        break;
                    }
                    scale *= 0.5;
                }
            }
            if (current - before).abs() <= 1e-12 * current.abs().max(1.0) {
                break;
            }
        }
        Ok(Gating { coef })
    }
}

/// Row-wise log-softmax with max subtraction.
fn log_softmax_rows(mut scores: DMatrix<f64>) -> DMatrix<f64> {
    for mut row in scores.row_iter_mut() {
        let vals: Vec<f64> = row.iter().copied().collect();
        let lse = log_sum_exp(&vals);
        for v in row.iter_mut() {
            *v -= lse;
        }
    }
    scores
}

/// `Σ_i [Σ_j W_ij s_ij − t_i lse_j(s_ij)]` plus the normal log-prior.
fn objective(
    coef: &DMatrix<f64>,
    x: &DMatrix<f64>,
    w: &DMatrix<f64>,
    totals: &DVector<f64>,
    penalty_sd: Option<f64>,
) -> f64 {
    let scores = x * coef.transpose();
    let mut acc = 0.0;
    for (i, row) in scores.row_iter().enumerate() {
        let vals: Vec<f64> = row.iter().copied().collect();
        let lse = log_sum_exp(&vals);
        acc += row.iter().zip(w.row(i).iter()).map(|(s, wij)| wij * s).sum::<f64>() - totals[i] * lse;
    }
    if let Some(sd) = penalty_sd {
        acc -= coef.iter().map(|a| a * a).sum::<f64>() / (2.0 * sd * sd);
    }
    acc
}
