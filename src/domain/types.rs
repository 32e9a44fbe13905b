//! Shared domain types.
//!
//! These types are intentionally kept small so they can be:
//!
//! - shared read-only across rayon workers during fitting
//! - converted to/from the JSON export
//! - built directly from `nalgebra` matrices supplied by callers

use std::time::Duration;

use clap::ValueEnum;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::error::{LrmoeError, Result};
use crate::model::Model;

/// One censored/truncated response value `(tl, yl, yu, tu)`.
///
/// - truncation window `[tl, tu]`: values outside it are never observed
/// - observation interval `[yl, yu]`: the value is known to lie inside it
///
/// Exact when `yl == yu`, right-censored when `yu == +inf`, left-truncated when
/// `tl > 0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub tl: f64,
    pub yl: f64,
    pub yu: f64,
    pub tu: f64,
}

impl Interval {
    /// Validated constructor enforcing `tl <= yl <= yu <= tu`.
    pub fn new(tl: f64, yl: f64, yu: f64, tu: f64) -> Result<Self> {
        if [tl, yl, yu, tu].iter().any(|v| v.is_nan()) {
            return Err(LrmoeError::InvalidObservation(format!(
                "NaN in interval ({tl}, {yl}, {yu}, {tu})"
            )));
        }
        if !(tl <= yl && yl <= yu && yu <= tu) {
            return Err(LrmoeError::InvalidObservation(format!(
                "interval ({tl}, {yl}, {yu}, {tu}) violates tl <= yl <= yu <= tu"
            )));
        }
        if yl == f64::INFINITY {
            return Err(LrmoeError::InvalidObservation(format!(
                "interval ({tl}, {yl}, {yu}, {tu}) has an infinite lower observation bound"
            )));
        }
        Ok(Self { tl, yl, yu, tu })
    }

    /// An exact, untruncated observation.
    pub fn exact(y: f64) -> Self {
        Self {
            tl: 0.0,
            yl: y,
            yu: y,
            tu: f64::INFINITY,
        }
    }

    pub fn is_exact(&self) -> bool {
        self.yl == self.yu
    }

    pub fn is_truncated(&self) -> bool {
        self.tl > 0.0 || self.tu < f64::INFINITY
    }

    /// A single representative value (used for initialization).
    ///
    /// Exact value, else the midpoint of a finite interval, else the lower bound.
    pub fn representative(&self) -> f64 {
        if self.is_exact() || !self.yu.is_finite() {
            self.yl
        } else {
            0.5 * (self.yl + self.yu)
        }
    }
}

/// Response data: `n_obs` rows by `n_dims` censored/truncated values.
///
/// Stored per dimension so each expert update can borrow one column.
#[derive(Debug, Clone, PartialEq)]
pub struct Responses {
    n_obs: usize,
    columns: Vec<Vec<Interval>>,
}

impl Responses {
    /// Build from an exact-value matrix (`n × d`).
    pub fn exact(y: &DMatrix<f64>) -> Result<Self> {
        let (n, d) = y.shape();
        if d == 0 {
            return Err(LrmoeError::ShapeMismatch("response matrix has no columns".into()));
        }
        let mut columns = Vec::with_capacity(d);
        for j in 0..d {
            let mut col = Vec::with_capacity(n);
            for i in 0..n {
                let v = y[(i, j)];
                col.push(Interval::new(0.0_f64.min(v), v, v, f64::INFINITY)?);
            }
            columns.push(col);
        }
        Ok(Self { n_obs: n, columns })
    }

    /// Build from a censored matrix with 4 columns per dimension:
    /// `tl, yl, yu, tu` for dimension 0, then dimension 1, ...
    pub fn censored(y: &DMatrix<f64>) -> Result<Self> {
        let (n, c) = y.shape();
        if c == 0 || c % 4 != 0 {
            return Err(LrmoeError::ShapeMismatch(format!(
                "censored response matrix needs 4 columns per dimension, got {c}"
            )));
        }
        let d = c / 4;
        let mut columns = Vec::with_capacity(d);
        for j in 0..d {
            let mut col = Vec::with_capacity(n);
            for i in 0..n {
                col.push(Interval::new(
                    y[(i, 4 * j)],
                    y[(i, 4 * j + 1)],
                    y[(i, 4 * j + 2)],
                    y[(i, 4 * j + 3)],
                )?);
            }
            columns.push(col);
        }
        Ok(Self { n_obs: n, columns })
    }

    /// Build from already-validated columns (one `Vec` per dimension).
    pub fn from_columns(columns: Vec<Vec<Interval>>) -> Result<Self> {
        let Some(first) = columns.first() else {
            return Err(LrmoeError::ShapeMismatch("responses need at least one dimension".into()));
        };
        let n = first.len();
        if let Some(bad) = columns.iter().position(|c| c.len() != n) {
            return Err(LrmoeError::ShapeMismatch(format!(
                "response dimension {bad} has {} rows, expected {n}",
                columns[bad].len()
            )));
        }
        Ok(Self { n_obs: n, columns })
    }

    pub fn n_obs(&self) -> usize {
        self.n_obs
    }

    pub fn n_dims(&self) -> usize {
        self.columns.len()
    }

    /// All observations of one response dimension.
    pub fn dim(&self, d: usize) -> &[Interval] {
        &self.columns[d]
    }

    pub fn get(&self, i: usize, d: usize) -> &Interval {
        &self.columns[d][i]
    }
}

/// Which expert family a component uses.
///
/// Zero-inflated variants wrap the matching base family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ExpertKind {
    Poisson,
    NegativeBinomial,
    Gamma,
    LogNormal,
    Weibull,
    ZiPoisson,
    ZiNegativeBinomial,
    ZiGamma,
    ZiLogNormal,
    ZiWeibull,
}

impl ExpertKind {
    /// Human-readable label for terminal output.
    pub fn display_name(self) -> &'static str {
        match self {
            ExpertKind::Poisson => "Poisson",
            ExpertKind::NegativeBinomial => "NegativeBinomial",
            ExpertKind::Gamma => "Gamma",
            ExpertKind::LogNormal => "LogNormal",
            ExpertKind::Weibull => "Weibull",
            ExpertKind::ZiPoisson => "ZI-Poisson",
            ExpertKind::ZiNegativeBinomial => "ZI-NegativeBinomial",
            ExpertKind::ZiGamma => "ZI-Gamma",
            ExpertKind::ZiLogNormal => "ZI-LogNormal",
            ExpertKind::ZiWeibull => "ZI-Weibull",
        }
    }

    /// Parameter names in the order of `Expert::params`.
    pub fn param_names(self) -> &'static [&'static str] {
        match self {
            ExpertKind::Poisson => &["lambda"],
            ExpertKind::NegativeBinomial => &["size", "prob"],
            ExpertKind::Gamma => &["shape", "scale"],
            ExpertKind::LogNormal => &["meanlog", "sdlog"],
            ExpertKind::Weibull => &["shape", "scale"],
            ExpertKind::ZiPoisson => &["p0", "lambda"],
            ExpertKind::ZiNegativeBinomial => &["p0", "size", "prob"],
            ExpertKind::ZiGamma => &["p0", "shape", "scale"],
            ExpertKind::ZiLogNormal => &["p0", "meanlog", "sdlog"],
            ExpertKind::ZiWeibull => &["p0", "shape", "scale"],
        }
    }

    /// Number of free parameters (for AIC/BIC).
    pub fn param_count(self) -> usize {
        self.param_names().len()
    }

    /// The base family of a zero-inflated kind.
    pub fn base(self) -> Option<ExpertKind> {
        match self {
            ExpertKind::ZiPoisson => Some(ExpertKind::Poisson),
            ExpertKind::ZiNegativeBinomial => Some(ExpertKind::NegativeBinomial),
            ExpertKind::ZiGamma => Some(ExpertKind::Gamma),
            ExpertKind::ZiLogNormal => Some(ExpertKind::LogNormal),
            ExpertKind::ZiWeibull => Some(ExpertKind::Weibull),
            _ => None,
        }
    }

    /// The zero-inflated counterpart of a base kind.
    pub fn zero_inflated(self) -> Option<ExpertKind> {
        match self {
            ExpertKind::Poisson => Some(ExpertKind::ZiPoisson),
            ExpertKind::NegativeBinomial => Some(ExpertKind::ZiNegativeBinomial),
            ExpertKind::Gamma => Some(ExpertKind::ZiGamma),
            ExpertKind::LogNormal => Some(ExpertKind::ZiLogNormal),
            ExpertKind::Weibull => Some(ExpertKind::ZiWeibull),
            _ => None,
        }
    }

    pub fn is_zero_inflated(self) -> bool {
        self.base().is_some()
    }

    /// Whether the family is supported on the non-negative integers.
    pub fn is_discrete(self) -> bool {
        matches!(
            self.base().unwrap_or(self),
            ExpertKind::Poisson | ExpertKind::NegativeBinomial
        )
    }
}

/// Penalty (log-prior) settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PenaltyConfig {
    /// Add gating and expert log-priors to the objective.
    pub enabled: bool,
    /// Standard deviation of the normal prior on gating coefficients.
    pub gating_sd: f64,
}

impl Default for PenaltyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            gating_sd: 5.0,
        }
    }
}

/// Fitting configuration.
///
/// This is derived from CLI flags (plus defaults) in the binary.
#[derive(Debug, Clone)]
pub struct FitConfig {
    /// Relative penalized log-likelihood change that counts as converged.
    pub tolerance: f64,
    /// Maximum number of outer ECM iterations.
    pub max_iterations: usize,
    /// Newton/IRLS sweeps over the gating components per iteration.
    pub gating_newton_steps: usize,
    /// Iteration cap for expert updates without a closed form (L-BFGS).
    pub expert_newton_steps: usize,
    pub penalty: PenaltyConfig,
    /// Optional wall-clock budget, checked at iteration boundaries.
    pub time_budget: Option<Duration>,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-6,
            max_iterations: 200,
            gating_newton_steps: 5,
            expert_newton_steps: 20,
            penalty: PenaltyConfig::default(),
            time_budget: None,
        }
    }
}

/// Options handed to every expert M-step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MStepOptions {
    pub penalty: bool,
    pub newton_steps: usize,
}

impl Default for MStepOptions {
    fn default() -> Self {
        Self {
            penalty: true,
            newton_steps: 20,
        }
    }
}

/// How the ECM loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitStatus {
    Converged,
    IterationLimitReached,
}

/// An expert update that failed and was skipped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateFailure {
    pub iteration: usize,
    pub dim: usize,
    pub component: usize,
    pub message: String,
}

/// Read-only summary of a finished fit.
#[derive(Debug, Clone)]
pub struct FittingResult {
    pub model: Model,
    pub status: FitStatus,
    pub converged: bool,
    pub iterations: usize,
    /// Unpenalized log-likelihood of the final model.
    pub loglik: f64,
    /// Penalized log-likelihood of the final model.
    pub penalized_loglik: f64,
    pub aic: f64,
    pub bic: f64,
    pub n_params: usize,
    pub n_obs: usize,
    /// Penalized log-likelihood after each iteration (index 0 = initial model).
    pub trace: Vec<f64>,
    pub failures: Vec<UpdateFailure>,
}
