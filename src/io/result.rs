//! Read/write fitted-result JSON files.
//!
//! Result JSON is the portable representation of a finished fit:
//! - gating coefficients and every expert (family + parameters)
//! - fit diagnostics (status, log-likelihoods, AIC/BIC, trace)
//! - skipped expert updates
//!
//! JSON has no infinities, so non-finite diagnostics are written as `null`
//! and read back as `-inf`.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use chrono::{DateTime, Utc};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::domain::{ExpertKind, FitStatus, FittingResult, UpdateFailure};
use crate::error::{LrmoeError, Result};
use crate::model::Model;

/// One expert as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpertSpec {
    pub kind: ExpertKind,
    pub params: Vec<f64>,
}

/// On-disk schema of a fitted result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitFile {
    pub tool: String,
    pub created_at: DateTime<Utc>,
    pub status: FitStatus,
    pub converged: bool,
    pub iterations: usize,
    pub loglik: Option<f64>,
    pub penalized_loglik: Option<f64>,
    pub aic: Option<f64>,
    pub bic: Option<f64>,
    pub n_params: usize,
    pub n_obs: usize,
    /// `components × covariates`, row-major.
    pub gating: Vec<Vec<f64>>,
    /// `dims × components`.
    pub experts: Vec<Vec<ExpertSpec>>,
    pub trace: Vec<Option<f64>>,
    pub failures: Vec<UpdateFailure>,
}

fn finite(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}

fn or_neg_inf(v: Option<f64>) -> f64 {
    v.unwrap_or(f64::NEG_INFINITY)
}

impl FitFile {
    pub fn from_result(result: &FittingResult) -> Self {
        let gating = result
            .model
            .gating()
            .coefficients()
            .row_iter()
            .map(|r| r.iter().copied().collect())
            .collect();
        let experts = result
            .model
            .experts()
            .rows()
            .iter()
            .map(|row| {
                row.iter()
                    .map(|e| ExpertSpec {
                        kind: e.kind(),
                        params: e.params(),
                    })
                    .collect()
            })
            .collect();

        Self {
            tool: "lrmoe".to_string(),
            created_at: Utc::now(),
            status: result.status,
            converged: result.converged,
            iterations: result.iterations,
            loglik: finite(result.loglik),
            penalized_loglik: finite(result.penalized_loglik),
            aic: finite(result.aic),
            bic: finite(result.bic),
            n_params: result.n_params,
            n_obs: result.n_obs,
            gating,
            experts,
            trace: result.trace.iter().copied().map(finite).collect(),
            failures: result.failures.clone(),
        }
    }

    /// Rebuild the fitted model, re-validating every parameter.
    pub fn to_model(&self) -> Result<Model> {
        let g = self.gating.len();
        let p = self.gating.first().map_or(0, Vec::len);
        if let Some(bad) = self.gating.iter().position(|row| row.len() != p) {
            return Err(LrmoeError::ModelSpecification(format!(
                "gating row {bad} has {} coefficients, expected {p}",
                self.gating[bad].len()
            )));
        }
        let coef = DMatrix::from_row_iterator(g, p, self.gating.iter().flatten().copied());
        let experts = self
            .experts
            .iter()
            .map(|row| row.iter().map(|s| s.kind.build(&s.params)).collect::<Result<Vec<_>>>())
            .collect::<Result<Vec<_>>>()?;
        Model::from_parts(coef, experts)
    }

    /// Rebuild the full result (model plus diagnostics).
    pub fn to_result(&self) -> Result<FittingResult> {
        Ok(FittingResult {
            model: self.to_model()?,
            status: self.status,
            converged: self.converged,
            iterations: self.iterations,
            loglik: or_neg_inf(self.loglik),
            penalized_loglik: or_neg_inf(self.penalized_loglik),
            aic: self.aic.unwrap_or(f64::INFINITY),
            bic: self.bic.unwrap_or(f64::INFINITY),
            n_params: self.n_params,
            n_obs: self.n_obs,
            trace: self.trace.iter().copied().map(or_neg_inf).collect(),
            failures: self.failures.clone(),
        })
    }
}

/// Write a result JSON file.
pub fn write_result_json(path: &Path, result: &FittingResult) -> Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(BufWriter::new(file), &FitFile::from_result(result))?;
    Ok(())
}

/// Read a result JSON file.
pub fn read_result_json(path: &Path) -> Result<FitFile> {
    let file = File::open(path)?;
    let parsed: FitFile = serde_json::from_reader(BufReader::new(file))?;
    Ok(parsed)
}
