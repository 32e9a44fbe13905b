//! The LRMoE model value: gating network plus a `dims × components` matrix of
//! experts.
//!
//! Models are immutable. Every fitting iteration builds a new `Model` from the
//! updated gating and experts; unchanged experts are shared through `Arc`.

use nalgebra::DMatrix;

use crate::domain::PenaltyConfig;
use crate::error::{LrmoeError, Result};
use crate::experts::ExpertRef;
use crate::gating::Gating;

pub mod simulate;

pub use simulate::simulate_dataset;

/// Experts indexed by `(response dimension, component)`.
#[derive(Debug, Clone)]
pub struct ExpertMatrix {
    n_dims: usize,
    n_components: usize,
    cells: Vec<Vec<ExpertRef>>,
}

impl ExpertMatrix {
    /// Build from one row of experts per response dimension.
    pub fn new(cells: Vec<Vec<ExpertRef>>) -> Result<Self> {
        let Some(first) = cells.first() else {
            return Err(LrmoeError::ModelSpecification(
                "expert matrix needs at least one response dimension".into(),
            ));
        };
        let g = first.len();
        if g == 0 {
            return Err(LrmoeError::ModelSpecification(
                "expert matrix needs at least one component".into(),
            ));
        }
        if let Some(d) = cells.iter().position(|row| row.len() != g) {
            return Err(LrmoeError::ModelSpecification(format!(
                "expert matrix row {d} has {} components, expected {g}",
                cells[d].len()
            )));
        }
        Ok(Self {
            n_dims: cells.len(),
            n_components: g,
            cells,
        })
    }

    pub fn n_dims(&self) -> usize {
        self.n_dims
    }

    pub fn n_components(&self) -> usize {
        self.n_components
    }

    pub fn get(&self, dim: usize, component: usize) -> &ExpertRef {
        &self.cells[dim][component]
    }

    pub fn rows(&self) -> &[Vec<ExpertRef>] {
        &self.cells
    }

    pub fn n_params(&self) -> usize {
        self.cells.iter().flatten().map(|e| e.n_params()).sum()
    }

    pub fn log_prior(&self) -> f64 {
        self.cells.iter().flatten().map(|e| e.log_prior()).sum()
    }
}

#[derive(Debug, Clone)]
pub struct Model {
    gating: Gating,
    experts: ExpertMatrix,
}

impl Model {
    /// Pair a gating network with an expert matrix; the component counts must
    /// agree.
    pub fn new(gating: Gating, experts: ExpertMatrix) -> Result<Self> {
        if gating.n_components() != experts.n_components() {
            return Err(LrmoeError::ModelSpecification(format!(
                "gating has {} components but the expert matrix has {}",
                gating.n_components(),
                experts.n_components()
            )));
        }
        Ok(Self { gating, experts })
    }

    /// Build from raw coefficients (`components × covariates`) and experts.
    pub fn from_parts(coefficients: DMatrix<f64>, experts: Vec<Vec<ExpertRef>>) -> Result<Self> {
        let experts = ExpertMatrix::new(experts)?;
        if coefficients.nrows() != experts.n_components() {
            return Err(LrmoeError::ModelSpecification(format!(
                "coefficient matrix has {} rows but the expert matrix has {} components",
                coefficients.nrows(),
                experts.n_components()
            )));
        }
        Self::new(Gating::new(coefficients)?, experts)
    }

    pub fn gating(&self) -> &Gating {
        &self.gating
    }

    pub fn experts(&self) -> &ExpertMatrix {
        &self.experts
    }

    pub fn n_components(&self) -> usize {
        self.gating.n_components()
    }

    pub fn n_dims(&self) -> usize {
        self.experts.n_dims()
    }

    /// Free parameters counted by AIC/BIC.
    pub fn n_params(&self) -> usize {
        self.gating.n_free_params() + self.experts.n_params()
    }

    /// Total log-prior added to the log-likelihood (0 when disabled).
    pub fn penalty(&self, penalty: &PenaltyConfig) -> f64 {
        if !penalty.enabled {
            return 0.0;
        }
        self.gating.log_prior(penalty.gating_sd) + self.experts.log_prior()
    }
}
