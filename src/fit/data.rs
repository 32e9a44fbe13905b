//! Validated fitting inputs.

use nalgebra::DMatrix;

use crate::domain::Responses;
use crate::error::{LrmoeError, Result};

/// Responses, covariates and exposures with matching row counts.
#[derive(Debug, Clone)]
pub struct FitData {
    pub responses: Responses,
    pub covariates: DMatrix<f64>,
    pub exposure: Vec<f64>,
}

impl FitData {
    /// `exposure` defaults to 1 for every row.
    pub fn new(responses: Responses, covariates: DMatrix<f64>, exposure: Option<&[f64]>) -> Result<Self> {
        let n = responses.n_obs();
        if covariates.nrows() != n {
            return Err(LrmoeError::ShapeMismatch(format!(
                "covariates have {} rows, responses have {n}",
                covariates.nrows()
            )));
        }
        if covariates.ncols() == 0 {
            return Err(LrmoeError::ShapeMismatch("covariate matrix has no columns".into()));
        }
        if let Some((idx, _)) = covariates.iter().enumerate().find(|(_, v)| !v.is_finite()) {
            return Err(LrmoeError::ShapeMismatch(format!(
                "covariate entry {idx} (column-major) is not finite"
            )));
        }
        let exposure = match exposure {
            Some(e) => {
                if e.len() != n {
                    return Err(LrmoeError::ShapeMismatch(format!(
                        "exposure has {} entries, responses have {n}",
                        e.len()
                    )));
                }
                if let Some(i) = e.iter().position(|v| !(v.is_finite() && *v >= 0.0)) {
                    return Err(LrmoeError::InvalidObservation(format!(
                        "exposure at row {i} must be finite and >= 0, got {}",
                        e[i]
                    )));
                }
                e.to_vec()
            }
            None => vec![1.0; n],
        };
        Ok(Self {
            responses,
            covariates,
            exposure,
        })
    }

    pub fn n_obs(&self) -> usize {
        self.responses.n_obs()
    }

    pub fn n_dims(&self) -> usize {
        self.responses.n_dims()
    }

    pub fn n_covariates(&self) -> usize {
        self.covariates.ncols()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn responses(n: usize) -> Responses {
        Responses::exact(&DMatrix::from_element(n, 1, 1.0)).unwrap()
    }

    #[test]
    fn row_counts_must_match() {
        let err = FitData::new(responses(3), DMatrix::zeros(4, 1), None).unwrap_err();
        assert!(matches!(err, LrmoeError::ShapeMismatch(_)));
        let err = FitData::new(responses(3), DMatrix::zeros(3, 1), Some(&[1.0, 1.0])).unwrap_err();
        assert!(matches!(err, LrmoeError::ShapeMismatch(_)));
    }

    #[test]
    fn negative_exposure_is_rejected() {
        let err = FitData::new(responses(2), DMatrix::zeros(2, 1), Some(&[1.0, -1.0])).unwrap_err();
        assert!(matches!(err, LrmoeError::InvalidObservation(_)));
    }

    #[test]
    fn exposure_defaults_to_one() {
        let data = FitData::new(responses(2), DMatrix::from_element(2, 1, 1.0), None).unwrap();
        assert_eq!(data.exposure, vec![1.0, 1.0]);
        assert_eq!(data.n_covariates(), 1);
    }
}
