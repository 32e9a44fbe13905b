//! Moment-based starting values.
//!
//! Observations are sorted by a representative value of the first response
//! dimension and cut into `g` contiguous groups; each group seeds one
//! component. Gating coefficients start at zero (equal weights).

use crate::domain::{ExpertKind, Responses};
use crate::error::{LrmoeError, Result};
use crate::experts::ExpertRef;
use crate::gating::Gating;
use crate::model::{ExpertMatrix, Model};

/// Build a starting model for `kinds[dim][component]`.
///
/// Families whose moment estimates are unusable fall back to their defaults
/// (see [`ExpertKind::init_from_sample`]).
pub fn moment_init(responses: &Responses, n_covariates: usize, kinds: &[Vec<ExpertKind>]) -> Result<Model> {
    if kinds.len() != responses.n_dims() {
        return Err(LrmoeError::ShapeMismatch(format!(
            "{} rows of expert kinds for {} response dimensions",
            kinds.len(),
            responses.n_dims()
        )));
    }
    let g = kinds.first().map_or(0, Vec::len);
    if g == 0 || kinds.iter().any(|row| row.len() != g) {
        return Err(LrmoeError::ModelSpecification(
            "every response dimension needs the same, non-zero number of components".into(),
        ));
    }

    let n = responses.n_obs();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        let ra = responses.get(a, 0).representative();
        let rb = responses.get(b, 0).representative();
        ra.total_cmp(&rb)
    });

    let mut cells: Vec<Vec<ExpertRef>> = Vec::with_capacity(kinds.len());
    for (d, row) in kinds.iter().enumerate() {
        let mut experts = Vec::with_capacity(g);
        for (j, kind) in row.iter().enumerate() {
            let (lo, hi) = (j * n / g, (j + 1) * n / g);
            let sample: Vec<f64> = order[lo..hi]
                .iter()
                .map(|&i| responses.get(i, d).representative())
                .collect();
            experts.push(kind.init_from_sample(&sample)?);
        }
        cells.push(experts);
    }

    Model::new(Gating::uniform(g, n_covariates)?, ExpertMatrix::new(cells)?)
}
