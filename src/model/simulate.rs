//! Drawing synthetic responses from a model.

use nalgebra::DMatrix;
use rand::RngCore;
use rand::distributions::{Distribution, WeightedIndex};

use crate::error::{LrmoeError, Result};
use crate::experts::with_exposure;
use crate::model::Model;

/// Draw one response row per covariate row.
///
/// For each row a component is drawn from the gating weights, then every
/// response dimension is drawn from that component's (exposure-scaled) expert.
/// Returns an `n × dims` matrix of exact values.
pub fn simulate_dataset(
    model: &Model,
    covariates: &DMatrix<f64>,
    exposure: Option<&[f64]>,
    rng: &mut dyn RngCore,
) -> Result<DMatrix<f64>> {
    let n = covariates.nrows();
    if let Some(e) = exposure {
        if e.len() != n {
            return Err(LrmoeError::ShapeMismatch(format!(
                "exposure has {} entries, covariates have {n} rows",
                e.len()
            )));
        }
    }
    let log_w = model.gating().log_weights(covariates)?;
    let dims = model.n_dims();
    let mut out = DMatrix::zeros(n, dims);

    for i in 0..n {
        let weights: Vec<f64> = log_w.row(i).iter().map(|v| v.exp()).collect();
        let picker = WeightedIndex::new(&weights)
            .map_err(|err| LrmoeError::ModelSpecification(format!("row {i}: invalid gating weights ({err})")))?;
        let component = picker.sample(rng);
        let e = exposure.map_or(1.0, |e| e[i]);
        for d in 0..dims {
            let expert = with_exposure(model.experts().get(d, component), e);
            out[(i, d)] = expert.simulate(rng);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ExpertKind;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn component_shares_follow_gating_weights() {
        // Intercept-only gating with P(component 0) = 1 / (1 + e^{-1}).
        let coef = DMatrix::from_row_slice(2, 1, &[1.0, 0.0]);
        let experts = vec![vec![
            ExpertKind::Poisson.build(&[1000.0]).unwrap(),
            ExpertKind::Poisson.build(&[1.0]).unwrap(),
        ]];
        let model = Model::from_parts(coef, experts).unwrap();
        let x = DMatrix::from_element(20_000, 1, 1.0);
        let mut rng = StdRng::seed_from_u64(9);
        let y = simulate_dataset(&model, &x, None, &mut rng).unwrap();
        let share = y.iter().filter(|&&v| v > 100.0).count() as f64 / 20_000.0;
        let expected = 1.0 / (1.0 + (-1.0f64).exp());
        assert!((share - expected).abs() < 0.02, "share {share}");
    }

    #[test]
    fn zero_exposure_gives_zero_counts() {
        let model = Model::from_parts(
            DMatrix::zeros(1, 1),
            vec![vec![ExpertKind::Poisson.build(&[5.0]).unwrap()]],
        )
        .unwrap();
        let x = DMatrix::from_element(10, 1, 1.0);
        let mut rng = StdRng::seed_from_u64(1);
        let y = simulate_dataset(&model, &x, Some(&[0.0; 10]), &mut rng).unwrap();
        assert!(y.iter().all(|&v| v == 0.0));
        assert!(matches!(
            simulate_dataset(&model, &x, Some(&[1.0; 3]), &mut rng),
            Err(LrmoeError::ShapeMismatch(_))
        ));
    }
}
