//! The demo pipeline behind `lrmoe demo`.
//!
//! covariates -> simulate from the reference model -> fit from a perturbed start

use nalgebra::DMatrix;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, StandardNormal};

use crate::domain::{ExpertKind, FitConfig, FittingResult, Responses};
use crate::error::Result;
use crate::fit::FitData;
use crate::model::{Model, simulate_dataset};

/// All computed outputs of a single demo run.
#[derive(Debug, Clone)]
pub struct DemoRun {
    pub truth: Model,
    pub result: FittingResult,
}

/// Two components, one dimension: gating `[[-0.5, 1], [0, 0]]`,
/// experts Poisson(6) and LogNormal(4, 0.3).
pub fn reference_model() -> Result<Model> {
    Model::from_parts(
        DMatrix::from_row_slice(2, 2, &[-0.5, 1.0, 0.0, 0.0]),
        vec![vec![
            ExpertKind::Poisson.build(&[6.0])?,
            ExpertKind::LogNormal.build(&[4.0, 0.3])?,
        ]],
    )
}

/// Starting point for the demo fit.
pub fn perturbed_start() -> Result<Model> {
    Model::from_parts(
        DMatrix::from_row_slice(2, 2, &[0.0, 0.5, 0.0, 0.0]),
        vec![vec![
            ExpertKind::Poisson.build(&[4.0])?,
            ExpertKind::LogNormal.build(&[3.5, 0.5])?,
        ]],
    )
}

/// Intercept column plus one standard-normal covariate.
pub fn demo_covariates(n: usize, rng: &mut StdRng) -> DMatrix<f64> {
    DMatrix::from_fn(n, 2, |_, c| {
        if c == 0 {
            1.0
        } else {
            StandardNormal.sample(&mut *rng)
        }
    })
}

pub fn run_demo(n: usize, seed: u64, config: &FitConfig) -> Result<DemoRun> {
    let mut rng = StdRng::seed_from_u64(seed);
    let truth = reference_model()?;

    let x = demo_covariates(n, &mut rng);
    let y = simulate_dataset(&truth, &x, None, &mut rng)?;
    log::info!("simulated {n} observations (seed {seed})");

    let data = FitData::new(Responses::exact(&y)?, x, None)?;
    let result = crate::fit::fit_model(&data, perturbed_start()?, config)?;

    Ok(DemoRun { truth, result })
}
