//! Bounded quasi-Newton maximizer for the expert M-steps without a closed
//! form (gamma, Weibull, negative binomial).
//!
//! The objective is evaluated on an unconstrained parameterization
//! (log / logit). `argmin` runs L-BFGS with a More-Thuente line search on the
//! negated objective; gradients come from `finitediff`.
//!
//! Guarantees:
//! - the returned point never has a lower objective than the start
//! - at most `max_iter` solver iterations run, converged or not
//! - a solver error (e.g. a non-finite objective inside the line search)
//!   returns the start point instead of failing the M-step

use argmin::core::{ArgminError, CostFunction, Error, Executor, Gradient, State, TerminationReason, TerminationStatus};
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::quasinewton::LBFGS;
use finitediff::FiniteDiff;
use ndarray::Array1;

pub type Theta = Array1<f64>;

type Lbfgs = LBFGS<MoreThuenteLineSearch<Theta, Theta, f64>, Theta, Theta, f64>;

const LBFGS_MEMORY: usize = 7;

/// Options for [`maximize`].
#[derive(Debug, Clone)]
pub struct MaximizeOptions {
    /// Maximum number of solver iterations.
    pub max_iter: usize,
    /// Gradient-norm tolerance.
    pub tol_grad: f64,
    /// Cost-change tolerance.
    pub tol_cost: f64,
}

impl Default for MaximizeOptions {
    fn default() -> Self {
        Self {
            max_iter: 20,
            tol_grad: 1e-8,
            tol_cost: 1e-12,
        }
    }
}

/// Result of [`maximize`].
#[derive(Debug, Clone)]
pub struct MaximizeOutcome {
    pub x: Vec<f64>,
    pub value: f64,
    pub iterations: usize,
    pub converged: bool,
}

/// `argmin` view of `-f`.
struct Negated<'a, F> {
    f: &'a F,
}

impl<F> CostFunction for Negated<'_, F>
where
    F: Fn(&[f64]) -> f64,
{
    type Param = Theta;
    type Output = f64;

    fn cost(&self, theta: &Theta) -> Result<f64, Error> {
        let value = (self.f)(&theta.to_vec());
        if !value.is_finite() {
            return Err(ArgminError::InvalidParameter {
                text: format!("objective is {value} at {theta}"),
            }
            .into());
        }
        Ok(-value)
    }
}

impl<F> Gradient for Negated<'_, F>
where
    F: Fn(&[f64]) -> f64,
{
    type Param = Theta;
    type Gradient = Theta;

    fn gradient(&self, theta: &Theta) -> Result<Theta, Error> {
        let cost = |x: &Theta| self.cost(x).unwrap_or(f64::NAN);
        let grad = theta.central_diff(&cost);
        if grad.iter().all(|g| g.is_finite()) {
            return Ok(grad);
        }
        // Central differences can step off the finite region near a boundary.
        let grad = theta.forward_diff(&cost);
        if grad.iter().all(|g| g.is_finite()) {
            return Ok(grad);
        }
        Err(ArgminError::ConditionViolated {
            text: format!("non-finite gradient at {theta}"),
        }
        .into())
    }
}

fn build_solver(opts: &MaximizeOptions) -> Result<Lbfgs, Error> {
    LBFGS::new(MoreThuenteLineSearch::new(), LBFGS_MEMORY)
        .with_tolerance_grad(opts.tol_grad)?
        .with_tolerance_cost(opts.tol_cost)
}

/// Maximize `f` starting from `x0`.
pub fn maximize<F>(f: F, x0: &[f64], opts: &MaximizeOptions) -> MaximizeOutcome
where
    F: Fn(&[f64]) -> f64,
{
    let start = MaximizeOutcome {
        x: x0.to_vec(),
        value: f(x0),
        iterations: 0,
        converged: false,
    };
    if !start.value.is_finite() || opts.max_iter == 0 {
        return start;
    }

    let problem = Negated { f: &f };
    let run = build_solver(opts).and_then(|solver| {
        Executor::new(problem, solver)
            .configure(|state| state.param(Array1::from(x0.to_vec())).max_iters(opts.max_iter as u64))
            .run()
    });

    let mut state = match run {
        Ok(result) => result.state().clone(),
        Err(err) => {
            log::debug!("L-BFGS stopped with an error ({err}); keeping the start point");
            return start;
        }
    };

    let iterations = state.get_iter() as usize;
    let converged = !matches!(
        state.get_termination_status(),
        TerminationStatus::NotTerminated | TerminationStatus::Terminated(TerminationReason::MaxItersReached)
    );
    let value = -state.get_best_cost();
    match state.take_best_param() {
        Some(best) if value.is_finite() && value >= start.value => MaximizeOutcome {
            x: best.to_vec(),
            value,
            iterations,
            converged,
        },
        _ => MaximizeOutcome { iterations, ..start },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_maximum_of_concave_quadratic() {
        let f = |x: &[f64]| -(x[0] - 1.0).powi(2) - 2.0 * (x[1] + 0.5).powi(2) + 0.5 * x[0] * x[1];
        let out = maximize(f, &[5.0, 5.0], &MaximizeOptions::default());
        // Stationary point of the quadratic.
        let g0 = -2.0 * (out.x[0] - 1.0) + 0.5 * out.x[1];
        let g1 = -4.0 * (out.x[1] + 0.5) + 0.5 * out.x[0];
        assert!(g0.abs() < 1e-4 && g1.abs() < 1e-4, "gradient ({g0}, {g1})");
        assert!(out.value >= f(&[5.0, 5.0]));
    }

    #[test]
    fn never_returns_a_worse_point() {
        // Non-concave objective.
        let f = |x: &[f64]| (x[0]).sin() + (2.0 * x[0]).cos();
        let start = [0.3];
        let out = maximize(f, &start, &MaximizeOptions::default());
        assert!(out.value >= f(&start));
        assert!((f(&out.x) - out.value).abs() < 1e-12);
    }

    #[test]
    fn non_finite_start_is_returned_unchanged() {
        let f = |_: &[f64]| f64::NEG_INFINITY;
        let out = maximize(f, &[1.0, 2.0], &MaximizeOptions::default());
        assert_eq!(out.x, vec![1.0, 2.0]);
        assert!(!out.converged);
        assert_eq!(out.iterations, 0);
    }

    #[test]
    fn respects_iteration_cap() {
        let f = |x: &[f64]| -(x[0] - 100.0).abs().powf(1.5);
        let opts = MaximizeOptions {
            max_iter: 2,
            ..MaximizeOptions::default()
        };
        let out = maximize(f, &[0.0], &opts);
        assert!(out.iterations <= 2);
        assert!(out.value >= f(&[0.0]));
    }

    #[test]
    fn infeasible_region_does_not_lose_the_start() {
        // Finite only for x > 0; steep enough that early steps overshoot.
        let f = |x: &[f64]| if x[0] > 0.0 { x[0].ln() - x[0] } else { f64::NEG_INFINITY };
        let out = maximize(f, &[0.2], &MaximizeOptions::default());
        assert!(out.value.is_finite());
        assert!(out.value >= f(&[0.2]));
    }
}
