//! Small dense linear solves for the gating Newton step.
//!
//! Each gating update solves `(Xᵀ D X + λ I) δ = g` for one component, where
//! the system size is the covariate count (typically 2–20 columns).
//!
//! Implementation choices:
//! - Cholesky first: the penalized negative Hessian is symmetric positive
//!   definite whenever the penalty is on or the design has full column rank.
//! - SVD least squares as the fallback for rank-deficient designs (e.g. a
//!   component whose weights collapsed to a handful of rows).

use nalgebra::{DMatrix, DVector};

/// Solve a symmetric positive (semi-)definite system.
///
/// Returns `None` if neither Cholesky nor the SVD fallback yields a finite
/// solution.
pub fn solve_spd(a: &DMatrix<f64>, b: &DVector<f64>) -> Option<DVector<f64>> {
    if let Some(chol) = a.clone().cholesky() {
        let x = chol.solve(b);
        if x.iter().all(|v| v.is_finite()) {
            return Some(x);
        }
    }
    solve_least_squares(a, b)
}

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    // Try progressively looser tolerances if strict solve fails.
    for &tol in &[1e-10, 1e-8, 1e-6] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn least_squares_solves_simple_system() {
        // Fit y = 2 + 3x on x = [0,1,2]
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let y = DVector::from_row_slice(&[2.0, 5.0, 8.0]);

        let beta = solve_least_squares(&x, &y).unwrap();
        assert!((beta[0] - 2.0).abs() < 1e-10);
        assert!((beta[1] - 3.0).abs() < 1e-10);
    }

    #[test]
    fn spd_solve_falls_back_on_singular_matrix() {
        let a = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 1.0]);
        let b = DVector::from_row_slice(&[2.0, 2.0]);
        let x = solve_spd(&a, &b).unwrap();
        assert!(((a * &x) - b).norm() < 1e-8);
    }

    #[test]
    fn spd_solve_uses_cholesky_on_well_posed_system() {
        let a = DMatrix::from_row_slice(2, 2, &[4.0, 1.0, 1.0, 3.0]);
        let b = DVector::from_row_slice(&[1.0, 2.0]);
        let x = solve_spd(&a, &b).unwrap();
        assert!((x[0] - 1.0 / 11.0).abs() < 1e-12);
        assert!((x[1] - 7.0 / 11.0).abs() < 1e-12);
    }
}
