//! Standard normal helpers in log space.
//!
//! The log-normal expert needs `ln Φ(z)` deep into both tails (censoring
//! points far from the bulk) and the first two moments of a standard normal
//! restricted to an interval. `statrs` supplies `erfc` and the quantile.

use statrs::distribution::{ContinuousCDF, Normal};
use statrs::function::erf::erfc;

use crate::math::logspace::{log_sub_exp, log_sum_exp};

const LN_SQRT_2PI: f64 = 0.918_938_533_204_672_8;

/// Below this point `ln Φ(z)` switches to the asymptotic expansion.
const LOWER_TAIL_SWITCH: f64 = -20.0;

/// `ln φ(z)`.
pub fn ln_pdf(z: f64) -> f64 {
    -0.5 * z * z - LN_SQRT_2PI
}

/// `Φ(z)`.
pub fn cdf(z: f64) -> f64 {
    0.5 * erfc(-z / std::f64::consts::SQRT_2)
}

/// `ln Φ(z)`, accurate in both tails.
pub fn log_cdf(z: f64) -> f64 {
    if z == f64::INFINITY {
        return 0.0;
    }
    if z == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    if z > 0.0 {
        // ln(1 - Φ(-z)), Φ(-z) is small.
        return (-0.5 * erfc(z / std::f64::consts::SQRT_2)).ln_1p();
    }
    if z > LOWER_TAIL_SWITCH {
        return cdf(z).ln();
    }
    // Mills-ratio series: Φ(z) ≈ φ(z)/(-z) · (1 - 1/z² + 3/z⁴ - 15/z⁶).
    let z2 = z * z;
    let series = 1.0 - 1.0 / z2 + 3.0 / (z2 * z2) - 15.0 / (z2 * z2 * z2);
    ln_pdf(z) - (-z).ln() + series.ln()
}

/// Standard normal quantile.
pub fn quantile(p: f64) -> f64 {
    if p <= 0.0 {
        return f64::NEG_INFINITY;
    }
    if p >= 1.0 {
        return f64::INFINITY;
    }
    match Normal::new(0.0, 1.0) {
        Ok(n) => n.inverse_cdf(p),
        Err(_) => f64::NAN,
    }
}

/// `ln P(a < Z <= b)` for a standard normal `Z`.
pub fn log_interval_mass(a: f64, b: f64) -> f64 {
    if !(a < b) {
        return f64::NEG_INFINITY;
    }
    if b <= 0.0 {
        log_sub_exp(log_cdf(b), log_cdf(a))
    } else if a >= 0.0 {
        log_sub_exp(log_cdf(-a), log_cdf(-b))
    } else {
        // Straddles zero: the mass is at least min(Φ(b)-1/2, 1/2-Φ(a)).
        (1.0 - cdf(a) - cdf(-b)).ln()
    }
}

/// First two raw moments of a standard normal on `(a, b]`.
///
/// Returns `(ln mass, E[Z], E[Z²])`, or `None` if the interval has no mass.
pub fn interval_moments(a: f64, b: f64) -> Option<(f64, f64, f64)> {
    let log_mass = log_interval_mass(a, b);
    if !log_mass.is_finite() {
        return None;
    }
    let (ra, a_ra) = if a.is_finite() {
        let r = (ln_pdf(a) - log_mass).exp();
        (r, a * r)
    } else {
        (0.0, 0.0)
    };
    let (rb, b_rb) = if b.is_finite() {
        let r = (ln_pdf(b) - log_mass).exp();
        (r, b * r)
    } else {
        (0.0, 0.0)
    };
    let m1 = ra - rb;
    let m2 = 1.0 + a_ra - b_rb;
    Some((log_mass, m1, m2.max(0.0)))
}

/// Moments of a standard normal on the complement of `(a, b]`.
pub fn complement_moments(a: f64, b: f64) -> Option<(f64, f64, f64)> {
    let lower = interval_moments(f64::NEG_INFINITY, a);
    let upper = interval_moments(b, f64::INFINITY);
    match (lower, upper) {
        (None, None) => None,
        (Some(m), None) | (None, Some(m)) => Some(m),
        (Some((la, m1a, m2a)), Some((lb, m1b, m2b))) => {
            let log_mass = log_sum_exp(&[la, lb]);
            let wa = (la - log_mass).exp();
            let wb = (lb - log_mass).exp();
            Some((log_mass, wa * m1a + wb * m1b, wa * m2a + wb * m2b))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn log_cdf_is_continuous_across_the_switch() {
        let left = log_cdf(LOWER_TAIL_SWITCH - 1e-9);
        let right = log_cdf(LOWER_TAIL_SWITCH + 1e-9);
        assert_relative_eq!(left, right, max_relative = 1e-6);
        assert!(log_cdf(-40.0).is_finite());
        assert_relative_eq!(log_cdf(0.0), 0.5f64.ln(), epsilon = 1e-12);
        assert!(log_cdf(10.0) < 0.0 && log_cdf(10.0) > -1e-20);
    }

    #[test]
    fn full_line_moments_are_standard() {
        let (lm, m1, m2) = interval_moments(f64::NEG_INFINITY, f64::INFINITY).unwrap();
        assert_relative_eq!(lm, 0.0, epsilon = 1e-12);
        assert_relative_eq!(m1, 0.0, epsilon = 1e-12);
        assert_relative_eq!(m2, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn half_line_moments_match_half_normal() {
        let (_, m1, m2) = interval_moments(0.0, f64::INFINITY).unwrap();
        assert_relative_eq!(m1, (2.0 / std::f64::consts::PI).sqrt(), epsilon = 1e-10);
        assert_relative_eq!(m2, 1.0, epsilon = 1e-10);
    }

    #[test]
    fn complement_of_symmetric_window_has_zero_mean() {
        let (lm, m1, _) = complement_moments(-1.0, 1.0).unwrap();
        assert_relative_eq!(m1, 0.0, epsilon = 1e-10);
        assert_relative_eq!(lm.exp(), 2.0 * cdf(-1.0), epsilon = 1e-12);
    }
}
