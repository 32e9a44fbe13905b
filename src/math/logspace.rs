//! Log-space arithmetic.
//!
//! Likelihood contributions of censored observations are differences of
//! probabilities that may both be close to 0 or both close to 1. All of the
//! helpers here work on log-probabilities so those differences keep their
//! relative precision.

use std::f64::consts::LN_2;

/// `ln(Σ exp(v))`, stable against overflow/underflow.
///
/// Returns `-inf` for an empty slice or when every entry is `-inf`.
pub fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    max + values.iter().map(|&v| (v - max).exp()).sum::<f64>().ln()
}

/// `ln(exp(a) - exp(b))` for `a >= b`.
///
/// Returns `-inf` when `b >= a` (the difference is zero or negative).
pub fn log_sub_exp(a: f64, b: f64) -> f64 {
    if b == f64::NEG_INFINITY {
        return a;
    }
    if b >= a {
        return f64::NEG_INFINITY;
    }
    a + log1mexp(b - a)
}

/// `ln(1 - exp(x))` for `x <= 0`.
///
/// Uses `ln(-expm1(x))` near zero and `ln_1p(-exp(x))` further out
/// (Mächler's split point `-ln 2`).
pub fn log1mexp(x: f64) -> f64 {
    if x >= 0.0 {
        return f64::NEG_INFINITY;
    }
    if x > -LN_2 {
        (-x.exp_m1()).ln()
    } else {
        (-x.exp()).ln_1p()
    }
}

/// Row-wise softmax of log-scores, written into `out`.
///
/// The row maximum is subtracted before exponentiating. If every score is
/// `-inf` the output is left untouched and `false` is returned.
pub fn softmax_into(log_scores: &[f64], out: &mut [f64]) -> bool {
    let lse = log_sum_exp(log_scores);
    if !lse.is_finite() {
        return false;
    }
    for (o, &s) in out.iter_mut().zip(log_scores) {
        *o = (s - lse).exp();
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn log_sum_exp_handles_extreme_values() {
        let v = [-1000.0, -1000.0];
        assert_relative_eq!(log_sum_exp(&v), -1000.0 + LN_2, epsilon = 1e-12);
        assert_eq!(log_sum_exp(&[]), f64::NEG_INFINITY);
        assert_eq!(log_sum_exp(&[f64::NEG_INFINITY; 3]), f64::NEG_INFINITY);
    }

    #[test]
    fn log_sub_exp_keeps_precision_for_close_values() {
        let a = (0.5f64).ln();
        let b = (0.5f64 - 1e-12).ln();
        let got = log_sub_exp(a, b).exp();
        assert_relative_eq!(got, 1e-12, max_relative = 1e-3);
        assert_eq!(log_sub_exp(b, a), f64::NEG_INFINITY);
    }

    #[test]
    fn log1mexp_matches_naive_in_safe_range() {
        for &x in &[-1e-10, -0.1, -0.69, -0.7, -5.0, -50.0] {
            let naive = (1.0 - f64::exp(x)).ln();
            assert_relative_eq!(log1mexp(x), naive, max_relative = 1e-6);
        }
        assert_eq!(log1mexp(0.0), f64::NEG_INFINITY);
    }

    #[test]
    fn softmax_survives_underflow() {
        let mut out = [0.0; 3];
        assert!(softmax_into(&[-2000.0, -2001.0, f64::NEG_INFINITY], &mut out));
        assert_relative_eq!(out.iter().sum::<f64>(), 1.0, epsilon = 1e-12);
        assert!(out[0] > out[1]);
        assert_eq!(out[2], 0.0);
    }
}
