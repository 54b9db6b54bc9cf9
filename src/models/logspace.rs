//! Log-space arithmetic helpers
//!
//! All recursions in this crate run in log space to avoid underflow on long
//! observation sequences, so summing probabilities means log-sum-exp.

/// Numerically stable computation of `log(exp(a) + exp(b))`.
///
/// Handles the cases where `a` or `b` are negative infinity.
pub fn log_sum_exp(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY {
        return b;
    }
    if b == f64::NEG_INFINITY {
        return a;
    }
    let max = a.max(b);
    max + ((a - max).exp() + (b - max).exp()).ln()
}

/// Log-sum-exp over a slice.
pub fn log_sum_exp_slice(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return f64::NEG_INFINITY;
    }
    let max = xs.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    let sum: f64 = xs.iter().map(|&x| (x - max).exp()).sum();
    max + sum.ln()
}
