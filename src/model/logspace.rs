//! Log-domain arithmetic.

pub const LOG_ZERO: f64 = f64::NEG_INFINITY;

/// `ln(e^a + e^b)` without leaving log space.
#[inline]
pub fn log_add(a: f64, b: f64) -> f64 {
    if a == LOG_ZERO {
        return b;
    }
    if b == LOG_ZERO {
        return a;
    }
    let (hi, lo) = if a > b { (a, b) } else { (b, a) };
    hi + (lo - hi).exp().ln_1p()
}

pub fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(LOG_ZERO, f64::max);
    if max == LOG_ZERO || !max.is_finite() {
        return max;
    }
    max + values.iter().map(|v| (v - max).exp()).sum::<f64>().ln()
}
