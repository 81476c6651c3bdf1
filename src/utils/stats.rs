//! Statistical utility functions.

use std::cmp::Ordering;

/// Calculate the mean of a slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation (n denominator).
pub fn population_std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let m = mean(values);
    (values.iter().map(|x| (x - m).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}

/// Total order on `f64` that puts every NaN after every number, whatever
/// its sign bit. `-0.0` sorts before `0.0`.
pub fn nan_last(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (false, false) => a.total_cmp(&b),
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
    }
}

/// Sort a copy of `values`, NaN last.
pub fn sorted(values: &[f64]) -> Vec<f64> {
    let mut out = values.to_vec();
    out.sort_by(|a, b| nan_last(*a, *b));
    out
}

/// Quantile `q` in `[0, 1]` of already sorted values.
///
/// Linear interpolation between the closest order statistics, the default
/// method of most numeric libraries.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let q = q.clamp(0.0, 1.0);
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn mean_calculates_correctly() {
        assert_relative_eq!(mean(&[1.0, 2.0, 3.0, 4.0, 5.0]), 3.0, epsilon = 1e-10);
        assert_relative_eq!(mean(&[10.0]), 10.0, epsilon = 1e-10);
        assert!(mean(&[]).is_nan());
    }

    #[test]
    fn population_std_uses_n_denominator() {
        assert_relative_eq!(
            population_std(&[1.0, 2.0, 3.0, 4.0, 5.0]),
            2.0_f64.sqrt(),
            epsilon = 1e-10
        );
        assert!(population_std(&[]).is_nan());
    }

    #[test]
    fn quantile_interpolates_linearly() {
        let values = sorted(&[4.0, 1.0, 3.0, 2.0, 5.0]);
        assert_eq!(values, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_relative_eq!(quantile_sorted(&values, 0.5), 3.0, epsilon = 1e-12);
        assert_relative_eq!(quantile_sorted(&values, 0.1), 1.4, epsilon = 1e-12);
        assert_relative_eq!(quantile_sorted(&values, 0.95), 4.8, epsilon = 1e-12);
        assert_relative_eq!(quantile_sorted(&values, 0.0), 1.0, epsilon = 1e-12);
        assert_relative_eq!(quantile_sorted(&values, 1.0), 5.0, epsilon = 1e-12);
    }

    #[test]
    fn nan_sorts_last_regardless_of_sign() {
        let negative_nan = -f64::NAN;
        assert!(negative_nan.is_sign_negative());
        let values = sorted(&[2.0, negative_nan, 1.0, f64::NAN, -3.0]);
        assert_eq!(&values[..3], &[-3.0, 1.0, 2.0]);
        assert!(values[3].is_nan() && values[4].is_nan());
        assert_eq!(nan_last(f64::NAN, negative_nan), Ordering::Equal);
        assert_eq!(nan_last(negative_nan, f64::INFINITY), Ordering::Greater);
    }

    #[test]
    fn quantile_of_constant_sample() {
        assert_relative_eq!(quantile_sorted(&[10.0; 7], 0.05), 10.0, epsilon = 1e-12);
        assert!(quantile_sorted(&[], 0.5).is_nan());
    }
}
