//! Differencing of order `d` and its inverse.

use crate::error::{ForecastError, Result};

/// First-order difference, NaN padded at the front so lengths are preserved.
fn diff_once(values: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    if !values.is_empty() {
        out.push(f64::NAN);
    }
    out.extend(values.windows(2).map(|w| w[1] - w[0]));
    out
}

/// Applies differencing of a given order and reverts it.
///
/// `fit_transform` remembers the first values of each differencing level so
/// that the training series can be reconstructed, and the last values so
/// that predictions following the fitted window can be integrated.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesDifferentiator {
    order: usize,
    initial_values: Vec<f64>,
    last_values: Vec<f64>,
}

impl TimeSeriesDifferentiator {
    pub fn new(order: usize) -> Result<Self> {
        if order == 0 {
            return Err(ForecastError::InvalidParameter(
                "Argument `differentiation` must be an integer equal to or greater than 1."
                    .to_string(),
            ));
        }
        Ok(Self {
            order,
            initial_values: Vec::new(),
            last_values: Vec::new(),
        })
    }

    pub fn order(&self) -> usize {
        self.order
    }

    /// Difference `values` `order` times. The first `order` outputs are NaN.
    pub fn fit_transform(&mut self, values: &[f64]) -> Result<Vec<f64>> {
        if values.len() <= self.order {
            return Err(ForecastError::InsufficientData {
                needed: self.order + 1,
                got: values.len(),
            });
        }
        let mut initial = Vec::with_capacity(self.order);
        let mut last = Vec::with_capacity(self.order);
        let mut current = values.to_vec();
        for level in 0..self.order {
            initial.push(current[level]);
            last.push(current[current.len() - 1]);
            current = diff_once(&current);
        }
        self.initial_values = initial;
        self.last_values = last;
        Ok(current)
    }

    /// Difference without updating the stored state.
    pub fn transform(&self, values: &[f64]) -> Vec<f64> {
        let mut current = values.to_vec();
        for _ in 0..self.order {
            current = diff_once(&current);
        }
        current
    }

    /// Revert the differencing of the series passed to `fit_transform`.
    pub fn inverse_transform(&self, differenced: &[f64]) -> Result<Vec<f64>> {
        if self.initial_values.len() != self.order {
            return Err(ForecastError::NotFitted(
                "TimeSeriesDifferentiator must be fitted before inverse_transform".to_string(),
            ));
        }
        let mut current = differenced.to_vec();
        for level in (0..self.order).rev() {
            let mut restored = Vec::with_capacity(current.len());
            let mut acc = self.initial_values[level];
            for (i, v) in current.iter().enumerate() {
                if i <= level {
                    // Positions lost by this and lower differencing levels.
                    restored.push(if i == level { acc } else { f64::NAN });
                } else {
                    acc += v;
                    restored.push(acc);
                }
            }
            current = restored;
        }
        Ok(current)
    }

    /// Integrate predictions that directly follow the fitted window.
    pub fn inverse_transform_next_window(&self, differenced: &[f64]) -> Result<Vec<f64>> {
        if self.last_values.len() != self.order {
            return Err(ForecastError::NotFitted(
                "TimeSeriesDifferentiator must be fitted before inverse_transform_next_window"
                    .to_string(),
            ));
        }
        let mut current = differenced.to_vec();
        for level in (0..self.order).rev() {
            let mut acc = self.last_values[level];
            for v in current.iter_mut() {
                acc += *v;
                *v = acc;
            }
        }
        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn first_order_difference_pads_with_nan() {
        let mut diff = TimeSeriesDifferentiator::new(1).unwrap();
        let out = diff.fit_transform(&[1.0, 4.0, 9.0, 16.0]).unwrap();
        assert!(out[0].is_nan());
        assert_eq!(&out[1..], &[3.0, 5.0, 7.0]);
    }

    #[test]
    fn inverse_transform_restores_training_series() {
        let values = [1.0, 4.0, 9.0, 16.0, 25.0, 36.0];
        for order in 1..=3 {
            let mut diff = TimeSeriesDifferentiator::new(order).unwrap();
            let transformed = diff.fit_transform(&values).unwrap();
            let restored = diff.inverse_transform(&transformed).unwrap();
            for i in (order - 1)..values.len() {
                if !restored[i].is_nan() {
                    assert_relative_eq!(restored[i], values[i], epsilon = 1e-9);
                }
            }
            assert_relative_eq!(restored[values.len() - 1], 36.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn next_window_continues_the_series() {
        let values = [1.0, 4.0, 9.0, 16.0, 25.0];
        let mut diff = TimeSeriesDifferentiator::new(2).unwrap();
        diff.fit_transform(&values).unwrap();
        // Second differences of squares are constant 2.
        let next = diff.inverse_transform_next_window(&[2.0, 2.0]).unwrap();
        assert_relative_eq!(next[0], 36.0, epsilon = 1e-9);
        assert_relative_eq!(next[1], 49.0, epsilon = 1e-9);
    }

    #[test]
    fn zero_order_rejected() {
        assert!(TimeSeriesDifferentiator::new(0).is_err());
    }
}
