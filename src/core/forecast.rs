//! Forecast result structures for holding predictions.

use crate::core::SeriesIndex;
use crate::error::{ForecastError, Result};
use crate::utils::stats::{mean, population_std, quantile_sorted, sorted};
use statrs::distribution::{ContinuousCDF, Normal};

/// A univariate forecast: point predictions with an optional interval.
#[derive(Debug, Clone, PartialEq)]
pub struct Forecast {
    index: SeriesIndex,
    point: Vec<f64>,
    lower: Option<Vec<f64>>,
    upper: Option<Vec<f64>>,
}

impl Forecast {
    /// Create a forecast from point predictions.
    pub fn new(index: SeriesIndex, point: Vec<f64>) -> Result<Self> {
        if index.len() != point.len() {
            return Err(ForecastError::DimensionMismatch {
                expected: index.len(),
                got: point.len(),
            });
        }
        Ok(Self {
            index,
            point,
            lower: None,
            upper: None,
        })
    }

    /// Create a forecast with prediction intervals.
    pub fn with_intervals(
        index: SeriesIndex,
        point: Vec<f64>,
        lower: Vec<f64>,
        upper: Vec<f64>,
    ) -> Result<Self> {
        let mut forecast = Self::new(index, point)?;
        for bound in [&lower, &upper] {
            if bound.len() != forecast.point.len() {
                return Err(ForecastError::DimensionMismatch {
                    expected: forecast.point.len(),
                    got: bound.len(),
                });
            }
        }
        forecast.lower = Some(lower);
        forecast.upper = Some(upper);
        Ok(forecast)
    }

    /// Index labels of the predicted steps.
    pub fn index(&self) -> &SeriesIndex {
        &self.index
    }

    /// Point predictions.
    pub fn point(&self) -> &[f64] {
        &self.point
    }

    /// Lower interval bounds.
    pub fn lower(&self) -> Option<&[f64]> {
        self.lower.as_deref()
    }

    /// Upper interval bounds.
    pub fn upper(&self) -> Option<&[f64]> {
        self.upper.as_deref()
    }

    /// Get the forecast horizon (number of steps).
    pub fn horizon(&self) -> usize {
        self.point.len()
    }

    /// Check if forecast is empty.
    pub fn is_empty(&self) -> bool {
        self.point.is_empty()
    }

    /// Check if interval bounds are available.
    pub fn has_intervals(&self) -> bool {
        self.lower.is_some() && self.upper.is_some()
    }
}

/// Bootstrapped forecast paths: `samples[step][boot]`.
#[derive(Debug, Clone, PartialEq)]
pub struct BootstrapPredictions {
    index: SeriesIndex,
    samples: Vec<Vec<f64>>,
}

impl BootstrapPredictions {
    pub fn new(index: SeriesIndex, samples: Vec<Vec<f64>>) -> Result<Self> {
        if index.len() != samples.len() {
            return Err(ForecastError::DimensionMismatch {
                expected: index.len(),
                got: samples.len(),
            });
        }
        Ok(Self { index, samples })
    }

    pub fn index(&self) -> &SeriesIndex {
        &self.index
    }

    /// All samples, one row per step.
    pub fn samples(&self) -> &[Vec<f64>] {
        &self.samples
    }

    /// Samples of a single step.
    pub fn step(&self, i: usize) -> Option<&[f64]> {
        self.samples.get(i).map(|s| s.as_slice())
    }

    pub fn n_steps(&self) -> usize {
        self.samples.len()
    }

    pub fn n_boot(&self) -> usize {
        self.samples.first().map(|s| s.len()).unwrap_or(0)
    }

    /// Quantiles (each in `[0, 1]`) per step: `out[q][step]`.
    pub fn quantiles(&self, quantiles: &[f64]) -> Result<Vec<Vec<f64>>> {
        validate_quantiles(quantiles)?;
        let sorted_steps: Vec<Vec<f64>> = self.samples.iter().map(|s| sorted(s)).collect();
        Ok(quantiles
            .iter()
            .map(|&q| {
                sorted_steps
                    .iter()
                    .map(|s| quantile_sorted(s, q))
                    .collect()
            })
            .collect())
    }

    /// Lower and upper percentiles (in `[0, 100]`) per step.
    pub fn percentile_interval(&self, interval: [f64; 2]) -> Result<(Vec<f64>, Vec<f64>)> {
        validate_interval(interval)?;
        let mut bounds = self.quantiles(&[interval[0] / 100.0, interval[1] / 100.0])?;
        let upper = bounds.pop().unwrap_or_default();
        let lower = bounds.pop().unwrap_or_default();
        Ok((lower, upper))
    }

    /// Fit a normal distribution to the samples of each step.
    pub fn fit_normal(&self) -> DistributionForecast {
        let loc = self.samples.iter().map(|s| mean(s)).collect();
        let scale = self.samples.iter().map(|s| population_std(s)).collect();
        DistributionForecast {
            index: self.index.clone(),
            loc,
            scale,
        }
    }
}

/// Quantile predictions: `values[q][step]`.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantileForecast {
    pub index: SeriesIndex,
    pub quantiles: Vec<f64>,
    pub values: Vec<Vec<f64>>,
}

impl QuantileForecast {
    /// Values of a single quantile level, if it was requested.
    pub fn quantile(&self, q: f64) -> Option<&[f64]> {
        self.quantiles
            .iter()
            .position(|&x| (x - q).abs() < 1e-12)
            .map(|i| self.values[i].as_slice())
    }
}

/// Normal predictive distribution per step.
#[derive(Debug, Clone, PartialEq)]
pub struct DistributionForecast {
    pub index: SeriesIndex,
    pub loc: Vec<f64>,
    pub scale: Vec<f64>,
}

impl DistributionForecast {
    /// Central interval from the fitted normal distributions, bounds in `[0, 100]`.
    pub fn interval(&self, interval: [f64; 2]) -> Result<(Vec<f64>, Vec<f64>)> {
        validate_interval(interval)?;
        let mut lower = Vec::with_capacity(self.loc.len());
        let mut upper = Vec::with_capacity(self.loc.len());
        for (&loc, &scale) in self.loc.iter().zip(&self.scale) {
            if scale <= 0.0 || !scale.is_finite() {
                // Degenerate distribution collapses to its location.
                lower.push(loc);
                upper.push(loc);
                continue;
            }
            let normal = Normal::new(loc, scale)
                .map_err(|e| ForecastError::ComputationError(e.to_string()))?;
            lower.push(normal.inverse_cdf(interval[0] / 100.0));
            upper.push(normal.inverse_cdf(interval[1] / 100.0));
        }
        Ok((lower, upper))
    }
}

/// Per-level point forecasts, in the order the levels were requested.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MultiSeriesForecast {
    entries: Vec<(String, Forecast)>,
}

impl MultiSeriesForecast {
    pub fn new(entries: Vec<(String, Forecast)>) -> Self {
        Self { entries }
    }

    pub fn levels(&self) -> Vec<&str> {
        self.entries.iter().map(|(l, _)| l.as_str()).collect()
    }

    pub fn get(&self, level: &str) -> Option<&Forecast> {
        self.entries
            .iter()
            .find(|(l, _)| l == level)
            .map(|(_, f)| f)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Forecast)> {
        self.entries.iter().map(|(l, f)| (l.as_str(), f))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Per-level bootstrapped paths, in the order the levels were requested.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MultiSeriesBootstrap {
    entries: Vec<(String, BootstrapPredictions)>,
}

impl MultiSeriesBootstrap {
    pub fn new(entries: Vec<(String, BootstrapPredictions)>) -> Self {
        Self { entries }
    }

    pub fn levels(&self) -> Vec<&str> {
        self.entries.iter().map(|(l, _)| l.as_str()).collect()
    }

    pub fn get(&self, level: &str) -> Option<&BootstrapPredictions> {
        self.entries
            .iter()
            .find(|(l, _)| l == level)
            .map(|(_, b)| b)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BootstrapPredictions)> {
        self.entries.iter().map(|(l, b)| (l.as_str(), b))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub(crate) fn validate_interval(interval: [f64; 2]) -> Result<()> {
    let [lower, upper] = interval;
    if !(0.0..100.0).contains(&lower) {
        return Err(ForecastError::InvalidParameter(format!(
            "Lower interval bound ({}) must be >= 0 and < 100.",
            lower
        )));
    }
    if !(upper > 0.0 && upper <= 100.0) {
        return Err(ForecastError::InvalidParameter(format!(
            "Upper interval bound ({}) must be > 0 and <= 100.",
            upper
        )));
    }
    if lower >= upper {
        return Err(ForecastError::InvalidParameter(format!(
            "Lower interval bound ({}) must be less than the upper interval bound ({}).",
            lower, upper
        )));
    }
    Ok(())
}

pub(crate) fn validate_quantiles(quantiles: &[f64]) -> Result<()> {
    if quantiles.is_empty() {
        return Err(ForecastError::InvalidParameter(
            "`quantiles` must contain at least one value".to_string(),
        ));
    }
    if let Some(q) = quantiles.iter().find(|q| !(0.0..=1.0).contains(*q)) {
        return Err(ForecastError::InvalidParameter(format!(
            "All elements in `quantiles` must be >= 0 and <= 1. Got {}.",
            q
        )));
    }
    Ok(())
}
