//! Scaling transforms applied to target series before training.
//!
//! Fitted parameters are kept so predictions can be mapped back to the
//! original scale. NaN values are ignored when fitting and propagated when
//! transforming.

use crate::error::{ForecastError, Result};
use serde::{Deserialize, Serialize};

/// Fitted `center` and `scale`: `x_scaled = (x - center) / scale`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleParams {
    pub center: f64,
    pub scale: f64,
}

impl ScaleParams {
    fn transform(&self, data: &[f64]) -> Vec<f64> {
        data.iter().map(|&x| (x - self.center) / self.scale).collect()
    }

    fn inverse(&self, data: &[f64]) -> Vec<f64> {
        data.iter().map(|&x| x * self.scale + self.center).collect()
    }
}

fn observed(series: &[f64]) -> Result<Vec<f64>> {
    let values: Vec<f64> = series.iter().copied().filter(|v| !v.is_nan()).collect();
    if values.is_empty() {
        return Err(ForecastError::EmptyData);
    }
    Ok(values)
}

fn not_fitted(name: &str) -> ForecastError {
    ForecastError::NotFitted(format!(
        "This {} instance is not fitted yet. Call `fit` before using transform.",
        name
    ))
}

/// Standardize data to zero mean and unit variance (population std).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    params: Option<ScaleParams>,
}

impl StandardScaler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fit(&mut self, series: &[f64]) -> Result<()> {
        let values = observed(series)?;
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let std = (values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n).sqrt();
        let scale = if std < 1e-10 { 1.0 } else { std };
        self.params = Some(ScaleParams {
            center: mean,
            scale,
        });
        Ok(())
    }

    pub fn params(&self) -> Option<ScaleParams> {
        self.params
    }
}

/// Normalize data to the `[0, 1]` range.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    params: Option<ScaleParams>,
}

impl MinMaxScaler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fit(&mut self, series: &[f64]) -> Result<()> {
        let values = observed(series)?;
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let range = max - min;
        let scale = if range < 1e-10 { 1.0 } else { range };
        self.params = Some(ScaleParams { center: min, scale });
        Ok(())
    }

    pub fn params(&self) -> Option<ScaleParams> {
        self.params
    }
}

/// A series transformer used as `transformer_y` / `transformer_series`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Scaler {
    Standard(StandardScaler),
    MinMax(MinMaxScaler),
}

impl Scaler {
    /// Unfitted standard scaler.
    pub fn standard() -> Self {
        Scaler::Standard(StandardScaler::new())
    }

    /// Unfitted min-max scaler.
    pub fn min_max() -> Self {
        Scaler::MinMax(MinMaxScaler::new())
    }

    pub fn name(&self) -> &'static str {
        match self {
            Scaler::Standard(_) => "StandardScaler",
            Scaler::MinMax(_) => "MinMaxScaler",
        }
    }

    fn params(&self) -> Option<ScaleParams> {
        match self {
            Scaler::Standard(s) => s.params(),
            Scaler::MinMax(s) => s.params(),
        }
    }

    pub fn is_fitted(&self) -> bool {
        self.params().is_some()
    }

    /// Unfitted copy with the same configuration.
    pub fn unfitted(&self) -> Self {
        match self {
            Scaler::Standard(_) => Scaler::standard(),
            Scaler::MinMax(_) => Scaler::min_max(),
        }
    }

    pub fn fit(&mut self, series: &[f64]) -> Result<()> {
        match self {
            Scaler::Standard(s) => s.fit(series),
            Scaler::MinMax(s) => s.fit(series),
        }
    }

    pub fn transform(&self, series: &[f64]) -> Result<Vec<f64>> {
        let params = self.params().ok_or_else(|| not_fitted(self.name()))?;
        Ok(params.transform(series))
    }

    pub fn inverse_transform(&self, series: &[f64]) -> Result<Vec<f64>> {
        let params = self.params().ok_or_else(|| not_fitted(self.name()))?;
        Ok(params.inverse(series))
    }

    pub fn fit_transform(&mut self, series: &[f64]) -> Result<Vec<f64>> {
        self.fit(series)?;
        self.transform(series)
    }

    /// Express errors measured on the original scale on the transformed scale.
    ///
    /// Only the scale applies: a difference of two values does not carry the
    /// center.
    pub fn scale_residuals(&self, residuals: &[f64]) -> Result<Vec<f64>> {
        let params = self.params().ok_or_else(|| not_fitted(self.name()))?;
        Ok(residuals.iter().map(|r| r / params.scale).collect())
    }
}
