//! Predictors built from the window of past values: lags or a user function.

use crate::error::{ForecastError, Result};
use std::fmt;
use std::sync::Arc;

/// Sorted, deduplicated lags, each `>= 1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Lags(Vec<usize>);

impl Lags {
    /// Lags `1..=n`.
    pub fn new(n: usize) -> Result<Self> {
        if n < 1 {
            return Err(ForecastError::InvalidParameter(
                "Minimum value of lags allowed is 1.".to_string(),
            ));
        }
        Ok(Lags((1..=n).collect()))
    }

    /// Explicit list of lags.
    pub fn from_list(lags: &[usize]) -> Result<Self> {
        if lags.is_empty() {
            return Err(ForecastError::InvalidParameter(
                "Argument `lags` must contain at least one value.".to_string(),
            ));
        }
        if lags.contains(&0) {
            return Err(ForecastError::InvalidParameter(
                "Minimum value of lags allowed is 1.".to_string(),
            ));
        }
        let mut lags = lags.to_vec();
        lags.sort_unstable();
        lags.dedup();
        Ok(Lags(lags))
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    pub fn max_lag(&self) -> usize {
        self.0.last().copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Column names `lag_1, lag_2, ...`.
    pub fn names(&self) -> Vec<String> {
        self.0.iter().map(|l| format!("lag_{}", l)).collect()
    }

    /// Lag values read from the end of `window` (oldest value first).
    pub fn values(&self, window: &[f64]) -> Vec<f64> {
        let n = window.len();
        self.0.iter().map(|&l| window[n - l]).collect()
    }
}

impl fmt::Display for Lags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let items: Vec<String> = self.0.iter().map(|l| l.to_string()).collect();
        write!(f, "[{}]", items.join(", "))
    }
}

/// Function mapping the last `window_size` values to a feature vector.
pub type WindowFeatureFn = Arc<dyn Fn(&[f64]) -> Vec<f64> + Send + Sync>;

/// User supplied predictors computed from a window of past values.
#[derive(Clone)]
pub struct CustomPredictors {
    function: WindowFeatureFn,
    window_size: usize,
    names: Vec<String>,
}

impl CustomPredictors {
    pub fn new<F>(function: F, window_size: usize, names: Vec<String>) -> Result<Self>
    where
        F: Fn(&[f64]) -> Vec<f64> + Send + Sync + 'static,
    {
        if window_size < 1 {
            return Err(ForecastError::InvalidParameter(
                "Argument `window_size` must be an integer equal to or greater than 1."
                    .to_string(),
            ));
        }
        if names.is_empty() {
            return Err(ForecastError::InvalidParameter(
                "Custom predictors need at least one feature name.".to_string(),
            ));
        }
        Ok(Self {
            function: Arc::new(function),
            window_size,
            names,
        })
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

impl fmt::Debug for CustomPredictors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomPredictors")
            .field("window_size", &self.window_size)
            .field("names", &self.names)
            .finish()
    }
}

/// How the autoregressive part of the feature matrix is built.
#[derive(Debug, Clone)]
pub enum Predictors {
    Lags(Lags),
    Custom(CustomPredictors),
}

impl From<Lags> for Predictors {
    fn from(lags: Lags) -> Self {
        Predictors::Lags(lags)
    }
}

impl From<CustomPredictors> for Predictors {
    fn from(custom: CustomPredictors) -> Self {
        Predictors::Custom(custom)
    }
}

impl Predictors {
    /// Number of past values needed to compute one feature row.
    pub fn window_size(&self) -> usize {
        match self {
            Predictors::Lags(lags) => lags.max_lag(),
            Predictors::Custom(c) => c.window_size,
        }
    }

    pub fn names(&self) -> Vec<String> {
        match self {
            Predictors::Lags(lags) => lags.names(),
            Predictors::Custom(c) => c.names.clone(),
        }
    }

    pub fn n_features(&self) -> usize {
        match self {
            Predictors::Lags(lags) => lags.len(),
            Predictors::Custom(c) => c.names.len(),
        }
    }

    /// Label used to identify the predictors in search results.
    pub fn label(&self) -> String {
        match self {
            Predictors::Lags(lags) => lags.to_string(),
            Predictors::Custom(_) => "custom predictors".to_string(),
        }
    }

    pub fn lags(&self) -> Option<&Lags> {
        match self {
            Predictors::Lags(lags) => Some(lags),
            Predictors::Custom(_) => None,
        }
    }

    /// Feature row from `window`, whose last value is the most recent one.
    pub fn features(&self, window: &[f64]) -> Result<Vec<f64>> {
        if window.len() < self.window_size() {
            return Err(ForecastError::InsufficientData {
                needed: self.window_size(),
                got: window.len(),
            });
        }
        match self {
            Predictors::Lags(lags) => Ok(lags.values(window)),
            Predictors::Custom(c) => {
                let recent = &window[window.len() - c.window_size..];
                let features = (c.function)(recent);
                if features.len() != c.names.len() {
                    return Err(ForecastError::DimensionMismatch {
                        expected: c.names.len(),
                        got: features.len(),
                    });
                }
                Ok(features)
            }
        }
    }
}
