//! Accuracy metrics for forecast evaluation.
//!
//! Every metric is also available by name through [`Metric`], which is how
//! backtesting and hyperparameter search refer to them.

use crate::error::{ForecastError, Result};
use std::fmt;
use std::sync::Arc;

/// Accuracy metrics for evaluating forecast performance.
#[derive(Debug, Clone)]
pub struct AccuracyMetrics {
    /// Mean Absolute Error
    pub mae: f64,
    /// Mean Squared Error
    pub mse: f64,
    /// Root Mean Squared Error
    pub rmse: f64,
    /// Mean Absolute Percentage Error (None if zeros in actual)
    pub mape: Option<f64>,
    /// Symmetric Mean Absolute Percentage Error
    pub smape: f64,
    /// Mean Absolute Scaled Error (None if insufficient data)
    pub mase: Option<f64>,
    /// R-squared (coefficient of determination)
    pub r_squared: f64,
}

fn check_lengths(actual: &[f64], predicted: &[f64]) -> Result<()> {
    if actual.is_empty() || predicted.is_empty() {
        return Err(ForecastError::EmptyData);
    }
    if actual.len() != predicted.len() {
        return Err(ForecastError::DimensionMismatch {
            expected: actual.len(),
            got: predicted.len(),
        });
    }
    Ok(())
}

/// Calculate accuracy metrics between actual and predicted values.
///
/// # Arguments
/// * `actual` - Actual observed values
/// * `predicted` - Predicted/forecast values
/// * `seasonal_period` - Optional seasonal period for MASE calculation
///
/// # Returns
/// `AccuracyMetrics` struct with all computed metrics
pub fn calculate_metrics(
    actual: &[f64],
    predicted: &[f64],
    seasonal_period: Option<usize>,
) -> Result<AccuracyMetrics> {
    check_lengths(actual, predicted)?;
    if actual.iter().chain(predicted).any(|v| v.is_nan()) {
        return Err(ForecastError::MissingValues(
            "`actual` and `predicted` must not contain NaN values".to_string(),
        ));
    }
    let n = actual.len() as f64;

    let mae = mean_absolute_error(actual, predicted)?;
    let mse = mean_squared_error(actual, predicted)?;
    let rmse = mse.sqrt();

    // MAPE (only if no zeros in actual)
    let mape = if actual.contains(&0.0) {
        None
    } else {
        let sum: f64 = actual
            .iter()
            .zip(predicted.iter())
            .map(|(a, p)| ((a - p) / a).abs())
            .sum();
        Some(100.0 * sum / n)
    };

    let smape = smape(actual, predicted);
    let mase = in_sample_mase(actual, predicted, seasonal_period);

    let mean_actual = actual.iter().sum::<f64>() / n;
    let ss_tot: f64 = actual.iter().map(|a| (a - mean_actual).powi(2)).sum();
    let ss_res = mse * n;
    let r_squared = if ss_tot == 0.0 {
        1.0
    } else {
        1.0 - ss_res / ss_tot
    };

    Ok(AccuracyMetrics {
        mae,
        mse,
        rmse,
        mape,
        smape,
        mase,
        r_squared,
    })
}

/// MASE scaled by the (seasonal) naive error of `actual` itself.
fn in_sample_mase(
    actual: &[f64],
    predicted: &[f64],
    seasonal_period: Option<usize>,
) -> Option<f64> {
    let n = actual.len();
    let period = seasonal_period.unwrap_or(1);
    if n <= period {
        return None;
    }
    let naive_mae: f64 = actual
        .iter()
        .skip(period)
        .zip(actual.iter())
        .map(|(curr, prev)| (curr - prev).abs())
        .sum::<f64>()
        / (n - period) as f64;
    if naive_mae == 0.0 {
        return None;
    }
    mean_absolute_error(actual, predicted)
        .ok()
        .map(|mae| mae / naive_mae)
}

/// Calculate SMAPE between two slices.
pub fn smape(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.len() != predicted.len() || actual.is_empty() {
        return f64::NAN;
    }
    let n = actual.len() as f64;
    actual
        .iter()
        .zip(predicted.iter())
        .map(|(a, p)| {
            let denom = a.abs() + p.abs();
            if denom == 0.0 {
                0.0
            } else {
                2.0 * (a - p).abs() / denom
            }
        })
        .sum::<f64>()
        * 100.0
        / n
}

pub fn mean_squared_error(y_true: &[f64], y_pred: &[f64]) -> Result<f64> {
    check_lengths(y_true, y_pred)?;
    Ok(y_true
        .iter()
        .zip(y_pred)
        .map(|(a, p)| (a - p).powi(2))
        .sum::<f64>()
        / y_true.len() as f64)
}

pub fn mean_absolute_error(y_true: &[f64], y_pred: &[f64]) -> Result<f64> {
    check_lengths(y_true, y_pred)?;
    Ok(y_true
        .iter()
        .zip(y_pred)
        .map(|(a, p)| (a - p).abs())
        .sum::<f64>()
        / y_true.len() as f64)
}

/// Mean of `|y - ŷ| / |y|` as a fraction; zeros in `y_true` are replaced by
/// machine epsilon.
pub fn mean_absolute_percentage_error(y_true: &[f64], y_pred: &[f64]) -> Result<f64> {
    check_lengths(y_true, y_pred)?;
    Ok(y_true
        .iter()
        .zip(y_pred)
        .map(|(a, p)| (a - p).abs() / a.abs().max(f64::EPSILON))
        .sum::<f64>()
        / y_true.len() as f64)
}

pub fn mean_squared_log_error(y_true: &[f64], y_pred: &[f64]) -> Result<f64> {
    check_lengths(y_true, y_pred)?;
    if y_true.iter().chain(y_pred).any(|v| *v < 0.0) {
        return Err(ForecastError::InvalidParameter(
            "Mean Squared Logarithmic Error cannot be used when targets contain negative values."
                .to_string(),
        ));
    }
    Ok(y_true
        .iter()
        .zip(y_pred)
        .map(|(a, p)| (a.ln_1p() - p.ln_1p()).powi(2))
        .sum::<f64>()
        / y_true.len() as f64)
}

fn naive_differences(y_train: &[f64]) -> Result<Vec<f64>> {
    if y_train.len() < 2 {
        return Err(ForecastError::InsufficientData {
            needed: 2,
            got: y_train.len(),
        });
    }
    Ok(y_train.windows(2).map(|w| w[1] - w[0]).collect())
}

/// MAE divided by the MAE of the one-step naive forecast on `y_train`.
///
/// A constant `y_train` has a zero scale: the result is infinite, or NaN
/// when the predictions are also exact.
pub fn mean_absolute_scaled_error(y_true: &[f64], y_pred: &[f64], y_train: &[f64]) -> Result<f64> {
    let mae = mean_absolute_error(y_true, y_pred)?;
    let diffs = naive_differences(y_train)?;
    let scale = diffs.iter().map(|d| d.abs()).sum::<f64>() / diffs.len() as f64;
    Ok(mae / scale)
}

/// Square root of the MSE divided by the MSE of the one-step naive forecast
/// on `y_train`.
pub fn root_mean_squared_scaled_error(
    y_true: &[f64],
    y_pred: &[f64],
    y_train: &[f64],
) -> Result<f64> {
    let mse = mean_squared_error(y_true, y_pred)?;
    let diffs = naive_differences(y_train)?;
    let scale = diffs.iter().map(|d| d * d).sum::<f64>() / diffs.len() as f64;
    Ok((mse / scale).sqrt())
}

/// User metric `f(y_true, y_pred)`.
pub type MetricFn = Arc<dyn Fn(&[f64], &[f64]) -> f64 + Send + Sync>;

/// A metric used to score backtesting predictions. Lower is better.
#[derive(Clone)]
pub enum Metric {
    MeanSquaredError,
    MeanAbsoluteError,
    MeanAbsolutePercentageError,
    MeanSquaredLogError,
    MeanAbsoluteScaledError,
    RootMeanSquaredScaledError,
    Custom { name: String, function: MetricFn },
}

impl Metric {
    pub fn from_name(name: &str) -> Result<Self> {
        Ok(match name {
            "mean_squared_error" => Metric::MeanSquaredError,
            "mean_absolute_error" => Metric::MeanAbsoluteError,
            "mean_absolute_percentage_error" => Metric::MeanAbsolutePercentageError,
            "mean_squared_log_error" => Metric::MeanSquaredLogError,
            "mean_absolute_scaled_error" => Metric::MeanAbsoluteScaledError,
            "root_mean_squared_scaled_error" => Metric::RootMeanSquaredScaledError,
            _ => {
                return Err(ForecastError::InvalidParameter(format!(
                    "Allowed metrics are: ['mean_squared_error', 'mean_absolute_error', \
                     'mean_absolute_percentage_error', 'mean_squared_log_error', \
                     'mean_absolute_scaled_error', 'root_mean_squared_scaled_error']. Got {}.",
                    name
                )))
            }
        })
    }

    pub fn custom<F>(name: impl Into<String>, function: F) -> Self
    where
        F: Fn(&[f64], &[f64]) -> f64 + Send + Sync + 'static,
    {
        Metric::Custom {
            name: name.into(),
            function: Arc::new(function),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Metric::MeanSquaredError => "mean_squared_error",
            Metric::MeanAbsoluteError => "mean_absolute_error",
            Metric::MeanAbsolutePercentageError => "mean_absolute_percentage_error",
            Metric::MeanSquaredLogError => "mean_squared_log_error",
            Metric::MeanAbsoluteScaledError => "mean_absolute_scaled_error",
            Metric::RootMeanSquaredScaledError => "root_mean_squared_scaled_error",
            Metric::Custom { name, .. } => name,
        }
    }

    /// Whether the metric is scaled by the training series.
    pub fn needs_y_train(&self) -> bool {
        matches!(
            self,
            Metric::MeanAbsoluteScaledError | Metric::RootMeanSquaredScaledError
        )
    }

    pub fn compute(&self, y_true: &[f64], y_pred: &[f64], y_train: &[f64]) -> Result<f64> {
        match self {
            Metric::MeanSquaredError => mean_squared_error(y_true, y_pred),
            Metric::MeanAbsoluteError => mean_absolute_error(y_true, y_pred),
            Metric::MeanAbsolutePercentageError => mean_absolute_percentage_error(y_true, y_pred),
            Metric::MeanSquaredLogError => mean_squared_log_error(y_true, y_pred),
            Metric::MeanAbsoluteScaledError => mean_absolute_scaled_error(y_true, y_pred, y_train),
            Metric::RootMeanSquaredScaledError => {
                root_mean_squared_scaled_error(y_true, y_pred, y_train)
            }
            Metric::Custom { function, .. } => {
                check_lengths(y_true, y_pred)?;
                Ok(function(y_true, y_pred))
            }
        }
    }

    /// Metric over values pooled from several series. Scaled metrics use the
    /// naive differences of every training series, never across series.
    pub(crate) fn compute_pooled(
        &self,
        y_true: &[f64],
        y_pred: &[f64],
        y_trains: &[&[f64]],
    ) -> Result<f64> {
        if !self.needs_y_train() {
            return self.compute(y_true, y_pred, &[]);
        }
        let mut diffs = Vec::new();
        for y_train in y_trains {
            diffs.extend(naive_differences(y_train)?);
        }
        match self {
            Metric::MeanAbsoluteScaledError => {
                let scale = diffs.iter().map(|d| d.abs()).sum::<f64>() / diffs.len() as f64;
                Ok(mean_absolute_error(y_true, y_pred)? / scale)
            }
            _ => {
                let scale = diffs.iter().map(|d| d * d).sum::<f64>() / diffs.len() as f64;
                Ok((mean_squared_error(y_true, y_pred)? / scale).sqrt())
            }
        }
    }
}

impl fmt::Debug for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Metric({})", self.name())
    }
}

impl TryFrom<&str> for Metric {
    type Error = ForecastError;

    fn try_from(name: &str) -> Result<Self> {
        Metric::from_name(name)
    }
}

/// Metric names must be unique within one evaluation.
pub(crate) fn check_unique_names(metrics: &[Metric]) -> Result<()> {
    if metrics.is_empty() {
        return Err(ForecastError::InvalidParameter(
            "At least one metric is required.".to_string(),
        ));
    }
    for (i, m) in metrics.iter().enumerate() {
        if metrics[..i].iter().any(|other| other.name() == m.name()) {
            return Err(ForecastError::InvalidParameter(
                "When `metric` is a `list`, each metric name must be unique.".to_string(),
            ));
        }
    }
    Ok(())
}
