//! Backtesting of forecasters over successive folds.

use super::folds::{BacktestConfig, Fold};
use crate::core::{Exog, Forecast, MultiSeriesForecast, TimeSeries};
use crate::error::{ForecastError, Result};
use crate::forecaster::{
    check_train_exog, check_y, BootstrapConfig, FitOptions, Forecaster, MultiSeriesExog,
    MultiSeriesFitOptions, MultiSeriesForecaster, PredictOptions,
};
use crate::utils::metrics::{check_unique_names, Metric};
use crate::warnings::format_set;
use serde::{Deserialize, Serialize};

/// Prediction intervals requested from a backtesting run.
#[derive(Debug, Clone, PartialEq)]
pub struct BacktestIntervals {
    /// Lower and upper percentiles, e.g. `[5.0, 95.0]`.
    pub interval: [f64; 2],
    pub bootstrap: BootstrapConfig,
}

impl BacktestIntervals {
    pub fn new(interval: [f64; 2]) -> Self {
        Self {
            interval,
            bootstrap: BootstrapConfig::default(),
        }
    }

    pub fn with_bootstrap(mut self, bootstrap: BootstrapConfig) -> Self {
        self.bootstrap = bootstrap;
        self
    }
}

/// Metric values and the concatenated predictions of every fold.
#[derive(Debug, Clone, PartialEq)]
pub struct BacktestResult {
    /// `(metric name, value)` in the order the metrics were given.
    pub metrics: Vec<(String, f64)>,
    pub predictions: Forecast,
}

impl BacktestResult {
    pub fn metric(&self, name: &str) -> Option<f64> {
        metric_value(&self.metrics, name)
    }
}

/// How per-level metrics are combined into one value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    /// Mean of the level metrics.
    Average,
    /// Mean of the level metrics weighted by their number of predictions.
    WeightedAverage,
    /// Metric computed on the predictions of all levels together.
    Pooling,
}

impl Aggregation {
    pub const ALL: [Aggregation; 3] = [
        Aggregation::Average,
        Aggregation::WeightedAverage,
        Aggregation::Pooling,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Aggregation::Average => "average",
            Aggregation::WeightedAverage => "weighted_average",
            Aggregation::Pooling => "pooling",
        }
    }
}

/// Result of a multi-series backtesting run.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiSeriesBacktestResult {
    /// Metric values of each level.
    pub levels: Vec<(String, Vec<(String, f64)>)>,
    /// Metric values combined across levels.
    pub aggregated: Vec<(Aggregation, Vec<(String, f64)>)>,
    pub predictions: MultiSeriesForecast,
}

impl MultiSeriesBacktestResult {
    pub fn level_metric(&self, level: &str, name: &str) -> Option<f64> {
        self.levels
            .iter()
            .find(|(l, _)| l == level)
            .and_then(|(_, values)| metric_value(values, name))
    }

    pub fn aggregated_metric(&self, aggregation: Aggregation, name: &str) -> Option<f64> {
        self.aggregated
            .iter()
            .find(|(a, _)| *a == aggregation)
            .and_then(|(_, values)| metric_value(values, name))
    }
}

fn metric_value(values: &[(String, f64)], name: &str) -> Option<f64> {
    values.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
}

/// Backtest a single-series forecaster.
///
/// The forecaster is cloned, so `forecaster` itself is never refitted. Each
/// fold predicts `gap + steps` values from the `window_size` observations
/// preceding the fold and keeps the last `steps`.
///
/// # Example
/// ```
/// use autoreg_forecast::core::TimeSeries;
/// use autoreg_forecast::forecaster::{ForecasterAutoreg, Lags};
/// use autoreg_forecast::model_selection::{backtesting_forecaster, BacktestConfig};
/// use autoreg_forecast::regressor::LinearRegression;
/// use autoreg_forecast::utils::Metric;
///
/// let y = TimeSeries::from_values("y", (0..40).map(|i| 2.0 * i as f64).collect());
/// let forecaster = ForecasterAutoreg::new(LinearRegression::new(), Lags::new(3).unwrap());
/// let config = BacktestConfig::new(5, 20);
/// let result =
///     backtesting_forecaster(&forecaster, &y, None, &config, &[Metric::MeanAbsoluteError], None)
///         .unwrap();
/// assert_eq!(result.predictions.horizon(), 20);
/// assert!(result.metric("mean_absolute_error").unwrap() < 1e-6);
/// ```
pub fn backtesting_forecaster<F: Forecaster>(
    forecaster: &F,
    y: &TimeSeries,
    exog: Option<&Exog>,
    config: &BacktestConfig,
    metrics: &[Metric],
    intervals: Option<&BacktestIntervals>,
) -> Result<BacktestResult> {
    check_unique_names(metrics)?;
    check_y(y)?;
    if let Some(exog) = exog {
        check_train_exog(y, exog)?;
    }
    let folds = config.folds(y.len(), forecaster.window_size())?;
    tracing::info!(
        forecaster = forecaster.name(),
        n_folds = folds.len(),
        "backtesting"
    );

    let mut fitted = forecaster.clone();
    let mut point = Vec::new();
    let mut lower = Vec::new();
    let mut upper = Vec::new();
    for fold in &folds {
        if fold.refit {
            let y_train = y.slice(fold.train.start, fold.train.end)?;
            let exog_train = exog
                .map(|e| e.slice(fold.train.start, fold.train.end))
                .transpose()?;
            fitted.fit(&y_train, exog_train.as_ref(), FitOptions::default())?;
        }
        let last_window = y.slice(fold.last_window.start, fold.last_window.end)?;
        let exog_pred = exog
            .map(|e| e.slice(fold.train.end, fold.test.end))
            .transpose()?;
        let forecast = match intervals {
            Some(iv) => fitted.predict_interval(
                fold.horizon(),
                Some(&last_window),
                exog_pred.as_ref(),
                iv.interval,
                &iv.bootstrap,
            )?,
            None => fitted.predict(fold.horizon(), Some(&last_window), exog_pred.as_ref())?,
        };
        let skip = fold.n_gap();
        point.extend_from_slice(&forecast.point()[skip..]);
        if let (Some(l), Some(u)) = (forecast.lower(), forecast.upper()) {
            lower.extend_from_slice(&l[skip..]);
            upper.extend_from_slice(&u[skip..]);
        }
    }

    let (start, end) = test_span(&folds);
    let index = y.index().slice(start, end)?;
    let predictions = if intervals.is_some() {
        Forecast::with_intervals(index, point, lower, upper)?
    } else {
        Forecast::new(index, point)?
    };

    let y_true = &y.values()[start..end];
    let y_train = &y.values()[..config.initial_train_size];
    let values = metrics
        .iter()
        .map(|m| Ok((m.name().to_string(), m.compute(y_true, predictions.point(), y_train)?)))
        .collect::<Result<Vec<_>>>()?;

    Ok(BacktestResult {
        metrics: values,
        predictions,
    })
}

/// Backtest a multi-series forecaster.
///
/// Every series must share the same index. `levels` selects the series that
/// are predicted and scored, all of them by default. Metrics are reported per
/// level and combined with each of `aggregations`.
#[allow(clippy::too_many_arguments)]
pub fn backtesting_forecaster_multiseries<F: MultiSeriesForecaster>(
    forecaster: &F,
    series: &[TimeSeries],
    exog: Option<&MultiSeriesExog>,
    levels: Option<&[String]>,
    config: &BacktestConfig,
    metrics: &[Metric],
    aggregations: &[Aggregation],
    intervals: Option<&BacktestIntervals>,
) -> Result<MultiSeriesBacktestResult> {
    check_unique_names(metrics)?;
    let first = series.first().ok_or(ForecastError::EmptyData)?;
    if series.iter().any(|s| s.index() != first.index()) {
        return Err(ForecastError::InvalidParameter(
            "All series must have the same index to be backtested together.".to_string(),
        ));
    }
    let levels: Vec<String> = match levels {
        Some(levels) => levels.to_vec(),
        None => series.iter().map(|s| s.name().to_string()).collect(),
    };
    let unknown: Vec<String> = levels
        .iter()
        .filter(|l| series.iter().all(|s| s.name() != l.as_str()))
        .cloned()
        .collect();
    if !unknown.is_empty() {
        return Err(ForecastError::InvalidParameter(format!(
            "`levels` {} not found in `series`.",
            format_set(&unknown)
        )));
    }

    let folds = config.folds(first.len(), forecaster.window_size())?;
    tracing::info!(
        forecaster = forecaster.name(),
        n_series = series.len(),
        n_levels = levels.len(),
        n_folds = folds.len(),
        "backtesting"
    );

    let mut fitted = forecaster.clone();
    let mut point = vec![Vec::new(); levels.len()];
    let mut lower = vec![Vec::new(); levels.len()];
    let mut upper = vec![Vec::new(); levels.len()];
    for (i, fold) in folds.iter().enumerate() {
        // Warnings repeat identically on every fold after the first.
        let suppress = i > 0;
        if fold.refit {
            let train: Vec<TimeSeries> = series
                .iter()
                .map(|s| s.slice(fold.train.start, fold.train.end))
                .collect::<Result<_>>()?;
            let exog_train = exog
                .map(|e| e.slice(fold.train.start, fold.train.end))
                .transpose()?;
            let options = MultiSeriesFitOptions::default().with_suppress_warnings(suppress);
            fitted.fit(&train, exog_train.as_ref(), &options)?;
        }
        let windows: Vec<TimeSeries> = series
            .iter()
            .map(|s| s.slice(fold.last_window.start, fold.last_window.end))
            .collect::<Result<_>>()?;
        let exog_pred = exog
            .map(|e| e.slice(fold.train.end, fold.test.end))
            .transpose()?;
        let mut options = PredictOptions::new()
            .with_levels(&levels)
            .with_last_window(&windows)
            .with_suppress_warnings(suppress);
        if let Some(exog_pred) = exog_pred.as_ref() {
            options = options.with_exog(exog_pred);
        }
        let forecast = match intervals {
            Some(iv) => {
                fitted.predict_interval(fold.horizon(), &options, iv.interval, &iv.bootstrap)?
            }
            None => fitted.predict(fold.horizon(), &options)?,
        };
        collect_fold(&forecast, &levels, fold, &mut point, &mut lower, &mut upper)?;
    }

    let (start, end) = test_span(&folds);
    let index = first.index().slice(start, end)?;
    let mut entries = Vec::with_capacity(levels.len());
    for (((level, point), lower), upper) in levels.iter().zip(point).zip(lower).zip(upper) {
        let forecast = if intervals.is_some() {
            Forecast::with_intervals(index.clone(), point, lower, upper)?
        } else {
            Forecast::new(index.clone(), point)?
        };
        entries.push((level.clone(), forecast));
    }
    let predictions = MultiSeriesForecast::new(entries);

    let scored: Vec<LevelScore> = predictions
        .iter()
        .map(|(level, forecast)| {
            let values = series
                .iter()
                .find(|s| s.name() == level)
                .map(|s| s.values())
                .unwrap_or_default();
            LevelScore::new(
                level,
                &values[start..end],
                forecast.point(),
                &values[..config.initial_train_size],
            )
        })
        .collect();

    let level_metrics = scored
        .iter()
        .map(|score| {
            let values = metrics
                .iter()
                .map(|m| Ok((m.name().to_string(), score.compute(m)?)))
                .collect::<Result<Vec<_>>>()?;
            Ok((score.level.clone(), values))
        })
        .collect::<Result<Vec<_>>>()?;

    let aggregated = aggregations
        .iter()
        .map(|&aggregation| {
            let values = metrics
                .iter()
                .enumerate()
                .map(|(j, m)| {
                    let per_level: Vec<f64> = level_metrics.iter().map(|(_, v)| v[j].1).collect();
                    Ok((m.name().to_string(), aggregate(aggregation, m, &scored, &per_level)?))
                })
                .collect::<Result<Vec<_>>>()?;
            Ok((aggregation, values))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(MultiSeriesBacktestResult {
        levels: level_metrics,
        aggregated,
        predictions,
    })
}

fn test_span(folds: &[Fold]) -> (usize, usize) {
    let start = folds.first().map_or(0, |f| f.test.start);
    let end = folds.last().map_or(0, |f| f.test.end);
    (start, end)
}

fn collect_fold(
    forecast: &MultiSeriesForecast,
    levels: &[String],
    fold: &Fold,
    point: &mut [Vec<f64>],
    lower: &mut [Vec<f64>],
    upper: &mut [Vec<f64>],
) -> Result<()> {
    let skip = fold.n_gap();
    for (j, level) in levels.iter().enumerate() {
        let level_forecast = forecast.get(level).ok_or_else(|| {
            ForecastError::ComputationError(format!(
                "No predictions for level '{}' in fold starting at {}.",
                level, fold.test.start
            ))
        })?;
        point[j].extend_from_slice(&level_forecast.point()[skip..]);
        if let (Some(l), Some(u)) = (level_forecast.lower(), level_forecast.upper()) {
            lower[j].extend_from_slice(&l[skip..]);
            upper[j].extend_from_slice(&u[skip..]);
        }
    }
    Ok(())
}

/// Observed and predicted values of one level, missing observations removed.
struct LevelScore {
    level: String,
    y_true: Vec<f64>,
    y_pred: Vec<f64>,
    y_train: Vec<f64>,
}

impl LevelScore {
    fn new(level: &str, y_true: &[f64], y_pred: &[f64], y_train: &[f64]) -> Self {
        let (y_true, y_pred): (Vec<f64>, Vec<f64>) = y_true
            .iter()
            .zip(y_pred)
            .filter(|(t, _)| !t.is_nan())
            .map(|(t, p)| (*t, *p))
            .unzip();
        Self {
            level: level.to_string(),
            y_true,
            y_pred,
            y_train: y_train.iter().copied().filter(|v| !v.is_nan()).collect(),
        }
    }

    fn compute(&self, metric: &Metric) -> Result<f64> {
        if self.y_true.is_empty() {
            return Ok(f64::NAN);
        }
        metric.compute(&self.y_true, &self.y_pred, &self.y_train)
    }
}

fn aggregate(
    aggregation: Aggregation,
    metric: &Metric,
    scored: &[LevelScore],
    per_level: &[f64],
) -> Result<f64> {
    let valid: Vec<(f64, usize)> = per_level
        .iter()
        .zip(scored)
        .filter(|(v, _)| !v.is_nan())
        .map(|(v, s)| (*v, s.y_true.len()))
        .collect();
    match aggregation {
        Aggregation::Average => {
            Ok(valid.iter().map(|(v, _)| v).sum::<f64>() / valid.len() as f64)
        }
        Aggregation::WeightedAverage => {
            let total: usize = valid.iter().map(|(_, n)| n).sum();
            Ok(valid.iter().map(|(v, n)| v * *n as f64).sum::<f64>() / total as f64)
        }
        Aggregation::Pooling => {
            let mut y_true = Vec::new();
            let mut y_pred = Vec::new();
            let mut y_trains: Vec<&[f64]> = Vec::new();
            for score in scored.iter().filter(|s| !s.y_true.is_empty()) {
                y_true.extend_from_slice(&score.y_true);
                y_pred.extend_from_slice(&score.y_pred);
                y_trains.push(&score.y_train);
            }
            if y_true.is_empty() {
                return Ok(f64::NAN);
            }
            metric.compute_pooled(&y_true, &y_pred, &y_trains)
        }
    }
}
