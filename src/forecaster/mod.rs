//! Forecasters that turn a tabular regressor into a multi-step forecaster.
//!
//! Single-series forecasters implement [`Forecaster`], panel forecasters
//! implement [`MultiSeriesForecaster`]. Prediction intervals are built from
//! bootstrapped paths, which is shared by every implementation through the
//! default trait methods.

pub mod autoreg;
pub mod direct;
pub mod multiseries;
pub mod predictors;
pub mod residuals;
pub mod rnn;

pub use autoreg::ForecasterAutoreg;
pub use direct::ForecasterAutoregDirect;
pub use multiseries::{
    Encoding, ForecasterAutoregMultiSeries, MultiSeriesExog, TransformerSeries,
};
pub use predictors::{CustomPredictors, Lags, Predictors, WindowFeatureFn};
pub use residuals::{BootstrapConfig, ResidualStore, MAX_RESIDUALS, UNKNOWN_LEVEL};
pub use rnn::ForecasterRnn;

use crate::core::{
    validate_interval, BootstrapPredictions, DistributionForecast, Exog, Forecast,
    MultiSeriesBootstrap, MultiSeriesForecast, QuantileForecast, TimeSeries,
};
use crate::error::{ForecastError, Result};
use crate::regressor::ParamSet;
use std::collections::BTreeMap;
use std::fmt;

/// Options of single-series `fit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FitOptions {
    pub store_in_sample_residuals: bool,
    pub store_last_window: bool,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            store_in_sample_residuals: true,
            store_last_window: true,
        }
    }
}

impl FitOptions {
    pub fn with_store_in_sample_residuals(mut self, store: bool) -> Self {
        self.store_in_sample_residuals = store;
        self
    }

    pub fn with_store_last_window(mut self, store: bool) -> Self {
        self.store_last_window = store;
        self
    }
}

/// Which series keep their last window after a multi-series `fit`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StoreLastWindow {
    #[default]
    All,
    Nothing,
    Levels(Vec<String>),
}

impl StoreLastWindow {
    pub(crate) fn includes(&self, level: &str) -> bool {
        match self {
            StoreLastWindow::All => true,
            StoreLastWindow::Nothing => false,
            StoreLastWindow::Levels(levels) => levels.iter().any(|l| l == level),
        }
    }
}

/// Options of multi-series `fit`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiSeriesFitOptions {
    pub store_in_sample_residuals: bool,
    pub store_last_window: StoreLastWindow,
    pub suppress_warnings: bool,
}

impl Default for MultiSeriesFitOptions {
    fn default() -> Self {
        Self {
            store_in_sample_residuals: true,
            store_last_window: StoreLastWindow::All,
            suppress_warnings: false,
        }
    }
}

impl MultiSeriesFitOptions {
    pub fn with_store_in_sample_residuals(mut self, store: bool) -> Self {
        self.store_in_sample_residuals = store;
        self
    }

    pub fn with_store_last_window(mut self, store: StoreLastWindow) -> Self {
        self.store_last_window = store;
        self
    }

    pub fn with_suppress_warnings(mut self, suppress: bool) -> Self {
        self.suppress_warnings = suppress;
        self
    }
}

/// Inputs of multi-series predictions besides the number of steps.
#[derive(Debug, Clone, Copy, Default)]
pub struct PredictOptions<'a> {
    /// Levels to predict, all training series when `None`.
    pub levels: Option<&'a [String]>,
    /// Windows to predict from instead of the stored ones.
    pub last_window: Option<&'a [TimeSeries]>,
    pub exog: Option<&'a MultiSeriesExog>,
    pub suppress_warnings: bool,
}

impl<'a> PredictOptions<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_levels(mut self, levels: &'a [String]) -> Self {
        self.levels = Some(levels);
        self
    }

    pub fn with_last_window(mut self, last_window: &'a [TimeSeries]) -> Self {
        self.last_window = Some(last_window);
        self
    }

    pub fn with_exog(mut self, exog: &'a MultiSeriesExog) -> Self {
        self.exog = Some(exog);
        self
    }

    pub fn with_suppress_warnings(mut self, suppress: bool) -> Self {
        self.suppress_warnings = suppress;
        self
    }
}

/// Common interface of single-series forecasters.
pub trait Forecaster: Clone + fmt::Debug {
    /// Shape of the residuals accepted by [`Forecaster::set_out_sample_residuals`].
    type OutSampleResiduals;

    /// Forecaster name.
    fn name(&self) -> &str;

    /// Fit on `y` and, optionally, exogenous variables aligned with it.
    fn fit(&mut self, y: &TimeSeries, exog: Option<&Exog>, options: FitOptions) -> Result<()>;

    /// Point predictions for the next `steps` steps.
    fn predict(
        &self,
        steps: usize,
        last_window: Option<&TimeSeries>,
        exog: Option<&Exog>,
    ) -> Result<Forecast>;

    /// Bootstrapped prediction paths.
    fn predict_bootstrapping(
        &self,
        steps: usize,
        last_window: Option<&TimeSeries>,
        exog: Option<&Exog>,
        config: &BootstrapConfig,
    ) -> Result<BootstrapPredictions>;

    /// Point predictions with percentile bounds of the bootstrapped paths.
    fn predict_interval(
        &self,
        steps: usize,
        last_window: Option<&TimeSeries>,
        exog: Option<&Exog>,
        interval: [f64; 2],
        config: &BootstrapConfig,
    ) -> Result<Forecast> {
        validate_interval(interval)?;
        let point = self.predict(steps, last_window, exog)?;
        let boot = self.predict_bootstrapping(steps, last_window, exog, config)?;
        let (lower, upper) = boot.percentile_interval(interval)?;
        Forecast::with_intervals(point.index().clone(), point.point().to_vec(), lower, upper)
    }

    /// Quantiles of the bootstrapped paths.
    fn predict_quantiles(
        &self,
        steps: usize,
        last_window: Option<&TimeSeries>,
        exog: Option<&Exog>,
        quantiles: &[f64],
        config: &BootstrapConfig,
    ) -> Result<QuantileForecast> {
        crate::core::validate_quantiles(quantiles)?;
        let boot = self.predict_bootstrapping(steps, last_window, exog, config)?;
        Ok(QuantileForecast {
            index: boot.index().clone(),
            quantiles: quantiles.to_vec(),
            values: boot.quantiles(quantiles)?,
        })
    }

    /// Normal distribution fitted to the bootstrapped paths of each step.
    fn predict_dist(
        &self,
        steps: usize,
        last_window: Option<&TimeSeries>,
        exog: Option<&Exog>,
        config: &BootstrapConfig,
    ) -> Result<DistributionForecast> {
        let boot = self.predict_bootstrapping(steps, last_window, exog, config)?;
        Ok(boot.fit_normal())
    }

    /// Overwrite regressor hyperparameters. The forecaster must be refitted.
    fn set_params(&mut self, params: &ParamSet) -> Result<()>;

    /// Replace the lags. The forecaster must be refitted.
    fn set_lags(&mut self, lags: Lags) -> Result<()>;

    /// Store residuals measured on data not seen during training.
    fn set_out_sample_residuals(
        &mut self,
        residuals: Self::OutSampleResiduals,
        append: bool,
    ) -> Result<()>;

    /// Number of past observations needed to predict.
    fn window_size(&self) -> usize;

    /// Label of the predictors, e.g. `[1, 2, 3]`.
    fn lags_label(&self) -> String;

    /// Predictors come from a user function instead of lags.
    fn uses_custom_predictors(&self) -> bool {
        false
    }

    /// Hyperparameters of the underlying regressor.
    fn regressor_params(&self) -> ParamSet;

    fn is_fitted(&self) -> bool;
}

/// Common interface of forecasters trained on several series at once.
pub trait MultiSeriesForecaster: Clone + fmt::Debug {
    fn name(&self) -> &str;

    /// Fit on named series, optionally with exogenous variables.
    fn fit(
        &mut self,
        series: &[TimeSeries],
        exog: Option<&MultiSeriesExog>,
        options: &MultiSeriesFitOptions,
    ) -> Result<()>;

    fn predict(&self, steps: usize, options: &PredictOptions<'_>) -> Result<MultiSeriesForecast>;

    fn predict_bootstrapping(
        &self,
        steps: usize,
        options: &PredictOptions<'_>,
        config: &BootstrapConfig,
    ) -> Result<MultiSeriesBootstrap>;

    /// Point predictions with percentile bounds, per level.
    fn predict_interval(
        &self,
        steps: usize,
        options: &PredictOptions<'_>,
        interval: [f64; 2],
        config: &BootstrapConfig,
    ) -> Result<MultiSeriesForecast> {
        validate_interval(interval)?;
        // Warnings are raised once, by the bootstrapping call.
        let quiet = PredictOptions {
            suppress_warnings: true,
            ..*options
        };
        let point = self.predict(steps, &quiet)?;
        let boot = self.predict_bootstrapping(steps, options, config)?;
        let mut entries = Vec::with_capacity(point.len());
        for (level, forecast) in point.iter() {
            if let Some(paths) = boot.get(level) {
                let (lower, upper) = paths.percentile_interval(interval)?;
                entries.push((
                    level.to_string(),
                    Forecast::with_intervals(
                        forecast.index().clone(),
                        forecast.point().to_vec(),
                        lower,
                        upper,
                    )?,
                ));
            }
        }
        Ok(MultiSeriesForecast::new(entries))
    }

    /// Quantiles of the bootstrapped paths, per level.
    fn predict_quantiles(
        &self,
        steps: usize,
        options: &PredictOptions<'_>,
        quantiles: &[f64],
        config: &BootstrapConfig,
    ) -> Result<Vec<(String, QuantileForecast)>> {
        crate::core::validate_quantiles(quantiles)?;
        let boot = self.predict_bootstrapping(steps, options, config)?;
        boot.iter()
            .map(|(level, paths)| {
                Ok((
                    level.to_string(),
                    QuantileForecast {
                        index: paths.index().clone(),
                        quantiles: quantiles.to_vec(),
                        values: paths.quantiles(quantiles)?,
                    },
                ))
            })
            .collect()
    }

    /// Normal distributions fitted to the bootstrapped paths, per level.
    fn predict_dist(
        &self,
        steps: usize,
        options: &PredictOptions<'_>,
        config: &BootstrapConfig,
    ) -> Result<Vec<(String, DistributionForecast)>> {
        let boot = self.predict_bootstrapping(steps, options, config)?;
        Ok(boot
            .iter()
            .map(|(level, paths)| (level.to_string(), paths.fit_normal()))
            .collect())
    }

    fn set_params(&mut self, params: &ParamSet) -> Result<()>;

    fn set_lags(&mut self, lags: Lags) -> Result<()>;

    /// Store out-of-sample residuals per level.
    fn set_out_sample_residuals(
        &mut self,
        residuals: &BTreeMap<String, Vec<f64>>,
        append: bool,
        suppress_warnings: bool,
    ) -> Result<()>;

    fn window_size(&self) -> usize;

    fn lags_label(&self) -> String;

    fn uses_custom_predictors(&self) -> bool {
        false
    }

    fn regressor_params(&self) -> ParamSet;

    /// Names of the training series, in training order.
    fn series_names(&self) -> &[String];

    fn is_fitted(&self) -> bool;
}

pub(crate) fn check_y(y: &TimeSeries) -> Result<()> {
    if y.is_empty() {
        return Err(ForecastError::EmptyData);
    }
    if y.values().iter().any(|v| v.is_nan()) {
        return Err(ForecastError::MissingValues(
            "`y` has missing values.".to_string(),
        ));
    }
    check_extendable_index(y)
}

/// Predictions are labelled by extending the training index, so it must have
/// a regular frequency.
pub(crate) fn check_extendable_index(series: &TimeSeries) -> Result<()> {
    if !series.index().is_extendable() {
        return Err(ForecastError::TimestampError(format!(
            "Series '{}' has an index without a regular frequency. Predictions \
             could not be labelled; use a range index or regular timestamps.",
            series.name()
        )));
    }
    Ok(())
}

/// Exogenous variables passed to `fit` must be aligned with `y`.
pub(crate) fn check_train_exog(y: &TimeSeries, exog: &Exog) -> Result<()> {
    if exog.len() != y.len() {
        return Err(ForecastError::InvalidParameter(format!(
            "`exog` must have same number of samples as `y`. length `exog`: ({}), length `y`: ({})",
            exog.len(),
            y.len()
        )));
    }
    if let Some(index) = exog.index() {
        if index != y.index() {
            return Err(ForecastError::InvalidParameter(
                "Different index for `y` and `exog`. They must be equal to ensure the \
                 correct alignment of values."
                    .to_string(),
            ));
        }
    }
    Ok(())
}

/// The window predictions start from: the provided one or the stored one.
pub(crate) fn resolve_last_window(
    provided: Option<&TimeSeries>,
    stored: Option<&TimeSeries>,
    window_size: usize,
) -> Result<TimeSeries> {
    let window = match provided.or(stored) {
        Some(window) => window,
        None => {
            return Err(ForecastError::InvalidParameter(
                "`last_window` was not stored during training. Provide `last_window` as \
                 argument in predict method."
                    .to_string(),
            ))
        }
    };
    if window.len() < window_size {
        return Err(ForecastError::InvalidParameter(format!(
            "`last_window` must have as many values as needed to generate the predictors. \
             For this forecaster it is {}.",
            window_size
        )));
    }
    if window.values().iter().any(|v| v.is_nan()) {
        return Err(ForecastError::MissingValues(
            "`last_window` has missing values.".to_string(),
        ));
    }
    Ok(window.tail(window_size))
}

/// Exogenous rows used by a prediction of `steps` steps, columns in training order.
pub(crate) fn prepare_predict_exog(
    exog: Option<&Exog>,
    exog_names: Option<&[String]>,
    steps: usize,
    future: &crate::core::SeriesIndex,
) -> Result<Option<Exog>> {
    match (exog, exog_names) {
        (None, None) => Ok(None),
        (Some(_), None) => Err(ForecastError::InvalidParameter(
            "Forecaster trained without exogenous variable/s. `exog` must be `None` when \
             predicting."
                .to_string(),
        )),
        (None, Some(_)) => Err(ForecastError::InvalidParameter(
            "Forecaster trained with exogenous variable/s. Same variables must be provided \
             when predicting."
                .to_string(),
        )),
        (Some(exog), Some(names)) => {
            if exog.len() < steps {
                return Err(ForecastError::InvalidParameter(format!(
                    "`exog` must have at least as many values as the distance to the maximum \
                     step predicted, {}.",
                    steps
                )));
            }
            if let (Some(index), Some(expected)) = (exog.index(), future.first_label()) {
                if index.first_label() != Some(expected) {
                    return Err(ForecastError::InvalidParameter(format!(
                        "To make predictions `exog` must start one step ahead of \
                         `last_window`. Expected index {}.",
                        expected
                    )));
                }
            }
            Ok(Some(exog.select(names)?.head(steps)?))
        }
    }
}
