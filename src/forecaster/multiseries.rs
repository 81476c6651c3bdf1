//! Global recursive forecaster trained on several series at once.
//!
//! Rows of all series are stacked into a single training matrix. Series are
//! told apart by an encoded identifier column (ordinal code or one-hot), or
//! not at all when the encoding is `None`.

use super::predictors::{Lags, Predictors};
use super::residuals::{
    cap_residuals, sample_residual_matrix, BootstrapConfig, ResidualStore, UNKNOWN_LEVEL,
};
use super::{
    check_extendable_index, MultiSeriesFitOptions, MultiSeriesForecaster, PredictOptions,
};
use crate::core::{
    BootstrapPredictions, Exog, Forecast, IndexLabel, Matrix, MultiSeriesBootstrap,
    MultiSeriesForecast, SeriesIndex, TimeSeries,
};
use crate::error::{ForecastError, Result};
use crate::preprocessing::{Scaler, TimeSeriesDifferentiator};
use crate::regressor::{ParamSet, Regressor};
use crate::warnings::{format_set, ForecastWarning};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Name of the ordinal series identifier column.
pub const LEVEL_COLUMN: &str = "_level_skforecast";

/// How the series identifier enters the feature matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    /// Integer code of the series in training order.
    #[default]
    Ordinal,
    /// One indicator column per training series.
    OneHot,
    /// No identifier: all series share the same model input.
    None,
}

impl Encoding {
    /// Parse `'ordinal'`, `'onehot'` or no value.
    pub fn parse(value: Option<&str>) -> Result<Self> {
        match value {
            None => Ok(Encoding::None),
            Some("ordinal") => Ok(Encoding::Ordinal),
            Some("onehot") => Ok(Encoding::OneHot),
            Some(other) => Err(ForecastError::InvalidParameter(format!(
                "Argument `encoding` must be one of the following values: 'ordinal', \
                 'onehot' or None. Got '{}'.",
                other
            ))),
        }
    }
}

/// Transformers fitted on the series before training.
#[derive(Debug, Clone, PartialEq)]
pub enum TransformerSeries {
    /// Cloned and fitted on every series. A copy fitted on all series pooled
    /// serves levels unseen in training.
    Single(Scaler),
    /// One scaler per series, fitted on that series only. Training series
    /// without an entry are left untransformed. The `_unknown_level` entry is
    /// fitted on all series pooled and serves levels unseen in training.
    PerSeries(BTreeMap<String, Scaler>),
}

impl TransformerSeries {
    /// Per-series scalers; the map must contain [`UNKNOWN_LEVEL`].
    pub fn per_series(scalers: BTreeMap<String, Scaler>) -> Result<Self> {
        if !scalers.contains_key(UNKNOWN_LEVEL) {
            return Err(ForecastError::InvalidParameter(
                "If `transformer_series` is a map, a transformer must be provided to \
                 transform series that do not exist during training. Add the key \
                 '_unknown_level' to `transformer_series`."
                    .to_string(),
            ));
        }
        Ok(TransformerSeries::PerSeries(scalers))
    }

    /// Unfitted scaler for a training series, `None` when it stays unscaled.
    fn for_series(&self, name: &str) -> Option<Scaler> {
        match self {
            TransformerSeries::Single(template) => Some(template.unfitted()),
            TransformerSeries::PerSeries(scalers) => scalers.get(name).map(Scaler::unfitted),
        }
    }

    fn for_unknown_level(&self) -> Option<Scaler> {
        match self {
            TransformerSeries::Single(template) => Some(template.unfitted()),
            TransformerSeries::PerSeries(scalers) => {
                scalers.get(UNKNOWN_LEVEL).map(Scaler::unfitted)
            }
        }
    }
}

/// Exogenous variables of a multi-series forecaster.
#[derive(Debug, Clone, PartialEq)]
pub enum MultiSeriesExog {
    /// One table shared by every series.
    Shared(Exog),
    /// One table per series; series without a table get missing values.
    PerSeries(BTreeMap<String, Exog>),
}

impl MultiSeriesExog {
    fn for_series(&self, name: &str) -> Option<&Exog> {
        match self {
            MultiSeriesExog::Shared(exog) => Some(exog),
            MultiSeriesExog::PerSeries(tables) => tables.get(name),
        }
    }

    /// Rows `[start, end)` of every table.
    pub fn slice(&self, start: usize, end: usize) -> Result<MultiSeriesExog> {
        Ok(match self {
            MultiSeriesExog::Shared(exog) => MultiSeriesExog::Shared(exog.slice(start, end)?),
            MultiSeriesExog::PerSeries(tables) => MultiSeriesExog::PerSeries(
                tables
                    .iter()
                    .map(|(name, exog)| Ok((name.clone(), exog.slice(start, end)?)))
                    .collect::<Result<_>>()?,
            ),
        })
    }

    /// Column names in order of first appearance.
    pub fn column_names(&self) -> Vec<String> {
        match self {
            MultiSeriesExog::Shared(exog) => exog.column_names().to_vec(),
            MultiSeriesExog::PerSeries(tables) => {
                let mut names: Vec<String> = Vec::new();
                for exog in tables.values() {
                    for name in exog.column_names() {
                        if !names.contains(name) {
                            names.push(name.clone());
                        }
                    }
                }
                names
            }
        }
    }
}

/// Row `i` of `exog` restricted to `names`; absent columns are NaN.
fn exog_row(exog: &Exog, names: &[String], i: usize) -> Vec<f64> {
    names
        .iter()
        .map(|n| exog.column(n).map_or(f64::NAN, |c| c[i]))
        .collect()
}

/// Exogenous rows aligned with `index`, by label when the table has an index.
fn aligned_exog_rows(exog: Option<&Exog>, names: &[String], index: &SeriesIndex) -> Result<Vec<Vec<f64>>> {
    let exog = match exog {
        Some(exog) => exog,
        None => return Ok(vec![vec![f64::NAN; names.len()]; index.len()]),
    };
    match exog.index() {
        Some(exog_index) => {
            let positions: HashMap<IndexLabel, usize> = exog_index
                .labels()
                .into_iter()
                .enumerate()
                .map(|(i, l)| (l, i))
                .collect();
            Ok(index
                .labels()
                .iter()
                .map(|label| match positions.get(label) {
                    Some(&i) => exog_row(exog, names, i),
                    None => vec![f64::NAN; names.len()],
                })
                .collect())
        }
        None => {
            if exog.len() != index.len() {
                return Err(ForecastError::InvalidParameter(format!(
                    "`exog` without an index must have the same length as its series. \
                     length `exog`: ({}), length series: ({})",
                    exog.len(),
                    index.len()
                )));
            }
            Ok((0..exog.len()).map(|i| exog_row(exog, names, i)).collect())
        }
    }
}

/// Exogenous rows for the predicted `future` labels.
fn future_exog_rows(
    exog: Option<&Exog>,
    names: &[String],
    future: &SeriesIndex,
    level: &str,
) -> Result<Vec<Vec<f64>>> {
    let exog = match exog {
        Some(exog) => exog,
        None => return Ok(vec![vec![f64::NAN; names.len()]; future.len()]),
    };
    if names.iter().any(|n| exog.column(n).is_none()) {
        return Err(ForecastError::InvalidParameter(format!(
            "Missing columns in `exog` for series '{}'. Expected {:?}. Got {:?}.",
            level,
            names,
            exog.column_names()
        )));
    }
    match exog.index() {
        Some(exog_index) => {
            let positions: HashMap<IndexLabel, usize> = exog_index
                .labels()
                .into_iter()
                .enumerate()
                .map(|(i, l)| (l, i))
                .collect();
            future
                .labels()
                .iter()
                .map(|label| {
                    positions
                        .get(label)
                        .map(|&i| exog_row(exog, names, i))
                        .ok_or_else(|| {
                            ForecastError::InvalidParameter(format!(
                                "`exog` for series '{}' does not cover the predicted index. \
                                 Missing label {}.",
                                level, label
                            ))
                        })
                })
                .collect()
        }
        None => {
            if exog.len() < future.len() {
                return Err(ForecastError::InvalidParameter(format!(
                    "`exog` must have at least as many values as the distance to the maximum \
                     step predicted, {}.",
                    future.len()
                )));
            }
            Ok((0..future.len()).map(|i| exog_row(exog, names, i)).collect())
        }
    }
}

/// Stacked training matrix of all series.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiSeriesTrainingMatrix {
    pub x: Matrix,
    pub y: Vec<f64>,
    /// Series each row belongs to.
    pub row_levels: Vec<String>,
    pub feature_names: Vec<String>,
}

/// Everything a recursive prediction needs for one level.
#[derive(Debug, Clone)]
struct LevelInput {
    level: String,
    /// Last transformed values, at least `predictors.window_size()` of them.
    window: Vec<f64>,
    encoding: Vec<f64>,
    exog: Option<Vec<Vec<f64>>>,
    scaler: Option<Scaler>,
    differentiator: Option<TimeSeriesDifferentiator>,
}

/// Recursive forecaster shared by many series.
#[derive(Debug, Clone)]
pub struct ForecasterAutoregMultiSeries<R: Regressor> {
    regressor: R,
    predictors: Predictors,
    encoding: Encoding,
    transformer_series: Option<TransformerSeries>,
    differentiation: Option<usize>,
    series_names: Vec<String>,
    transformers: BTreeMap<String, Scaler>,
    last_window: BTreeMap<String, TimeSeries>,
    training_range: BTreeMap<String, (IndexLabel, IndexLabel)>,
    exog_names: Option<Vec<String>>,
    feature_names: Vec<String>,
    in_sample_residuals: ResidualStore<String>,
    out_sample_residuals: Option<ResidualStore<String>>,
    fitted: bool,
}

impl<R: Regressor> ForecasterAutoregMultiSeries<R> {
    /// Ordinal encoding and a standard scaler per series by default.
    pub fn new(regressor: R, predictors: impl Into<Predictors>) -> Self {
        Self {
            regressor,
            predictors: predictors.into(),
            encoding: Encoding::Ordinal,
            transformer_series: Some(TransformerSeries::Single(Scaler::standard())),
            differentiation: None,
            series_names: Vec::new(),
            transformers: BTreeMap::new(),
            last_window: BTreeMap::new(),
            training_range: BTreeMap::new(),
            exog_names: None,
            feature_names: Vec::new(),
            in_sample_residuals: ResidualStore::new(),
            out_sample_residuals: None,
            fitted: false,
        }
    }

    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Scaler cloned and fitted per series; `None` trains on raw values.
    pub fn with_transformer_series(mut self, transformer: Option<Scaler>) -> Self {
        self.transformer_series = transformer.map(TransformerSeries::Single);
        self
    }

    /// A different scaler for each series. Fails without an `_unknown_level`
    /// entry.
    pub fn with_transformer_series_per_series(
        mut self,
        scalers: BTreeMap<String, Scaler>,
    ) -> Result<Self> {
        self.transformer_series = Some(TransformerSeries::per_series(scalers)?);
        Ok(self)
    }

    pub fn transformer_series(&self) -> Option<&TransformerSeries> {
        self.transformer_series.as_ref()
    }

    pub fn with_differentiation(mut self, order: usize) -> Result<Self> {
        TimeSeriesDifferentiator::new(order)?;
        self.differentiation = Some(order);
        Ok(self)
    }

    pub fn regressor(&self) -> &R {
        &self.regressor
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Fitted scalers by level, including the pooled `_unknown_level` one.
    pub fn transformers(&self) -> &BTreeMap<String, Scaler> {
        &self.transformers
    }

    /// Stored last windows, raw values.
    pub fn last_window(&self) -> &BTreeMap<String, TimeSeries> {
        &self.last_window
    }

    pub fn training_range(&self) -> &BTreeMap<String, (IndexLabel, IndexLabel)> {
        &self.training_range
    }

    pub fn exog_names(&self) -> Option<&[String]> {
        self.exog_names.as_deref()
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn in_sample_residuals(&self) -> &ResidualStore<String> {
        &self.in_sample_residuals
    }

    /// Mutable access, e.g. to replace the residuals of a level.
    pub fn in_sample_residuals_mut(&mut self) -> &mut ResidualStore<String> {
        &mut self.in_sample_residuals
    }

    pub fn out_sample_residuals(&self) -> Option<&ResidualStore<String>> {
        self.out_sample_residuals.as_ref()
    }

    fn reset(&mut self) {
        self.series_names.clear();
        self.transformers.clear();
        self.last_window.clear();
        self.training_range.clear();
        self.exog_names = None;
        self.feature_names.clear();
        self.in_sample_residuals = ResidualStore::new();
        self.out_sample_residuals = None;
        self.fitted = false;
    }

    fn encoding_names(&self) -> Vec<String> {
        match self.encoding {
            Encoding::Ordinal => vec![LEVEL_COLUMN.to_string()],
            Encoding::OneHot => self.series_names.clone(),
            Encoding::None => Vec::new(),
        }
    }

    /// Identifier columns of `level`: NaN code or all zeros when unknown.
    fn encode_level(&self, level: &str) -> Vec<f64> {
        match self.encoding {
            Encoding::Ordinal => vec![self
                .series_names
                .iter()
                .position(|n| n == level)
                .map_or(f64::NAN, |p| p as f64)],
            Encoding::OneHot => self
                .series_names
                .iter()
                .map(|n| if n == level { 1.0 } else { 0.0 })
                .collect(),
            Encoding::None => Vec::new(),
        }
    }

    /// Scaler of `level`, the pooled one for unknown levels.
    fn scaler_for(&self, level: &str) -> Option<&Scaler> {
        if self.series_names.iter().any(|name| name == level) {
            self.transformers.get(level)
        } else {
            self.transformers.get(UNKNOWN_LEVEL)
        }
    }

    /// Stack the training rows of all series.
    ///
    /// Fits the per-series transformers as a side effect.
    pub fn create_train_x_y(
        &mut self,
        series: &[TimeSeries],
        exog: Option<&MultiSeriesExog>,
        suppress_warnings: bool,
    ) -> Result<MultiSeriesTrainingMatrix> {
        if series.is_empty() {
            return Err(ForecastError::EmptyData);
        }
        let mut names: Vec<String> = Vec::with_capacity(series.len());
        for s in series {
            if names.iter().any(|n| n == s.name()) {
                return Err(ForecastError::InvalidParameter(format!(
                    "Series names must be unique. Got duplicated '{}'.",
                    s.name()
                )));
            }
            names.push(s.name().to_string());
        }
        self.series_names = names;

        let window_size = self.window_size();
        let pws = self.predictors.window_size();
        let exog_names = exog.map(|e| e.column_names()).unwrap_or_default();

        let mut trimmed = Vec::with_capacity(series.len());
        for s in series {
            check_extendable_index(s)?;
            let s = s.trim_missing()?;
            if s.len() <= window_size {
                return Err(ForecastError::InvalidParameter(format!(
                    "All series must have at least `window_size + 1` = {} observations. \
                     Series '{}' has {}.",
                    window_size + 1,
                    s.name(),
                    s.len()
                )));
            }
            trimmed.push(s);
        }

        self.transformers.clear();
        if let Some(transformer) = &self.transformer_series {
            if let TransformerSeries::PerSeries(scalers) = transformer {
                let untransformed: Vec<String> = trimmed
                    .iter()
                    .map(|s| s.name().to_string())
                    .filter(|name| !scalers.contains_key(name))
                    .collect();
                if !untransformed.is_empty() {
                    ForecastWarning::IgnoredArgument(format!(
                        "{} not present in `transformer_series`. No transformation is \
                         applied to these series.",
                        format_set(&untransformed)
                    ))
                    .emit(suppress_warnings);
                }
            }
            for s in &trimmed {
                if let Some(mut scaler) = transformer.for_series(s.name()) {
                    scaler.fit(s.values())?;
                    self.transformers.insert(s.name().to_string(), scaler);
                }
            }
            if let Some(mut scaler) = transformer.for_unknown_level() {
                let pooled: Vec<f64> =
                    trimmed.iter().flat_map(|s| s.values().iter().copied()).collect();
                scaler.fit(&pooled)?;
                self.transformers.insert(UNKNOWN_LEVEL.to_string(), scaler);
            }
        }

        let mut feature_names = self.predictors.names();
        feature_names.extend(self.encoding_names());
        feature_names.extend(exog_names.iter().cloned());

        let mut x = Matrix::with_columns(feature_names.len());
        let mut y = Vec::new();
        let mut row_levels = Vec::new();
        let mut dropped: Vec<String> = Vec::new();
        for s in &trimmed {
            let level = s.name();
            let mut values = match self.transformers.get(level) {
                Some(scaler) => scaler.transform(s.values())?,
                None => s.values().to_vec(),
            };
            if let Some(order) = self.differentiation {
                values = TimeSeriesDifferentiator::new(order)?.fit_transform(&values)?;
            }
            let encoded = self.encode_level(level);
            let exog_rows = match exog {
                Some(exog) => Some(aligned_exog_rows(exog.for_series(level), &exog_names, s.index())?),
                None => None,
            };
            let mut level_dropped = false;
            for t in window_size..values.len() {
                let mut row = self.predictors.features(&values[t - pws..t])?;
                row.extend(encoded.iter().copied());
                if let Some(rows) = &exog_rows {
                    row.extend(rows[t].iter().copied());
                }
                if values[t].is_nan() || row.iter().any(|v| v.is_nan()) {
                    level_dropped = true;
                    continue;
                }
                x.push_row(&row)?;
                y.push(values[t]);
                row_levels.push(level.to_string());
            }
            if level_dropped {
                dropped.push(level.to_string());
            }
        }

        if !dropped.is_empty() {
            ForecastWarning::MissingValues(format!(
                "NaNs detected in `y_train` or `X_train` of series {}. They have been dropped \
                 because the regressor cannot be trained with missing values. Same rows have \
                 been dropped from `y_train` and `X_train` to maintain alignment.",
                format_set(&dropped)
            ))
            .emit(suppress_warnings);
        }
        if y.is_empty() {
            return Err(ForecastError::InsufficientData {
                needed: 1,
                got: 0,
            });
        }
        Ok(MultiSeriesTrainingMatrix {
            x,
            y,
            row_levels,
            feature_names,
        })
    }

    /// Levels, windows and exogenous rows of a prediction.
    fn prepare_inputs(
        &self,
        steps: usize,
        options: &PredictOptions<'_>,
    ) -> Result<(SeriesIndex, Vec<LevelInput>)> {
        if !self.fitted {
            return Err(ForecastError::forecaster_not_fitted());
        }
        if steps == 0 {
            return Err(ForecastError::InvalidParameter(
                "`steps` must be an integer greater than or equal to 1.".to_string(),
            ));
        }
        let suppress = options.suppress_warnings;
        let window_size = self.window_size();

        let windows: Vec<TimeSeries> = match options.last_window {
            Some(provided) => {
                let levels: Vec<String> = match options.levels {
                    Some(levels) => levels.to_vec(),
                    None => provided.iter().map(|s| s.name().to_string()).collect(),
                };
                let missing: Vec<String> = levels
                    .iter()
                    .filter(|l| provided.iter().all(|s| s.name() != l.as_str()))
                    .cloned()
                    .collect();
                if !missing.is_empty() {
                    return Err(ForecastError::InvalidParameter(format!(
                        "`last_window` must contain a series named as each level to be \
                         predicted. Missing: {}.",
                        format_set(&missing)
                    )));
                }
                let mut windows = Vec::with_capacity(levels.len());
                for level in &levels {
                    if let Some(window) = provided.iter().find(|s| s.name() == level.as_str()) {
                        windows.push(window.clone());
                    }
                }
                let last = windows.first().and_then(|w| w.last_label());
                if windows.iter().any(|w| w.last_label() != last) {
                    return Err(ForecastError::InvalidParameter(
                        "All series in `last_window` must end at the same index.".to_string(),
                    ));
                }
                windows
            }
            None => {
                let levels: Vec<String> = options
                    .levels
                    .map(|l| l.to_vec())
                    .unwrap_or_else(|| self.series_names.clone());
                let (available, missing): (Vec<String>, Vec<String>) = levels
                    .into_iter()
                    .partition(|l| self.last_window.contains_key(l));
                if available.is_empty() {
                    return Err(ForecastError::InvalidParameter(format!(
                        "No series to predict. None of the series {} are present in \
                         `last_window` attribute. Provide `last_window` as argument in \
                         predict method.",
                        format_set(&missing)
                    )));
                }
                if !missing.is_empty() {
                    ForecastWarning::IgnoredArgument(format!(
                        "Levels {} are excluded from prediction since they were not stored in \
                         `last_window` attribute during training. If you don't want to retrain \
                         the Forecaster, provide `last_window` as argument.",
                        format_set(&missing)
                    ))
                    .emit(suppress);
                }

                let stored: Vec<&TimeSeries> =
                    available.iter().filter_map(|l| self.last_window.get(l)).collect();
                let max_label = stored
                    .iter()
                    .filter_map(|w| w.last_label())
                    .fold(None, |acc: Option<IndexLabel>, label| match acc {
                        Some(current) if current >= label => Some(current),
                        _ => Some(label),
                    });
                let (kept, behind): (Vec<&TimeSeries>, Vec<&TimeSeries>) =
                    stored.into_iter().partition(|w| w.last_label() == max_label);
                if !behind.is_empty() {
                    let names: Vec<String> = behind.iter().map(|w| w.name().to_string()).collect();
                    let max = max_label.map(|l| l.to_string()).unwrap_or_default();
                    ForecastWarning::IgnoredArgument(format!(
                        "Only series whose last window ends at the same index can be predicted \
                         together. Series that do not reach the maximum index, '{}', are \
                         excluded from prediction: {}.",
                        max,
                        format_set(&names)
                    ))
                    .emit(suppress);
                }
                kept.into_iter().cloned().collect()
            }
        };

        let unknown: Vec<String> = windows
            .iter()
            .map(|w| w.name().to_string())
            .filter(|l| !self.series_names.contains(l))
            .collect();
        if !unknown.is_empty() && self.encoding != Encoding::None {
            let encoded_as = match self.encoding {
                Encoding::OneHot => "all zeros",
                _ => "NaN",
            };
            ForecastWarning::UnknownLevel(format!(
                "`levels` {} were not included in training. Unknown levels are encoded as {}, \
                 which may cause the prediction to fail if the regressor does not accept NaN \
                 values.",
                format_set(&unknown),
                encoded_as
            ))
            .emit(suppress);
        }

        let first = windows.first().ok_or(ForecastError::EmptyData)?;
        if first.len() < window_size {
            return Err(ForecastError::InvalidParameter(format!(
                "`last_window` must have as many values as needed to generate the predictors. \
                 For this forecaster it is {}.",
                window_size
            )));
        }
        let future = first.index().future(steps)?;

        let exog_names = match (options.exog, &self.exog_names) {
            (None, None) => None,
            (Some(_), None) => {
                return Err(ForecastError::InvalidParameter(
                    "Forecaster trained without exogenous variable/s. `exog` must be `None` \
                     when predicting."
                        .to_string(),
                ))
            }
            (None, Some(_)) => {
                return Err(ForecastError::InvalidParameter(
                    "Forecaster trained with exogenous variable/s. Same variables must be \
                     provided when predicting."
                        .to_string(),
                ))
            }
            (Some(_), Some(names)) => Some(names),
        };

        let mut inputs = Vec::with_capacity(windows.len());
        for window in &windows {
            let level = window.name();
            if window.len() < window_size {
                return Err(ForecastError::InvalidParameter(format!(
                    "`last_window` must have as many values as needed to generate the \
                     predictors. For this forecaster it is {}.",
                    window_size
                )));
            }
            let window = window.tail(window_size);
            if window.values().iter().any(|v| v.is_nan()) {
                return Err(ForecastError::MissingValues(format!(
                    "`last_window` has missing values for series '{}'.",
                    level
                )));
            }
            let scaler = self.scaler_for(level).cloned();
            let mut values = match &scaler {
                Some(scaler) => scaler.transform(window.values())?,
                None => window.values().to_vec(),
            };
            let differentiator = match self.differentiation {
                Some(order) => {
                    let mut diff = TimeSeriesDifferentiator::new(order)?;
                    values = diff.fit_transform(&values)?;
                    Some(diff)
                }
                None => None,
            };
            let exog = match (options.exog, exog_names) {
                (Some(exog), Some(names)) => {
                    Some(future_exog_rows(exog.for_series(level), names, &future, level)?)
                }
                _ => None,
            };
            inputs.push(LevelInput {
                level: level.to_string(),
                window: values,
                encoding: self.encode_level(level),
                exog,
                scaler,
                differentiator,
            });
        }
        Ok((future, inputs))
    }

    /// Recursive prediction of all levels in lock-step: `out[level][step][path]`.
    ///
    /// `residuals[level][step][path]` are added before values are fed back.
    fn predict_paths(
        &self,
        steps: usize,
        inputs: &[LevelInput],
        residuals: Option<&[Vec<Vec<f64>>]>,
    ) -> Result<Vec<Vec<Vec<f64>>>> {
        let n_paths = residuals
            .and_then(|r| r.first())
            .and_then(|r| r.first())
            .map_or(1, |r| r.len());
        let pws = self.predictors.window_size();
        let mut buffers: Vec<Vec<Vec<f64>>> = inputs
            .iter()
            .map(|input| vec![input.window[input.window.len() - pws..].to_vec(); n_paths])
            .collect();
        let mut out = vec![vec![vec![0.0; n_paths]; steps]; inputs.len()];

        for step in 0..steps {
            let mut x = Matrix::with_columns(self.feature_names.len());
            for (input, level_buffers) in inputs.iter().zip(&buffers) {
                for buffer in level_buffers {
                    let mut row = self.predictors.features(buffer)?;
                    row.extend(input.encoding.iter().copied());
                    if let Some(exog) = &input.exog {
                        row.extend(exog[step].iter().copied());
                    }
                    x.push_row(&row)?;
                }
            }
            let predictions = self.regressor.predict(&x)?;
            for (l, level_buffers) in buffers.iter_mut().enumerate() {
                for (p, buffer) in level_buffers.iter_mut().enumerate() {
                    let mut value = predictions[l * n_paths + p];
                    if let Some(residuals) = residuals {
                        value += residuals[l][step][p];
                    }
                    buffer.push(value);
                    out[l][step][p] = value;
                }
            }
        }

        for (input, level_out) in inputs.iter().zip(out.iter_mut()) {
            for p in 0..n_paths {
                let mut path: Vec<f64> = level_out.iter().map(|s| s[p]).collect();
                if let Some(diff) = &input.differentiator {
                    path = diff.inverse_transform_next_window(&path)?;
                }
                if let Some(scaler) = &input.scaler {
                    path = scaler.inverse_transform(&path)?;
                }
                for (step, value) in path.into_iter().enumerate() {
                    level_out[step][p] = value;
                }
            }
        }
        Ok(out)
    }

    /// Residuals used to bootstrap each level, in the order of `inputs`.
    fn select_residuals<'a>(
        &'a self,
        inputs: &[LevelInput],
        in_sample: bool,
        suppress: bool,
    ) -> Result<Vec<&'a [f64]>> {
        let attribute = if in_sample {
            "in_sample_residuals"
        } else {
            "out_sample_residuals"
        };
        let store = if in_sample {
            &self.in_sample_residuals
        } else {
            self.out_sample_residuals.as_ref().ok_or_else(|| {
                ForecastError::InvalidParameter(
                    "`forecaster.out_sample_residuals` is `None`. Use \
                     `in_sample_residuals=True` or the  `set_out_sample_residuals()` \
                     method before predicting."
                        .to_string(),
                )
            })?
        };

        let mut unknown: Vec<String> = Vec::new();
        let mut selected = Vec::with_capacity(inputs.len());
        for input in inputs {
            let level = input.level.as_str();
            let known = self.series_names.iter().any(|n| n == level);
            let key = if self.encoding == Encoding::None {
                UNKNOWN_LEVEL
            } else if known {
                level
            } else {
                unknown.push(level.to_string());
                UNKNOWN_LEVEL
            };
            let residuals = store.get(&key.to_string()).ok_or_else(|| {
                ForecastError::InvalidParameter(format!(
                    "Not available residuals for level '{}'. Check `forecaster.{}`.",
                    level, attribute
                ))
            })?;
            if residuals.iter().any(|r| r.is_nan()) {
                return Err(ForecastError::InvalidParameter(format!(
                    "forecaster residuals for level '{}' contains `None` or `NaNs` values. \
                     Check `forecaster.{}`.",
                    level, attribute
                )));
            }
            selected.push(residuals);
        }
        if !unknown.is_empty() {
            ForecastWarning::UnknownLevel(format!(
                "`levels` {} are not present in `forecaster.{}`, most likely because they \
                 were not present in the training data. A random sample of the residuals from \
                 other levels will be used. This can lead to inaccurate intervals for the \
                 unknown levels.",
                format_set(&unknown),
                attribute
            ))
            .emit(suppress);
        }
        Ok(selected)
    }
}

impl<R: Regressor> MultiSeriesForecaster for ForecasterAutoregMultiSeries<R> {
    fn name(&self) -> &str {
        match self.predictors {
            Predictors::Lags(_) => "ForecasterAutoregMultiSeries",
            Predictors::Custom(_) => "ForecasterAutoregMultiSeriesCustom",
        }
    }

    fn fit(
        &mut self,
        series: &[TimeSeries],
        exog: Option<&MultiSeriesExog>,
        options: &MultiSeriesFitOptions,
    ) -> Result<()> {
        self.reset();
        let suppress = options.suppress_warnings;
        if self.regressor.is_linear() && self.transformer_series.is_none() {
            ForecastWarning::LinearModelScaling.emit(suppress);
        }
        let train = self.create_train_x_y(series, exog, suppress)?;
        self.regressor.fit(&train.x, &train.y)?;
        self.feature_names = train.feature_names.clone();
        self.exog_names = exog.map(|e| e.column_names());

        if options.store_in_sample_residuals {
            let fitted = self.regressor.predict(&train.x)?;
            let mut by_level: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
            for ((level, y), p) in train.row_levels.iter().zip(&train.y).zip(&fitted) {
                by_level.entry(level.as_str()).or_default().push(y - p);
            }
            let pooled: Vec<f64> = train.y.iter().zip(&fitted).map(|(y, p)| y - p).collect();
            if self.encoding != Encoding::None {
                for (level, residuals) in by_level {
                    self.in_sample_residuals
                        .insert_in_sample(level.to_string(), residuals);
                }
            }
            self.in_sample_residuals
                .insert_in_sample(UNKNOWN_LEVEL.to_string(), pooled);
        } else {
            if self.encoding != Encoding::None {
                for level in &self.series_names {
                    self.in_sample_residuals.insert_empty(level.clone());
                }
            }
            self.in_sample_residuals.insert_empty(UNKNOWN_LEVEL.to_string());
        }

        if let super::StoreLastWindow::Levels(levels) = &options.store_last_window {
            let ignored: Vec<String> = levels
                .iter()
                .filter(|l| !self.series_names.contains(l))
                .cloned()
                .collect();
            if !ignored.is_empty() {
                ForecastWarning::IgnoredArgument(format!(
                    "Levels {} in `store_last_window` were not present in training and are \
                     ignored.",
                    format_set(&ignored)
                ))
                .emit(suppress);
            }
        }
        let window_size = self.window_size();
        for s in series {
            let trimmed = s.trim_missing()?;
            if let (Some(first), Some(last)) = (trimmed.index().first_label(), trimmed.last_label()) {
                self.training_range.insert(s.name().to_string(), (first, last));
            }
            if options.store_last_window.includes(s.name()) {
                self.last_window
                    .insert(s.name().to_string(), trimmed.tail(window_size));
            }
        }
        self.fitted = true;

        tracing::debug!(
            forecaster = self.name(),
            regressor = self.regressor.name(),
            n_series = self.series_names.len(),
            n_rows = train.x.n_rows(),
            n_features = train.x.n_cols(),
            "fitted multi-series forecaster"
        );
        Ok(())
    }

    fn predict(&self, steps: usize, options: &PredictOptions<'_>) -> Result<MultiSeriesForecast> {
        let (index, inputs) = self.prepare_inputs(steps, options)?;
        let paths = self.predict_paths(steps, &inputs, None)?;
        let mut entries = Vec::with_capacity(inputs.len());
        for (input, level_paths) in inputs.iter().zip(paths) {
            let point = level_paths.iter().map(|s| s[0]).collect();
            entries.push((input.level.clone(), Forecast::new(index.clone(), point)?));
        }
        Ok(MultiSeriesForecast::new(entries))
    }

    fn predict_bootstrapping(
        &self,
        steps: usize,
        options: &PredictOptions<'_>,
        config: &BootstrapConfig,
    ) -> Result<MultiSeriesBootstrap> {
        config.validate()?;
        let (index, inputs) = self.prepare_inputs(steps, options)?;
        let selected =
            self.select_residuals(&inputs, config.in_sample_residuals, options.suppress_warnings)?;
        let mut sampled = Vec::with_capacity(selected.len());
        for residuals in selected {
            let mut rng = StdRng::seed_from_u64(config.random_state);
            sampled.push(sample_residual_matrix(residuals, steps, config.n_boot, &mut rng)?);
        }
        let paths = self.predict_paths(steps, &inputs, Some(&sampled))?;
        let mut entries = Vec::with_capacity(inputs.len());
        for (input, level_paths) in inputs.iter().zip(paths) {
            entries.push((
                input.level.clone(),
                BootstrapPredictions::new(index.clone(), level_paths)?,
            ));
        }
        Ok(MultiSeriesBootstrap::new(entries))
    }

    fn set_params(&mut self, params: &ParamSet) -> Result<()> {
        self.regressor.set_params(params)?;
        self.reset();
        Ok(())
    }

    fn set_lags(&mut self, lags: Lags) -> Result<()> {
        self.predictors = Predictors::Lags(lags);
        self.reset();
        Ok(())
    }

    /// Residuals are given on the original scale of each series. Values are
    /// stored as given, missing values included, and checked at prediction time.
    fn set_out_sample_residuals(
        &mut self,
        residuals: &BTreeMap<String, Vec<f64>>,
        append: bool,
        suppress_warnings: bool,
    ) -> Result<()> {
        if !self.fitted {
            return Err(ForecastError::NotFitted(
                "This forecaster is not fitted yet. Call `fit` with appropriate arguments \
                 before using `set_out_sample_residuals()`."
                    .to_string(),
            ));
        }
        let mut store = match (append, self.out_sample_residuals.clone()) {
            (true, Some(store)) => store,
            _ => ResidualStore::new(),
        };

        let scaled = |level: &str, values: &[f64]| -> Result<Vec<f64>> {
            match self.transformers.get(level) {
                Some(scaler) => scaler.scale_residuals(values),
                None => Ok(values.to_vec()),
            }
        };

        if self.encoding == Encoding::None {
            ForecastWarning::UnknownLevel(
                "As `encoding` is set to `None`, no distinction between levels is made. All \
                 residuals are stored in the '_unknown_level' key."
                    .to_string(),
            )
            .emit(suppress_warnings);
            let mut pooled = Vec::new();
            for (level, values) in residuals {
                pooled.extend(scaled(level, values)?);
            }
            let key = UNKNOWN_LEVEL.to_string();
            if append {
                store.append(key, &pooled);
            } else {
                store.insert(key, pooled);
            }
            self.out_sample_residuals = Some(store);
            return Ok(());
        }

        let ignored: Vec<String> = residuals
            .keys()
            .filter(|l| !self.series_names.contains(l))
            .cloned()
            .collect();
        if !ignored.is_empty() {
            ForecastWarning::IgnoredArgument(format!(
                "Residuals of levels {} are ignored since they were not present in training.",
                format_set(&ignored)
            ))
            .emit(suppress_warnings);
        }
        for (level, values) in residuals {
            if !self.series_names.contains(level) {
                continue;
            }
            let values = scaled(level, values)?;
            if append {
                store.append(level.clone(), &values);
            } else {
                store.insert(level.clone(), values);
            }
        }

        let mut pooled: Vec<f64> = Vec::new();
        for level in &self.series_names {
            if let Some(values) = store.get(level) {
                pooled.extend(values.iter().copied().filter(|v| !v.is_nan()));
            }
        }
        store.insert(UNKNOWN_LEVEL.to_string(), cap_residuals(pooled));
        self.out_sample_residuals = Some(store);
        Ok(())
    }

    fn window_size(&self) -> usize {
        self.predictors.window_size() + self.differentiation.unwrap_or(0)
    }

    fn lags_label(&self) -> String {
        self.predictors.label()
    }

    fn uses_custom_predictors(&self) -> bool {
        matches!(self.predictors, Predictors::Custom(_))
    }

    fn regressor_params(&self) -> ParamSet {
        self.regressor.params()
    }

    fn series_names(&self) -> &[String] {
        &self.series_names
    }

    fn is_fitted(&self) -> bool {
        self.fitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecaster::StoreLastWindow;
    use crate::regressor::{DecisionTreeRegressor, LinearRegression};
    use approx::assert_relative_eq;
    use chrono::{Duration, TimeZone, Utc};

    fn arange(name: &str, n: usize) -> TimeSeries {
        TimeSeries::from_values(name, (0..n).map(|v| v as f64).collect())
    }

    fn linear(lags: usize) -> ForecasterAutoregMultiSeries<LinearRegression> {
        ForecasterAutoregMultiSeries::new(LinearRegression::new(), Lags::new(lags).unwrap())
            .with_transformer_series(None)
    }

    fn quiet() -> MultiSeriesFitOptions {
        MultiSeriesFitOptions::default().with_suppress_warnings(true)
    }

    #[test]
    fn encoding_parse() {
        assert_eq!(Encoding::parse(Some("ordinal")).unwrap(), Encoding::Ordinal);
        assert_eq!(Encoding::parse(Some("onehot")).unwrap(), Encoding::OneHot);
        assert_eq!(Encoding::parse(None).unwrap(), Encoding::None);
        let err = Encoding::parse(Some("binary")).unwrap_err();
        assert!(err.to_string().contains("Got 'binary'."));
    }

    #[test]
    fn training_matrix_stacks_series_with_codes() {
        let mut f = linear(2);
        let series = vec![arange("a", 4), arange("b", 5)];
        let train = f.create_train_x_y(&series, None, true).unwrap();
        assert_eq!(train.feature_names, vec!["lag_1", "lag_2", LEVEL_COLUMN]);
        assert_eq!(train.x.n_rows(), 2 + 3);
        assert_eq!(train.x.row(0), &[1.0, 0.0, 0.0]);
        assert_eq!(train.x.row(2), &[1.0, 0.0, 1.0]);
        assert_eq!(train.row_levels[4], "b");
    }

    #[test]
    fn onehot_encoding_adds_one_column_per_series() {
        let mut f = linear(2).with_encoding(Encoding::OneHot);
        let series = vec![arange("a", 4), arange("b", 4)];
        let train = f.create_train_x_y(&series, None, true).unwrap();
        assert_eq!(train.feature_names, vec!["lag_1", "lag_2", "a", "b"]);
        assert_eq!(train.x.row(2), &[1.0, 0.0, 0.0, 1.0]);
        assert_eq!(f.encode_level("c"), vec![0.0, 0.0]);
    }

    #[test]
    fn rows_with_missing_values_are_dropped() {
        let mut f = linear(2);
        let gappy = TimeSeries::from_values("a", vec![f64::NAN, 0.0, 1.0, f64::NAN, 3.0, 4.0, 5.0, 6.0]);
        let train = f.create_train_x_y(&[gappy], None, true).unwrap();
        // Leading NaN trimmed; rows touching the interior NaN are dropped.
        assert_eq!(train.y, vec![5.0, 6.0]);
    }

    #[test]
    fn duplicated_series_names_rejected() {
        let mut f = linear(2);
        let series = vec![arange("a", 5), arange("a", 5)];
        assert!(f.fit(&series, None, &quiet()).is_err());
    }

    #[test]
    fn residual_keys_follow_encoding() {
        let series = vec![arange("1", 10), arange("2", 10)];
        let mut f = linear(3);
        f.fit(&series, None, &quiet()).unwrap();
        let keys: Vec<&String> = f.in_sample_residuals().keys().collect();
        assert_eq!(keys, vec!["1", "2", UNKNOWN_LEVEL]);

        let mut f = linear(3).with_encoding(Encoding::None);
        f.fit(&series, None, &quiet()).unwrap();
        let keys: Vec<&String> = f.in_sample_residuals().keys().collect();
        assert_eq!(keys, vec![UNKNOWN_LEVEL]);
    }

    #[test]
    fn interval_uses_level_residuals() {
        let series = vec![arange("1", 10), arange("2", 10)];
        let mut f = linear(3);
        f.fit(&series, None, &quiet()).unwrap();
        f.in_sample_residuals_mut().insert("1".to_string(), vec![10.0; 5]);
        f.in_sample_residuals_mut().insert("2".to_string(), vec![20.0; 5]);

        let options = PredictOptions::new();
        let pred = f
            .predict_interval(2, &options, [5.0, 95.0], &BootstrapConfig::default())
            .unwrap();
        let one = pred.get("1").unwrap();
        assert_relative_eq!(one.point()[0], 10.0, epsilon = 1e-6);
        assert_relative_eq!(one.point()[1], 11.0, epsilon = 1e-6);
        assert_relative_eq!(one.lower().unwrap()[0], 20.0, epsilon = 1e-6);
        assert_relative_eq!(one.upper().unwrap()[1], 24.333333333, epsilon = 1e-6);
        let two = pred.get("2").unwrap();
        assert_relative_eq!(two.lower().unwrap()[0], 30.0, epsilon = 1e-6);
        assert_relative_eq!(two.upper().unwrap()[1], 37.666666667, epsilon = 1e-6);
    }

    #[test]
    fn levels_without_stored_window_are_excluded() {
        let series = vec![arange("1", 20), arange("2", 20)];
        let mut f = linear(3);
        let options = quiet().with_store_last_window(StoreLastWindow::Levels(vec!["1".to_string()]));
        f.fit(&series, None, &options).unwrap();

        let levels = vec!["1".to_string(), "2".to_string()];
        let pred = f
            .predict(1, &PredictOptions::new().with_levels(&levels).with_suppress_warnings(true))
            .unwrap();
        assert_eq!(pred.levels(), vec!["1"]);

        let only_two = vec!["2".to_string()];
        let err = f
            .predict(1, &PredictOptions::new().with_levels(&only_two))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid parameter: No series to predict. None of the series {'2'} are present in \
             `last_window` attribute. Provide `last_window` as argument in predict method."
        );
    }

    #[test]
    fn series_ending_earlier_are_excluded() {
        let start = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let long = TimeSeries::new(
            "1",
            SeriesIndex::date_range(start, Duration::days(1), 50).unwrap(),
            (0..50).map(|v| v as f64).collect(),
        )
        .unwrap();
        let short = TimeSeries::new(
            "2",
            SeriesIndex::date_range(start, Duration::days(1), 30).unwrap(),
            (0..30).map(|v| v as f64).collect(),
        )
        .unwrap();
        let mut f = linear(3);
        f.fit(&[long, short], None, &quiet()).unwrap();
        let pred = f
            .predict(2, &PredictOptions::new().with_suppress_warnings(true))
            .unwrap();
        assert_eq!(pred.levels(), vec!["1"]);
        let expected = Utc.with_ymd_and_hms(2020, 2, 20, 0, 0, 0).unwrap();
        assert_eq!(
            pred.get("1").unwrap().index().first_label(),
            Some(IndexLabel::Timestamp(expected))
        );
    }

    #[test]
    fn unknown_level_uses_pooled_residuals() {
        let series = vec![arange("1", 30), arange("2", 30)];
        let mut f = ForecasterAutoregMultiSeries::new(
            DecisionTreeRegressor::new(),
            Lags::new(3).unwrap(),
        );
        f.fit(&series, None, &quiet()).unwrap();
        let mut windows: Vec<TimeSeries> = f.last_window().values().cloned().collect();
        windows.push(windows[0].clone().with_name("3"));
        let levels = vec!["1".to_string(), "3".to_string()];
        let options = PredictOptions::new()
            .with_levels(&levels)
            .with_last_window(&windows)
            .with_suppress_warnings(true);
        let boot = f
            .predict_bootstrapping(1, &options, &BootstrapConfig::new(4))
            .unwrap();
        assert_eq!(boot.levels(), vec!["1", "3"]);
        assert_eq!(boot.get("3").unwrap().n_boot(), 4);
    }

    #[test]
    fn out_sample_residual_checks() {
        let series = vec![arange("1", 20), arange("2", 20)];
        let mut f = ForecasterAutoregMultiSeries::new(LinearRegression::new(), Lags::new(3).unwrap());
        f.fit(&series, None, &quiet()).unwrap();
        let config = BootstrapConfig::new(4).with_in_sample_residuals(false);
        let options = PredictOptions::new().with_suppress_warnings(true);

        let err = f.predict_bootstrapping(3, &options, &config).unwrap_err();
        assert!(err
            .to_string()
            .contains("`forecaster.out_sample_residuals` is `None`. Use `in_sample_residuals=True` or the  `set_out_sample_residuals()`"));

        let mut residuals = BTreeMap::new();
        residuals.insert("1".to_string(), vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        f.set_out_sample_residuals(&residuals, false, true).unwrap();
        let err = f.predict_bootstrapping(3, &options, &config).unwrap_err();
        assert!(err.to_string().contains(
            "Not available residuals for level '2'. Check `forecaster.out_sample_residuals`."
        ));

        residuals.insert("2".to_string(), vec![1.0, 2.0, 3.0, 4.0, f64::NAN]);
        f.set_out_sample_residuals(&residuals, false, true).unwrap();
        let err = f.predict_bootstrapping(3, &options, &config).unwrap_err();
        assert!(err.to_string().contains(
            "forecaster residuals for level '2' contains `None` or `NaNs` values."
        ));
    }

    #[test]
    fn encoding_none_pools_out_sample_residuals() {
        let series = vec![arange("1", 20), arange("2", 20)];
        let mut f = linear(3).with_encoding(Encoding::None);
        f.fit(&series, None, &quiet()).unwrap();
        let mut residuals = BTreeMap::new();
        residuals.insert("1".to_string(), vec![1.0, 2.0]);
        residuals.insert("2".to_string(), vec![3.0]);
        f.set_out_sample_residuals(&residuals, false, true).unwrap();
        let store = f.out_sample_residuals().unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&UNKNOWN_LEVEL.to_string()).unwrap(), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn shared_exog_is_aligned_by_position() {
        let series = vec![arange("1", 12), arange("2", 12)];
        let exog = MultiSeriesExog::Shared(Exog::from_column(
            "x",
            (0..12).map(|v| (v % 3) as f64).collect(),
        ));
        let mut f = linear(2);
        f.fit(&series, Some(&exog), &quiet()).unwrap();
        assert_eq!(f.exog_names(), Some(&["x".to_string()][..]));
        assert!(f
            .predict(2, &PredictOptions::new().with_suppress_warnings(true))
            .is_err());
        let future = MultiSeriesExog::Shared(Exog::from_column("x", vec![0.0, 1.0]));
        let pred = f
            .predict(
                2,
                &PredictOptions::new()
                    .with_exog(&future)
                    .with_suppress_warnings(true),
            )
            .unwrap();
        assert_eq!(pred.len(), 2);
        assert_relative_eq!(pred.get("1").unwrap().point()[0], 12.0, epsilon = 1e-6);
    }

    fn per_series_scalers() -> BTreeMap<String, Scaler> {
        let mut scalers = BTreeMap::new();
        scalers.insert("a".to_string(), Scaler::standard());
        scalers.insert("b".to_string(), Scaler::min_max());
        scalers.insert(UNKNOWN_LEVEL.to_string(), Scaler::standard());
        scalers
    }

    #[test]
    fn per_series_transformers_require_unknown_level() {
        let mut scalers = per_series_scalers();
        scalers.remove(UNKNOWN_LEVEL);
        let err = ForecasterAutoregMultiSeries::new(LinearRegression::new(), Lags::new(2).unwrap())
            .with_transformer_series_per_series(scalers)
            .unwrap_err();
        assert!(err.to_string().contains("Add the key '_unknown_level'"));
    }

    #[test]
    fn per_series_transformers_are_fitted_per_series() {
        let mut f = ForecasterAutoregMultiSeries::new(LinearRegression::new(), Lags::new(2).unwrap())
            .with_transformer_series_per_series(per_series_scalers())
            .unwrap();
        let series = vec![arange("a", 30), arange("b", 30), arange("c", 30)];
        f.fit(&series, None, &quiet()).unwrap();

        let transformers = f.transformers();
        assert_eq!(transformers.get("a").map(Scaler::name), Some("StandardScaler"));
        assert_eq!(transformers.get("b").map(Scaler::name), Some("MinMaxScaler"));
        assert!(transformers.get("c").is_none());
        assert!(transformers[UNKNOWN_LEVEL].is_fitted());
        assert_eq!(f.scaler_for("c"), None);
        assert_eq!(f.scaler_for("new"), transformers.get(UNKNOWN_LEVEL));

        let train = f.create_train_x_y(&series, None, true).unwrap();
        let first_c = train.row_levels.iter().position(|l| l == "c").unwrap();
        assert_eq!(train.y[first_c], 2.0);
    }

    #[test]
    fn intervals_with_per_series_transformers() {
        let mut f = ForecasterAutoregMultiSeries::new(LinearRegression::new(), Lags::new(2).unwrap())
            .with_transformer_series_per_series(per_series_scalers())
            .unwrap();
        f.fit(&[arange("a", 30), arange("b", 30)], None, &quiet())
            .unwrap();
        // Residuals live on the transformed scale: 0.1 of the 0..29 range.
        f.in_sample_residuals_mut().insert("b".to_string(), vec![0.1; 5]);

        let pred = f
            .predict_interval(1, &PredictOptions::new(), [5.0, 95.0], &BootstrapConfig::new(10))
            .unwrap();
        let a = pred.get("a").unwrap();
        assert_relative_eq!(a.point()[0], 30.0, epsilon = 1e-6);
        let b = pred.get("b").unwrap();
        assert_relative_eq!(b.point()[0], 30.0, epsilon = 1e-6);
        assert_relative_eq!(b.lower().unwrap()[0], 32.9, epsilon = 1e-6);
        assert_relative_eq!(b.upper().unwrap()[0], 32.9, epsilon = 1e-6);
    }
}
