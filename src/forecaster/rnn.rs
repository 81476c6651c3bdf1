//! Forecaster backed by a recurrent neural network.
//!
//! The network reads a window of `lags` rows over all training series and
//! outputs every step of every level at once, so predictions are direct:
//! nothing is fed back.

use super::predictors::Lags;
use super::residuals::{sample_residual_matrix, BootstrapConfig, ResidualStore};
use super::{
    check_extendable_index, MultiSeriesExog, MultiSeriesFitOptions, MultiSeriesForecaster,
    PredictOptions,
};
use crate::core::{
    BootstrapPredictions, Forecast, IndexLabel, MultiSeriesBootstrap, MultiSeriesForecast,
    SeriesIndex, TimeSeries,
};
use crate::error::{ForecastError, Result};
use crate::nn::{RecurrentModel, TrainingHistory};
use crate::preprocessing::Scaler;
use crate::regressor::ParamSet;
use crate::warnings::{format_set, ForecastWarning};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeMap;

/// Training windows and targets of a [`ForecasterRnn`].
#[derive(Debug, Clone, PartialEq)]
pub struct RnnTrainingData {
    /// `x[sample][lag][series]`, oldest lag first.
    pub x: Vec<Vec<Vec<f64>>>,
    /// `y[sample][step][level]`.
    pub y: Vec<Vec<Vec<f64>>>,
    /// Index label of the first predicted step of each sample.
    pub index: Vec<IndexLabel>,
}

/// Multi-series, multi-step forecaster over a [`RecurrentModel`].
#[derive(Debug, Clone)]
pub struct ForecasterRnn {
    initial_model: RecurrentModel,
    model: RecurrentModel,
    levels: Vec<String>,
    lags: Lags,
    max_step: usize,
    transformer_series: Option<Scaler>,
    series_names: Vec<String>,
    transformers: BTreeMap<String, Scaler>,
    last_window: Option<Vec<TimeSeries>>,
    training_range: Option<(IndexLabel, IndexLabel)>,
    history: Option<TrainingHistory>,
    in_sample_residuals: ResidualStore<String>,
    out_sample_residuals: Option<ResidualStore<String>>,
    fitted: bool,
}

impl ForecasterRnn {
    /// `model` must read `lags.len()` rows and output one column per level.
    pub fn new(model: RecurrentModel, levels: Vec<String>, lags: Lags) -> Result<Self> {
        if levels.is_empty() {
            return Err(ForecastError::InvalidParameter(
                "`levels` must contain at least one series name.".to_string(),
            ));
        }
        let (model_lags, _) = model.input_shape();
        let (steps, model_levels) = model.output_shape();
        if model_lags != lags.len() {
            return Err(ForecastError::InvalidParameter(format!(
                "Number of lags ({}) does not match the input shape of the model ({}).",
                lags.len(),
                model_lags
            )));
        }
        if model_levels != levels.len() {
            return Err(ForecastError::InvalidParameter(format!(
                "Number of levels ({}) does not match the output shape of the model ({}).",
                levels.len(),
                model_levels
            )));
        }
        Ok(Self {
            initial_model: model.clone(),
            model,
            levels,
            lags,
            max_step: steps,
            transformer_series: Some(Scaler::min_max()),
            series_names: Vec::new(),
            transformers: BTreeMap::new(),
            last_window: None,
            training_range: None,
            history: None,
            in_sample_residuals: ResidualStore::new(),
            out_sample_residuals: None,
            fitted: false,
        })
    }

    pub fn with_transformer_series(mut self, transformer: Option<Scaler>) -> Self {
        self.transformer_series = transformer;
        self
    }

    pub fn levels(&self) -> &[String] {
        &self.levels
    }

    pub fn lags(&self) -> &Lags {
        &self.lags
    }

    /// Largest step the model predicts.
    pub fn max_step(&self) -> usize {
        self.max_step
    }

    pub fn model(&self) -> &RecurrentModel {
        &self.model
    }

    /// Loss per epoch of the last `fit`.
    pub fn history(&self) -> Option<&TrainingHistory> {
        self.history.as_ref()
    }

    pub fn last_window(&self) -> Option<&[TimeSeries]> {
        self.last_window.as_deref()
    }

    pub fn training_range(&self) -> Option<(IndexLabel, IndexLabel)> {
        self.training_range
    }

    pub fn transformers(&self) -> &BTreeMap<String, Scaler> {
        &self.transformers
    }

    pub fn in_sample_residuals(&self) -> &ResidualStore<String> {
        &self.in_sample_residuals
    }

    pub fn out_sample_residuals(&self) -> Option<&ResidualStore<String>> {
        self.out_sample_residuals.as_ref()
    }

    fn transform(&self, name: &str, values: &[f64]) -> Result<Vec<f64>> {
        match self.transformers.get(name) {
            Some(scaler) => scaler.transform(values),
            None => Ok(values.to_vec()),
        }
    }

    fn inverse_transform(&self, name: &str, values: &[f64]) -> Result<Vec<f64>> {
        match self.transformers.get(name) {
            Some(scaler) => scaler.inverse_transform(values),
            None => Ok(values.to_vec()),
        }
    }

    /// Input window of the model from the transformed last values of every
    /// series.
    fn window_rows(&self, columns: &[Vec<f64>]) -> Vec<Vec<f64>> {
        self.lags
            .as_slice()
            .iter()
            .rev()
            .map(|&lag| columns.iter().map(|c| c[c.len() - lag]).collect())
            .collect()
    }

    /// Windows and targets of all samples. Fits the per-series transformers.
    pub fn create_train_x_y(&mut self, series: &[TimeSeries]) -> Result<RnnTrainingData> {
        let first = series.first().ok_or(ForecastError::EmptyData)?;
        for s in series {
            if s.index() != first.index() {
                return Err(ForecastError::InvalidParameter(
                    "All series must share the same index.".to_string(),
                ));
            }
            if s.has_missing_values() {
                return Err(ForecastError::MissingValues(format!(
                    "Series '{}' has missing values.",
                    s.name()
                )));
            }
        }
        check_extendable_index(first)?;
        let names: Vec<String> = series.iter().map(|s| s.name().to_string()).collect();
        let missing: Vec<String> = self
            .levels
            .iter()
            .filter(|l| !names.contains(l))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(ForecastError::InvalidParameter(format!(
                "Levels {} are not present in `series`.",
                format_set(&missing)
            )));
        }

        let window_size = self.lags.max_lag();
        let n = first.len();
        if n < window_size + self.max_step {
            return Err(ForecastError::InsufficientData {
                needed: window_size + self.max_step,
                got: n,
            });
        }

        self.transformers.clear();
        if let Some(template) = &self.transformer_series {
            for s in series {
                let mut scaler = template.unfitted();
                scaler.fit(s.values())?;
                self.transformers.insert(s.name().to_string(), scaler);
            }
        }
        let columns = series
            .iter()
            .map(|s| self.transform(s.name(), s.values()))
            .collect::<Result<Vec<_>>>()?;
        let level_columns: Vec<&Vec<f64>> = self
            .levels
            .iter()
            .filter_map(|l| names.iter().position(|n| n == l).map(|p| &columns[p]))
            .collect();

        let labels = first.index().labels();
        let mut data = RnnTrainingData {
            x: Vec::new(),
            y: Vec::new(),
            index: Vec::new(),
        };
        for t in window_size..=n - self.max_step {
            let past: Vec<Vec<f64>> = columns.iter().map(|c| c[..t].to_vec()).collect();
            data.x.push(self.window_rows(&past));
            data.y.push(
                (0..self.max_step)
                    .map(|step| level_columns.iter().map(|c| c[t + step]).collect())
                    .collect(),
            );
            data.index.push(labels[t]);
        }
        self.series_names = names;
        Ok(data)
    }

    /// Validated, sorted steps.
    fn check_steps(&self, steps: &[usize]) -> Result<Vec<usize>> {
        if steps.is_empty() || steps.iter().any(|&s| s == 0 || s > self.max_step) {
            return Err(ForecastError::InvalidParameter(format!(
                "The maximum step that can be predicted is {}. Got {:?}.",
                self.max_step, steps
            )));
        }
        let mut steps = steps.to_vec();
        steps.sort_unstable();
        steps.dedup();
        Ok(steps)
    }

    /// Sorted steps, levels to predict with their positions in the model
    /// output, the future index and the model input window.
    #[allow(clippy::type_complexity)]
    fn prepare_inputs(
        &self,
        steps: &[usize],
        options: &PredictOptions<'_>,
    ) -> Result<(Vec<usize>, Vec<(String, usize)>, SeriesIndex, Vec<Vec<f64>>)> {
        if !self.fitted {
            return Err(ForecastError::forecaster_not_fitted());
        }
        let steps = self.check_steps(steps)?;
        if options.exog.is_some() {
            ForecastWarning::IgnoredArgument(
                "`exog` is ignored since ForecasterRnn does not use exogenous variables."
                    .to_string(),
            )
            .emit(options.suppress_warnings);
        }

        let levels: Vec<String> = options
            .levels
            .map(|l| l.to_vec())
            .unwrap_or_else(|| self.levels.clone());
        let mut selected = Vec::with_capacity(levels.len());
        for level in levels {
            match self.levels.iter().position(|l| *l == level) {
                Some(p) => selected.push((level, p)),
                None => {
                    return Err(ForecastError::InvalidParameter(format!(
                        "`levels` must be in the levels of the model: {:?}. Got '{}'.",
                        self.levels, level
                    )))
                }
            }
        }

        let windows: &[TimeSeries] = match (options.last_window, &self.last_window) {
            (Some(provided), _) => provided,
            (None, Some(stored)) => stored,
            (None, None) => {
                return Err(ForecastError::InvalidParameter(
                    "`last_window` was not stored during training. Provide `last_window` as \
                     argument in predict method."
                        .to_string(),
                ))
            }
        };
        let window_size = self.lags.max_lag();
        let mut columns = Vec::with_capacity(self.series_names.len());
        let mut future = None;
        for name in &self.series_names {
            let window = windows.iter().find(|w| w.name() == name).ok_or_else(|| {
                ForecastError::InvalidParameter(format!(
                    "`last_window` must contain all the series used in training. Missing '{}'.",
                    name
                ))
            })?;
            if window.len() < window_size {
                return Err(ForecastError::InvalidParameter(format!(
                    "`last_window` must have as many values as needed to generate the \
                     predictors. For this forecaster it is {}.",
                    window_size
                )));
            }
            if window.has_missing_values() {
                return Err(ForecastError::MissingValues(format!(
                    "`last_window` has missing values for series '{}'.",
                    name
                )));
            }
            if future.is_none() {
                future = Some(window.index().future(self.max_step)?);
            }
            columns.push(self.transform(name, window.values())?);
        }
        let future = future.ok_or(ForecastError::EmptyData)?;
        let positions: Vec<usize> = steps.iter().map(|s| s - 1).collect();
        let index = future.select(&positions)?;
        Ok((steps, selected, index, self.window_rows(&columns)))
    }

    /// Point predictions of the given steps (1-based, any order).
    pub fn predict_steps(
        &self,
        steps: &[usize],
        options: &PredictOptions<'_>,
    ) -> Result<MultiSeriesForecast> {
        let (steps, levels, index, window) = self.prepare_inputs(steps, options)?;
        let output = self.model.predict(&window)?;
        let mut entries = Vec::with_capacity(levels.len());
        for (level, p) in levels {
            let scaled: Vec<f64> = steps.iter().map(|s| output[s - 1][p]).collect();
            let values = self.inverse_transform(&level, &scaled)?;
            entries.push((level, Forecast::new(index.clone(), values)?));
        }
        Ok(MultiSeriesForecast::new(entries))
    }

    /// Bootstrapped predictions of the given steps.
    pub fn predict_bootstrapping_steps(
        &self,
        steps: &[usize],
        options: &PredictOptions<'_>,
        config: &BootstrapConfig,
    ) -> Result<MultiSeriesBootstrap> {
        config.validate()?;
        let (steps, levels, index, window) = self.prepare_inputs(steps, options)?;
        let store = if config.in_sample_residuals {
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
        let attribute = if config.in_sample_residuals {
            "in_sample_residuals"
        } else {
            "out_sample_residuals"
        };

        let output = self.model.predict(&window)?;
        let mut entries = Vec::with_capacity(levels.len());
        for (level, p) in levels {
            let residuals = store.get(&level).ok_or_else(|| {
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
            let mut rng = StdRng::seed_from_u64(config.random_state);
            let sampled = sample_residual_matrix(residuals, steps.len(), config.n_boot, &mut rng)?;

            let mut samples = vec![vec![0.0; config.n_boot]; steps.len()];
            for b in 0..config.n_boot {
                let path: Vec<f64> = steps
                    .iter()
                    .enumerate()
                    .map(|(i, s)| output[s - 1][p] + sampled[i][b])
                    .collect();
                for (i, value) in self.inverse_transform(&level, &path)?.into_iter().enumerate() {
                    samples[i][b] = value;
                }
            }
            entries.push((level, BootstrapPredictions::new(index.clone(), samples)?));
        }
        Ok(MultiSeriesBootstrap::new(entries))
    }
}

impl MultiSeriesForecaster for ForecasterRnn {
    fn name(&self) -> &str {
        "ForecasterRnn"
    }

    fn fit(
        &mut self,
        series: &[TimeSeries],
        exog: Option<&MultiSeriesExog>,
        options: &MultiSeriesFitOptions,
    ) -> Result<()> {
        if exog.is_some() {
            ForecastWarning::IgnoredArgument(
                "`exog` is ignored since ForecasterRnn does not use exogenous variables."
                    .to_string(),
            )
            .emit(options.suppress_warnings);
        }
        self.fitted = false;
        self.last_window = None;
        self.out_sample_residuals = None;
        self.in_sample_residuals = ResidualStore::new();

        let data = self.create_train_x_y(series)?;
        self.model = self.initial_model.clone();
        let history = self.model.fit(&data.x, &data.y)?;

        if options.store_in_sample_residuals {
            let mut residuals: BTreeMap<usize, Vec<f64>> = BTreeMap::new();
            for (x, y) in data.x.iter().zip(&data.y) {
                let pred = self.model.predict(x)?;
                for (true_row, pred_row) in y.iter().zip(&pred) {
                    for (p, (t, f)) in true_row.iter().zip(pred_row).enumerate() {
                        residuals.entry(p).or_default().push(t - f);
                    }
                }
            }
            for (p, level) in self.levels.iter().enumerate() {
                let values = residuals.remove(&p).unwrap_or_default();
                self.in_sample_residuals.insert_in_sample(level.clone(), values);
            }
        } else {
            for level in &self.levels {
                self.in_sample_residuals.insert_empty(level.clone());
            }
        }

        let window_size = self.lags.max_lag();
        if options.store_last_window != super::StoreLastWindow::Nothing {
            self.last_window = Some(series.iter().map(|s| s.tail(window_size)).collect());
        }
        if let Some(first) = series.first() {
            if let (Some(start), Some(end)) = (first.index().first_label(), first.last_label()) {
                self.training_range = Some((start, end));
            }
        }
        tracing::debug!(
            forecaster = "ForecasterRnn",
            n_samples = data.x.len(),
            n_params = self.model.n_params(),
            final_loss = history.final_loss(),
            "fitted recurrent forecaster"
        );
        self.history = Some(history);
        self.fitted = true;
        Ok(())
    }

    fn predict(&self, steps: usize, options: &PredictOptions<'_>) -> Result<MultiSeriesForecast> {
        let steps: Vec<usize> = (1..=steps).collect();
        self.predict_steps(&steps, options)
    }

    fn predict_bootstrapping(
        &self,
        steps: usize,
        options: &PredictOptions<'_>,
        config: &BootstrapConfig,
    ) -> Result<MultiSeriesBootstrap> {
        let steps: Vec<usize> = (1..=steps).collect();
        self.predict_bootstrapping_steps(&steps, options, config)
    }

    /// Only an empty parameter set is accepted: the network is configured
    /// when it is built.
    fn set_params(&mut self, params: &ParamSet) -> Result<()> {
        if let Some((name, _)) = params.iter().next() {
            return Err(ForecastError::InvalidParameter(format!(
                "ForecasterRnn does not accept parameter '{}'. Build a new model instead.",
                name
            )));
        }
        Ok(())
    }

    fn set_lags(&mut self, lags: Lags) -> Result<()> {
        if lags.len() != self.lags.len() {
            return Err(ForecastError::InvalidParameter(format!(
                "Number of lags ({}) does not match the input shape of the model ({}).",
                lags.len(),
                self.lags.len()
            )));
        }
        self.lags = lags;
        self.fitted = false;
        Ok(())
    }

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
        let ignored: Vec<String> = residuals
            .keys()
            .filter(|l| !self.levels.contains(l))
            .cloned()
            .collect();
        if !ignored.is_empty() {
            ForecastWarning::IgnoredArgument(format!(
                "Residuals of levels {} are ignored since they are not predicted by the model.",
                format_set(&ignored)
            ))
            .emit(suppress_warnings);
        }
        let mut store = match (append, self.out_sample_residuals.clone()) {
            (true, Some(store)) => store,
            _ => ResidualStore::new(),
        };
        for (level, values) in residuals {
            if !self.levels.contains(level) {
                continue;
            }
            let values = match self.transformers.get(level) {
                Some(scaler) => scaler.scale_residuals(values)?,
                None => values.clone(),
            };
            if append {
                store.append(level.clone(), &values);
            } else {
                store.insert(level.clone(), values);
            }
        }
        self.out_sample_residuals = Some(store);
        Ok(())
    }

    fn window_size(&self) -> usize {
        self.lags.max_lag()
    }

    fn lags_label(&self) -> String {
        self.lags.to_string()
    }

    fn regressor_params(&self) -> ParamSet {
        let config = self.model.config();
        ParamSet::new()
            .with("learning_rate", config.learning_rate)
            .with("epochs", config.epochs as i64)
            .with("batch_size", config.batch_size as i64)
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
    use crate::nn::{create_and_compile_model, Activation, RnnConfig};

    fn series() -> Vec<TimeSeries> {
        vec![
            TimeSeries::from_values("1", (0..50).map(|v| v as f64).collect()),
            TimeSeries::from_values("2", (0..50).map(|v| (v * 2) as f64).collect()),
            TimeSeries::from_values("3", (0..50).map(|v| (v as f64 * 0.5).sin()).collect()),
        ]
    }

    fn forecaster() -> ForecasterRnn {
        let config = RnnConfig::default()
            .with_recurrent_units(vec![8])
            .with_dense_units(vec![8])
            .with_activation(Activation::Tanh)
            .with_epochs(5);
        let model = create_and_compile_model(3, 3, 4, 2, &config).unwrap();
        ForecasterRnn::new(
            model,
            vec!["1".to_string(), "2".to_string()],
            Lags::new(3).unwrap(),
        )
        .unwrap()
    }

    fn quiet() -> MultiSeriesFitOptions {
        MultiSeriesFitOptions::default().with_suppress_warnings(true)
    }

    #[test]
    fn shapes_must_match_model() {
        let model = create_and_compile_model(3, 3, 4, 2, &RnnConfig::default()).unwrap();
        assert!(ForecasterRnn::new(model.clone(), vec!["1".to_string()], Lags::new(3).unwrap()).is_err());
        assert!(ForecasterRnn::new(
            model,
            vec!["1".to_string(), "2".to_string()],
            Lags::new(5).unwrap()
        )
        .is_err());
    }

    #[test]
    fn training_windows() {
        let mut f = forecaster();
        let data = f.create_train_x_y(&series()).unwrap();
        // Samples t = 3..=46.
        assert_eq!(data.x.len(), 44);
        assert_eq!(data.x[0].len(), 3);
        assert_eq!(data.x[0][0].len(), 3);
        assert_eq!(data.y[0].len(), 4);
        assert_eq!(data.y[0][0].len(), 2);
        assert_eq!(data.index[0], IndexLabel::Position(3));
        // Min-max scaled arange(50): value v maps to v / 49.
        assert!((data.x[0][2][0] - 2.0 / 49.0).abs() < 1e-12);
        assert!((data.y[0][0][1] - 3.0 / 49.0).abs() < 1e-12);
    }

    #[test]
    fn fit_and_predict_subsets() {
        let mut f = forecaster();
        f.fit(&series(), None, &quiet()).unwrap();
        assert_eq!(f.history().unwrap().loss.len(), 5);
        let keys: Vec<&String> = f.in_sample_residuals().keys().collect();
        assert_eq!(keys, vec!["1", "2"]);

        let pred = f.predict(4, &PredictOptions::new()).unwrap();
        assert_eq!(pred.levels(), vec!["1", "2"]);
        assert_eq!(
            pred.get("1").unwrap().index().first_label(),
            Some(IndexLabel::Position(50))
        );

        let levels = vec!["2".to_string()];
        let pred = f
            .predict_steps(&[4, 2], &PredictOptions::new().with_levels(&levels))
            .unwrap();
        assert_eq!(pred.levels(), vec!["2"]);
        let index = pred.get("2").unwrap().index();
        assert_eq!(index.labels(), vec![IndexLabel::Position(51), IndexLabel::Position(53)]);

        assert!(f.predict(5, &PredictOptions::new()).is_err());
    }

    #[test]
    fn refit_is_deterministic() {
        let mut a = forecaster();
        a.fit(&series(), None, &quiet()).unwrap();
        let first = a.predict(2, &PredictOptions::new()).unwrap();
        a.fit(&series(), None, &quiet()).unwrap();
        assert_eq!(a.predict(2, &PredictOptions::new()).unwrap(), first);
    }

    #[test]
    fn interval_contains_point_prediction_spread() {
        let mut f = forecaster();
        f.fit(&series(), None, &quiet()).unwrap();
        let pred = f
            .predict_interval(
                3,
                &PredictOptions::new(),
                [5.0, 95.0],
                &BootstrapConfig::new(50),
            )
            .unwrap();
        let one = pred.get("1").unwrap();
        for i in 0..3 {
            assert!(one.lower().unwrap()[i] <= one.upper().unwrap()[i]);
        }
    }

    #[test]
    fn out_sample_residuals_required() {
        let mut f = forecaster();
        f.fit(&series(), None, &quiet()).unwrap();
        let config = BootstrapConfig::new(5).with_in_sample_residuals(false);
        assert!(f.predict_bootstrapping(2, &PredictOptions::new(), &config).is_err());

        let mut residuals = BTreeMap::new();
        residuals.insert("1".to_string(), vec![0.5, -0.5]);
        residuals.insert("2".to_string(), vec![1.0, -1.0]);
        f.set_out_sample_residuals(&residuals, false, true).unwrap();
        let boot = f.predict_bootstrapping(2, &PredictOptions::new(), &config).unwrap();
        assert_eq!(boot.get("2").unwrap().n_boot(), 5);
    }
}
