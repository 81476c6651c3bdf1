//! Direct multi-step forecaster: one regressor per forecast horizon.

use super::predictors::Lags;
use super::residuals::{sample_residual_matrix, BootstrapConfig, ResidualStore};
use super::{
    check_train_exog, check_y, prepare_predict_exog, resolve_last_window, FitOptions, Forecaster,
};
use crate::core::{
    BootstrapPredictions, Exog, Forecast, IndexFreq, IndexLabel, Matrix, SeriesIndex, TimeSeries,
};
use crate::error::{ForecastError, Result};
use crate::preprocessing::Scaler;
use crate::regressor::{ParamSet, Regressor};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeMap;

/// Training data of a direct forecaster.
///
/// All horizons share the lag matrix; targets and exogenous rows differ per step.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectTrainingMatrix {
    pub lags: Matrix,
    /// Exogenous rows aligned with the target of each step.
    pub exog: Option<Vec<Matrix>>,
    /// Target of each step, `targets[step - 1]`.
    pub targets: Vec<Vec<f64>>,
    pub feature_names: Vec<String>,
}

impl DirectTrainingMatrix {
    /// Predictors and target used by the regressor of `step` (1-based).
    pub fn for_step(&self, step: usize) -> Result<(Matrix, &[f64])> {
        let target = step
            .checked_sub(1)
            .and_then(|i| self.targets.get(i))
            .ok_or_else(|| {
                ForecastError::InvalidParameter(format!(
                    "Invalid value `step`. For this forecaster, minimum value is 1 and the \
                     maximum step is {}.",
                    self.targets.len()
                ))
            })?;
        let x = match &self.exog {
            Some(exog) => Matrix::hstack(&[&self.lags, &exog[step - 1]])?,
            None => self.lags.clone(),
        };
        Ok((x, target))
    }
}

/// Forecaster that trains a separate regressor for every step of the horizon.
#[derive(Debug, Clone)]
pub struct ForecasterAutoregDirect<R: Regressor> {
    regressor: R,
    regressors: BTreeMap<usize, R>,
    lags: Lags,
    steps: usize,
    transformer_y: Option<Scaler>,
    last_window: Option<TimeSeries>,
    index_freq: Option<IndexFreq>,
    training_range: Option<(IndexLabel, IndexLabel)>,
    exog_names: Option<Vec<String>>,
    in_sample_residuals: ResidualStore<usize>,
    out_sample_residuals: Option<ResidualStore<usize>>,
    fitted: bool,
}

impl<R: Regressor> ForecasterAutoregDirect<R> {
    /// `regressor` is cloned once per step at fit time.
    pub fn new(regressor: R, lags: Lags, steps: usize) -> Result<Self> {
        if steps < 1 {
            return Err(ForecastError::InvalidParameter(format!(
                "`steps` argument must be an int greater than or equal to 1. Got {}.",
                steps
            )));
        }
        Ok(Self {
            regressor,
            regressors: BTreeMap::new(),
            lags,
            steps,
            transformer_y: None,
            last_window: None,
            index_freq: None,
            training_range: None,
            exog_names: None,
            in_sample_residuals: ResidualStore::new(),
            out_sample_residuals: None,
            fitted: false,
        })
    }

    pub fn with_transformer_y(mut self, transformer: Scaler) -> Self {
        self.transformer_y = Some(transformer);
        self
    }

    /// Maximum number of steps the forecaster can predict.
    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn lags(&self) -> &Lags {
        &self.lags
    }

    /// Fitted regressor of a step.
    pub fn regressor_for_step(&self, step: usize) -> Option<&R> {
        self.regressors.get(&step)
    }

    pub fn last_window(&self) -> Option<&TimeSeries> {
        self.last_window.as_ref()
    }

    pub fn index_freq(&self) -> Option<IndexFreq> {
        self.index_freq
    }

    pub fn training_range(&self) -> Option<(IndexLabel, IndexLabel)> {
        self.training_range
    }

    pub fn exog_names(&self) -> Option<&[String]> {
        self.exog_names.as_deref()
    }

    /// Training residuals by step; a step maps to `None` when they were not stored.
    pub fn in_sample_residuals(&self) -> &ResidualStore<usize> {
        &self.in_sample_residuals
    }

    pub fn out_sample_residuals(&self) -> Option<&ResidualStore<usize>> {
        self.out_sample_residuals.as_ref()
    }

    fn reset(&mut self) {
        self.regressors.clear();
        self.last_window = None;
        self.index_freq = None;
        self.training_range = None;
        self.exog_names = None;
        self.in_sample_residuals = ResidualStore::new();
        self.fitted = false;
    }

    /// Build the shared lag matrix and the per-step targets and exogenous rows.
    pub fn create_train_x_y(
        &mut self,
        y: &TimeSeries,
        exog: Option<&Exog>,
    ) -> Result<DirectTrainingMatrix> {
        check_y(y)?;
        let max_lag = self.lags.max_lag();
        if y.len() < max_lag + self.steps {
            return Err(ForecastError::InsufficientData {
                needed: max_lag + self.steps,
                got: y.len(),
            });
        }
        if let Some(exog) = exog {
            check_train_exog(y, exog)?;
        }

        let mut values = y.values().to_vec();
        if let Some(transformer) = self.transformer_y.as_mut() {
            values = transformer.fit_transform(&values)?;
        }

        let n_rows = values.len() - max_lag - self.steps + 1;
        let mut lags = Matrix::with_columns(self.lags.len());
        for i in 0..n_rows {
            lags.push_row(&self.lags.values(&values[i..i + max_lag]))?;
        }
        let targets = (1..=self.steps)
            .map(|k| {
                let offset = max_lag + k - 1;
                values[offset..offset + n_rows].to_vec()
            })
            .collect();
        let exog_rows = match exog {
            Some(exog) => {
                let mut per_step = Vec::with_capacity(self.steps);
                for k in 1..=self.steps {
                    let offset = max_lag + k - 1;
                    let mut block = Matrix::with_columns(exog.n_columns());
                    for t in offset..offset + n_rows {
                        block.push_row(&exog.row(t))?;
                    }
                    per_step.push(block);
                }
                Some(per_step)
            }
            None => None,
        };

        let mut feature_names = self.lags.names();
        if let Some(exog) = exog {
            feature_names.extend(exog.column_names().iter().cloned());
        }
        Ok(DirectTrainingMatrix {
            lags,
            exog: exog_rows,
            targets,
            feature_names,
        })
    }

    /// Validated, sorted horizons of an explicit step list.
    fn check_steps(&self, steps: &[usize]) -> Result<Vec<usize>> {
        if steps.is_empty() {
            return Err(ForecastError::InvalidParameter(
                "`steps` must contain at least one value.".to_string(),
            ));
        }
        if let Some(bad) = steps.iter().find(|&&s| s < 1 || s > self.steps) {
            return Err(ForecastError::InvalidParameter(format!(
                "The maximum value of `steps` must be less than or equal to the value of steps \
                 defined when initializing the forecaster. Got {}, but the maximum is {}.",
                bad, self.steps
            )));
        }
        let mut steps = steps.to_vec();
        steps.sort_unstable();
        steps.dedup();
        Ok(steps)
    }

    /// Point predictions on the transformed scale for the given horizons.
    fn predict_transformed(
        &self,
        steps: &[usize],
        last_window: Option<&TimeSeries>,
        exog: Option<&Exog>,
    ) -> Result<(SeriesIndex, Vec<f64>)> {
        if !self.fitted {
            return Err(ForecastError::forecaster_not_fitted());
        }
        let steps = self.check_steps(steps)?;
        let max_step = steps.last().copied().unwrap_or(1);
        let window = resolve_last_window(last_window, self.last_window.as_ref(), self.window_size())?;
        let future = window.index().future(max_step)?;
        let exog = prepare_predict_exog(exog, self.exog_names.as_deref(), max_step, &future)?;

        let mut values = window.values().to_vec();
        if let Some(transformer) = &self.transformer_y {
            values = transformer.transform(&values)?;
        }
        let lag_row = self.lags.values(&values);

        let mut predictions = Vec::with_capacity(steps.len());
        for &step in &steps {
            let regressor = self
                .regressors
                .get(&step)
                .ok_or_else(ForecastError::forecaster_not_fitted)?;
            let mut row = lag_row.clone();
            if let Some(exog) = &exog {
                row.extend(exog.row(step - 1));
            }
            let x = Matrix::from_rows(&[row])?;
            predictions.push(regressor.predict(&x)?[0]);
        }
        let positions: Vec<usize> = steps.iter().map(|s| s - 1).collect();
        Ok((future.select(&positions)?, predictions))
    }

    fn inverse(&self, values: Vec<f64>) -> Result<Vec<f64>> {
        match &self.transformer_y {
            Some(transformer) => transformer.inverse_transform(&values),
            None => Ok(values),
        }
    }

    /// Predict an explicit list of horizons, e.g. `[1, 3]`.
    pub fn predict_steps(
        &self,
        steps: &[usize],
        last_window: Option<&TimeSeries>,
        exog: Option<&Exog>,
    ) -> Result<Forecast> {
        let (index, predictions) = self.predict_transformed(steps, last_window, exog)?;
        Forecast::new(index, self.inverse(predictions)?)
    }

    /// Bootstrapped predictions of an explicit list of horizons.
    ///
    /// Each horizon draws from its own residuals; there is no recursion.
    pub fn predict_bootstrapping_steps(
        &self,
        steps: &[usize],
        last_window: Option<&TimeSeries>,
        exog: Option<&Exog>,
        config: &BootstrapConfig,
    ) -> Result<BootstrapPredictions> {
        config.validate()?;
        let (index, predictions) = self.predict_transformed(steps, last_window, exog)?;
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

        let steps = self.check_steps(steps)?;
        let mut rng = StdRng::seed_from_u64(config.random_state);
        let mut samples = Vec::with_capacity(steps.len());
        for (&step, &prediction) in steps.iter().zip(&predictions) {
            let residuals = store.get(&step).ok_or_else(|| {
                let attribute = if config.in_sample_residuals {
                    "in_sample_residuals"
                } else {
                    "out_sample_residuals"
                };
                ForecastError::InvalidParameter(format!(
                    "`forecaster.{}` for step {} is `None`. Check the residuals stored by the \
                     forecaster.",
                    attribute, step
                ))
            })?;
            let sampled = sample_residual_matrix(residuals, 1, config.n_boot, &mut rng)?;
            let paths: Vec<f64> = sampled[0].iter().map(|r| prediction + r).collect();
            samples.push(self.inverse(paths)?);
        }
        BootstrapPredictions::new(index, samples)
    }
}

impl<R: Regressor> Forecaster for ForecasterAutoregDirect<R> {
    /// Residuals keyed by step, on the original scale.
    type OutSampleResiduals = BTreeMap<usize, Vec<f64>>;

    fn name(&self) -> &str {
        "ForecasterAutoregDirect"
    }

    fn fit(&mut self, y: &TimeSeries, exog: Option<&Exog>, options: FitOptions) -> Result<()> {
        self.reset();
        let train = self.create_train_x_y(y, exog)?;
        for step in 1..=self.steps {
            let (x, target) = train.for_step(step)?;
            let mut regressor = self.regressor.clone();
            regressor.fit(&x, target)?;
            if options.store_in_sample_residuals {
                let fitted = regressor.predict(&x)?;
                let residuals = target.iter().zip(&fitted).map(|(y, p)| y - p).collect();
                self.in_sample_residuals.insert_in_sample(step, residuals);
            } else {
                self.in_sample_residuals.insert_empty(step);
            }
            self.regressors.insert(step, regressor);
        }
        if options.store_last_window {
            self.last_window = Some(y.tail(self.window_size()));
        }
        self.index_freq = Some(y.index().freq());
        self.training_range = y.index().first_label().zip(y.index().last_label());
        self.exog_names = exog.map(|e| e.column_names().to_vec());
        self.fitted = true;

        tracing::debug!(
            forecaster = self.name(),
            regressor = self.regressor.name(),
            steps = self.steps,
            n_rows = train.lags.n_rows(),
            "fitted direct forecaster"
        );
        Ok(())
    }

    fn predict(
        &self,
        steps: usize,
        last_window: Option<&TimeSeries>,
        exog: Option<&Exog>,
    ) -> Result<Forecast> {
        if steps > self.steps {
            return Err(ForecastError::InvalidParameter(format!(
                "The maximum value of `steps` must be less than or equal to the value of steps \
                 defined when initializing the forecaster. Got {}, but the maximum is {}.",
                steps, self.steps
            )));
        }
        let horizons: Vec<usize> = (1..=steps).collect();
        self.predict_steps(&horizons, last_window, exog)
    }

    fn predict_bootstrapping(
        &self,
        steps: usize,
        last_window: Option<&TimeSeries>,
        exog: Option<&Exog>,
        config: &BootstrapConfig,
    ) -> Result<BootstrapPredictions> {
        let horizons: Vec<usize> = (1..=steps).collect();
        self.predict_bootstrapping_steps(&horizons, last_window, exog, config)
    }

    fn set_params(&mut self, params: &ParamSet) -> Result<()> {
        self.regressor.set_params(params)?;
        self.reset();
        Ok(())
    }

    fn set_lags(&mut self, lags: Lags) -> Result<()> {
        self.lags = lags;
        self.reset();
        Ok(())
    }

    fn set_out_sample_residuals(
        &mut self,
        residuals: BTreeMap<usize, Vec<f64>>,
        append: bool,
    ) -> Result<()> {
        if let Some(bad) = residuals.keys().find(|&&k| k < 1 || k > self.steps) {
            return Err(ForecastError::InvalidParameter(format!(
                "Residuals provided for step {}, but the forecaster predicts steps 1 to {}.",
                bad, self.steps
            )));
        }
        let mut store = match (append, self.out_sample_residuals.clone()) {
            (true, Some(store)) => store,
            _ => ResidualStore::new(),
        };
        for (step, values) in residuals {
            let mut values: Vec<f64> = values.into_iter().filter(|r| !r.is_nan()).collect();
            if let Some(transformer) = &self.transformer_y {
                if !transformer.is_fitted() {
                    return Err(ForecastError::forecaster_not_fitted());
                }
                values = transformer.scale_residuals(&values)?;
            }
            if append {
                store.append(step, &values);
            } else {
                store.insert(step, values);
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
        self.regressor.params()
    }

    fn is_fitted(&self) -> bool {
        self.fitted
    }
}
