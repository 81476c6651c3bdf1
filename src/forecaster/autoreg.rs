//! Recursive multi-step forecaster.
//!
//! A single regressor learns the one-step-ahead relation between the
//! predictors of a window and the next value. Forecasts of several steps are
//! produced by feeding every prediction back as the most recent observation.

use super::predictors::{Lags, Predictors};
use super::residuals::{append_residuals, cap_residuals, sample_residual_matrix, BootstrapConfig};
use super::{
    check_train_exog, check_y, prepare_predict_exog, resolve_last_window, FitOptions, Forecaster,
};
use crate::core::{
    BootstrapPredictions, Exog, Forecast, IndexFreq, IndexLabel, Matrix, SeriesIndex, TimeSeries,
};
use crate::error::{ForecastError, Result};
use crate::preprocessing::{Scaler, TimeSeriesDifferentiator};
use crate::regressor::{ParamSet, Regressor};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Training matrix of a recursive forecaster.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingMatrix {
    /// Predictors, then exogenous columns.
    pub x: Matrix,
    pub y: Vec<f64>,
    pub feature_names: Vec<String>,
    /// Index labels of the rows (the target positions).
    pub index: SeriesIndex,
}

/// Recursive autoregressive forecaster.
///
/// # Example
/// ```
/// use autoreg_forecast::core::TimeSeries;
/// use autoreg_forecast::forecaster::{FitOptions, Forecaster, ForecasterAutoreg, Lags};
/// use autoreg_forecast::regressor::LinearRegression;
///
/// let y = TimeSeries::from_values("y", (0..50).map(|v| v as f64).collect());
/// let mut forecaster = ForecasterAutoreg::new(LinearRegression::new(), Lags::new(3).unwrap());
/// forecaster.fit(&y, None, FitOptions::default()).unwrap();
///
/// let forecast = forecaster.predict(3, None, None).unwrap();
/// assert_eq!(forecast.horizon(), 3);
/// assert!((forecast.point()[0] - 50.0).abs() < 1e-6);
/// ```
#[derive(Debug, Clone)]
pub struct ForecasterAutoreg<R: Regressor> {
    regressor: R,
    predictors: Predictors,
    transformer_y: Option<Scaler>,
    differentiation: Option<usize>,
    last_window: Option<TimeSeries>,
    index_freq: Option<IndexFreq>,
    training_range: Option<(IndexLabel, IndexLabel)>,
    exog_names: Option<Vec<String>>,
    in_sample_residuals: Option<Vec<f64>>,
    out_sample_residuals: Option<Vec<f64>>,
    fitted: bool,
}

impl<R: Regressor> ForecasterAutoreg<R> {
    /// Create a forecaster from a regressor and its predictors (lags or a custom function).
    pub fn new(regressor: R, predictors: impl Into<Predictors>) -> Self {
        Self {
            regressor,
            predictors: predictors.into(),
            transformer_y: None,
            differentiation: None,
            last_window: None,
            index_freq: None,
            training_range: None,
            exog_names: None,
            in_sample_residuals: None,
            out_sample_residuals: None,
            fitted: false,
        }
    }

    /// Scale the series before training; predictions are mapped back.
    pub fn with_transformer_y(mut self, transformer: Scaler) -> Self {
        self.transformer_y = Some(transformer);
        self
    }

    /// Model the differenced series of the given order.
    pub fn with_differentiation(mut self, order: usize) -> Result<Self> {
        TimeSeriesDifferentiator::new(order)?;
        self.differentiation = Some(order);
        Ok(self)
    }

    pub fn regressor(&self) -> &R {
        &self.regressor
    }

    pub fn predictors(&self) -> &Predictors {
        &self.predictors
    }

    pub fn transformer_y(&self) -> Option<&Scaler> {
        self.transformer_y.as_ref()
    }

    pub fn differentiation(&self) -> Option<usize> {
        self.differentiation
    }

    /// Last `window_size` training observations.
    pub fn last_window(&self) -> Option<&TimeSeries> {
        self.last_window.as_ref()
    }

    pub fn index_freq(&self) -> Option<IndexFreq> {
        self.index_freq
    }

    /// First and last index labels of the training series.
    pub fn training_range(&self) -> Option<(IndexLabel, IndexLabel)> {
        self.training_range
    }

    pub fn exog_names(&self) -> Option<&[String]> {
        self.exog_names.as_deref()
    }

    /// Training residuals, on the transformed scale.
    pub fn in_sample_residuals(&self) -> Option<&[f64]> {
        self.in_sample_residuals.as_deref()
    }

    pub fn out_sample_residuals(&self) -> Option<&[f64]> {
        self.out_sample_residuals.as_deref()
    }

    fn reset(&mut self) {
        self.last_window = None;
        self.index_freq = None;
        self.training_range = None;
        self.exog_names = None;
        self.in_sample_residuals = None;
        self.fitted = false;
    }

    /// Transform `y` and build the predictors/target matrix.
    ///
    /// Fits `transformer_y` as a side effect.
    pub fn create_train_x_y(&mut self, y: &TimeSeries, exog: Option<&Exog>) -> Result<TrainingMatrix> {
        check_y(y)?;
        let window_size = self.window_size();
        if y.len() <= window_size {
            return Err(ForecastError::InsufficientData {
                needed: window_size + 1,
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
        if let Some(order) = self.differentiation {
            values = TimeSeriesDifferentiator::new(order)?.fit_transform(&values)?;
        }

        let pws = self.predictors.window_size();
        let n_exog = exog.map(|e| e.n_columns()).unwrap_or(0);
        let mut x = Matrix::with_columns(self.predictors.n_features() + n_exog);
        let mut target = Vec::with_capacity(values.len() - window_size);
        for t in window_size..values.len() {
            let mut row = self.predictors.features(&values[t - pws..t])?;
            if let Some(exog) = exog {
                row.extend(exog.row(t));
            }
            x.push_row(&row)?;
            target.push(values[t]);
        }

        let mut feature_names = self.predictors.names();
        if let Some(exog) = exog {
            feature_names.extend(exog.column_names().iter().cloned());
        }
        Ok(TrainingMatrix {
            x,
            y: target,
            feature_names,
            index: y.index().slice(window_size, y.len())?,
        })
    }

    /// Paths of `steps` predictions, `out[step][path]`, on the original scale.
    ///
    /// Without residuals a single path is produced. With residuals
    /// (`[step][path]`) each path adds its residual to the prediction before
    /// it becomes the next lag.
    fn predict_paths(
        &self,
        steps: usize,
        last_window: Option<&TimeSeries>,
        exog: Option<&Exog>,
        residuals: Option<&[Vec<f64>]>,
    ) -> Result<(SeriesIndex, Vec<Vec<f64>>)> {
        if !self.fitted {
            return Err(ForecastError::forecaster_not_fitted());
        }
        if steps == 0 {
            return Err(ForecastError::InvalidParameter(
                "`steps` must be an integer greater than or equal to 1.".to_string(),
            ));
        }
        let window = resolve_last_window(last_window, self.last_window.as_ref(), self.window_size())?;
        let future = window.index().future(steps)?;
        let exog = prepare_predict_exog(exog, self.exog_names.as_deref(), steps, &future)?;

        let mut values = window.values().to_vec();
        if let Some(transformer) = &self.transformer_y {
            values = transformer.transform(&values)?;
        }
        let differentiator = match self.differentiation {
            Some(order) => {
                let mut diff = TimeSeriesDifferentiator::new(order)?;
                values = diff.fit_transform(&values)?;
                Some(diff)
            }
            None => None,
        };

        let n_paths = residuals.and_then(|r| r.first()).map_or(1, |r| r.len());
        let pws = self.predictors.window_size();
        let mut buffers: Vec<Vec<f64>> = vec![values[values.len() - pws..].to_vec(); n_paths];
        let mut raw = vec![vec![0.0; n_paths]; steps];

        for step in 0..steps {
            let mut x = Matrix::with_columns(0);
            for buffer in &buffers {
                let mut row = self.predictors.features(buffer)?;
                if let Some(exog) = &exog {
                    row.extend(exog.row(step));
                }
                if x.n_cols() == 0 {
                    x = Matrix::with_columns(row.len());
                }
                x.push_row(&row)?;
            }
            let predictions = self.regressor.predict(&x)?;
            for (path, buffer) in buffers.iter_mut().enumerate() {
                let mut value = predictions[path];
                if let Some(residuals) = residuals {
                    value += residuals[step][path];
                }
                buffer.push(value);
                raw[step][path] = value;
            }
        }

        for path in 0..n_paths {
            let mut series: Vec<f64> = raw.iter().map(|s| s[path]).collect();
            if let Some(diff) = &differentiator {
                series = diff.inverse_transform_next_window(&series)?;
            }
            if let Some(transformer) = &self.transformer_y {
                series = transformer.inverse_transform(&series)?;
            }
            for (step, value) in series.into_iter().enumerate() {
                raw[step][path] = value;
            }
        }
        Ok((future, raw))
    }
}

impl<R: Regressor> Forecaster for ForecasterAutoreg<R> {
    type OutSampleResiduals = Vec<f64>;

    fn name(&self) -> &str {
        match self.predictors {
            Predictors::Lags(_) => "ForecasterAutoreg",
            Predictors::Custom(_) => "ForecasterAutoregCustom",
        }
    }

    fn fit(&mut self, y: &TimeSeries, exog: Option<&Exog>, options: FitOptions) -> Result<()> {
        self.reset();
        let train = self.create_train_x_y(y, exog)?;
        self.regressor.fit(&train.x, &train.y)?;

        if options.store_in_sample_residuals {
            let fitted = self.regressor.predict(&train.x)?;
            let residuals = train.y.iter().zip(&fitted).map(|(y, p)| y - p).collect();
            self.in_sample_residuals = Some(cap_residuals(residuals));
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
            n_rows = train.x.n_rows(),
            n_features = train.x.n_cols(),
            "fitted recursive forecaster"
        );
        Ok(())
    }

    fn predict(
        &self,
        steps: usize,
        last_window: Option<&TimeSeries>,
        exog: Option<&Exog>,
    ) -> Result<Forecast> {
        let (index, paths) = self.predict_paths(steps, last_window, exog, None)?;
        let point = paths.iter().map(|p| p[0]).collect();
        Forecast::new(index, point)
    }

    fn predict_bootstrapping(
        &self,
        steps: usize,
        last_window: Option<&TimeSeries>,
        exog: Option<&Exog>,
        config: &BootstrapConfig,
    ) -> Result<BootstrapPredictions> {
        config.validate()?;
        if !self.fitted {
            return Err(ForecastError::forecaster_not_fitted());
        }
        let residuals = if config.in_sample_residuals {
            self.in_sample_residuals.as_deref().ok_or_else(|| {
                ForecastError::InvalidParameter(
                    "`forecaster.in_sample_residuals` is `None`. Fit the forecaster with \
                     `store_in_sample_residuals = true` before predicting."
                        .to_string(),
                )
            })?
        } else {
            self.out_sample_residuals.as_deref().ok_or_else(|| {
                ForecastError::InvalidParameter(
                    "`forecaster.out_sample_residuals` is `None`. Use \
                     `in_sample_residuals=True` or the  `set_out_sample_residuals()` \
                     method before predicting."
                        .to_string(),
                )
            })?
        };

        let mut rng = StdRng::seed_from_u64(config.random_state);
        let sampled = sample_residual_matrix(residuals, steps, config.n_boot, &mut rng)?;
        let (index, paths) = self.predict_paths(steps, last_window, exog, Some(&sampled))?;
        BootstrapPredictions::new(index, paths)
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

    /// Residuals are given on the original scale and stored on the scale the
    /// regressor is trained on.
    fn set_out_sample_residuals(&mut self, residuals: Vec<f64>, append: bool) -> Result<()> {
        let mut residuals: Vec<f64> = residuals.into_iter().filter(|r| !r.is_nan()).collect();
        if residuals.is_empty() {
            return Err(ForecastError::InvalidParameter(
                "`residuals` must contain at least one non-missing value.".to_string(),
            ));
        }
        if let Some(transformer) = &self.transformer_y {
            if !transformer.is_fitted() {
                return Err(ForecastError::forecaster_not_fitted());
            }
            residuals = transformer.scale_residuals(&residuals)?;
        }
        match (append, self.out_sample_residuals.as_mut()) {
            (true, Some(current)) => append_residuals(current, &residuals),
            _ => self.out_sample_residuals = Some(cap_residuals(residuals)),
        }
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

    fn is_fitted(&self) -> bool {
        self.fitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecaster::CustomPredictors;
    use crate::regressor::LinearRegression;
    use approx::assert_relative_eq;

    fn trend(n: usize) -> TimeSeries {
        TimeSeries::from_values("y", (0..n).map(|v| v as f64).collect())
    }

    fn forecaster(lags: usize) -> ForecasterAutoreg<LinearRegression> {
        ForecasterAutoreg::new(LinearRegression::new(), Lags::new(lags).unwrap())
    }

    #[test]
    fn training_matrix_holds_lags_then_exog() {
        let y = trend(6);
        let exog = Exog::from_column("x", (100..106).map(|v| v as f64).collect());
        let mut f = forecaster(3);
        let train = f.create_train_x_y(&y, Some(&exog)).unwrap();
        assert_eq!(train.x.n_rows(), 3);
        assert_eq!(train.x.row(0), &[2.0, 1.0, 0.0, 103.0]);
        assert_eq!(train.y, vec![3.0, 4.0, 5.0]);
        assert_eq!(train.feature_names, vec!["lag_1", "lag_2", "lag_3", "x"]);
        assert_eq!(train.index.first_label(), Some(IndexLabel::Position(3)));
    }

    #[test]
    fn short_series_is_rejected() {
        let mut f = forecaster(5);
        let err = f.fit(&trend(5), None, FitOptions::default()).unwrap_err();
        assert_eq!(err, ForecastError::InsufficientData { needed: 6, got: 5 });
    }

    #[test]
    fn predict_before_fit_fails() {
        let f = forecaster(3);
        assert!(matches!(
            f.predict(1, None, None),
            Err(ForecastError::NotFitted(_))
        ));
    }

    #[test]
    fn recursive_prediction_continues_trend() {
        let mut f = forecaster(3);
        f.fit(&trend(50), None, FitOptions::default()).unwrap();
        let forecast = f.predict(5, None, None).unwrap();
        for (i, v) in forecast.point().iter().enumerate() {
            assert_relative_eq!(*v, 50.0 + i as f64, epsilon = 1e-6);
        }
        assert_eq!(forecast.index().first_label(), Some(IndexLabel::Position(50)));
        assert_eq!(f.last_window().unwrap().values(), &[47.0, 48.0, 49.0]);
        assert_eq!(
            f.training_range(),
            Some((IndexLabel::Position(0), IndexLabel::Position(49)))
        );
    }

    #[test]
    fn transformer_and_differentiation_are_reverted() {
        let mut f = forecaster(3)
            .with_transformer_y(Scaler::standard())
            .with_differentiation(1)
            .unwrap();
        assert_eq!(f.window_size(), 4);
        f.fit(&trend(30), None, FitOptions::default()).unwrap();
        let forecast = f.predict(3, None, None).unwrap();
        assert_relative_eq!(forecast.point()[0], 30.0, epsilon = 1e-6);
        assert_relative_eq!(forecast.point()[2], 32.0, epsilon = 1e-6);
    }

    #[test]
    fn residual_is_added_before_feeding_back() {
        let mut f = forecaster(3);
        f.fit(&trend(50), None, FitOptions::default()).unwrap();
        f.set_out_sample_residuals(vec![10.0], false).unwrap();
        let config = BootstrapConfig::new(4).with_in_sample_residuals(false);
        let boot = f.predict_bootstrapping(2, None, None, &config).unwrap();
        assert!(boot.step(0).unwrap().iter().all(|v| (v - 60.0).abs() < 1e-6));
        // Second step sees lags [60, 49, 48]: mean + 2 + residual.
        let expected = (60.0 + 49.0 + 48.0) / 3.0 + 2.0 + 10.0;
        assert!(boot.step(1).unwrap().iter().all(|v| (v - expected).abs() < 1e-6));

        let interval = f
            .predict_interval(2, None, None, [5.0, 95.0], &config)
            .unwrap();
        assert_relative_eq!(interval.point()[0], 50.0, epsilon = 1e-6);
        assert_relative_eq!(interval.lower().unwrap()[1], expected, epsilon = 1e-6);
    }

    #[test]
    fn missing_out_sample_residuals_error() {
        let mut f = forecaster(3);
        f.fit(&trend(20), None, FitOptions::default()).unwrap();
        let config = BootstrapConfig::default().with_in_sample_residuals(false);
        let err = f.predict_bootstrapping(2, None, None, &config).unwrap_err();
        assert!(err
            .to_string()
            .contains("`forecaster.out_sample_residuals` is `None`"));
    }

    #[test]
    fn bootstrapping_is_seeded() {
        let y = TimeSeries::from_values(
            "y",
            (0..60).map(|v| (v as f64 * 0.7).sin() * 5.0 + v as f64).collect(),
        );
        let mut f = forecaster(4);
        f.fit(&y, None, FitOptions::default()).unwrap();
        let config = BootstrapConfig::new(20).with_random_state(7);
        let a = f.predict_bootstrapping(3, None, None, &config).unwrap();
        let b = f.predict_bootstrapping(3, None, None, &config).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.n_boot(), 20);
        assert_eq!(a.n_steps(), 3);
    }

    #[test]
    fn exog_must_be_given_when_trained_with_it() {
        let y = trend(20);
        let exog = Exog::from_column("x", vec![1.0; 20]);
        let mut f = forecaster(2);
        f.fit(&y, Some(&exog), FitOptions::default()).unwrap();
        assert!(f.predict(2, None, None).is_err());
        let future = Exog::from_column("x", vec![1.0; 1]);
        assert!(f.predict(2, None, Some(&future)).is_err());
        let future = Exog::from_column("x", vec![1.0; 2]);
        assert_eq!(f.predict(2, None, Some(&future)).unwrap().horizon(), 2);
    }

    #[test]
    fn without_stored_window_a_window_must_be_given() {
        let mut f = forecaster(3);
        let options = FitOptions::default()
            .with_store_last_window(false)
            .with_store_in_sample_residuals(false);
        f.fit(&trend(20), None, options).unwrap();
        assert!(f.last_window().is_none());
        assert!(f.in_sample_residuals().is_none());
        assert!(f.predict(1, None, None).is_err());

        let window = TimeSeries::with_range("y", 100, 1, vec![100.0, 101.0, 102.0]).unwrap();
        let forecast = f.predict(1, Some(&window), None).unwrap();
        assert_relative_eq!(forecast.point()[0], 103.0, epsilon = 1e-6);
        assert_eq!(forecast.index().first_label(), Some(IndexLabel::Position(103)));
    }

    #[test]
    fn custom_predictors_change_name_and_label() {
        let custom = CustomPredictors::new(
            |w: &[f64]| vec![w[w.len() - 1], w.iter().sum::<f64>() / w.len() as f64],
            4,
            vec!["lag_1".to_string(), "mean_4".to_string()],
        )
        .unwrap();
        let mut f = ForecasterAutoreg::new(LinearRegression::new(), custom);
        assert_eq!(f.name(), "ForecasterAutoregCustom");
        assert_eq!(f.lags_label(), "custom predictors");
        f.fit(&trend(30), None, FitOptions::default()).unwrap();
        let forecast = f.predict(2, None, None).unwrap();
        assert_relative_eq!(forecast.point()[0], 30.0, epsilon = 1e-6);
    }

    #[test]
    fn set_lags_resets_fit() {
        let mut f = forecaster(3);
        f.fit(&trend(20), None, FitOptions::default()).unwrap();
        f.set_lags(Lags::from_list(&[1, 5]).unwrap()).unwrap();
        assert!(!f.is_fitted());
        assert_eq!(f.window_size(), 5);
        assert_eq!(f.lags_label(), "[1, 5]");
    }
}
