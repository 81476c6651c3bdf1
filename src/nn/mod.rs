//! Small recurrent neural networks for multi-series, multi-step forecasting.
//!
//! A model maps an input window of shape `(lags, n_series)` to an output of
//! shape `(steps, levels)`:
//!
//! ```text
//! input -> recurrent layers -> dense layers -> linear dense -> reshape
//! ```
//!
//! Models are trained with Adam on the mean squared error. Weight
//! initialization and batch shuffling use a generator seeded from
//! [`RnnConfig::seed`], so training is reproducible.

pub mod activation;
pub mod layers;
pub mod optimizer;
pub mod recurrent;

pub use activation::Activation;
pub use layers::Dense;
pub use optimizer::Adam;
pub use recurrent::{Lstm, RecurrentLayer, RecurrentLayerKind, SimpleRnn};

use crate::error::{ForecastError, Result};
use layers::DenseCache;
use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use recurrent::RecurrentCache;
use serde::{Deserialize, Serialize};

/// Architecture and training settings of a [`RecurrentModel`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RnnConfig {
    pub recurrent_layer: RecurrentLayerKind,
    /// Units of each stacked recurrent layer.
    pub recurrent_units: Vec<usize>,
    /// Units of each hidden dense layer, may be empty.
    pub dense_units: Vec<usize>,
    pub activation: Activation,
    pub learning_rate: f64,
    pub epochs: usize,
    pub batch_size: usize,
    pub seed: u64,
}

impl Default for RnnConfig {
    fn default() -> Self {
        Self {
            recurrent_layer: RecurrentLayerKind::Lstm,
            recurrent_units: vec![100],
            dense_units: vec![64],
            activation: Activation::Relu,
            learning_rate: 0.01,
            epochs: 10,
            batch_size: 32,
            seed: 123,
        }
    }
}

impl RnnConfig {
    pub fn with_recurrent_layer(mut self, kind: RecurrentLayerKind) -> Self {
        self.recurrent_layer = kind;
        self
    }

    pub fn with_recurrent_units(mut self, units: Vec<usize>) -> Self {
        self.recurrent_units = units;
        self
    }

    pub fn with_dense_units(mut self, units: Vec<usize>) -> Self {
        self.dense_units = units;
        self
    }

    pub fn with_activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn with_epochs(mut self, epochs: usize) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| ForecastError::InvalidParameter(format!("invalid RnnConfig: {}", e)))
    }

    fn validate(&self) -> Result<()> {
        if self.recurrent_units.is_empty() || self.recurrent_units.contains(&0) {
            return Err(ForecastError::InvalidParameter(
                "`recurrent_units` must contain at least one layer with a positive number of units."
                    .to_string(),
            ));
        }
        if self.dense_units.contains(&0) {
            return Err(ForecastError::InvalidParameter(
                "`dense_units` must be positive.".to_string(),
            ));
        }
        if self.learning_rate.is_nan() || self.learning_rate <= 0.0 {
            return Err(ForecastError::InvalidParameter(
                "`learning_rate` must be positive.".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(ForecastError::InvalidParameter(
                "`batch_size` must be positive.".to_string(),
            ));
        }
        Ok(())
    }
}

/// Mean squared error after each training epoch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub loss: Vec<f64>,
}

impl TrainingHistory {
    pub fn final_loss(&self) -> Option<f64> {
        self.loss.last().copied()
    }
}

/// Build a model for windows of `lags` rows over `n_series` series, predicting
/// `steps` steps of `levels` series.
pub fn create_and_compile_model(
    n_series: usize,
    lags: usize,
    steps: usize,
    levels: usize,
    config: &RnnConfig,
) -> Result<RecurrentModel> {
    for (name, value) in [
        ("n_series", n_series),
        ("lags", lags),
        ("steps", steps),
        ("levels", levels),
    ] {
        if value == 0 {
            return Err(ForecastError::InvalidParameter(format!(
                "`{}` must be greater than 0.",
                name
            )));
        }
    }
    config.validate()?;

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut recurrent = Vec::with_capacity(config.recurrent_units.len());
    let mut inputs = n_series;
    for &units in &config.recurrent_units {
        recurrent.push(RecurrentLayer::new(
            config.recurrent_layer,
            inputs,
            units,
            config.activation,
            &mut rng,
        ));
        inputs = units;
    }
    let mut dense = Vec::with_capacity(config.dense_units.len());
    for &units in &config.dense_units {
        dense.push(Dense::new(inputs, units, config.activation, &mut rng));
        inputs = units;
    }
    let output = Dense::new(inputs, levels * steps, Activation::Linear, &mut rng);

    Ok(RecurrentModel {
        lags,
        n_series,
        steps,
        levels,
        recurrent,
        dense,
        output,
        optimizer: Adam::new(config.learning_rate),
        config: config.clone(),
    })
}

/// Input window `(lags, n_series)` as one column vector per lag.
fn to_sequence(window: &[Vec<f64>]) -> Vec<DMatrix<f64>> {
    window
        .iter()
        .map(|row| DMatrix::from_column_slice(row.len(), 1, row))
        .collect()
}

/// Parameters in the order gradients are returned by `backward`.
fn params_of<'a>(
    recurrent: &'a mut [RecurrentLayer],
    dense: &'a mut [Dense],
    output: &'a mut Dense,
) -> Vec<&'a mut DMatrix<f64>> {
    let mut params = Vec::new();
    for layer in recurrent {
        params.extend(layer.params_mut());
    }
    for layer in dense {
        params.extend(layer.params_mut());
    }
    params.extend(output.params_mut());
    params
}

struct ForwardCache {
    recurrent: Vec<(usize, RecurrentCache)>,
    dense: Vec<DenseCache>,
    output: DenseCache,
}

/// Recurrent network with a dense head.
#[derive(Debug, Clone)]
pub struct RecurrentModel {
    lags: usize,
    n_series: usize,
    steps: usize,
    levels: usize,
    recurrent: Vec<RecurrentLayer>,
    dense: Vec<Dense>,
    output: Dense,
    optimizer: Adam,
    config: RnnConfig,
}

impl RecurrentModel {
    /// `(lags, n_series)`.
    pub fn input_shape(&self) -> (usize, usize) {
        (self.lags, self.n_series)
    }

    /// `(steps, levels)`.
    pub fn output_shape(&self) -> (usize, usize) {
        (self.steps, self.levels)
    }

    pub fn config(&self) -> &RnnConfig {
        &self.config
    }

    pub fn n_params(&self) -> usize {
        self.recurrent.iter().map(|l| l.n_params()).sum::<usize>()
            + self.dense.iter().map(|l| l.n_params()).sum::<usize>()
            + self.output.n_params()
    }

    fn check_window(&self, window: &[Vec<f64>]) -> Result<()> {
        if window.len() != self.lags || window.iter().any(|r| r.len() != self.n_series) {
            return Err(ForecastError::InvalidParameter(format!(
                "Model input must have shape ({}, {}).",
                self.lags, self.n_series
            )));
        }
        Ok(())
    }

    fn forward(&self, window: &[Vec<f64>]) -> (DMatrix<f64>, ForwardCache) {
        let mut sequence = to_sequence(window);
        let mut recurrent = Vec::with_capacity(self.recurrent.len());
        for layer in &self.recurrent {
            let (outputs, cache) = layer.forward(&sequence);
            recurrent.push((sequence.len(), cache));
            sequence = outputs;
        }
        let mut x = sequence
            .pop()
            .unwrap_or_else(|| DMatrix::zeros(self.n_series, 1));
        let mut dense = Vec::with_capacity(self.dense.len());
        for layer in &self.dense {
            let (out, cache) = layer.forward(&x);
            dense.push(cache);
            x = out;
        }
        let (out, output) = self.output.forward(&x);
        (
            out,
            ForwardCache {
                recurrent,
                dense,
                output,
            },
        )
    }

    /// Parameter gradients for one sample.
    fn backward(&self, cache: &ForwardCache, grad_out: &DMatrix<f64>) -> Vec<DMatrix<f64>> {
        let (mut grad, output_grads) = self.output.backward(&cache.output, grad_out);
        let mut dense_grads = Vec::with_capacity(self.dense.len());
        for (layer, layer_cache) in self.dense.iter().zip(&cache.dense).rev() {
            let (dx, grads) = layer.backward(layer_cache, &grad);
            dense_grads.push(grads);
            grad = dx;
        }

        // Only the last recurrent layer's final state feeds the head.
        let mut recurrent_grads = Vec::with_capacity(self.recurrent.len());
        let mut grad_sequence: Option<Vec<DMatrix<f64>>> = None;
        for (layer, (len, layer_cache)) in self.recurrent.iter().zip(&cache.recurrent).rev() {
            let grad_outputs = grad_sequence.take().unwrap_or_else(|| {
                let mut g = vec![DMatrix::zeros(layer.units(), 1); *len];
                if let Some(last) = g.last_mut() {
                    *last = grad.clone();
                }
                g
            });
            let (dx, grads) = layer.backward(layer_cache, &grad_outputs);
            recurrent_grads.push(grads);
            grad_sequence = Some(dx);
        }

        recurrent_grads
            .into_iter()
            .rev()
            .flatten()
            .chain(dense_grads.into_iter().rev().flatten())
            .chain(output_grads)
            .collect()
    }

    /// Train on `inputs[sample][lag][series]` against
    /// `targets[sample][step][level]`.
    pub fn fit(&mut self, inputs: &[Vec<Vec<f64>>], targets: &[Vec<Vec<f64>>]) -> Result<TrainingHistory> {
        if inputs.is_empty() {
            return Err(ForecastError::EmptyData);
        }
        if inputs.len() != targets.len() {
            return Err(ForecastError::DimensionMismatch {
                expected: inputs.len(),
                got: targets.len(),
            });
        }
        for window in inputs {
            self.check_window(window)?;
        }
        if inputs.iter().flatten().flatten().any(|v| !v.is_finite()) {
            return Err(ForecastError::MissingValues(
                "Training data of the recurrent model contains missing values.".to_string(),
            ));
        }
        let n_out = self.steps * self.levels;
        let mut flat_targets = Vec::with_capacity(targets.len());
        for target in targets {
            let flat: Vec<f64> = target.iter().flatten().copied().collect();
            if target.len() != self.steps || flat.len() != n_out {
                return Err(ForecastError::InvalidParameter(format!(
                    "Model target must have shape ({}, {}).",
                    self.steps, self.levels
                )));
            }
            if flat.iter().any(|v| !v.is_finite()) {
                return Err(ForecastError::MissingValues(
                    "Training data of the recurrent model contains missing values.".to_string(),
                ));
            }
            flat_targets.push(DMatrix::from_column_slice(n_out, 1, &flat));
        }

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut order: Vec<usize> = (0..inputs.len()).collect();
        let mut history = TrainingHistory::default();
        for epoch in 0..self.config.epochs {
            order.shuffle(&mut rng);
            let mut epoch_loss = 0.0;
            for batch in order.chunks(self.config.batch_size) {
                let mut grads: Option<Vec<DMatrix<f64>>> = None;
                for &i in batch {
                    let (pred, cache) = self.forward(&inputs[i]);
                    let diff = &pred - &flat_targets[i];
                    epoch_loss += diff.norm_squared() / n_out as f64;
                    let grad_out = diff * (2.0 / (n_out * batch.len()) as f64);
                    let sample = self.backward(&cache, &grad_out);
                    match grads.as_mut() {
                        Some(acc) => {
                            for (a, g) in acc.iter_mut().zip(&sample) {
                                *a += g;
                            }
                        }
                        None => grads = Some(sample),
                    }
                }
                if let Some(grads) = grads {
                    let RecurrentModel {
                        recurrent,
                        dense,
                        output,
                        optimizer,
                        ..
                    } = self;
                    optimizer.step(params_of(recurrent, dense, output), &grads);
                }
            }
            let loss = epoch_loss / inputs.len() as f64;
            tracing::debug!(epoch, loss, "recurrent model epoch");
            history.loss.push(loss);
        }
        Ok(history)
    }

    /// Prediction of shape `(steps, levels)` for one input window.
    pub fn predict(&self, window: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        self.check_window(window)?;
        let (out, _) = self.forward(window);
        Ok(out
            .as_slice()
            .chunks(self.levels)
            .map(|row| row.to_vec())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> RnnConfig {
        RnnConfig::default()
            .with_recurrent_units(vec![8])
            .with_dense_units(vec![8])
            .with_activation(Activation::Tanh)
            .with_epochs(30)
            .with_batch_size(8)
    }

    #[test]
    fn model_shapes() {
        let config = RnnConfig::default()
            .with_recurrent_units(vec![100])
            .with_dense_units(vec![128, 64]);
        let model = create_and_compile_model(3, 3, 4, 2, &config).unwrap();
        assert_eq!(model.input_shape(), (3, 3));
        assert_eq!(model.output_shape(), (4, 2));
        let window = vec![vec![0.1, 0.2, 0.3]; 3];
        let pred = model.predict(&window).unwrap();
        assert_eq!(pred.len(), 4);
        assert!(pred.iter().all(|row| row.len() == 2));
    }

    #[test]
    fn invalid_arguments() {
        let config = RnnConfig::default();
        assert!(create_and_compile_model(0, 3, 1, 1, &config).is_err());
        assert!(create_and_compile_model(1, 3, 0, 1, &config).is_err());
        let empty = RnnConfig::default().with_recurrent_units(Vec::new());
        assert!(create_and_compile_model(1, 3, 1, 1, &empty).is_err());
    }

    #[test]
    fn config_from_json_uses_defaults() {
        let config = RnnConfig::from_json(r#"{"recurrent_layer": "RNN", "epochs": 3}"#).unwrap();
        assert_eq!(config.recurrent_layer, RecurrentLayerKind::SimpleRnn);
        assert_eq!(config.epochs, 3);
        assert_eq!(config.learning_rate, 0.01);
    }

    #[test]
    fn training_reduces_loss_and_is_reproducible() {
        let series: Vec<f64> = (0..40).map(|i| (i as f64 * 0.3).sin()).collect();
        let mut inputs = Vec::new();
        let mut targets = Vec::new();
        for t in 3..series.len() {
            inputs.push(series[t - 3..t].iter().map(|v| vec![*v]).collect());
            targets.push(vec![vec![series[t]]]);
        }
        for kind in [RecurrentLayerKind::Lstm, RecurrentLayerKind::SimpleRnn] {
            let config = small_config().with_recurrent_layer(kind);
            let mut a = create_and_compile_model(1, 3, 1, 1, &config).unwrap();
            let mut b = a.clone();
            let history = a.fit(&inputs, &targets).unwrap();
            assert_eq!(history.loss.len(), 30);
            assert!(history.final_loss().unwrap() < history.loss[0]);
            assert_eq!(b.fit(&inputs, &targets).unwrap(), history);
        }
    }

    #[test]
    fn fit_rejects_wrong_shapes() {
        let mut model = create_and_compile_model(2, 3, 1, 1, &small_config()).unwrap();
        let inputs = vec![vec![vec![0.0]; 3]];
        let targets = vec![vec![vec![0.0]]];
        assert!(model.fit(&inputs, &targets).is_err());
    }
}
