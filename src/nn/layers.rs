//! Fully connected layer and weight initialization.

use super::activation::Activation;
use nalgebra::DMatrix;
use rand::Rng;

/// Glorot uniform initialization of a `rows x cols` weight matrix.
pub(crate) fn glorot_uniform(rows: usize, cols: usize, rng: &mut impl Rng) -> DMatrix<f64> {
    let limit = (6.0 / (rows + cols) as f64).sqrt();
    DMatrix::from_fn(rows, cols, |_, _| rng.gen_range(-limit..limit))
}

/// `y = activation(W x + b)` on column vectors.
#[derive(Debug, Clone)]
pub struct Dense {
    pub(crate) weights: DMatrix<f64>,
    pub(crate) bias: DMatrix<f64>,
    activation: Activation,
}

/// Values kept by [`Dense::forward`] for the backward pass.
#[derive(Debug, Clone)]
pub(crate) struct DenseCache {
    input: DMatrix<f64>,
    pre_activation: DMatrix<f64>,
}

impl Dense {
    pub fn new(inputs: usize, units: usize, activation: Activation, rng: &mut impl Rng) -> Self {
        Self {
            weights: glorot_uniform(units, inputs, rng),
            bias: DMatrix::zeros(units, 1),
            activation,
        }
    }

    pub fn units(&self) -> usize {
        self.weights.nrows()
    }

    pub fn n_params(&self) -> usize {
        self.weights.len() + self.bias.len()
    }

    pub(crate) fn forward(&self, input: &DMatrix<f64>) -> (DMatrix<f64>, DenseCache) {
        let z = &self.weights * input + &self.bias;
        let out = self.activation.forward(&z);
        (
            out,
            DenseCache {
                input: input.clone(),
                pre_activation: z,
            },
        )
    }

    /// Gradient of the input and of `[weights, bias]`.
    pub(crate) fn backward(
        &self,
        cache: &DenseCache,
        grad_out: &DMatrix<f64>,
    ) -> (DMatrix<f64>, Vec<DMatrix<f64>>) {
        let dz = self.activation.backward(&cache.pre_activation, grad_out);
        let dw = &dz * cache.input.transpose();
        let dx = self.weights.transpose() * &dz;
        (dx, vec![dw, dz])
    }

    pub(crate) fn params_mut(&mut self) -> Vec<&mut DMatrix<f64>> {
        vec![&mut self.weights, &mut self.bias]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn glorot_limits() {
        let mut rng = StdRng::seed_from_u64(0);
        let w = glorot_uniform(10, 20, &mut rng);
        let limit = (6.0_f64 / 30.0).sqrt();
        assert!(w.iter().all(|v| v.abs() <= limit));
    }

    #[test]
    fn weight_gradient_matches_finite_differences() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut layer = Dense::new(3, 2, Activation::Tanh, &mut rng);
        let x = DMatrix::from_column_slice(3, 1, &[0.5, -0.2, 0.8]);
        let loss = |l: &Dense| l.forward(&x).0.sum();

        let (out, cache) = layer.forward(&x);
        let (_, grads) = layer.backward(&cache, &DMatrix::from_element(out.nrows(), 1, 1.0));

        let h = 1e-6;
        let original = layer.weights[(1, 2)];
        layer.weights[(1, 2)] = original + h;
        let up = loss(&layer);
        layer.weights[(1, 2)] = original - h;
        let down = loss(&layer);
        assert_relative_eq!(grads[0][(1, 2)], (up - down) / (2.0 * h), epsilon = 1e-6);
    }
}
