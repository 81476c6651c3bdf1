//! Element-wise activation functions.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

/// Activation applied by recurrent and dense layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    #[default]
    Relu,
    Tanh,
    Sigmoid,
    Linear,
}

pub(crate) fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

impl Activation {
    pub fn apply(&self, z: f64) -> f64 {
        match self {
            Activation::Relu => z.max(0.0),
            Activation::Tanh => z.tanh(),
            Activation::Sigmoid => sigmoid(z),
            Activation::Linear => z,
        }
    }

    /// Derivative with respect to the pre-activation `z`.
    pub fn derivative(&self, z: f64) -> f64 {
        match self {
            Activation::Relu => {
                if z > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            Activation::Tanh => 1.0 - z.tanh().powi(2),
            Activation::Sigmoid => {
                let s = sigmoid(z);
                s * (1.0 - s)
            }
            Activation::Linear => 1.0,
        }
    }

    pub(crate) fn forward(&self, z: &DMatrix<f64>) -> DMatrix<f64> {
        z.map(|v| self.apply(v))
    }

    pub(crate) fn backward(&self, z: &DMatrix<f64>, grad: &DMatrix<f64>) -> DMatrix<f64> {
        z.map(|v| self.derivative(v)).component_mul(grad)
    }
}
