//! Recurrent layers trained with backpropagation through time.
//!
//! ```text
//! SimpleRnn: h_t = act(W x_t + U h_{t-1} + b)
//!
//! Lstm:      i_t = σ(W_i x_t + U_i h_{t-1} + b_i)
//!            f_t = σ(W_f x_t + U_f h_{t-1} + b_f)
//!            g_t = act(W_g x_t + U_g h_{t-1} + b_g)
//!            o_t = σ(W_o x_t + U_o h_{t-1} + b_o)
//!            c_t = f_t * c_{t-1} + i_t * g_t
//!            h_t = o_t * act(c_t)
//! ```
//!
//! Sequences are slices of column vectors, one per time step.

use super::activation::{sigmoid, Activation};
use super::layers::glorot_uniform;
use nalgebra::DMatrix;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Recurrent cell type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RecurrentLayerKind {
    #[default]
    #[serde(rename = "LSTM")]
    Lstm,
    #[serde(rename = "RNN")]
    SimpleRnn,
}

/// Fully connected recurrent layer.
#[derive(Debug, Clone)]
pub struct SimpleRnn {
    w: DMatrix<f64>,
    u: DMatrix<f64>,
    b: DMatrix<f64>,
    activation: Activation,
}

#[derive(Debug, Clone)]
pub(crate) struct SimpleRnnCache {
    inputs: Vec<DMatrix<f64>>,
    /// `hidden[t]` is the state before step `t`; one more than `inputs`.
    hidden: Vec<DMatrix<f64>>,
    pre_activations: Vec<DMatrix<f64>>,
}

impl SimpleRnn {
    pub fn new(inputs: usize, units: usize, activation: Activation, rng: &mut impl Rng) -> Self {
        Self {
            w: glorot_uniform(units, inputs, rng),
            u: glorot_uniform(units, units, rng),
            b: DMatrix::zeros(units, 1),
            activation,
        }
    }

    pub fn units(&self) -> usize {
        self.w.nrows()
    }

    fn forward(&self, sequence: &[DMatrix<f64>]) -> (Vec<DMatrix<f64>>, SimpleRnnCache) {
        let mut hidden = vec![DMatrix::zeros(self.units(), 1)];
        let mut pre_activations = Vec::with_capacity(sequence.len());
        for x in sequence {
            let z = &self.w * x + &self.u * &hidden[hidden.len() - 1] + &self.b;
            hidden.push(self.activation.forward(&z));
            pre_activations.push(z);
        }
        let outputs = hidden[1..].to_vec();
        (
            outputs,
            SimpleRnnCache {
                inputs: sequence.to_vec(),
                hidden,
                pre_activations,
            },
        )
    }

    fn backward(
        &self,
        cache: &SimpleRnnCache,
        grad_outputs: &[DMatrix<f64>],
    ) -> (Vec<DMatrix<f64>>, Vec<DMatrix<f64>>) {
        let mut dw = DMatrix::zeros(self.w.nrows(), self.w.ncols());
        let mut du = DMatrix::zeros(self.u.nrows(), self.u.ncols());
        let mut db = DMatrix::zeros(self.b.nrows(), 1);
        let mut grad_inputs = vec![DMatrix::zeros(self.w.ncols(), 1); cache.inputs.len()];
        let mut dh_next = DMatrix::zeros(self.units(), 1);

        for t in (0..cache.inputs.len()).rev() {
            let dh = &grad_outputs[t] + &dh_next;
            let dz = self.activation.backward(&cache.pre_activations[t], &dh);
            dw += &dz * cache.inputs[t].transpose();
            du += &dz * cache.hidden[t].transpose();
            db += &dz;
            grad_inputs[t] = self.w.transpose() * &dz;
            dh_next = self.u.transpose() * &dz;
        }
        (grad_inputs, vec![dw, du, db])
    }

    fn params_mut(&mut self) -> Vec<&mut DMatrix<f64>> {
        vec![&mut self.w, &mut self.u, &mut self.b]
    }
}

/// Long short-term memory layer. Gates are stacked as `[i, f, g, o]`.
#[derive(Debug, Clone)]
pub struct Lstm {
    w: DMatrix<f64>,
    u: DMatrix<f64>,
    b: DMatrix<f64>,
    activation: Activation,
}

#[derive(Debug, Clone)]
struct LstmStep {
    input_gate: DMatrix<f64>,
    forget_gate: DMatrix<f64>,
    candidate_pre: DMatrix<f64>,
    candidate: DMatrix<f64>,
    output_gate: DMatrix<f64>,
}

#[derive(Debug, Clone)]
pub(crate) struct LstmCache {
    inputs: Vec<DMatrix<f64>>,
    hidden: Vec<DMatrix<f64>>,
    cells: Vec<DMatrix<f64>>,
    steps: Vec<LstmStep>,
}

impl Lstm {
    pub fn new(inputs: usize, units: usize, activation: Activation, rng: &mut impl Rng) -> Self {
        let mut b = DMatrix::zeros(4 * units, 1);
        // Forget gate starts open.
        b.rows_mut(units, units).fill(1.0);
        Self {
            w: glorot_uniform(4 * units, inputs, rng),
            u: glorot_uniform(4 * units, units, rng),
            b,
            activation,
        }
    }

    pub fn units(&self) -> usize {
        self.u.ncols()
    }

    fn forward(&self, sequence: &[DMatrix<f64>]) -> (Vec<DMatrix<f64>>, LstmCache) {
        let n = self.units();
        let mut hidden = vec![DMatrix::zeros(n, 1)];
        let mut cells = vec![DMatrix::zeros(n, 1)];
        let mut steps = Vec::with_capacity(sequence.len());
        for x in sequence {
            let z = &self.w * x + &self.u * &hidden[hidden.len() - 1] + &self.b;
            let input_gate = z.rows(0, n).map(sigmoid);
            let forget_gate = z.rows(n, n).map(sigmoid);
            let candidate_pre = z.rows(2 * n, n).into_owned();
            let candidate = self.activation.forward(&candidate_pre);
            let output_gate = z.rows(3 * n, n).map(sigmoid);

            let c = forget_gate.component_mul(&cells[cells.len() - 1])
                + input_gate.component_mul(&candidate);
            let h = output_gate.component_mul(&self.activation.forward(&c));
            cells.push(c);
            hidden.push(h);
            steps.push(LstmStep {
                input_gate,
                forget_gate,
                candidate_pre,
                candidate,
                output_gate,
            });
        }
        let outputs = hidden[1..].to_vec();
        (
            outputs,
            LstmCache {
                inputs: sequence.to_vec(),
                hidden,
                cells,
                steps,
            },
        )
    }

    fn backward(
        &self,
        cache: &LstmCache,
        grad_outputs: &[DMatrix<f64>],
    ) -> (Vec<DMatrix<f64>>, Vec<DMatrix<f64>>) {
        let n = self.units();
        let mut dw = DMatrix::zeros(self.w.nrows(), self.w.ncols());
        let mut du = DMatrix::zeros(self.u.nrows(), self.u.ncols());
        let mut db = DMatrix::zeros(self.b.nrows(), 1);
        let mut grad_inputs = vec![DMatrix::zeros(self.w.ncols(), 1); cache.inputs.len()];
        let mut dh_next = DMatrix::zeros(n, 1);
        let mut dc_next = DMatrix::zeros(n, 1);

        for t in (0..cache.inputs.len()).rev() {
            let step = &cache.steps[t];
            let c = &cache.cells[t + 1];
            let c_prev = &cache.cells[t];
            let dh = &grad_outputs[t] + &dh_next;

            let act_c = self.activation.forward(c);
            let d_output = dh.component_mul(&act_c);
            let dc = self
                .activation
                .backward(c, &dh.component_mul(&step.output_gate))
                + &dc_next;
            let d_input = dc.component_mul(&step.candidate);
            let d_forget = dc.component_mul(c_prev);
            let d_candidate = dc.component_mul(&step.input_gate);

            let gate_grad = |gate: &DMatrix<f64>, grad: &DMatrix<f64>| {
                gate.map(|g| g * (1.0 - g)).component_mul(grad)
            };
            let mut dz = DMatrix::zeros(4 * n, 1);
            dz.rows_mut(0, n)
                .copy_from(&gate_grad(&step.input_gate, &d_input));
            dz.rows_mut(n, n)
                .copy_from(&gate_grad(&step.forget_gate, &d_forget));
            dz.rows_mut(2 * n, n)
                .copy_from(&self.activation.backward(&step.candidate_pre, &d_candidate));
            dz.rows_mut(3 * n, n)
                .copy_from(&gate_grad(&step.output_gate, &d_output));

            dw += &dz * cache.inputs[t].transpose();
            du += &dz * cache.hidden[t].transpose();
            db += &dz;
            grad_inputs[t] = self.w.transpose() * &dz;
            dh_next = self.u.transpose() * &dz;
            dc_next = dc.component_mul(&step.forget_gate);
        }
        (grad_inputs, vec![dw, du, db])
    }

    fn params_mut(&mut self) -> Vec<&mut DMatrix<f64>> {
        vec![&mut self.w, &mut self.u, &mut self.b]
    }
}

/// A recurrent layer of either kind.
#[derive(Debug, Clone)]
pub enum RecurrentLayer {
    SimpleRnn(SimpleRnn),
    Lstm(Lstm),
}

#[derive(Debug, Clone)]
pub(crate) enum RecurrentCache {
    SimpleRnn(SimpleRnnCache),
    Lstm(LstmCache),
}

impl RecurrentLayer {
    pub fn new(
        kind: RecurrentLayerKind,
        inputs: usize,
        units: usize,
        activation: Activation,
        rng: &mut impl Rng,
    ) -> Self {
        match kind {
            RecurrentLayerKind::SimpleRnn => {
                RecurrentLayer::SimpleRnn(SimpleRnn::new(inputs, units, activation, rng))
            }
            RecurrentLayerKind::Lstm => {
                RecurrentLayer::Lstm(Lstm::new(inputs, units, activation, rng))
            }
        }
    }

    pub fn units(&self) -> usize {
        match self {
            RecurrentLayer::SimpleRnn(l) => l.units(),
            RecurrentLayer::Lstm(l) => l.units(),
        }
    }

    pub fn n_params(&self) -> usize {
        match self {
            RecurrentLayer::SimpleRnn(l) => l.w.len() + l.u.len() + l.b.len(),
            RecurrentLayer::Lstm(l) => l.w.len() + l.u.len() + l.b.len(),
        }
    }

    /// Hidden state of every step.
    pub(crate) fn forward(&self, sequence: &[DMatrix<f64>]) -> (Vec<DMatrix<f64>>, RecurrentCache) {
        match self {
            RecurrentLayer::SimpleRnn(l) => {
                let (out, cache) = l.forward(sequence);
                (out, RecurrentCache::SimpleRnn(cache))
            }
            RecurrentLayer::Lstm(l) => {
                let (out, cache) = l.forward(sequence);
                (out, RecurrentCache::Lstm(cache))
            }
        }
    }

    /// Gradients of the inputs and of the parameters, in `params_mut` order.
    pub(crate) fn backward(
        &self,
        cache: &RecurrentCache,
        grad_outputs: &[DMatrix<f64>],
    ) -> (Vec<DMatrix<f64>>, Vec<DMatrix<f64>>) {
        match (self, cache) {
            (RecurrentLayer::SimpleRnn(l), RecurrentCache::SimpleRnn(c)) => l.backward(c, grad_outputs),
            (RecurrentLayer::Lstm(l), RecurrentCache::Lstm(c)) => l.backward(c, grad_outputs),
            // A cache always comes from the same layer's forward pass.
            _ => (Vec::new(), Vec::new()),
        }
    }

    pub(crate) fn params_mut(&mut self) -> Vec<&mut DMatrix<f64>> {
        match self {
            RecurrentLayer::SimpleRnn(l) => l.params_mut(),
            RecurrentLayer::Lstm(l) => l.params_mut(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn sequence() -> Vec<DMatrix<f64>> {
        vec![
            DMatrix::from_column_slice(2, 1, &[0.1, -0.4]),
            DMatrix::from_column_slice(2, 1, &[0.7, 0.2]),
            DMatrix::from_column_slice(2, 1, &[-0.3, 0.5]),
        ]
    }

    /// Loss = sum of the last hidden state.
    fn check_gradients(mut layer: RecurrentLayer) {
        let seq = sequence();
        let loss = |l: &RecurrentLayer| l.forward(&seq).0[seq.len() - 1].sum();

        let (out, cache) = layer.forward(&seq);
        let mut grad_out: Vec<DMatrix<f64>> =
            out.iter().map(|h| DMatrix::zeros(h.nrows(), 1)).collect();
        grad_out[seq.len() - 1] = DMatrix::from_element(layer.units(), 1, 1.0);
        let (_, grads) = layer.backward(&cache, &grad_out);

        let h = 1e-6;
        for (p, grad) in grads.iter().enumerate() {
            for idx in [0, grad.len() - 1] {
                let original = layer.params_mut()[p][idx];
                layer.params_mut()[p][idx] = original + h;
                let up = loss(&layer);
                layer.params_mut()[p][idx] = original - h;
                let down = loss(&layer);
                layer.params_mut()[p][idx] = original;
                assert_relative_eq!(grad[idx], (up - down) / (2.0 * h), epsilon = 1e-5);
            }
        }
    }

    #[test]
    fn simple_rnn_gradients() {
        let mut rng = StdRng::seed_from_u64(3);
        check_gradients(RecurrentLayer::new(
            RecurrentLayerKind::SimpleRnn,
            2,
            3,
            Activation::Tanh,
            &mut rng,
        ));
    }

    #[test]
    fn lstm_gradients() {
        let mut rng = StdRng::seed_from_u64(3);
        check_gradients(RecurrentLayer::new(
            RecurrentLayerKind::Lstm,
            2,
            3,
            Activation::Tanh,
            &mut rng,
        ));
    }

    #[test]
    fn lstm_forget_bias_is_one() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut layer = RecurrentLayer::new(RecurrentLayerKind::Lstm, 2, 4, Activation::Relu, &mut rng);
        assert_eq!(layer.n_params(), 4 * 4 * (2 + 4 + 1));
        let bias = layer.params_mut()[2].clone();
        assert_eq!(bias[4], 1.0);
        assert_eq!(bias[0], 0.0);
    }
}
