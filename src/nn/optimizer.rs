//! Adam optimizer (Kingma & Ba, 2014).

use nalgebra::DMatrix;

/// Adam with bias-corrected moment estimates.
///
/// Moments are allocated lazily on the first step, one per parameter, in the
/// order parameters are passed to [`Adam::step`].
#[derive(Debug, Clone)]
pub struct Adam {
    learning_rate: f64,
    beta1: f64,
    beta2: f64,
    eps: f64,
    m: Vec<DMatrix<f64>>,
    v: Vec<DMatrix<f64>>,
    t: i32,
}

impl Adam {
    /// Default: β₁=0.9, β₂=0.999, ε=1e-7
    pub fn new(learning_rate: f64) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-7,
            m: Vec::new(),
            v: Vec::new(),
            t: 0,
        }
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    /// Number of updates applied so far.
    pub fn iterations(&self) -> usize {
        self.t as usize
    }

    pub fn step(&mut self, params: Vec<&mut DMatrix<f64>>, grads: &[DMatrix<f64>]) {
        if self.m.len() != params.len() {
            self.m = params.iter().map(|p| DMatrix::zeros(p.nrows(), p.ncols())).collect();
            self.v = self.m.clone();
        }
        self.t += 1;
        let bias1 = 1.0 - self.beta1.powi(self.t);
        let bias2 = 1.0 - self.beta2.powi(self.t);

        for (idx, (param, grad)) in params.into_iter().zip(grads).enumerate() {
            let m = &mut self.m[idx];
            let v = &mut self.v[idx];
            for ((p, g), (mi, vi)) in param
                .iter_mut()
                .zip(grad.iter())
                .zip(m.iter_mut().zip(v.iter_mut()))
            {
                *mi = self.beta1 * *mi + (1.0 - self.beta1) * g;
                *vi = self.beta2 * *vi + (1.0 - self.beta2) * g * g;
                let m_hat = *mi / bias1;
                let v_hat = *vi / bias2;
                *p -= self.learning_rate * m_hat / (v_hat.sqrt() + self.eps);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn first_step_moves_by_learning_rate() {
        let mut param = DMatrix::from_element(1, 1, 1.0);
        let mut adam = Adam::new(0.1);
        adam.step(vec![&mut param], &[DMatrix::from_element(1, 1, 2.0)]);
        assert_relative_eq!(param[0], 0.9, epsilon = 1e-6);
        assert_eq!(adam.iterations(), 1);
    }

    #[test]
    fn minimizes_quadratic() {
        let mut x = DMatrix::from_element(1, 1, 5.0);
        let mut adam = Adam::new(0.1);
        for _ in 0..500 {
            let grad = x.map(|v| 2.0 * (v - 2.0));
            adam.step(vec![&mut x], &[grad]);
        }
        assert_relative_eq!(x[0], 2.0, epsilon = 1e-2);
    }
}
