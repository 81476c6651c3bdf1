//! Ordinary least squares and ridge regression.

use super::{
    bool_param, check_fit_input, check_predict_input, float_param, regressor_not_fitted,
    unknown_param, ParamSet, Regressor,
};
use crate::core::Matrix;
use crate::error::{ForecastError, Result};
use nalgebra::{DMatrix, DVector};

/// Centre columns and target when fitting an intercept.
struct Centred {
    x: DMatrix<f64>,
    y: DVector<f64>,
    x_mean: Vec<f64>,
    y_mean: f64,
}

fn centre(x: &Matrix, y: &[f64], fit_intercept: bool) -> Centred {
    let n = x.n_rows();
    let p = x.n_cols();
    let (x_mean, y_mean) = if fit_intercept {
        let x_mean = (0..p)
            .map(|j| x.column(j).iter().sum::<f64>() / n as f64)
            .collect::<Vec<_>>();
        (x_mean, y.iter().sum::<f64>() / n as f64)
    } else {
        (vec![0.0; p], 0.0)
    };
    let xc = DMatrix::from_fn(n, p, |i, j| x.get(i, j) - x_mean[j]);
    let yc = DVector::from_iterator(n, y.iter().map(|v| v - y_mean));
    Centred {
        x: xc,
        y: yc,
        x_mean,
        y_mean,
    }
}

/// Minimum-norm least squares solution through the SVD.
fn lstsq(a: &DMatrix<f64>, b: &DVector<f64>) -> Result<DVector<f64>> {
    if a.ncols() == 0 {
        return Ok(DVector::zeros(0));
    }
    let svd = a.clone().svd(true, true);
    let max_sv = svd.singular_values.iter().cloned().fold(0.0_f64, f64::max);
    let eps = max_sv * a.nrows().max(a.ncols()) as f64 * f64::EPSILON;
    svd.solve(b, eps)
        .map_err(|e| ForecastError::ComputationError(e.to_string()))
}

fn linear_predict(coef: &[f64], intercept: f64, x: &Matrix) -> Vec<f64> {
    x.rows()
        .map(|row| intercept + row.iter().zip(coef).map(|(a, b)| a * b).sum::<f64>())
        .collect()
}

/// Ordinary least squares linear regression.
///
/// Rank-deficient designs (for instance lags of a perfect linear trend) get the
/// minimum-norm coefficients.
#[derive(Debug, Clone)]
pub struct LinearRegression {
    fit_intercept: bool,
    coef: Option<Vec<f64>>,
    intercept: f64,
}

impl Default for LinearRegression {
    fn default() -> Self {
        Self::new()
    }
}

impl LinearRegression {
    pub fn new() -> Self {
        Self {
            fit_intercept: true,
            coef: None,
            intercept: 0.0,
        }
    }

    pub fn with_fit_intercept(mut self, fit_intercept: bool) -> Self {
        self.fit_intercept = fit_intercept;
        self
    }

    /// Fitted coefficients, one per feature.
    pub fn coef(&self) -> Option<&[f64]> {
        self.coef.as_deref()
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }
}

impl Regressor for LinearRegression {
    fn fit(&mut self, x: &Matrix, y: &[f64]) -> Result<()> {
        check_fit_input(x, y)?;
        let c = centre(x, y, self.fit_intercept);
        let beta = lstsq(&c.x, &c.y)?;
        let coef: Vec<f64> = beta.iter().cloned().collect();
        self.intercept = c.y_mean
            - c.x_mean
                .iter()
                .zip(&coef)
                .map(|(m, b)| m * b)
                .sum::<f64>();
        self.coef = Some(coef);
        Ok(())
    }

    fn predict(&self, x: &Matrix) -> Result<Vec<f64>> {
        let coef = self
            .coef
            .as_ref()
            .ok_or_else(|| regressor_not_fitted(self.name()))?;
        check_predict_input(x, coef.len())?;
        Ok(linear_predict(coef, self.intercept, x))
    }

    fn name(&self) -> &str {
        "LinearRegression"
    }

    fn params(&self) -> ParamSet {
        ParamSet::new().with("fit_intercept", self.fit_intercept)
    }

    fn set_params(&mut self, params: &ParamSet) -> Result<()> {
        for (name, value) in params.iter() {
            match name.as_str() {
                "fit_intercept" => self.fit_intercept = bool_param(name, value)?,
                other => return Err(unknown_param(self.name(), other)),
            }
        }
        self.coef = None;
        Ok(())
    }

    fn is_fitted(&self) -> bool {
        self.coef.is_some()
    }

    fn is_linear(&self) -> bool {
        true
    }
}

/// Linear least squares with L2 regularisation. The intercept is not penalised.
#[derive(Debug, Clone)]
pub struct Ridge {
    alpha: f64,
    fit_intercept: bool,
    coef: Option<Vec<f64>>,
    intercept: f64,
}

impl Default for Ridge {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl Ridge {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha,
            fit_intercept: true,
            coef: None,
            intercept: 0.0,
        }
    }

    pub fn with_fit_intercept(mut self, fit_intercept: bool) -> Self {
        self.fit_intercept = fit_intercept;
        self
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn coef(&self) -> Option<&[f64]> {
        self.coef.as_deref()
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }
}

impl Regressor for Ridge {
    fn fit(&mut self, x: &Matrix, y: &[f64]) -> Result<()> {
        if self.alpha < 0.0 {
            return Err(ForecastError::InvalidParameter(format!(
                "alpha must be >= 0, got {}",
                self.alpha
            )));
        }
        check_fit_input(x, y)?;
        let c = centre(x, y, self.fit_intercept);
        let p = c.x.ncols();
        let xt = c.x.transpose();
        let gram = &xt * &c.x + DMatrix::identity(p, p) * self.alpha;
        let rhs = &xt * &c.y;
        let beta = match gram.clone().cholesky() {
            Some(chol) => chol.solve(&rhs),
            None => lstsq(&gram, &rhs)?,
        };
        let coef: Vec<f64> = beta.iter().cloned().collect();
        self.intercept = c.y_mean
            - c.x_mean
                .iter()
                .zip(&coef)
                .map(|(m, b)| m * b)
                .sum::<f64>();
        self.coef = Some(coef);
        Ok(())
    }

    fn predict(&self, x: &Matrix) -> Result<Vec<f64>> {
        let coef = self
            .coef
            .as_ref()
            .ok_or_else(|| regressor_not_fitted(self.name()))?;
        check_predict_input(x, coef.len())?;
        Ok(linear_predict(coef, self.intercept, x))
    }

    fn name(&self) -> &str {
        "Ridge"
    }

    fn params(&self) -> ParamSet {
        ParamSet::new()
            .with("alpha", self.alpha)
            .with("fit_intercept", self.fit_intercept)
    }

    fn set_params(&mut self, params: &ParamSet) -> Result<()> {
        for (name, value) in params.iter() {
            match name.as_str() {
                "alpha" => self.alpha = float_param(name, value)?,
                "fit_intercept" => self.fit_intercept = bool_param(name, value)?,
                other => return Err(unknown_param(self.name(), other)),
            }
        }
        self.coef = None;
        Ok(())
    }

    fn is_fitted(&self) -> bool {
        self.coef.is_some()
    }

    fn is_linear(&self) -> bool {
        true
    }
}
