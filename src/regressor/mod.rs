//! Tabular regressors that forecasters delegate to.
//!
//! A forecaster only needs `fit` and `predict` on a dense feature matrix plus a
//! way to read and overwrite hyperparameters, so any model implementing
//! [`Regressor`] can be turned into a forecaster.

mod boosting;
mod linear;
mod tree;

pub use boosting::GradientBoostingRegressor;
pub use linear::{LinearRegression, Ridge};
pub use tree::DecisionTreeRegressor;

use crate::core::Matrix;
use crate::error::{ForecastError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Common interface of tabular regressors.
pub trait Regressor: Clone + fmt::Debug + Send + Sync {
    /// Fit on `x` (one row per sample) and target `y`.
    fn fit(&mut self, x: &Matrix, y: &[f64]) -> Result<()>;

    /// Predict one value per row of `x`.
    fn predict(&self, x: &Matrix) -> Result<Vec<f64>>;

    /// Short model name.
    fn name(&self) -> &str;

    /// Current hyperparameters.
    fn params(&self) -> ParamSet;

    /// Overwrite the given hyperparameters; other ones are left untouched.
    fn set_params(&mut self, params: &ParamSet) -> Result<()>;

    /// Whether the model is fitted.
    fn is_fitted(&self) -> bool;

    /// Linear models are sensitive to the scale of the series.
    fn is_linear(&self) -> bool {
        false
    }
}

/// A hyperparameter value that can be of different types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Categorical(String),
}

impl ParamValue {
    /// Numeric value; integers are widened.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Float(v) => Some(*v),
            ParamValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            ParamValue::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_categorical(&self) -> Option<&str> {
        match self {
            ParamValue::Categorical(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(true) => f.write_str("True"),
            ParamValue::Bool(false) => f.write_str("False"),
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::Float(v) => write!(f, "{:?}", v),
            ParamValue::Categorical(v) => write!(f, "'{}'", v),
        }
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Categorical(v.to_string())
    }
}

/// Named hyperparameters, ordered by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParamSet {
    params: BTreeMap<String, ParamValue>,
}

impl ParamSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a parameter value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) {
        self.params.insert(name.into(), value.into());
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.params.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.params.iter()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Parse from a JSON object such as `{"alpha": 0.1, "fit_intercept": true}`.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| ForecastError::InvalidParameter(format!("invalid params json: {}", e)))
    }
}

impl fmt::Display for ParamSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let items: Vec<String> = self
            .params
            .iter()
            .map(|(k, v)| format!("'{}': {}", k, v))
            .collect();
        write!(f, "{{{}}}", items.join(", "))
    }
}

impl FromIterator<(String, ParamValue)> for ParamSet {
    fn from_iter<I: IntoIterator<Item = (String, ParamValue)>>(iter: I) -> Self {
        Self {
            params: iter.into_iter().collect(),
        }
    }
}

pub(crate) fn unknown_param(model: &str, name: &str) -> ForecastError {
    ForecastError::InvalidParameter(format!(
        "Invalid parameter '{}' for estimator {}.",
        name, model
    ))
}

pub(crate) fn float_param(name: &str, value: &ParamValue) -> Result<f64> {
    value.as_f64().ok_or_else(|| {
        ForecastError::InvalidParameter(format!("parameter '{}' must be numeric, got {}", name, value))
    })
}

pub(crate) fn usize_param(name: &str, value: &ParamValue) -> Result<usize> {
    value
        .as_int()
        .filter(|v| *v >= 0)
        .map(|v| v as usize)
        .ok_or_else(|| {
            ForecastError::InvalidParameter(format!(
                "parameter '{}' must be a non-negative integer, got {}",
                name, value
            ))
        })
}

pub(crate) fn bool_param(name: &str, value: &ParamValue) -> Result<bool> {
    value.as_bool().ok_or_else(|| {
        ForecastError::InvalidParameter(format!("parameter '{}' must be a bool, got {}", name, value))
    })
}

/// `max_depth` style parameter where a categorical `None` disables the limit.
pub(crate) fn optional_usize_param(name: &str, value: &ParamValue) -> Result<Option<usize>> {
    match value {
        ParamValue::Categorical(s) if s.eq_ignore_ascii_case("none") => Ok(None),
        other => usize_param(name, other).map(Some),
    }
}

/// Validate training input shared by all regressors.
pub(crate) fn check_fit_input(x: &Matrix, y: &[f64]) -> Result<()> {
    if x.n_rows() != y.len() {
        return Err(ForecastError::DimensionMismatch {
            expected: x.n_rows(),
            got: y.len(),
        });
    }
    if y.is_empty() {
        return Err(ForecastError::EmptyData);
    }
    if y.iter().chain(x.as_slice()).any(|v| !v.is_finite()) {
        return Err(ForecastError::MissingValues(
            "training data contains NaN or infinite values".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn check_predict_input(x: &Matrix, n_features: usize) -> Result<()> {
    if x.n_cols() != n_features {
        return Err(ForecastError::DimensionMismatch {
            expected: n_features,
            got: x.n_cols(),
        });
    }
    Ok(())
}

pub(crate) fn regressor_not_fitted(name: &str) -> ForecastError {
    ForecastError::NotFitted(format!(
        "This {} instance is not fitted yet. Call `fit` before `predict`.",
        name
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn param_set_is_ordered_and_displays_like_a_dict() {
        let params = ParamSet::new()
            .with("n_estimators", 10i64)
            .with("alpha", 0.5)
            .with("fit_intercept", true);
        assert_eq!(
            params.to_string(),
            "{'alpha': 0.5, 'fit_intercept': True, 'n_estimators': 10}"
        );
    }

    #[test]
    fn param_set_from_json() {
        let params = ParamSet::from_json(r#"{"alpha": 0.1, "max_depth": 3, "flag": false}"#).unwrap();
        assert_eq!(params.get("alpha"), Some(&ParamValue::Float(0.1)));
        assert_eq!(params.get("max_depth"), Some(&ParamValue::Int(3)));
        assert_eq!(params.get("flag"), Some(&ParamValue::Bool(false)));
        assert!(ParamSet::from_json("[1, 2]").is_err());
    }

    #[test]
    fn numeric_params_are_widened() {
        assert_eq!(ParamValue::Int(3).as_f64(), Some(3.0));
        assert_eq!(ParamValue::Float(4.0).as_int(), Some(4));
        assert_eq!(ParamValue::Float(4.5).as_int(), None);
        assert!(usize_param("x", &ParamValue::Int(-1)).is_err());
        assert_eq!(
            optional_usize_param("max_depth", &"None".into()).unwrap(),
            None
        );
    }

    #[test]
    fn fit_input_checks() {
        let x = Matrix::from_rows(&[vec![1.0], vec![2.0]]).unwrap();
        assert!(check_fit_input(&x, &[1.0]).is_err());
        assert!(check_fit_input(&x, &[1.0, f64::NAN]).is_err());
        assert!(check_fit_input(&x, &[1.0, 2.0]).is_ok());
    }
}
