//! Gradient boosting with regression trees and squared loss.

use super::tree::DecisionTreeRegressor;
use super::{
    check_fit_input, check_predict_input, float_param, optional_usize_param,
    regressor_not_fitted, unknown_param, usize_param, ParamSet, ParamValue, Regressor,
};
use crate::core::Matrix;
use crate::error::{ForecastError, Result};
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::SeedableRng;

/// Gradient boosted regression trees.
///
/// Starts from the mean of the target and fits each tree to the residuals of
/// the current ensemble, shrunk by `learning_rate`. With `subsample < 1` each
/// tree sees a random subset of rows drawn from a generator seeded with
/// `random_state`.
#[derive(Debug, Clone)]
pub struct GradientBoostingRegressor {
    n_estimators: usize,
    learning_rate: f64,
    max_depth: Option<usize>,
    min_samples_split: usize,
    min_samples_leaf: usize,
    subsample: f64,
    random_state: Option<u64>,
    init: Option<f64>,
    trees: Vec<DecisionTreeRegressor>,
    n_features: usize,
}

impl Default for GradientBoostingRegressor {
    fn default() -> Self {
        Self::new()
    }
}

impl GradientBoostingRegressor {
    pub fn new() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: Some(3),
            min_samples_split: 2,
            min_samples_leaf: 1,
            subsample: 1.0,
            random_state: None,
            init: None,
            trees: Vec::new(),
            n_features: 0,
        }
    }

    pub fn with_n_estimators(mut self, n_estimators: usize) -> Self {
        self.n_estimators = n_estimators;
        self
    }

    pub fn with_learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = Some(max_depth);
        self
    }

    pub fn with_min_samples_leaf(mut self, min_samples_leaf: usize) -> Self {
        self.min_samples_leaf = min_samples_leaf.max(1);
        self
    }

    pub fn with_subsample(mut self, subsample: f64) -> Self {
        self.subsample = subsample;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Number of fitted trees.
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    fn base_tree(&self) -> DecisionTreeRegressor {
        let tree = DecisionTreeRegressor::new()
            .with_min_samples_split(self.min_samples_split)
            .with_min_samples_leaf(self.min_samples_leaf);
        match self.max_depth {
            Some(d) => tree.with_max_depth(d),
            None => tree,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.n_estimators == 0 {
            return Err(ForecastError::InvalidParameter(
                "n_estimators must be >= 1".to_string(),
            ));
        }
        if !(self.learning_rate > 0.0) {
            return Err(ForecastError::InvalidParameter(format!(
                "learning_rate must be > 0, got {}",
                self.learning_rate
            )));
        }
        if !(self.subsample > 0.0 && self.subsample <= 1.0) {
            return Err(ForecastError::InvalidParameter(format!(
                "subsample must be in (0, 1], got {}",
                self.subsample
            )));
        }
        Ok(())
    }
}

impl Regressor for GradientBoostingRegressor {
    fn fit(&mut self, x: &Matrix, y: &[f64]) -> Result<()> {
        self.validate()?;
        check_fit_input(x, y)?;
        let n = y.len();
        let init = y.iter().sum::<f64>() / n as f64;
        let mut current = vec![init; n];
        let mut rng = match self.random_state {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let n_sub = ((self.subsample * n as f64).round() as usize).clamp(1, n);
        let all_rows: Vec<usize> = (0..n).collect();

        let mut trees = Vec::with_capacity(self.n_estimators);
        for _ in 0..self.n_estimators {
            let residuals: Vec<f64> = y.iter().zip(&current).map(|(t, p)| t - p).collect();
            let rows = if n_sub < n {
                let mut rows = sample(&mut rng, n, n_sub).into_vec();
                rows.sort_unstable();
                rows
            } else {
                all_rows.clone()
            };
            let mut tree = self.base_tree();
            tree.fit_rows(x, &residuals, &rows)?;
            for (i, row) in x.rows().enumerate() {
                if let Some(update) = tree.predict_row(row) {
                    current[i] += self.learning_rate * update;
                }
            }
            trees.push(tree);
        }

        self.init = Some(init);
        self.trees = trees;
        self.n_features = x.n_cols();
        tracing::debug!(
            n_estimators = self.trees.len(),
            init,
            "fitted gradient boosting regressor"
        );
        Ok(())
    }

    fn predict(&self, x: &Matrix) -> Result<Vec<f64>> {
        let init = self.init.ok_or_else(|| regressor_not_fitted(self.name()))?;
        check_predict_input(x, self.n_features)?;
        Ok(x.rows()
            .map(|row| {
                init + self
                    .trees
                    .iter()
                    .filter_map(|t| t.predict_row(row))
                    .map(|v| self.learning_rate * v)
                    .sum::<f64>()
            })
            .collect())
    }

    fn name(&self) -> &str {
        "GradientBoostingRegressor"
    }

    fn params(&self) -> ParamSet {
        let max_depth = match self.max_depth {
            Some(d) => ParamValue::Int(d as i64),
            None => ParamValue::Categorical("None".to_string()),
        };
        let random_state = match self.random_state {
            Some(s) => ParamValue::Int(s as i64),
            None => ParamValue::Categorical("None".to_string()),
        };
        ParamSet::new()
            .with("learning_rate", self.learning_rate)
            .with("max_depth", max_depth)
            .with("min_samples_leaf", self.min_samples_leaf as i64)
            .with("min_samples_split", self.min_samples_split as i64)
            .with("n_estimators", self.n_estimators as i64)
            .with("random_state", random_state)
            .with("subsample", self.subsample)
    }

    fn set_params(&mut self, params: &ParamSet) -> Result<()> {
        for (name, value) in params.iter() {
            match name.as_str() {
                "n_estimators" => self.n_estimators = usize_param(name, value)?,
                "learning_rate" => self.learning_rate = float_param(name, value)?,
                "max_depth" => self.max_depth = optional_usize_param(name, value)?,
                "min_samples_split" => self.min_samples_split = usize_param(name, value)?.max(2),
                "min_samples_leaf" => self.min_samples_leaf = usize_param(name, value)?.max(1),
                "subsample" => self.subsample = float_param(name, value)?,
                "random_state" => {
                    self.random_state = optional_usize_param(name, value)?.map(|s| s as u64)
                }
                other => return Err(unknown_param(self.name(), other)),
            }
        }
        self.init = None;
        self.trees.clear();
        Ok(())
    }

    fn is_fitted(&self) -> bool {
        self.init.is_some()
    }
}
