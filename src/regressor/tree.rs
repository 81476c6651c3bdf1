//! CART regression tree.

use super::{
    check_fit_input, check_predict_input, optional_usize_param, regressor_not_fitted,
    unknown_param, usize_param, ParamSet, ParamValue, Regressor,
};
use crate::core::Matrix;
use crate::error::{ForecastError, Result};
use crate::utils::stats::nan_last;

#[derive(Debug, Clone)]
pub(crate) enum TreeNode {
    Leaf {
        value: f64,
    },
    /// Samples with `x[feature] <= threshold` go left, everything else
    /// (including NaN) goes right.
    Split {
        feature: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

impl TreeNode {
    fn predict_one(&self, row: &[f64]) -> f64 {
        let mut node = self;
        loop {
            match node {
                TreeNode::Leaf { value } => return *value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row[*feature] <= *threshold {
                        left
                    } else {
                        right
                    };
                }
            }
        }
    }

    pub(crate) fn depth(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 0,
            TreeNode::Split { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }
}

/// Decision tree regressor using variance reduction (squared error) splits.
#[derive(Debug, Clone)]
pub struct DecisionTreeRegressor {
    max_depth: Option<usize>,
    min_samples_split: usize,
    min_samples_leaf: usize,
    root: Option<TreeNode>,
    n_features: usize,
}

impl Default for DecisionTreeRegressor {
    fn default() -> Self {
        Self::new()
    }
}

impl DecisionTreeRegressor {
    pub fn new() -> Self {
        Self {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            root: None,
            n_features: 0,
        }
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples.max(2);
        self
    }

    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples.max(1);
        self
    }

    /// Depth of the fitted tree.
    pub fn depth(&self) -> Option<usize> {
        self.root.as_ref().map(|r| r.depth())
    }

    /// Fit on a subset of rows. Used by gradient boosting.
    pub(crate) fn fit_rows(&mut self, x: &Matrix, y: &[f64], rows: &[usize]) -> Result<()> {
        if rows.is_empty() {
            return Err(ForecastError::EmptyData);
        }
        let mut rows = rows.to_vec();
        self.n_features = x.n_cols();
        self.root = Some(self.build(x, y, &mut rows, 0));
        Ok(())
    }

    fn build(&self, x: &Matrix, y: &[f64], rows: &mut [usize], depth: usize) -> TreeNode {
        let n = rows.len();
        let value = rows.iter().map(|&i| y[i]).sum::<f64>() / n as f64;

        let depth_reached = self.max_depth.is_some_and(|d| depth >= d);
        if depth_reached || n < self.min_samples_split || n < 2 * self.min_samples_leaf {
            return TreeNode::Leaf { value };
        }

        let Some((feature, threshold)) = self.best_split(x, y, rows) else {
            return TreeNode::Leaf { value };
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .iter()
            .partition(|&&i| x.get(i, feature) <= threshold);
        let mut left_rows = left_rows;
        let mut right_rows = right_rows;
        TreeNode::Split {
            feature,
            threshold,
            left: Box::new(self.build(x, y, &mut left_rows, depth + 1)),
            right: Box::new(self.build(x, y, &mut right_rows, depth + 1)),
        }
    }

    /// Best `(feature, threshold)` by squared error reduction.
    fn best_split(&self, x: &Matrix, y: &[f64], rows: &mut [usize]) -> Option<(usize, f64)> {
        let n = rows.len();
        let total_sum: f64 = rows.iter().map(|&i| y[i]).sum();
        let total_sq: f64 = rows.iter().map(|&i| y[i] * y[i]).sum();
        let parent_sse = total_sq - total_sum * total_sum / n as f64;

        let mut best: Option<(usize, f64, f64)> = None;
        for feature in 0..x.n_cols() {
            rows.sort_by(|&a, &b| nan_last(x.get(a, feature), x.get(b, feature)));
            let mut left_sum = 0.0;
            let mut left_sq = 0.0;
            for k in 0..n - 1 {
                let yi = y[rows[k]];
                left_sum += yi;
                left_sq += yi * yi;

                let here = x.get(rows[k], feature);
                let next = x.get(rows[k + 1], feature);
                if here == next {
                    continue;
                }
                let n_left = k + 1;
                let n_right = n - n_left;
                if n_left < self.min_samples_leaf || n_right < self.min_samples_leaf {
                    continue;
                }
                let right_sum = total_sum - left_sum;
                let right_sq = total_sq - left_sq;
                let sse = (left_sq - left_sum * left_sum / n_left as f64)
                    + (right_sq - right_sum * right_sum / n_right as f64);
                let gain = parent_sse - sse;
                if gain > 1e-12 && best.map_or(true, |(_, _, g)| gain > g) {
                    best = Some((feature, (here + next) / 2.0, gain));
                }
            }
        }
        best.map(|(f, t, _)| (f, t))
    }

    pub(crate) fn predict_row(&self, row: &[f64]) -> Option<f64> {
        self.root.as_ref().map(|r| r.predict_one(row))
    }
}

impl Regressor for DecisionTreeRegressor {
    fn fit(&mut self, x: &Matrix, y: &[f64]) -> Result<()> {
        check_fit_input(x, y)?;
        let rows: Vec<usize> = (0..y.len()).collect();
        self.fit_rows(x, y, &rows)
    }

    fn predict(&self, x: &Matrix) -> Result<Vec<f64>> {
        let root = self
            .root
            .as_ref()
            .ok_or_else(|| regressor_not_fitted(self.name()))?;
        check_predict_input(x, self.n_features)?;
        Ok(x.rows().map(|row| root.predict_one(row)).collect())
    }

    fn name(&self) -> &str {
        "DecisionTreeRegressor"
    }

    fn params(&self) -> ParamSet {
        let max_depth = match self.max_depth {
            Some(d) => ParamValue::Int(d as i64),
            None => ParamValue::Categorical("None".to_string()),
        };
        ParamSet::new()
            .with("max_depth", max_depth)
            .with("min_samples_leaf", self.min_samples_leaf as i64)
            .with("min_samples_split", self.min_samples_split as i64)
    }

    fn set_params(&mut self, params: &ParamSet) -> Result<()> {
        for (name, value) in params.iter() {
            match name.as_str() {
                "max_depth" => self.max_depth = optional_usize_param(name, value)?,
                "min_samples_split" => self.min_samples_split = usize_param(name, value)?.max(2),
                "min_samples_leaf" => self.min_samples_leaf = usize_param(name, value)?.max(1),
                other => return Err(unknown_param(self.name(), other)),
            }
        }
        self.root = None;
        Ok(())
    }

    fn is_fitted(&self) -> bool {
        self.root.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn step_data() -> (Matrix, Vec<f64>) {
        let x = Matrix::from_rows(&(0..10).map(|i| vec![i as f64]).collect::<Vec<_>>()).unwrap();
        let y = (0..10).map(|i| if i < 5 { 1.0 } else { 3.0 }).collect();
        (x, y)
    }

    #[test]
    fn learns_a_step_function() {
        let (x, y) = step_data();
        let mut tree = DecisionTreeRegressor::new();
        tree.fit(&x, &y).unwrap();
        assert_eq!(tree.depth(), Some(1));

        let test = Matrix::from_rows(&[vec![2.0], vec![4.6], vec![8.0]]).unwrap();
        let pred = tree.predict(&test).unwrap();
        assert_relative_eq!(pred[0], 1.0);
        assert_relative_eq!(pred[1], 3.0);
        assert_relative_eq!(pred[2], 3.0);
    }

    #[test]
    fn max_depth_zero_predicts_mean() {
        let (x, y) = step_data();
        let mut tree = DecisionTreeRegressor::new().with_max_depth(0);
        tree.fit(&x, &y).unwrap();
        let pred = tree.predict(&x).unwrap();
        assert!(pred.iter().all(|p| (p - 2.0).abs() < 1e-12));
    }

    #[test]
    fn nan_feature_goes_right() {
        let (x, y) = step_data();
        let mut tree = DecisionTreeRegressor::new();
        tree.fit(&x, &y).unwrap();
        let test = Matrix::from_rows(&[vec![f64::NAN]]).unwrap();
        assert_relative_eq!(tree.predict(&test).unwrap()[0], 3.0);
    }

    #[test]
    fn min_samples_leaf_limits_splits() {
        let (x, y) = step_data();
        let mut tree = DecisionTreeRegressor::new().with_min_samples_leaf(6);
        tree.fit(&x, &y).unwrap();
        assert_eq!(tree.depth(), Some(0));
    }

    #[test]
    fn params_round_trip() {
        let mut tree = DecisionTreeRegressor::new();
        tree.set_params(&ParamSet::new().with("max_depth", 3i64))
            .unwrap();
        assert_eq!(tree.params().get("max_depth"), Some(&ParamValue::Int(3)));
        tree.set_params(&ParamSet::new().with("max_depth", "None"))
            .unwrap();
        assert_eq!(
            tree.params().get("max_depth"),
            Some(&ParamValue::Categorical("None".into()))
        );
    }
}
