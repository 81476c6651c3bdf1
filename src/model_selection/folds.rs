//! Train/test splits used by backtesting.

use crate::error::{ForecastError, Result};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// When the forecaster is retrained between folds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Refit {
    /// Train once, on the initial training window.
    #[default]
    Never,
    /// Retrain before every fold.
    Always,
    /// Retrain every `n` folds.
    Every(usize),
}

impl Refit {
    fn refits_at(&self, fold: usize) -> bool {
        match self {
            Refit::Never => fold == 0,
            Refit::Always => true,
            Refit::Every(n) => fold % n == 0,
        }
    }
}

/// Configuration of a backtesting run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    /// Number of observations predicted in each fold.
    pub steps: usize,
    /// Observations used to train the forecaster the first time.
    pub initial_train_size: usize,
    /// Slide the training window instead of expanding it.
    pub fixed_train_size: bool,
    /// Observations skipped between the end of training and the test window.
    pub gap: usize,
    pub refit: Refit,
    /// Keep the last fold when it has fewer than `steps` observations.
    pub allow_incomplete_fold: bool,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            steps: 1,
            initial_train_size: 0,
            fixed_train_size: false,
            gap: 0,
            refit: Refit::Never,
            allow_incomplete_fold: true,
        }
    }
}

impl BacktestConfig {
    pub fn new(steps: usize, initial_train_size: usize) -> Self {
        Self {
            steps,
            initial_train_size,
            ..Default::default()
        }
    }

    pub fn with_fixed_train_size(mut self, fixed: bool) -> Self {
        self.fixed_train_size = fixed;
        self
    }

    pub fn with_gap(mut self, gap: usize) -> Self {
        self.gap = gap;
        self
    }

    pub fn with_refit(mut self, refit: Refit) -> Self {
        self.refit = refit;
        self
    }

    pub fn with_allow_incomplete_fold(mut self, allow: bool) -> Self {
        self.allow_incomplete_fold = allow;
        self
    }

    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| ForecastError::InvalidParameter(format!("invalid backtest config: {e}")))
    }

    /// Split `n` observations into folds for a forecaster needing
    /// `window_size` past values.
    pub fn folds(&self, n: usize, window_size: usize) -> Result<Vec<Fold>> {
        if self.steps == 0 {
            return Err(ForecastError::InvalidParameter(
                "`steps` must be an integer greater than or equal to 1.".to_string(),
            ));
        }
        if self.refit == Refit::Every(0) {
            return Err(ForecastError::InvalidParameter(
                "`refit` must be a boolean or an integer greater than 0.".to_string(),
            ));
        }
        if self.initial_train_size < window_size || self.initial_train_size >= n {
            return Err(ForecastError::InvalidParameter(format!(
                "`initial_train_size` must be an integer greater than or equal to the \
                 window_size of the forecaster ({}) and smaller than the length of `y` ({}).",
                window_size, n
            )));
        }

        let mut folds = Vec::new();
        let mut train_end = self.initial_train_size;
        loop {
            let test_start = train_end + self.gap;
            if test_start >= n {
                break;
            }
            let test_end = (test_start + self.steps).min(n);
            if test_end - test_start < self.steps && !self.allow_incomplete_fold {
                break;
            }
            let train_start = if self.fixed_train_size {
                train_end - self.initial_train_size
            } else {
                0
            };
            folds.push(Fold {
                train: train_start..train_end,
                last_window: train_end - window_size..train_end,
                test: test_start..test_end,
                refit: self.refit.refits_at(folds.len()),
            });
            train_end += self.steps;
        }

        if folds.is_empty() {
            return Err(ForecastError::InvalidParameter(format!(
                "There are no complete test folds after `initial_train_size` ({}) and `gap` ({}) \
                 for a series of length {}.",
                self.initial_train_size, self.gap, n
            )));
        }
        tracing::debug!(
            n_folds = folds.len(),
            refits = folds.iter().filter(|f| f.refit).count(),
            "backtesting folds"
        );
        Ok(folds)
    }
}

/// One backtesting fold. All ranges are positions in the full series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fold {
    pub train: Range<usize>,
    /// Observations predictions start from.
    pub last_window: Range<usize>,
    pub test: Range<usize>,
    /// Whether the forecaster is trained before predicting this fold.
    pub refit: bool,
}

impl Fold {
    /// Steps predicted in this fold, gap included.
    pub fn horizon(&self) -> usize {
        self.test.end - self.train.end
    }

    /// Leading predictions that fall inside the gap.
    pub fn n_gap(&self) -> usize {
        self.test.start - self.train.end
    }
}
