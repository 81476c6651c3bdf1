//! Exhaustive and random search over lags and regressor hyperparameters.
//!
//! Every candidate is scored by backtesting. Results keep the grid order and
//! are then sorted by the first metric, lowest first.

use super::backtesting::{backtesting_forecaster, backtesting_forecaster_multiseries, Aggregation};
use super::folds::BacktestConfig;
use crate::core::{Exog, TimeSeries};
use crate::error::{ForecastError, Result};
use crate::forecaster::{
    FitOptions, Forecaster, Lags, MultiSeriesExog, MultiSeriesFitOptions, MultiSeriesForecaster,
};
use crate::regressor::{ParamSet, ParamValue};
use crate::utils::metrics::{check_unique_names, Metric};
use crate::utils::stats::nan_last;
use crate::warnings::ForecastWarning;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Hyperparameter candidates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamGrid {
    /// Cartesian product of the value lists, keys in sorted order.
    Product(BTreeMap<String, Vec<ParamValue>>),
    /// Explicit parameter sets, evaluated in order.
    List(Vec<ParamSet>),
}

impl Default for ParamGrid {
    fn default() -> Self {
        ParamGrid::Product(BTreeMap::new())
    }
}

impl ParamGrid {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn list(sets: Vec<ParamSet>) -> Self {
        ParamGrid::List(sets)
    }

    /// Add a parameter and its values to a product grid. No effect on a list.
    pub fn with<V: Into<ParamValue>>(mut self, name: impl Into<String>, values: Vec<V>) -> Self {
        if let ParamGrid::Product(grid) = &mut self {
            grid.insert(name.into(), values.into_iter().map(Into::into).collect());
        }
        self
    }

    /// Parse `{"alpha": [0.1, 1.0]}` as a product or `[{"alpha": 0.1}]` as a list.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| ForecastError::InvalidParameter(format!("invalid param grid: {e}")))
    }

    /// All parameter sets. In a product the last key varies fastest.
    pub fn candidates(&self) -> Vec<ParamSet> {
        match self {
            ParamGrid::List(sets) => sets.clone(),
            ParamGrid::Product(grid) => {
                let mut sets = vec![ParamSet::new()];
                for (name, values) in grid {
                    sets = sets
                        .iter()
                        .flat_map(|set| {
                            values
                                .iter()
                                .map(move |value| set.clone().with(name.clone(), value.clone()))
                        })
                        .collect();
                }
                sets
            }
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ParamGrid::List(sets) => sets.len(),
            ParamGrid::Product(grid) => grid.values().map(Vec::len).product(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Lag candidates.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum LagsGrid {
    /// Keep the forecaster's lags.
    #[default]
    Current,
    /// Each entry is labelled by its lags, e.g. `[1, 2, 3]`.
    List(Vec<Lags>),
    /// Entries labelled by name.
    Labelled(Vec<(String, Lags)>),
}

impl LagsGrid {
    /// Warning raised when a lags grid is given to a forecaster with custom
    /// predictors.
    fn ignored_for(&self, custom: bool) -> Option<ForecastWarning> {
        (custom && *self != LagsGrid::Current).then(|| {
            ForecastWarning::IgnoredArgument(
                "`lags_grid` is ignored since the forecaster uses custom predictors.".to_string(),
            )
        })
    }

    fn candidates(&self, current_label: String, custom: bool) -> Vec<(Option<Lags>, String)> {
        if custom {
            return vec![(None, current_label)];
        }
        match self {
            LagsGrid::Current => vec![(None, current_label)],
            LagsGrid::List(list) => list.iter().map(|l| (Some(l.clone()), l.to_string())).collect(),
            LagsGrid::Labelled(list) => list
                .iter()
                .map(|(label, l)| (Some(l.clone()), label.clone()))
                .collect(),
        }
    }
}

/// Options shared by all search functions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridSearchConfig {
    pub backtest: BacktestConfig,
    /// Refit the forecaster with the best candidate on the whole data.
    pub return_best: bool,
    /// Parameter sets drawn by random search.
    pub n_iter: usize,
    /// Seed of random search.
    pub random_state: u64,
    /// Aggregations of multi-series metrics; the first one ranks candidates.
    pub aggregations: Vec<Aggregation>,
    /// Tab-separated file receiving one row per candidate as it is scored.
    /// The header is written only when the file does not exist yet.
    pub output_file: Option<PathBuf>,
}

impl Default for GridSearchConfig {
    fn default() -> Self {
        Self {
            backtest: BacktestConfig::default(),
            return_best: true,
            n_iter: 10,
            random_state: 123,
            aggregations: Aggregation::ALL.to_vec(),
            output_file: None,
        }
    }
}

impl GridSearchConfig {
    pub fn new(backtest: BacktestConfig) -> Self {
        Self {
            backtest,
            ..Default::default()
        }
    }

    pub fn with_return_best(mut self, return_best: bool) -> Self {
        self.return_best = return_best;
        self
    }

    pub fn with_n_iter(mut self, n_iter: usize) -> Self {
        self.n_iter = n_iter;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    pub fn with_aggregations(mut self, aggregations: Vec<Aggregation>) -> Self {
        self.aggregations = aggregations;
        self
    }

    pub fn with_output_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_file = Some(path.into());
        self
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| ForecastError::InvalidParameter(format!("invalid search config: {e}")))
    }
}

/// Score of one (lags, params) candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    /// Lags set on the forecaster, `None` when its own predictors were kept.
    pub lags: Option<Lags>,
    pub lags_label: String,
    pub params: ParamSet,
    /// `(column, value)`; multi-series columns are named `metric__aggregation`.
    pub metrics: Vec<(String, f64)>,
}

impl SearchResult {
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
    }
}

/// Evaluate every combination of `lags_grid` and `param_grid` by backtesting.
///
/// With `return_best`, `forecaster` is set to the best candidate and refitted
/// on all of `y`.
pub fn grid_search_forecaster<F: Forecaster>(
    forecaster: &mut F,
    y: &TimeSeries,
    exog: Option<&Exog>,
    param_grid: &ParamGrid,
    lags_grid: &LagsGrid,
    metrics: &[Metric],
    config: &GridSearchConfig,
) -> Result<Vec<SearchResult>> {
    let params = param_grid.candidates();
    search_forecaster(forecaster, y, exog, &params, lags_grid, metrics, config)
}

/// Like [`grid_search_forecaster`] on `config.n_iter` parameter sets drawn
/// without replacement from `param_distributions`.
pub fn random_search_forecaster<F: Forecaster>(
    forecaster: &mut F,
    y: &TimeSeries,
    exog: Option<&Exog>,
    param_distributions: &ParamGrid,
    lags_grid: &LagsGrid,
    metrics: &[Metric],
    config: &GridSearchConfig,
) -> Result<Vec<SearchResult>> {
    let params = sample_params(param_distributions, config.n_iter, config.random_state);
    search_forecaster(forecaster, y, exog, &params, lags_grid, metrics, config)
}

/// Multi-series grid search, ranked by the first metric combined with the
/// first aggregation.
#[allow(clippy::too_many_arguments)]
pub fn grid_search_forecaster_multiseries<F: MultiSeriesForecaster>(
    forecaster: &mut F,
    series: &[TimeSeries],
    exog: Option<&MultiSeriesExog>,
    levels: Option<&[String]>,
    param_grid: &ParamGrid,
    lags_grid: &LagsGrid,
    metrics: &[Metric],
    config: &GridSearchConfig,
) -> Result<Vec<SearchResult>> {
    let params = param_grid.candidates();
    search_forecaster_multiseries(
        forecaster, series, exog, levels, &params, lags_grid, metrics, config,
    )
}

/// Multi-series random search.
#[allow(clippy::too_many_arguments)]
pub fn random_search_forecaster_multiseries<F: MultiSeriesForecaster>(
    forecaster: &mut F,
    series: &[TimeSeries],
    exog: Option<&MultiSeriesExog>,
    levels: Option<&[String]>,
    param_distributions: &ParamGrid,
    lags_grid: &LagsGrid,
    metrics: &[Metric],
    config: &GridSearchConfig,
) -> Result<Vec<SearchResult>> {
    let params = sample_params(param_distributions, config.n_iter, config.random_state);
    search_forecaster_multiseries(
        forecaster, series, exog, levels, &params, lags_grid, metrics, config,
    )
}

fn sample_params(grid: &ParamGrid, n_iter: usize, seed: u64) -> Vec<ParamSet> {
    let all = grid.candidates();
    let mut rng = StdRng::seed_from_u64(seed);
    rand::seq::index::sample(&mut rng, all.len(), n_iter.min(all.len()))
        .into_iter()
        .map(|i| all[i].clone())
        .collect()
}

fn check_candidates(params: &[ParamSet], metrics: &[Metric]) -> Result<()> {
    check_unique_names(metrics)?;
    if params.is_empty() {
        return Err(ForecastError::InvalidParameter(
            "The parameter grid has no candidates.".to_string(),
        ));
    }
    Ok(())
}

fn check_exog_length(exog_len: usize, y_len: usize) -> Result<()> {
    if exog_len != y_len {
        return Err(ForecastError::InvalidParameter(format!(
            "`exog` must have same number of samples as `y`. length `exog`: ({}), length `y`: ({})",
            exog_len, y_len
        )));
    }
    Ok(())
}

/// Stable sort by the first metric; missing values last.
fn rank(results: &mut [SearchResult]) {
    results.sort_by(|a, b| {
        let a = a.metrics.first().map_or(f64::NAN, |m| m.1);
        let b = b.metrics.first().map_or(f64::NAN, |m| m.1);
        nan_last(a, b)
    });
}

/// Append `result` to a tab-separated file: lags, label, params, one column
/// per metric, then one column per parameter.
fn write_result_row(path: &Path, result: &SearchResult, current_lags: &str) -> Result<()> {
    let io_error = |e: std::io::Error| {
        ForecastError::IoError(format!("cannot write search results to {}: {e}", path.display()))
    };
    let new_file = !path.exists();
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(io_error)?;

    if new_file {
        let header: Vec<&str> = ["lags", "lags_label", "params"]
            .into_iter()
            .chain(result.metrics.iter().map(|(name, _)| name.as_str()))
            .chain(result.params.iter().map(|(name, _)| name.as_str()))
            .collect();
        writeln!(file, "{}", header.join("\t")).map_err(io_error)?;
    }
    let lags = result
        .lags
        .as_ref()
        .map_or_else(|| current_lags.to_string(), |l| l.to_string());
    let row: Vec<String> = [lags, result.lags_label.clone(), result.params.to_string()]
        .into_iter()
        .chain(result.metrics.iter().map(|(_, v)| v.to_string()))
        .chain(result.params.iter().map(|(_, v)| v.to_string()))
        .collect();
    writeln!(file, "{}", row.join("\t")).map_err(io_error)
}

fn search_forecaster<F: Forecaster>(
    forecaster: &mut F,
    y: &TimeSeries,
    exog: Option<&Exog>,
    params: &[ParamSet],
    lags_grid: &LagsGrid,
    metrics: &[Metric],
    config: &GridSearchConfig,
) -> Result<Vec<SearchResult>> {
    check_candidates(params, metrics)?;
    if config.return_best {
        if let Some(exog) = exog {
            check_exog_length(exog.len(), y.len())?;
        }
    }
    let current_lags = forecaster.lags_label();
    if let Some(warning) = lags_grid.ignored_for(forecaster.uses_custom_predictors()) {
        warning.emit(false);
    }
    let lags = lags_grid.candidates(current_lags.clone(), forecaster.uses_custom_predictors());
    tracing::info!(
        n_models = lags.len() * params.len(),
        n_lags = lags.len(),
        n_params = params.len(),
        "grid search"
    );

    let mut results = Vec::with_capacity(lags.len() * params.len());
    for (lag, label) in &lags {
        let mut with_lags = forecaster.clone();
        if let Some(lag) = lag {
            with_lags.set_lags(lag.clone())?;
        }
        for set in params {
            let mut candidate = with_lags.clone();
            candidate.set_params(set)?;
            let scored =
                backtesting_forecaster(&candidate, y, exog, &config.backtest, metrics, None)?;
            tracing::debug!(lags = %label, params = %set, "candidate evaluated");
            let result = SearchResult {
                lags: lag.clone(),
                lags_label: label.clone(),
                params: set.clone(),
                metrics: scored.metrics,
            };
            if let Some(path) = &config.output_file {
                write_result_row(path, &result, &current_lags)?;
            }
            results.push(result);
        }
    }
    rank(&mut results);

    if config.return_best {
        if let Some(best) = results.first() {
            if let Some(lag) = &best.lags {
                forecaster.set_lags(lag.clone())?;
            }
            forecaster.set_params(&best.params)?;
            forecaster.fit(y, exog, FitOptions::default())?;
            tracing::info!(
                lags = %best.lags_label,
                params = %best.params,
                metric = ?best.metrics.first(),
                "refitted forecaster with the best lags and parameters on the whole data set"
            );
        }
    }
    Ok(results)
}

#[allow(clippy::too_many_arguments)]
fn search_forecaster_multiseries<F: MultiSeriesForecaster>(
    forecaster: &mut F,
    series: &[TimeSeries],
    exog: Option<&MultiSeriesExog>,
    levels: Option<&[String]>,
    params: &[ParamSet],
    lags_grid: &LagsGrid,
    metrics: &[Metric],
    config: &GridSearchConfig,
) -> Result<Vec<SearchResult>> {
    check_candidates(params, metrics)?;
    if config.aggregations.is_empty() {
        return Err(ForecastError::InvalidParameter(
            "At least one aggregation of the level metrics is required.".to_string(),
        ));
    }
    if config.return_best {
        let n = series.first().map_or(0, |s| s.len());
        match exog {
            Some(MultiSeriesExog::Shared(exog)) => check_exog_length(exog.len(), n)?,
            Some(MultiSeriesExog::PerSeries(tables)) => {
                for (name, table) in tables {
                    if let Some(s) = series.iter().find(|s| s.name() == name) {
                        check_exog_length(table.len(), s.len())?;
                    }
                }
            }
            None => {}
        }
    }
    let current_lags = forecaster.lags_label();
    if let Some(warning) = lags_grid.ignored_for(forecaster.uses_custom_predictors()) {
        warning.emit(false);
    }
    let lags = lags_grid.candidates(current_lags.clone(), forecaster.uses_custom_predictors());
    tracing::info!(
        n_models = lags.len() * params.len(),
        n_lags = lags.len(),
        n_params = params.len(),
        "multi-series grid search"
    );

    let mut results = Vec::with_capacity(lags.len() * params.len());
    for (lag, label) in &lags {
        let mut with_lags = forecaster.clone();
        if let Some(lag) = lag {
            with_lags.set_lags(lag.clone())?;
        }
        for set in params {
            let mut candidate = with_lags.clone();
            candidate.set_params(set)?;
            let scored = backtesting_forecaster_multiseries(
                &candidate,
                series,
                exog,
                levels,
                &config.backtest,
                metrics,
                &config.aggregations,
                None,
            )?;
            let mut columns = Vec::with_capacity(metrics.len() * config.aggregations.len());
            for metric in metrics {
                for &aggregation in &config.aggregations {
                    let value = scored
                        .aggregated_metric(aggregation, metric.name())
                        .unwrap_or(f64::NAN);
                    columns.push((format!("{}__{}", metric.name(), aggregation.name()), value));
                }
            }
            tracing::debug!(lags = %label, params = %set, "candidate evaluated");
            let result = SearchResult {
                lags: lag.clone(),
                lags_label: label.clone(),
                params: set.clone(),
                metrics: columns,
            };
            if let Some(path) = &config.output_file {
                write_result_row(path, &result, &current_lags)?;
            }
            results.push(result);
        }
    }
    rank(&mut results);

    if config.return_best {
        if let Some(best) = results.first() {
            if let Some(lag) = &best.lags {
                forecaster.set_lags(lag.clone())?;
            }
            forecaster.set_params(&best.params)?;
            forecaster.fit(series, exog, &MultiSeriesFitOptions::default())?;
            tracing::info!(
                lags = %best.lags_label,
                params = %best.params,
                metric = ?best.metrics.first(),
                "refitted forecaster with the best lags and parameters on the whole data set"
            );
        }
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecaster::{CustomPredictors, ForecasterAutoreg, ForecasterAutoregMultiSeries};
    use crate::regressor::{LinearRegression, Ridge};

    fn noisy_series(n: usize) -> TimeSeries {
        let values = (0..n)
            .map(|i| {
                let t = i as f64;
                20.0 + 3.0 * (t * 0.5).sin() + 0.3 * ((i * 13) % 7) as f64
            })
            .collect();
        TimeSeries::from_values("y", values)
    }

    #[test]
    fn product_grid_order() {
        let grid = ParamGrid::new()
            .with("b", vec![1_i64, 2])
            .with("a", vec![true, false]);
        let sets = grid.candidates();
        assert_eq!(grid.len(), 4);
        assert_eq!(sets.len(), 4);
        assert_eq!(sets[0], ParamSet::new().with("a", true).with("b", 1_i64));
        assert_eq!(sets[1], ParamSet::new().with("a", true).with("b", 2_i64));
        assert_eq!(sets[2], ParamSet::new().with("a", false).with("b", 1_i64));
    }

    #[test]
    fn empty_product_has_one_candidate() {
        assert_eq!(ParamGrid::new().candidates(), vec![ParamSet::new()]);
        assert!(ParamGrid::list(vec![]).is_empty());
    }

    #[test]
    fn grid_from_json() {
        let product = ParamGrid::from_json(r#"{"alpha": [0.1, 1.0]}"#).unwrap();
        assert_eq!(product.len(), 2);
        let list = ParamGrid::from_json(r#"[{"alpha": 0.1}, {"fit_intercept": false}]"#).unwrap();
        assert!(matches!(list, ParamGrid::List(ref sets) if sets.len() == 2));
    }

    #[test]
    fn lags_grid_labels() {
        let grid = LagsGrid::Labelled(vec![("short".to_string(), Lags::new(2).unwrap())]);
        let candidates = grid.candidates("[1]".to_string(), false);
        assert_eq!(candidates[0].1, "short");
        let candidates = LagsGrid::List(vec![Lags::from_list(&[1, 3]).unwrap()])
            .candidates("[1]".to_string(), false);
        assert_eq!(candidates[0].1, "[1, 3]");
        let candidates = LagsGrid::List(vec![Lags::new(2).unwrap()])
            .candidates("custom predictors".to_string(), true);
        assert_eq!(candidates, vec![(None, "custom predictors".to_string())]);
    }

    #[test]
    fn results_sorted_by_first_metric() {
        let y = noisy_series(80);
        let mut forecaster = ForecasterAutoreg::new(Ridge::new(1.0), Lags::new(2).unwrap());
        let grid = ParamGrid::new().with("alpha", vec![0.01, 1.0, 100.0]);
        let lags = LagsGrid::List(vec![Lags::new(2).unwrap(), Lags::new(4).unwrap()]);
        let config = GridSearchConfig::new(BacktestConfig::new(5, 50));
        let results = grid_search_forecaster(
            &mut forecaster,
            &y,
            None,
            &grid,
            &lags,
            &[Metric::MeanSquaredError, Metric::MeanAbsoluteError],
            &config,
        )
        .unwrap();
        assert_eq!(results.len(), 6);
        assert!(results
            .windows(2)
            .all(|w| w[0].metrics[0].1 <= w[1].metrics[0].1));
        assert_eq!(results[0].metrics[1].0, "mean_absolute_error");

        let best = &results[0];
        assert!(forecaster.is_fitted());
        assert_eq!(forecaster.lags_label(), best.lags_label);
        assert_eq!(forecaster.regressor_params().get("alpha"), best.params.get("alpha"));
    }

    #[test]
    fn without_return_best_forecaster_is_untouched() {
        let y = noisy_series(60);
        let mut forecaster = ForecasterAutoreg::new(LinearRegression::new(), Lags::new(3).unwrap());
        let config = GridSearchConfig::new(BacktestConfig::new(4, 40)).with_return_best(false);
        let results = grid_search_forecaster(
            &mut forecaster,
            &y,
            None,
            &ParamGrid::new(),
            &LagsGrid::Current,
            &[Metric::MeanAbsoluteError],
            &config,
        )
        .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].lags_label, "[1, 2, 3]");
        assert!(!forecaster.is_fitted());
    }

    #[test]
    fn exog_length_checked_before_search() {
        let y = noisy_series(60);
        let exog = Exog::from_column("x", vec![1.0; 50]);
        let mut forecaster = ForecasterAutoreg::new(LinearRegression::new(), Lags::new(3).unwrap());
        let err = grid_search_forecaster(
            &mut forecaster,
            &y,
            Some(&exog),
            &ParamGrid::new(),
            &LagsGrid::Current,
            &[Metric::MeanAbsoluteError],
            &GridSearchConfig::new(BacktestConfig::new(4, 40)),
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid parameter: `exog` must have same number of samples as `y`. \
             length `exog`: (50), length `y`: (60)"
        );
    }

    #[test]
    fn custom_predictors_ignore_lags_grid() {
        let y = noisy_series(60);
        let custom = CustomPredictors::new(
            |w: &[f64]| vec![w[w.len() - 1], w.iter().sum::<f64>() / w.len() as f64],
            4,
            vec!["last".to_string(), "mean_4".to_string()],
        )
        .unwrap();
        let mut forecaster = ForecasterAutoreg::new(LinearRegression::new(), custom);
        let results = grid_search_forecaster(
            &mut forecaster,
            &y,
            None,
            &ParamGrid::new(),
            &LagsGrid::List(vec![Lags::new(2).unwrap(), Lags::new(3).unwrap()]),
            &[Metric::MeanAbsoluteError],
            &GridSearchConfig::new(BacktestConfig::new(4, 40)).with_return_best(false),
        )
        .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].lags_label, "custom predictors");
        assert!(results[0].lags.is_none());
    }

    #[test]
    fn random_search_is_seeded_and_without_replacement() {
        let grid = ParamGrid::new().with("alpha", vec![0.1, 0.5, 1.0, 5.0, 10.0]);
        let first = sample_params(&grid, 3, 7);
        assert_eq!(first, sample_params(&grid, 3, 7));
        assert_eq!(first.len(), 3);
        for (i, a) in first.iter().enumerate() {
            assert!(first[i + 1..].iter().all(|b| a != b));
        }
        assert_eq!(sample_params(&grid, 50, 7).len(), 5);

        let y = noisy_series(70);
        let mut forecaster = ForecasterAutoreg::new(Ridge::new(1.0), Lags::new(3).unwrap());
        let results = random_search_forecaster(
            &mut forecaster,
            &y,
            None,
            &grid,
            &LagsGrid::Current,
            &[Metric::MeanAbsoluteError],
            &GridSearchConfig::new(BacktestConfig::new(5, 50)).with_n_iter(2),
        )
        .unwrap();
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn multiseries_columns_and_ranking() {
        let a = TimeSeries::from_values(
            "a",
            (0..50).map(|i| 5.0 + (i as f64 * 0.4).sin()).collect(),
        );
        let b = TimeSeries::from_values(
            "b",
            (0..50).map(|i| 10.0 + (i as f64 * 0.3).cos()).collect(),
        );
        let mut forecaster =
            ForecasterAutoregMultiSeries::new(Ridge::new(1.0), Lags::new(3).unwrap());
        let config = GridSearchConfig::new(BacktestConfig::new(5, 35))
            .with_aggregations(vec![Aggregation::WeightedAverage, Aggregation::Pooling]);
        let results = grid_search_forecaster_multiseries(
            &mut forecaster,
            &[a, b],
            None,
            None,
            &ParamGrid::new().with("alpha", vec![0.1, 10.0]),
            &LagsGrid::Current,
            &[Metric::MeanAbsoluteError],
            &config,
        )
        .unwrap();
        assert_eq!(results.len(), 2);
        let names: Vec<&str> = results[0].metrics.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "mean_absolute_error__weighted_average",
                "mean_absolute_error__pooling"
            ]
        );
        assert!(results[0].metrics[0].1 <= results[1].metrics[0].1);
        assert!(forecaster.is_fitted());
    }

    #[test]
    fn duplicate_metrics_rejected() {
        let y = noisy_series(60);
        let mut forecaster = ForecasterAutoreg::new(LinearRegression::new(), Lags::new(3).unwrap());
        let metrics = vec![
            Metric::custom("mae", |t: &[f64], p: &[f64]| {
                t.iter().zip(p).map(|(a, b)| (a - b).abs()).sum::<f64>()
            }),
            Metric::custom("mae", |_: &[f64], _: &[f64]| 0.0),
        ];
        let err = grid_search_forecaster(
            &mut forecaster,
            &y,
            None,
            &ParamGrid::new(),
            &LagsGrid::Current,
            &metrics,
            &GridSearchConfig::new(BacktestConfig::new(4, 40)),
        )
        .unwrap_err();
        assert!(err.to_string().contains("each metric name must be unique"));
    }

    fn scored(label: &str, value: f64) -> SearchResult {
        SearchResult {
            lags: None,
            lags_label: label.to_string(),
            params: ParamSet::new(),
            metrics: vec![("mean_absolute_scaled_error".to_string(), value)],
        }
    }

    #[test]
    fn nan_scores_rank_last_whatever_their_sign() {
        let zero = 0.0_f64;
        let undefined = zero / zero;
        let mut results = vec![
            scored("good", 2.0),
            scored("undefined", undefined),
            scored("negative_nan", -f64::NAN),
            scored("better", 1.0),
        ];
        rank(&mut results);
        let labels: Vec<&str> = results.iter().map(|r| r.lags_label.as_str()).collect();
        assert_eq!(labels, vec!["better", "good", "undefined", "negative_nan"]);
    }

    #[test]
    fn lags_grid_with_custom_predictors_warns() {
        let grid = LagsGrid::List(vec![Lags::new(2).unwrap()]);
        assert!(matches!(
            grid.ignored_for(true),
            Some(ForecastWarning::IgnoredArgument(_))
        ));
        assert_eq!(grid.ignored_for(false), None);
        assert_eq!(LagsGrid::Current.ignored_for(true), None);
    }

    fn output_path(name: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "autoreg_forecast_{}_{}.txt",
            name,
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);
        path
    }

    fn read_rows(path: &Path) -> Vec<Vec<String>> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|line| line.split('\t').map(str::to_string).collect())
            .collect()
    }

    fn search_with_output(path: &Path, metrics: &[Metric]) -> Vec<SearchResult> {
        let y = noisy_series(60);
        let mut forecaster = ForecasterAutoreg::new(Ridge::new(1.0), Lags::new(2).unwrap());
        let grid = ParamGrid::list(vec![
            ParamSet::new().with("alpha", 0.01),
            ParamSet::new().with("alpha", 0.1),
            ParamSet::new().with("alpha", 1.0),
        ]);
        let lags = LagsGrid::List(vec![Lags::new(2).unwrap(), Lags::new(4).unwrap()]);
        let config = GridSearchConfig::new(BacktestConfig::new(3, 48))
            .with_return_best(false)
            .with_output_file(path);
        grid_search_forecaster(&mut forecaster, &y, None, &grid, &lags, metrics, &config).unwrap()
    }

    #[test]
    fn output_file_with_single_metric() {
        let path = output_path("single_metric");
        let results = search_with_output(&path, &[Metric::MeanSquaredError]);
        let rows = read_rows(&path);
        std::fs::remove_file(&path).unwrap();

        assert_eq!(
            rows[0],
            vec!["lags", "lags_label", "params", "mean_squared_error", "alpha"]
        );
        assert_eq!(rows.len(), 1 + results.len());
        // Rows are written in evaluation order, before ranking.
        assert_eq!(rows[1][0], "[1, 2]");
        assert_eq!(rows[1][2], "{'alpha': 0.01}");
        assert_eq!(rows[1][4], "0.01");
        assert_eq!(rows[6][0], "[1, 2, 3, 4]");

        let mut scores: Vec<f64> = rows[1..].iter().map(|r| r[3].parse().unwrap()).collect();
        scores.sort_by(|a, b| a.total_cmp(b));
        let ranked: Vec<f64> = results.iter().map(|r| r.metrics[0].1).collect();
        assert_eq!(scores, ranked);
    }

    #[test]
    fn output_file_with_two_metrics() {
        let path = output_path("two_metrics");
        let results = search_with_output(
            &path,
            &[Metric::MeanSquaredError, Metric::MeanAbsoluteError],
        );
        let rows = read_rows(&path);
        std::fs::remove_file(&path).unwrap();

        assert_eq!(
            rows[0],
            vec![
                "lags",
                "lags_label",
                "params",
                "mean_squared_error",
                "mean_absolute_error",
                "alpha"
            ]
        );
        let best = &results[0];
        let row = rows[1..]
            .iter()
            .find(|r| r[1] == best.lags_label && r[2] == best.params.to_string())
            .unwrap();
        assert_eq!(row[3].parse::<f64>().unwrap(), best.metrics[0].1);
        assert_eq!(row[4].parse::<f64>().unwrap(), best.metrics[1].1);
    }

    #[test]
    fn output_file_appends_without_repeating_header() {
        let path = output_path("append");
        search_with_output(&path, &[Metric::MeanSquaredError]);
        search_with_output(&path, &[Metric::MeanSquaredError]);
        let rows = read_rows(&path);
        std::fs::remove_file(&path).unwrap();

        assert_eq!(rows.len(), 1 + 2 * 6);
        assert_eq!(rows.iter().filter(|r| r[0] == "lags").count(), 1);
        assert_eq!(rows[1..7], rows[7..]);
    }
}
