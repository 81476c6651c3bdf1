//! Backtesting and hyperparameter search.

pub mod backtesting;
pub mod folds;
pub mod grid_search;

pub use backtesting::{
    backtesting_forecaster, backtesting_forecaster_multiseries, Aggregation, BacktestIntervals,
    BacktestResult, MultiSeriesBacktestResult,
};
pub use folds::{BacktestConfig, Fold, Refit};
pub use grid_search::{
    grid_search_forecaster, grid_search_forecaster_multiseries, random_search_forecaster,
    random_search_forecaster_multiseries, GridSearchConfig, LagsGrid, ParamGrid, SearchResult,
};
