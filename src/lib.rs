//! # autoreg-forecast
//!
//! Turn tabular regressors into multi-step time series forecasters.
//!
//! Provides recursive, direct and global multi-series forecasters over any
//! [`regressor::Regressor`], a recurrent-network forecaster, bootstrapped
//! prediction intervals, backtesting and hyperparameter search.

// Allow some clippy warnings for cleaner code in specific cases
#![allow(clippy::too_many_arguments)]
#![allow(clippy::type_complexity)]
#![allow(clippy::needless_range_loop)]

pub mod core;
pub mod error;
pub mod forecaster;
pub mod model_selection;
pub mod nn;
pub mod preprocessing;
pub mod regressor;
pub mod utils;
pub mod warnings;

pub use error::{ForecastError, Result};

pub mod prelude {
    pub use crate::core::{Exog, Forecast, SeriesIndex, TimeSeries};
    pub use crate::error::{ForecastError, Result};
    pub use crate::forecaster::{
        BootstrapConfig, FitOptions, Forecaster, ForecasterAutoreg, ForecasterAutoregDirect,
        ForecasterAutoregMultiSeries, ForecasterRnn, Lags, MultiSeriesForecaster, PredictOptions,
    };
    pub use crate::model_selection::{backtesting_forecaster, BacktestConfig, GridSearchConfig};
    pub use crate::regressor::{ParamSet, Regressor};
    pub use crate::utils::{calculate_metrics, AccuracyMetrics, Metric};
}
