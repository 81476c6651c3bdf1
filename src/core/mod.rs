//! Core data structures for time series forecasting.

mod exog;
mod forecast;
mod matrix;
mod time_series;

pub use exog::Exog;
pub(crate) use forecast::{validate_interval, validate_quantiles};
pub use forecast::{
    BootstrapPredictions, DistributionForecast, Forecast, MultiSeriesBootstrap,
    MultiSeriesForecast, QuantileForecast,
};
pub use matrix::Matrix;
pub use time_series::{Frequency, IndexFreq, IndexLabel, SeriesIndex, TimeSeries};
