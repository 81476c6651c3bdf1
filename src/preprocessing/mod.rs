//! Preprocessing helpers: calendar features, scaling and differencing.

pub mod calendar;
pub mod differentiation;
pub mod scale;

pub use calendar::{DateTimeEncoding, DateTimeFeatureTransformer, SUPPORTED_FEATURES};
pub use differentiation::TimeSeriesDifferentiator;
pub use scale::{MinMaxScaler, ScaleParams, Scaler, StandardScaler};
