//! Metrics and statistical helpers.

pub mod metrics;
pub mod stats;

pub use metrics::{calculate_metrics, AccuracyMetrics, Metric, MetricFn};
