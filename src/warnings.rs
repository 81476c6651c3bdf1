//! Non-fatal conditions raised while fitting or predicting.
//!
//! Warnings never abort an operation. They are emitted through `tracing` at
//! `WARN` level under the `autoreg_forecast::warnings` target, and callers can
//! silence them per call with `suppress_warnings`.

use std::collections::BTreeSet;
use std::fmt;

/// A warning raised by a forecaster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForecastWarning {
    /// An argument (or part of it) was ignored.
    IgnoredArgument(String),
    /// A level that was not seen during training was requested.
    UnknownLevel(String),
    /// Input series contain NaN values that were dropped.
    MissingValues(String),
    /// A linear regressor is trained on unscaled series.
    LinearModelScaling,
}

impl ForecastWarning {
    /// Category name, mirrors the warning class shown to users.
    pub fn category(&self) -> &'static str {
        match self {
            ForecastWarning::IgnoredArgument(_) => "IgnoredArgumentWarning",
            ForecastWarning::UnknownLevel(_) => "UnknownLevelWarning",
            ForecastWarning::MissingValues(_) => "MissingValuesWarning",
            ForecastWarning::LinearModelScaling => "DataTransformationWarning",
        }
    }

    /// Emit the warning unless `suppress` is set.
    pub fn emit(&self, suppress: bool) {
        if suppress {
            return;
        }
        tracing::warn!(
            target: "autoreg_forecast::warnings",
            category = self.category(),
            "{}",
            self
        );
    }
}

impl fmt::Display for ForecastWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForecastWarning::IgnoredArgument(msg)
            | ForecastWarning::UnknownLevel(msg)
            | ForecastWarning::MissingValues(msg) => f.write_str(msg),
            ForecastWarning::LinearModelScaling => f.write_str(
                "When using a linear model, it is recommended to use a transformer_series \
                 to ensure all series are in the same scale.",
            ),
        }
    }
}

/// Render a set of names the way messages list them: `{'a', 'b'}`.
pub(crate) fn format_set<'a, I>(names: I) -> String
where
    I: IntoIterator<Item = &'a String>,
{
    let sorted: BTreeSet<&String> = names.into_iter().collect();
    let inner: Vec<String> = sorted.iter().map(|n| format!("'{}'", n)).collect();
    format!("{{{}}}", inner.join(", "))
}
