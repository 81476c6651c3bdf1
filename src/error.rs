//! Error types for the autoreg-forecast library.

use thiserror::Error;

/// Result type alias for forecasting operations.
pub type Result<T> = std::result::Result<T, ForecastError>;

/// Errors that can occur while building features, fitting or predicting.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ForecastError {
    /// Input data is empty.
    #[error("empty input data")]
    EmptyData,

    /// Insufficient data points for the operation.
    #[error("insufficient data: need at least {needed}, got {got}")]
    InsufficientData { needed: usize, got: usize },

    /// Invalid parameter value.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Dimension mismatch between data structures.
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// Timestamp-related error.
    #[error("timestamp error: {0}")]
    TimestampError(String),

    /// A forecaster, regressor or transformer was used before `fit`.
    #[error("not fitted: {0}")]
    NotFitted(String),

    /// Missing values detected where they are not allowed.
    #[error("missing values: {0}")]
    MissingValues(String),

    /// Computation error (e.g., numerical issues).
    #[error("computation error: {0}")]
    ComputationError(String),

    /// Reading or writing a file failed.
    #[error("io error: {0}")]
    IoError(String),
}

impl ForecastError {
    /// Error returned by forecasters asked to predict before being fitted.
    pub fn forecaster_not_fitted() -> Self {
        ForecastError::NotFitted(
            "This Forecaster instance is not fitted yet. Call `fit` with \
             appropriate arguments before using predict."
                .to_string(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_are_descriptive() {
        let err = ForecastError::EmptyData;
        assert_eq!(err.to_string(), "empty input data");

        let err = ForecastError::InsufficientData { needed: 10, got: 5 };
        assert_eq!(
            err.to_string(),
            "insufficient data: need at least 10, got 5"
        );

        let err = ForecastError::InvalidParameter("lags must be positive".to_string());
        assert_eq!(err.to_string(), "invalid parameter: lags must be positive");

        let err = ForecastError::DimensionMismatch {
            expected: 3,
            got: 2,
        };
        assert_eq!(err.to_string(), "dimension mismatch: expected 3, got 2");
    }

    #[test]
    fn not_fitted_message_mentions_fit() {
        let err = ForecastError::forecaster_not_fitted();
        assert!(err.to_string().contains("Call `fit`"));
    }

    #[test]
    fn errors_are_clonable_and_comparable() {
        let err1 = ForecastError::EmptyData;
        let err2 = err1.clone();
        assert_eq!(err1, err2);
    }
}
