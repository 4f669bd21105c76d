//! Error types for the anofox-autoforecast library.

use thiserror::Error;

/// Result type alias for forecast operations.
pub type Result<T> = std::result::Result<T, ForecastError>;

/// Errors that can occur while loading, diagnosing, selecting or forecasting.
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

    /// Model has not been fitted yet.
    #[error("model must be fitted before prediction")]
    FitRequired,

    /// Missing values detected when not allowed.
    #[error("missing values detected in data")]
    MissingValues,

    /// Index out of bounds.
    #[error("index out of bounds: {index} (size: {size})")]
    IndexOutOfBounds { index: usize, size: usize },

    /// Computation error (e.g., numerical issues).
    #[error("computation error: {0}")]
    ComputationError(String),

    /// Missing inputs, no enabled model family or an invalid option.
    /// Raised before any group is processed.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A candidate or selected model failed to fit or forecast.
    #[error("model {model} failed: {reason}")]
    ModelFit { model: String, reason: String },

    /// A result table could not be written to its sink.
    #[error("output error: {0}")]
    Output(String),

    /// A group failed while the run is configured to stop on errors.
    #[error("run stopped in group {group}: {reason}")]
    FatalRun { group: String, reason: String },
}

impl ForecastError {
    /// Wrap an error raised by a model into a [`ForecastError::ModelFit`].
    pub fn model_fit(model: impl Into<String>, source: &ForecastError) -> Self {
        match source {
            ForecastError::ModelFit { .. } => source.clone(),
            other => ForecastError::ModelFit {
                model: model.into(),
                reason: other.to_string(),
            },
        }
    }

    /// Numeric code written to the `_ERRORNO_` column of the execution log.
    pub fn code(&self) -> i32 {
        match self {
            ForecastError::EmptyData => 101,
            ForecastError::InsufficientData { .. } => 102,
            ForecastError::InvalidParameter(_) => 103,
            ForecastError::DimensionMismatch { .. } => 104,
            ForecastError::TimestampError(_) => 105,
            ForecastError::FitRequired => 106,
            ForecastError::MissingValues => 107,
            ForecastError::ComputationError(_) => 108,
            ForecastError::IndexOutOfBounds { .. } => 109,
            ForecastError::Configuration(_) => 200,
            ForecastError::ModelFit { .. } => 300,
            ForecastError::FatalRun { .. } => 400,
            ForecastError::Output(_) => 500,
        }
    }
}
