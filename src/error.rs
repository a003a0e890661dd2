//! Error types for the steward lifecycle manager

use thiserror::Error;

/// Result type alias for steward operations
pub type Result<T> = std::result::Result<T, StewardError>;

/// Main error type for the steward crate
#[derive(Error, Debug)]
pub enum StewardError {
    #[error("Data error: {0}")]
    DataError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Training error: {0}")]
    TrainingError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Unknown model: {0}")]
    UnknownModel(String),

    #[error("Insufficient training data: got {actual} rows, need {required}")]
    InsufficientData { actual: usize, required: usize },

    #[error("Feature not found: {0}")]
    FeatureNotFound(String),

    #[error("Scheduler error: {0}")]
    SchedulerError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<polars::error::PolarsError> for StewardError {
    fn from(err: polars::error::PolarsError) -> Self {
        StewardError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for StewardError {
    fn from(err: serde_json::Error) -> Self {
        StewardError::SerializationError(err.to_string())
    }
}
