//! Error types for the pipeline-search engine

use thiserror::Error;

/// Result type alias for pipeline-search operations
pub type Result<T> = std::result::Result<T, AutoMLError>;

/// Main error type for the pipeline-search engine
#[derive(Error, Debug)]
pub enum AutoMLError {
    #[error("Data error: {0}")]
    DataError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Unknown {stage} method '{value}', expected one of: [{}]", .valid.join(", "))]
    UnknownMethod {
        stage: String,
        value: String,
        valid: Vec<String>,
    },

    #[error("Malformed {stage} config: {reason}")]
    MalformedConfig { stage: String, reason: String },

    #[error("Ensemble weights do not match members: {expected} members, {actual} weights")]
    WeightMismatch { expected: usize, actual: usize },

    #[error("Pipeline has no model stage")]
    MissingModel,

    #[error("{0} is not fitted")]
    NotFitted(String),

    #[error("{stage} stage failed: {message}")]
    StageError { stage: String, message: String },

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Trial cancelled")]
    Cancelled,

    #[error("Failure budget exhausted: {failures} trials failed, at most {allowed} allowed")]
    FailureBudgetExceeded { failures: usize, allowed: usize },

    #[error("No search budget: set a trial count or a time budget")]
    NoBudget,

    #[error("Search error: {0}")]
    SearchError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl AutoMLError {
    /// True for errors that are raised while validating configuration,
    /// before any stage has touched data.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            AutoMLError::ConfigError(_)
                | AutoMLError::UnknownMethod { .. }
                | AutoMLError::MalformedConfig { .. }
                | AutoMLError::WeightMismatch { .. }
                | AutoMLError::MissingModel
                | AutoMLError::InvalidParameter { .. }
        )
    }

    /// Attach the failing stage to a runtime error.
    ///
    /// Configuration errors, cancellation and errors that already carry a
    /// stage pass through unchanged.
    pub fn in_stage(self, stage: impl Into<String>) -> Self {
        match self {
            AutoMLError::StageError { .. } | AutoMLError::Cancelled => self,
            err if err.is_config_error() => err,
            err => AutoMLError::StageError {
                stage: stage.into(),
                message: err.to_string(),
            },
        }
    }
}

impl From<polars::error::PolarsError> for AutoMLError {
    fn from(err: polars::error::PolarsError) -> Self {
        AutoMLError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for AutoMLError {
    fn from(err: serde_json::Error) -> Self {
        AutoMLError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for AutoMLError {
    fn from(err: ndarray::ShapeError) -> Self {
        AutoMLError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}
