//! Error types for the harvest pipeline

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Main error type for the pipeline
#[derive(Error, Debug)]
pub enum HarvestError {
    /// Input file missing, unreadable, or lacking a required column
    #[error("Load error: {0}")]
    LoadError(String),

    /// Two values for the same element inside one (area, year, item) group
    #[error("Ambiguous reshape: duplicate '{element}' for ({area}, {year}, {item})")]
    ReshapeAmbiguityError {
        area: String,
        year: i64,
        item: String,
        element: String,
    },

    /// No rows left after a cleaning stage
    #[error("Empty dataset after {stage}")]
    EmptyDatasetError { stage: String },

    /// One roster variant failed; isolated to that candidate
    #[error("Candidate '{model}' failed: {reason}")]
    CandidateFitError { model: String, reason: String },

    #[error("No candidate model could be trained")]
    NoCandidatesError,

    #[error("Persistence error: {0}")]
    PersistenceError(String),

    #[error("Artifact mismatch: expected {expected}, found {found}")]
    ArtifactMismatch { expected: String, found: String },

    #[error("Data error: {0}")]
    DataError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Computation error: {0}")]
    ComputationError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl HarvestError {
    /// Shorthand for an empty-dataset failure at a named stage
    pub fn empty(stage: impl Into<String>) -> Self {
        HarvestError::EmptyDatasetError { stage: stage.into() }
    }
}

impl From<polars::error::PolarsError> for HarvestError {
    fn from(err: polars::error::PolarsError) -> Self {
        HarvestError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for HarvestError {
    fn from(err: serde_json::Error) -> Self {
        HarvestError::SerializationError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for HarvestError {
    fn from(err: ndarray::ShapeError) -> Self {
        HarvestError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}
