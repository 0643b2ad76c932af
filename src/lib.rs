//! Harvest AutoML - crop production modelling on FAOSTAT data
//!
//! This crate turns long-format agricultural statistics into a trained
//! production regressor:
//! - Reshaping raw observations into one record per (area, year, item)
//! - IQR outlier removal
//! - Fitting a fixed roster of regressors on a seeded train/test split
//! - Held-out evaluation and deterministic best-model selection
//! - Atomic, versioned persistence of the winner and a comparison table
//!
//! # Modules
//!
//! ## Core
//! - [`preprocessing`] - Reshaping, outlier filtering, feature construction
//! - [`training`] - Regressors, evaluation and model selection
//! - [`export`] - Model artifacts and artifact-backed prediction
//! - [`pipeline`] - End-to-end batch pipeline
//!
//! ## Support
//! - [`error`] - Crate-wide error type
//! - [`utils`] - Data loading/saving and atomic writes
//! - [`cli`] - Command-line interface

// Core error handling
pub mod error;

// Core ML modules
pub mod preprocessing;
pub mod training;

// Persistence and orchestration
pub mod export;
pub mod pipeline;
pub mod utils;

// Services
pub mod cli;

pub use error::{HarvestError, Result};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{HarvestError, Result};

    // Preprocessing
    pub use crate::preprocessing::{
        FeatureBuilder, FeatureSet, FilterMode, IqrBounds, Measure, OutlierConfig, OutlierFilter,
        PivotedRecord, RawObservation, RecordNormalizer,
    };

    // Training
    pub use crate::training::{
        Evaluator, ModelCandidate, ModelKind, ModelMetrics, ModelSelector, Regressor,
        SelectionResult, TrainEngine, TrainedModel, TrainingConfig,
    };

    // Export
    pub use crate::export::{ArtifactStore, ModelArtifact, Predictor};

    // Pipeline
    pub use crate::pipeline::{Pipeline, PipelineConfig, PipelineReport};

    // Data IO
    pub use crate::utils::{DataLoader, DataSaver};
}
