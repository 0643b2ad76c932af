//! Model persistence module
//!
//! Writes the winning model as a versioned JSON artifact, the per-model
//! comparison table, and loads artifacts back for prediction.

mod artifact;

pub use artifact::{
    artifact_file_stem, ArtifactStore, ModelArtifact, Predictor, ARTIFACT_FORMAT, ARTIFACT_FORMAT_VERSION,
};
