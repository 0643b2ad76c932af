//! Pipeline configuration

use crate::error::{HarvestError, Result};
use crate::preprocessing::OutlierConfig;
use crate::training::TrainingConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// End-to-end configuration. Every field has a default, so a JSON file may
/// set only what it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub outlier: OutlierConfig,
    pub training: TrainingConfig,
    /// Directory for the cleaned table and the comparison table
    pub output_dir: PathBuf,
    /// Directory for model artifacts
    pub models_dir: PathBuf,
    pub cleaned_file_name: String,
    pub comparison_file_name: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            outlier: OutlierConfig::default(),
            training: TrainingConfig::default(),
            output_dir: PathBuf::from("output"),
            models_dir: PathBuf::from("models"),
            cleaned_file_name: "cleaned_data.csv".to_string(),
            comparison_file_name: "model_comparison.csv".to_string(),
        }
    }
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a JSON config file
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| HarvestError::ConfigError(format!("{}: {}", path.display(), e)))?;
        serde_json::from_str(&text)
            .map_err(|e| HarvestError::ConfigError(format!("{}: {}", path.display(), e)))
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_models_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.models_dir = dir.into();
        self
    }

    pub fn with_outlier(mut self, outlier: OutlierConfig) -> Self {
        self.outlier = outlier;
        self
    }

    pub fn with_training(mut self, training: TrainingConfig) -> Self {
        self.training = training;
        self
    }

    pub fn cleaned_path(&self) -> PathBuf {
        self.output_dir.join(&self.cleaned_file_name)
    }

    pub fn comparison_path(&self) -> PathBuf {
        self.output_dir.join(&self.comparison_file_name)
    }

    pub fn validate(&self) -> Result<()> {
        self.outlier
            .validate()
            .map_err(|e| HarvestError::ConfigError(format!("outlier: {}", e)))?;
        self.training.validate()?;
        for (field, name) in [
            ("cleaned_file_name", &self.cleaned_file_name),
            ("comparison_file_name", &self.comparison_file_name),
        ] {
            if name.trim().is_empty() {
                return Err(HarvestError::ConfigError(format!("{} must not be empty", field)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocessing::{FilterMode, Measure};

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cleaned_path(), PathBuf::from("output/cleaned_data.csv"));
        assert_eq!(config.outlier.factor, 1.5);
        assert_eq!(config.training.test_size, 0.2);
    }

    #[test]
    fn test_partial_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                "outlier": {"mode": "simultaneous", "columns": ["Yield", "AreaHarvested"]},
                "training": {"random_seed": 7},
                "models_dir": "artifacts"
            }"#,
        )
        .unwrap();

        let config = PipelineConfig::from_json_file(&path).unwrap();
        assert_eq!(config.outlier.mode, FilterMode::Simultaneous);
        assert_eq!(config.outlier.columns, vec![Measure::Yield, Measure::AreaHarvested]);
        assert_eq!(config.outlier.factor, 1.5);
        assert_eq!(config.training.random_seed, 7);
        assert_eq!(config.training.test_size, 0.2);
        assert_eq!(config.models_dir, PathBuf::from("artifacts"));
        assert_eq!(config.output_dir, PathBuf::from("output"));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = PipelineConfig::default();
        config.training.test_size = 0.0;
        assert!(matches!(config.validate(), Err(HarvestError::ConfigError(_))));

        let mut config = PipelineConfig::default();
        config.outlier.factor = -1.0;
        assert!(matches!(config.validate(), Err(HarvestError::ConfigError(_))));

        let mut config = PipelineConfig::default();
        config.outlier.columns.clear();
        assert!(matches!(config.validate(), Err(HarvestError::ConfigError(_))));
    }

    #[test]
    fn test_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            PipelineConfig::from_json_file(&path),
            Err(HarvestError::ConfigError(_))
        ));
    }
}
