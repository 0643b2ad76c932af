//! Versioned model artifacts, the comparison table, and artifact-backed prediction

use crate::error::{HarvestError, Result};
use crate::preprocessing::{FEATURE_NAMES, TARGET_NAME};
use crate::training::{ComparisonRow, ModelKind, ModelMetrics, Regressor, SelectionResult, TrainedModel};
use crate::utils::{write_atomic, DataSaver};
use chrono::{DateTime, Utc};
use ndarray::Array2;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

/// Format tag written into every artifact
pub const ARTIFACT_FORMAT: &str = "harvest-automl/model";

/// Current artifact layout version
pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

/// File stem for a model: display name lowercased with spaces replaced by `_`
pub fn artifact_file_stem(model_name: &str) -> String {
    model_name.replace(' ', "_").to_lowercase()
}

/// Persisted winning model with everything needed to use it later
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub format: String,
    pub format_version: u32,
    pub kind: ModelKind,
    pub model_name: String,
    /// Feature order the model expects
    pub feature_names: Vec<String>,
    pub target_name: String,
    /// Held-out metrics at training time
    pub metrics: ModelMetrics,
    pub trained_at: DateTime<Utc>,
    pub model: TrainedModel,
}

impl ModelArtifact {
    pub fn new(model_name: impl Into<String>, model: TrainedModel, metrics: ModelMetrics) -> Self {
        Self {
            format: ARTIFACT_FORMAT.to_string(),
            format_version: ARTIFACT_FORMAT_VERSION,
            kind: model.kind(),
            model_name: model_name.into(),
            feature_names: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
            target_name: TARGET_NAME.to_string(),
            metrics,
            trained_at: Utc::now(),
            model,
        }
    }

    /// Artifact for the winner of a selection
    pub fn from_selection(selection: &SelectionResult) -> Result<Self> {
        Ok(Self::new(
            selection.winner_name(),
            selection.model()?.clone(),
            *selection.metrics()?,
        ))
    }

    /// Check the format tag, version, feature contract and model variant
    pub fn validate(&self) -> Result<()> {
        if self.format != ARTIFACT_FORMAT {
            return Err(HarvestError::ArtifactMismatch {
                expected: ARTIFACT_FORMAT.to_string(),
                found: self.format.clone(),
            });
        }
        if self.format_version != ARTIFACT_FORMAT_VERSION {
            return Err(HarvestError::ArtifactMismatch {
                expected: format!("format_version {}", ARTIFACT_FORMAT_VERSION),
                found: format!("format_version {}", self.format_version),
            });
        }
        if self.feature_names != FEATURE_NAMES {
            return Err(HarvestError::ArtifactMismatch {
                expected: format!("features {:?}", FEATURE_NAMES),
                found: format!("features {:?}", self.feature_names),
            });
        }
        if self.target_name != TARGET_NAME {
            return Err(HarvestError::ArtifactMismatch {
                expected: format!("target {}", TARGET_NAME),
                found: format!("target {}", self.target_name),
            });
        }
        if self.model.kind() != self.kind {
            return Err(HarvestError::ArtifactMismatch {
                expected: format!("model kind {}", self.kind.id()),
                found: format!("model kind {}", self.model.kind().id()),
            });
        }
        Ok(())
    }
}

/// Writes and reads pipeline outputs
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    models_dir: PathBuf,
    output_dir: PathBuf,
    comparison_file_name: String,
}

impl ArtifactStore {
    pub fn new(models_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            models_dir: models_dir.into(),
            output_dir: output_dir.into(),
            comparison_file_name: "model_comparison.csv".to_string(),
        }
    }

    pub fn with_comparison_file_name(mut self, name: impl Into<String>) -> Self {
        self.comparison_file_name = name.into();
        self
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Where the artifact for `model_name` lives
    pub fn artifact_path(&self, model_name: &str) -> PathBuf {
        self.models_dir.join(format!("{}.json", artifact_file_stem(model_name)))
    }

    pub fn comparison_path(&self) -> PathBuf {
        self.output_dir.join(&self.comparison_file_name)
    }

    /// Persist an artifact, replacing any previous one of the same name
    pub fn save_model(&self, artifact: &ModelArtifact) -> Result<PathBuf> {
        let path = self.artifact_path(&artifact.model_name);
        write_atomic(&path, |file| {
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, artifact)?;
            writer.flush()?;
            Ok(())
        })?;
        info!(model = %artifact.model_name, path = %path.display(), "Saved model artifact");
        Ok(path)
    }

    /// Load and validate an artifact
    pub fn load_model(path: &Path) -> Result<ModelArtifact> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| HarvestError::PersistenceError(format!("{}: {}", path.display(), e)))?;

        // Check the envelope before committing to the full layout
        let value: serde_json::Value = serde_json::from_str(&text)?;
        let format = value.get("format").and_then(|v| v.as_str()).unwrap_or("<missing>");
        if format != ARTIFACT_FORMAT {
            return Err(HarvestError::ArtifactMismatch {
                expected: ARTIFACT_FORMAT.to_string(),
                found: format.to_string(),
            });
        }
        let version = value.get("format_version").and_then(|v| v.as_u64());
        if version != Some(ARTIFACT_FORMAT_VERSION as u64) {
            return Err(HarvestError::ArtifactMismatch {
                expected: format!("format_version {}", ARTIFACT_FORMAT_VERSION),
                found: format!("format_version {:?}", version),
            });
        }

        let artifact: ModelArtifact = serde_json::from_value(value)?;
        artifact.validate()?;
        Ok(artifact)
    }

    /// Comparison table as a frame: `name, MSE, MAE, R²`, nulls for failures
    pub fn comparison_frame(rows: &[ComparisonRow]) -> Result<DataFrame> {
        let metric = |f: fn(&ModelMetrics) -> f64| -> Vec<Option<f64>> {
            rows.iter().map(|r| r.metrics.as_ref().map(f)).collect()
        };
        let df = df!(
            "name" => rows.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(),
            "MSE" => metric(|m| m.mse),
            "MAE" => metric(|m| m.mae),
            "R²" => metric(|m| m.r2)
        )?;
        Ok(df)
    }

    /// Write the comparison table
    pub fn save_comparison(&self, rows: &[ComparisonRow]) -> Result<PathBuf> {
        let path = self.comparison_path();
        let mut df = Self::comparison_frame(rows)?;
        DataSaver::save_csv(&mut df, &path)?;
        info!(path = %path.display(), rows = rows.len(), "Saved model comparison");
        Ok(path)
    }
}

/// Predicts production from a persisted artifact
#[derive(Debug, Clone)]
pub struct Predictor {
    artifact: ModelArtifact,
}

impl Predictor {
    /// Load an artifact file
    pub fn load(path: &Path) -> Result<Self> {
        Ok(Self {
            artifact: ArtifactStore::load_model(path)?,
        })
    }

    pub fn from_artifact(artifact: ModelArtifact) -> Result<Self> {
        artifact.validate()?;
        Ok(Self { artifact })
    }

    pub fn artifact(&self) -> &ModelArtifact {
        &self.artifact
    }

    pub fn model_name(&self) -> &str {
        &self.artifact.model_name
    }

    fn check_input(name: &str, value: f64) -> Result<()> {
        if !value.is_finite() || value < 0.0 {
            return Err(HarvestError::InvalidInput(format!(
                "{} must be a finite non-negative number, got {}",
                name, value
            )));
        }
        Ok(())
    }

    /// Predict production for one (area harvested, yield) pair.
    /// Negative model outputs are clamped to zero.
    pub fn predict(&self, area_harvested: f64, crop_yield: f64) -> Result<f64> {
        let predictions = self.predict_batch(&[(area_harvested, crop_yield)])?;
        predictions
            .first()
            .copied()
            .ok_or_else(|| HarvestError::ComputationError("model returned no prediction".to_string()))
    }

    /// Predict production for many (area harvested, yield) pairs.
    ///
    /// Outputs are clamped into `[0, f64::MAX]`; inputs far outside the
    /// training range can overflow a model, and NaN maps to zero.
    pub fn predict_batch(&self, inputs: &[(f64, f64)]) -> Result<Vec<f64>> {
        for &(area_harvested, crop_yield) in inputs {
            Self::check_input("area harvested", area_harvested)?;
            Self::check_input("yield", crop_yield)?;
        }

        let x = Array2::from_shape_fn((inputs.len(), FEATURE_NAMES.len()), |(r, c)| match c {
            0 => inputs[r].0,
            _ => inputs[r].1,
        });
        let predictions = self.artifact.model.predict(&x)?;

        Ok(predictions.iter().map(|&p| clamp_production(p)).collect())
    }
}

fn clamp_production(p: f64) -> f64 {
    if p.is_nan() {
        0.0
    } else {
        p.clamp(0.0, f64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn fitted_artifact() -> ModelArtifact {
        let x = array![[1.0, 1.0], [2.0, 1.0], [3.0, 2.0], [4.0, 3.0]];
        let y = array![2.5, 4.5, 7.0, 9.5];
        let mut model = TrainedModel::for_kind(ModelKind::LinearRegression, 42);
        model.fit(&x, &y).unwrap();
        let metrics = ModelMetrics {
            mse: 0.0,
            rmse: 0.0,
            mae: 0.0,
            r2: 1.0,
            n_samples: 4,
        };
        ModelArtifact::new("Linear Regression", model, metrics)
    }

    #[test]
    fn test_file_stem() {
        assert_eq!(artifact_file_stem("Random Forest Regressor"), "random_forest_regressor");
        assert_eq!(artifact_file_stem("Linear Regression"), "linear_regression");
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("models"), dir.path().join("output"));
        let artifact = fitted_artifact();

        let path = store.save_model(&artifact).unwrap();
        assert_eq!(path, dir.path().join("models").join("linear_regression.json"));

        let loaded = ArtifactStore::load_model(&path).unwrap();
        assert_eq!(loaded.kind, ModelKind::LinearRegression);
        assert_eq!(loaded.metrics, artifact.metrics);
        assert_eq!(loaded.feature_names, vec!["AreaHarvested", "Yield"]);

        let query = array![[5.0, 2.0]];
        assert_eq!(
            loaded.model.predict(&query).unwrap(),
            artifact.model.predict(&query).unwrap()
        );
    }

    #[test]
    fn test_wrong_format_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bogus.json");
        std::fs::write(&path, r#"{"format": "something-else", "format_version": 1}"#).unwrap();

        assert!(matches!(
            ArtifactStore::load_model(&path),
            Err(HarvestError::ArtifactMismatch { .. })
        ));
    }

    #[test]
    fn test_kind_mismatch_rejected() {
        let mut artifact = fitted_artifact();
        artifact.kind = ModelKind::Svr;
        assert!(matches!(artifact.validate(), Err(HarvestError::ArtifactMismatch { .. })));
    }

    #[test]
    fn test_comparison_frame_has_nulls_for_failures() {
        let rows = vec![
            ComparisonRow {
                name: "Linear Regression".to_string(),
                metrics: Some(fitted_artifact().metrics),
                error: None,
            },
            ComparisonRow {
                name: "Support Vector Regressor (SVR)".to_string(),
                metrics: None,
                error: Some("too many rows".to_string()),
            },
        ];
        let df = ArtifactStore::comparison_frame(&rows).unwrap();

        assert_eq!(df.height(), 2);
        let names: Vec<String> = df.get_column_names().iter().map(|s| s.to_string()).collect();
        assert_eq!(names, vec!["name", "MSE", "MAE", "R²"]);
        assert_eq!(df.column("R²").unwrap().null_count(), 1);
    }

    #[test]
    fn test_predictor_validates_and_clamps() {
        let predictor = Predictor::from_artifact(fitted_artifact()).unwrap();

        assert!(predictor.predict(4.0, 3.0).unwrap() > 0.0);
        assert!(predictor.predict(0.0, 0.0).unwrap() >= 0.0);
        assert!(matches!(predictor.predict(-1.0, 2.0), Err(HarvestError::InvalidInput(_))));
        assert!(matches!(predictor.predict(1.0, f64::NAN), Err(HarvestError::InvalidInput(_))));

        let batch = predictor.predict_batch(&[(1.0, 1.0), (4.0, 3.0)]).unwrap();
        assert_eq!(batch.len(), 2);
        assert!(batch.iter().all(|&p| p >= 0.0));
    }

    #[test]
    fn test_overflowing_prediction_is_clamped() {
        let predictor = Predictor::from_artifact(fitted_artifact()).unwrap();

        let batch = predictor.predict_batch(&[(f64::MAX, f64::MAX), (4.0, 3.0)]).unwrap();
        assert_eq!(batch[0], f64::MAX);
        assert!((batch[1] - 9.5).abs() < 1e-6);
    }

    #[test]
    fn test_clamp_production() {
        assert_eq!(clamp_production(f64::NAN), 0.0);
        assert_eq!(clamp_production(f64::INFINITY), f64::MAX);
        assert_eq!(clamp_production(f64::NEG_INFINITY), 0.0);
        assert_eq!(clamp_production(-3.0), 0.0);
        assert_eq!(clamp_production(12.5), 12.5);
    }
}
