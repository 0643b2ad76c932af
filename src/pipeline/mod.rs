//! End-to-end batch pipeline
//!
//! Stages run strictly in order: load → normalize → filter → save cleaned
//! table, then features → split → fit → evaluate → select → persist. Each
//! stage consumes the previous stage's output and produces a new value.

mod config;

pub use config::PipelineConfig;

use crate::error::{HarvestError, Result};
use crate::export::{ArtifactStore, ModelArtifact};
use crate::preprocessing::{
    FeatureBuilder, IqrBounds, NormalizeStats, OutlierFilter, PivotedRecord, RecordNormalizer,
};
use crate::training::{ComparisonRow, ModelMetrics, ModelSelector, TrainEngine};
use crate::utils::{DataLoader, DataSaver};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

/// Outcome of the cleaning stages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanReport {
    pub stats: NormalizeStats,
    pub bounds: Vec<IqrBounds>,
    /// Rows in the cleaned table
    pub rows: usize,
    pub cleaned_path: PathBuf,
}

/// Outcome of the training stages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainReport {
    pub feature_rows: usize,
    pub n_train: usize,
    pub n_test: usize,
    /// Every candidate in registration order
    pub comparison: Vec<ComparisonRow>,
    pub winner: String,
    pub winner_metrics: ModelMetrics,
    pub artifact_path: PathBuf,
    pub comparison_path: PathBuf,
}

/// Outcome of a full run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    pub clean: CleanReport,
    pub train: TrainReport,
}

/// Batch pipeline over one input file
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    loader: DataLoader,
    store: ArtifactStore,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let store = ArtifactStore::new(&config.models_dir, &config.output_dir)
            .with_comparison_file_name(config.comparison_file_name.clone());
        Ok(Self {
            config,
            loader: DataLoader::new(),
            store,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Load raw observations, pivot them wide, drop outliers and write the
    /// cleaned table.
    pub fn clean(&self, path: &Path) -> Result<(Vec<PivotedRecord>, CleanReport)> {
        let start = Instant::now();
        let raw = self.loader.load_raw(path)?;

        let (records, stats) = RecordNormalizer::new().normalize_with_stats(&raw)?;
        info!(
            input = stats.input_rows,
            relevant = stats.relevant_rows,
            groups = stats.groups,
            complete = stats.complete_groups,
            "Normalized observations"
        );
        if records.is_empty() {
            return Err(HarvestError::empty("normalization"));
        }

        let (filtered, bounds) = OutlierFilter::new(self.config.outlier.clone()).filter(&records)?;
        if filtered.is_empty() {
            return Err(HarvestError::empty("outlier filtering"));
        }

        let cleaned_path = self.config.cleaned_path();
        DataSaver::save_cleaned(&filtered, &cleaned_path)?;

        info!(
            rows = filtered.len(),
            path = %cleaned_path.display(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Cleaning complete"
        );

        let report = CleanReport {
            stats,
            bounds,
            rows: filtered.len(),
            cleaned_path,
        };
        Ok((filtered, report))
    }

    /// Build features, fit the roster, select the best model and persist it
    /// together with the comparison table.
    pub fn train_from_records(&self, records: &[PivotedRecord]) -> Result<TrainReport> {
        let start = Instant::now();
        let features = FeatureBuilder::new().build(records)?;

        let engine = TrainEngine::new(self.config.training.clone());
        let (split, candidates) = engine.train(&features)?;

        for candidate in &candidates {
            if let Some(reason) = candidate.error() {
                warn!(model = %candidate.name, reason, "Candidate excluded from selection");
            }
        }

        let selection = ModelSelector::new().select(candidates)?;
        let artifact = ModelArtifact::from_selection(&selection)?;
        let artifact_path = self.store.save_model(&artifact)?;
        let comparison_path = self.store.save_comparison(&selection.comparison)?;

        info!(
            winner = %artifact.model_name,
            r2 = artifact.metrics.r2,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Training complete"
        );

        Ok(TrainReport {
            feature_rows: features.n_samples(),
            n_train: split.n_train(),
            n_test: split.n_test(),
            comparison: selection.comparison,
            winner: artifact.model_name,
            winner_metrics: artifact.metrics,
            artifact_path,
            comparison_path,
        })
    }

    /// Train from a previously written cleaned table
    pub fn train_from_file(&self, path: &Path) -> Result<TrainReport> {
        let records = self.loader.load_cleaned(path)?;
        if records.is_empty() {
            return Err(HarvestError::empty("cleaned table"));
        }
        self.train_from_records(&records)
    }

    /// Clean then train
    pub fn run(&self, path: &Path) -> Result<PipelineReport> {
        info!(input = %path.display(), "Starting pipeline");
        let (records, clean) = self.clean(path)?;
        let train = self.train_from_records(&records)?;
        Ok(PipelineReport { clean, train })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::{ModelKind, TrainingConfig};
    use std::fmt::Write as _;

    fn write_raw(path: &Path, n: usize) {
        let mut csv = String::from("Area,Year,Element,Item,Value,Unit\n");
        for i in 0..n {
            let area = 100.0 + (i % 17) as f64 * 10.0;
            let crop_yield = 20.0 + (i % 7) as f64;
            let production = area * crop_yield / 10.0;
            let year = 2000 + (i % 20);
            let region = format!("Region{}", i / 20);
            writeln!(csv, "{},{},Area harvested,Maize,{},ha", region, year, area).unwrap();
            writeln!(csv, "{},{},Yield,Maize,{},hg/ha", region, year, crop_yield).unwrap();
            writeln!(csv, "{},{},Production,Maize,{},t", region, year, production).unwrap();
        }
        std::fs::write(path, csv).unwrap();
    }

    fn fast_config(dir: &Path) -> PipelineConfig {
        PipelineConfig::default()
            .with_output_dir(dir.join("output"))
            .with_models_dir(dir.join("models"))
            .with_training(TrainingConfig::default().with_roster(vec![
                ModelKind::LinearRegression,
                ModelKind::RidgeRegression,
                ModelKind::DecisionTreeRegressor,
            ]))
    }

    #[test]
    fn test_clean_writes_table() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("raw.csv");
        write_raw(&input, 60);

        let pipeline = Pipeline::new(fast_config(dir.path())).unwrap();
        let (records, report) = pipeline.clean(&input).unwrap();

        assert_eq!(report.stats.complete_groups, 60);
        assert_eq!(report.rows, records.len());
        assert_eq!(report.bounds.len(), 3);
        assert!(report.cleaned_path.exists());
    }

    #[test]
    fn test_run_persists_winner() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("raw.csv");
        write_raw(&input, 80);

        let pipeline = Pipeline::new(fast_config(dir.path())).unwrap();
        let report = pipeline.run(&input).unwrap();

        assert_eq!(report.train.comparison.len(), 3);
        assert_eq!(report.train.n_train + report.train.n_test, report.train.feature_rows);
        assert!(report.train.artifact_path.exists());
        assert!(report.train.comparison_path.exists());
    }

    #[test]
    fn test_no_complete_groups_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("raw.csv");
        std::fs::write(
            &input,
            "Area,Year,Element,Item,Value\nA,2000,Yield,Wheat,10\nA,2000,Production,Wheat,50\n",
        )
        .unwrap();

        let pipeline = Pipeline::new(fast_config(dir.path())).unwrap();
        assert!(matches!(
            pipeline.clean(&input),
            Err(HarvestError::EmptyDatasetError { .. })
        ));
        assert!(!pipeline.config().cleaned_path().exists());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = PipelineConfig::default();
        config.training.roster.clear();
        assert!(matches!(Pipeline::new(config), Err(HarvestError::ConfigError(_))));
    }
}
