//! Supervised feature construction

use super::normalizer::{Measure, PivotedRecord};
use crate::error::{HarvestError, Result};
use ndarray::{Array1, Array2};
use tracing::{info, warn};

/// Feature column names, in matrix column order
pub const FEATURE_NAMES: [&str; 2] = ["AreaHarvested", "Yield"];

/// Target column name
pub const TARGET_NAME: &str = "Production";

/// Feature matrix (`n × 2`: area harvested, yield) and production target
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSet {
    pub x: Array2<f64>,
    pub y: Array1<f64>,
}

impl FeatureSet {
    pub fn n_samples(&self) -> usize {
        self.x.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.x.nrows() == 0
    }

    pub fn feature_names(&self) -> Vec<String> {
        FEATURE_NAMES.iter().map(|s| s.to_string()).collect()
    }
}

/// Builds the feature/target table, dropping rows that are not physically valid
#[derive(Debug, Clone, Default)]
pub struct FeatureBuilder;

impl FeatureBuilder {
    pub fn new() -> Self {
        Self
    }

    fn is_valid(record: &PivotedRecord) -> bool {
        Measure::ALL.iter().all(|&m| {
            let v = record.value(m);
            v.is_finite() && v > 0.0
        })
    }

    /// Build features from filtered records.
    ///
    /// Rows with a missing (non-finite) or non-positive measurement are
    /// excluded, never imputed. Fails with
    /// [`HarvestError::EmptyDatasetError`] when nothing remains.
    pub fn build(&self, records: &[PivotedRecord]) -> Result<FeatureSet> {
        let valid: Vec<&PivotedRecord> = records.iter().filter(|r| Self::is_valid(r)).collect();

        let dropped = records.len() - valid.len();
        if dropped > 0 {
            warn!(dropped, "Excluded rows with missing or non-positive measurements");
        }

        if valid.is_empty() {
            return Err(HarvestError::empty("feature building"));
        }

        let n = valid.len();
        let x = Array2::from_shape_fn((n, FEATURE_NAMES.len()), |(r, c)| match c {
            0 => valid[r].area_harvested,
            _ => valid[r].crop_yield,
        });
        let y: Array1<f64> = valid.iter().map(|r| r.production).collect();

        info!(samples = n, features = FEATURE_NAMES.len(), "Built feature table");
        Ok(FeatureSet { x, y })
    }
}
