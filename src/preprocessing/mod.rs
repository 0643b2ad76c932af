//! Data preprocessing module
//!
//! Cleaning stages applied before training:
//! - Long-to-wide reshaping of raw observations
//! - IQR outlier removal
//! - Feature/target construction with positivity checks

pub mod features;
pub mod normalizer;
pub mod outlier;

pub use features::{FeatureBuilder, FeatureSet, FEATURE_NAMES, TARGET_NAME};
pub use normalizer::{Element, Measure, NormalizeStats, PivotedRecord, RawObservation, RecordNormalizer};
pub use outlier::{quantile, FilterMode, IqrBounds, OutlierConfig, OutlierFilter};
