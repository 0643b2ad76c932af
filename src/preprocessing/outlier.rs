//! IQR-based outlier removal over pivoted records
//!
//! Rows are removed when a measurement falls outside
//! `[Q1 - factor·IQR, Q3 + factor·IQR]`. Quartiles use linear interpolation
//! between closest ranks: the q-th quantile of `n` sorted values sits at
//! position `q·(n-1)`.
//!
//! In [`FilterMode::Sequential`] (the default) each column's bounds are
//! computed on the rows that survived the previous columns, so the column
//! order changes the result. [`FilterMode::Simultaneous`] computes every
//! column's bounds on the same input and is order-independent.
//!
//! A constant column has IQR = 0 and its interval collapses to a single
//! point: only rows exactly equal to that value survive.

use super::normalizer::{Measure, PivotedRecord};
use crate::error::{HarvestError, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// How per-column bounds relate to each other
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    /// Each column is bounded on the survivors of the previous columns
    #[default]
    Sequential,
    /// All columns are bounded on the unfiltered input
    Simultaneous,
}

/// Outlier filter configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutlierConfig {
    /// Columns to filter, in order
    pub columns: Vec<Measure>,
    /// IQR multiplier
    pub factor: f64,
    pub mode: FilterMode,
}

impl Default for OutlierConfig {
    fn default() -> Self {
        Self {
            columns: Measure::ALL.to_vec(),
            factor: 1.5,
            mode: FilterMode::Sequential,
        }
    }
}

impl OutlierConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_columns(mut self, columns: Vec<Measure>) -> Self {
        self.columns = columns;
        self
    }

    pub fn with_factor(mut self, factor: f64) -> Self {
        self.factor = factor;
        self
    }

    pub fn with_mode(mut self, mode: FilterMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.columns.is_empty() {
            return Err(HarvestError::ConfigError(
                "outlier filter needs at least one column".to_string(),
            ));
        }
        if !self.factor.is_finite() || self.factor < 0.0 {
            return Err(HarvestError::InvalidParameter {
                name: "factor".to_string(),
                value: self.factor.to_string(),
                reason: "must be finite and non-negative".to_string(),
            });
        }
        Ok(())
    }
}

/// Fitted bounds for one column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IqrBounds {
    pub column: Measure,
    pub q1: f64,
    pub q3: f64,
    pub lower: f64,
    pub upper: f64,
    /// Rows this column removed
    pub removed: usize,
}

impl IqrBounds {
    /// Closed-interval membership; NaN is never inside
    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }
}

/// Quantile of `values` with linear interpolation between closest ranks.
///
/// Non-finite values are ignored. Returns `None` when no finite value remains
/// or `q` is outside `[0, 1]`.
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if !(0.0..=1.0).contains(&q) {
        return None;
    }
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);
    Some(quantile_sorted(&sorted, q))
}

fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

/// Removes statistically extreme rows column by column
#[derive(Debug, Clone, Default)]
pub struct OutlierFilter {
    config: OutlierConfig,
}

impl OutlierFilter {
    pub fn new(config: OutlierConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OutlierConfig {
        &self.config
    }

    /// Compute bounds for one column over `records`, or `None` if it has no finite values
    pub fn compute_bounds(&self, records: &[PivotedRecord], column: Measure) -> Option<IqrBounds> {
        let values: Vec<f64> = records.iter().map(|r| r.value(column)).collect();
        let q1 = quantile(&values, 0.25)?;
        let q3 = quantile(&values, 0.75)?;
        let iqr = q3 - q1;
        Some(IqrBounds {
            column,
            q1,
            q3,
            lower: q1 - self.config.factor * iqr,
            upper: q3 + self.config.factor * iqr,
            removed: 0,
        })
    }

    /// Filter records, preserving the relative order of survivors
    pub fn filter(&self, records: &[PivotedRecord]) -> Result<(Vec<PivotedRecord>, Vec<IqrBounds>)> {
        self.config.validate()?;

        let (kept, bounds) = match self.config.mode {
            FilterMode::Sequential => self.filter_sequential(records),
            FilterMode::Simultaneous => self.filter_simultaneous(records),
        };

        info!(
            input = records.len(),
            kept = kept.len(),
            mode = ?self.config.mode,
            "Removed IQR outliers"
        );
        Ok((kept, bounds))
    }

    fn filter_sequential(&self, records: &[PivotedRecord]) -> (Vec<PivotedRecord>, Vec<IqrBounds>) {
        let mut working: Vec<PivotedRecord> = records.to_vec();
        let mut all_bounds = Vec::with_capacity(self.config.columns.len());

        for &column in &self.config.columns {
            let Some(mut bounds) = self.compute_bounds(&working, column) else {
                // Nothing finite left to bound; non-finite rows cannot satisfy any interval
                working.clear();
                continue;
            };
            let before = working.len();
            working.retain(|r| bounds.contains(r.value(column)));
            bounds.removed = before - working.len();

            debug!(
                column = %column,
                q1 = bounds.q1,
                q3 = bounds.q3,
                lower = bounds.lower,
                upper = bounds.upper,
                removed = bounds.removed,
                "Applied column bounds"
            );
            all_bounds.push(bounds);
        }

        (working, all_bounds)
    }

    fn filter_simultaneous(&self, records: &[PivotedRecord]) -> (Vec<PivotedRecord>, Vec<IqrBounds>) {
        let mut all_bounds: Vec<IqrBounds> = self
            .config
            .columns
            .iter()
            .filter_map(|&column| self.compute_bounds(records, column))
            .collect();

        if all_bounds.len() < self.config.columns.len() {
            return (Vec::new(), all_bounds);
        }

        for bounds in &mut all_bounds {
            bounds.removed = records
                .iter()
                .filter(|r| !bounds.contains(r.value(bounds.column)))
                .count();
        }

        let kept = records
            .iter()
            .filter(|r| all_bounds.iter().all(|b| b.contains(r.value(b.column))))
            .cloned()
            .collect();

        (kept, all_bounds)
    }

    /// Re-apply previously fitted bounds without recomputing quartiles
    pub fn apply_bounds(records: &[PivotedRecord], bounds: &[IqrBounds]) -> Vec<PivotedRecord> {
        records
            .iter()
            .filter(|r| bounds.iter().all(|b| b.contains(r.value(b.column))))
            .cloned()
            .collect()
    }
}
