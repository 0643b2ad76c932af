//! Long-to-wide reshaping of raw FAOSTAT observations
//!
//! FAOSTAT exports one row per (area, year, item, element). Only the three
//! measurements the model needs are kept, and each (area, year, item) group is
//! spread into a single record carrying all three values.

use crate::error::{HarvestError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, info};

/// Numeric measurement columns of a pivoted record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Measure {
    AreaHarvested,
    Yield,
    Production,
}

impl Measure {
    /// All measures in their canonical column order
    pub const ALL: [Measure; 3] = [Measure::AreaHarvested, Measure::Yield, Measure::Production];

    /// Column header used in tabular outputs
    pub fn column_name(&self) -> &'static str {
        match self {
            Measure::AreaHarvested => "AreaHarvested",
            Measure::Yield => "Yield",
            Measure::Production => "Production",
        }
    }

    fn slot(&self) -> usize {
        match self {
            Measure::AreaHarvested => 0,
            Measure::Yield => 1,
            Measure::Production => 2,
        }
    }
}

impl fmt::Display for Measure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column_name())
    }
}

/// Element label of a raw observation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Element {
    AreaHarvested,
    Yield,
    Production,
    /// Any other FAOSTAT element (stocks, producing animals, ...), ignored by the pivot
    Other(String),
}

impl Element {
    /// Parse a FAOSTAT element label.
    ///
    /// Matching is case-insensitive and whitespace-trimmed; `AreaHarvested`
    /// and `Area_harvested` are accepted as aliases of `Area harvested`.
    pub fn parse(label: &str) -> Self {
        let normalized: String = label
            .trim()
            .to_lowercase()
            .chars()
            .filter(|c| !matches!(c, ' ' | '_'))
            .collect();
        match normalized.as_str() {
            "areaharvested" => Element::AreaHarvested,
            "yield" => Element::Yield,
            "production" => Element::Production,
            _ => Element::Other(label.trim().to_string()),
        }
    }

    /// The measure this element feeds, if it is one of the three relevant kinds
    pub fn measure(&self) -> Option<Measure> {
        match self {
            Element::AreaHarvested => Some(Measure::AreaHarvested),
            Element::Yield => Some(Measure::Yield),
            Element::Production => Some(Measure::Production),
            Element::Other(_) => None,
        }
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Element::AreaHarvested => f.write_str("Area harvested"),
            Element::Yield => f.write_str("Yield"),
            Element::Production => f.write_str("Production"),
            Element::Other(label) => f.write_str(label),
        }
    }
}

/// One row of the raw long-format input
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawObservation {
    pub area: String,
    pub year: i64,
    pub element: Element,
    pub item: String,
    /// `None` when the source cell was empty
    pub value: Option<f64>,
}

impl RawObservation {
    pub fn new(
        area: impl Into<String>,
        year: i64,
        element: Element,
        item: impl Into<String>,
        value: Option<f64>,
    ) -> Self {
        Self {
            area: area.into(),
            year,
            element,
            item: item.into(),
            value,
        }
    }
}

/// One (area, year, item) group with all three measurements present
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PivotedRecord {
    pub area: String,
    pub year: i64,
    pub item: String,
    pub area_harvested: f64,
    pub crop_yield: f64,
    pub production: f64,
}

impl PivotedRecord {
    pub fn new(
        area: impl Into<String>,
        year: i64,
        item: impl Into<String>,
        area_harvested: f64,
        crop_yield: f64,
        production: f64,
    ) -> Self {
        Self {
            area: area.into(),
            year,
            item: item.into(),
            area_harvested,
            crop_yield,
            production,
        }
    }

    /// Value of a measurement column
    pub fn value(&self, measure: Measure) -> f64 {
        match measure {
            Measure::AreaHarvested => self.area_harvested,
            Measure::Yield => self.crop_yield,
            Measure::Production => self.production,
        }
    }
}

/// Row accounting of one normalization pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizeStats {
    pub input_rows: usize,
    /// Rows whose element is one of the three relevant kinds
    pub relevant_rows: usize,
    /// Distinct (area, year, item) keys among relevant rows
    pub groups: usize,
    /// Groups carrying all three measurements
    pub complete_groups: usize,
}

type GroupKey = (String, i64, String);

#[derive(Default)]
struct GroupSlots {
    seen: [bool; 3],
    values: [Option<f64>; 3],
}

/// Filters raw observations to the relevant elements and pivots them wide
#[derive(Debug, Clone, Default)]
pub struct RecordNormalizer;

impl RecordNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Pivot raw observations into one record per (area, year, item).
    ///
    /// Output is ordered by key. Groups missing any measurement (including
    /// empty or non-finite values) are dropped; a repeated element inside a
    /// group is a [`HarvestError::ReshapeAmbiguityError`].
    pub fn normalize(&self, rows: &[RawObservation]) -> Result<Vec<PivotedRecord>> {
        self.normalize_with_stats(rows).map(|(records, _)| records)
    }

    /// Like [`normalize`](Self::normalize), also returning row accounting
    pub fn normalize_with_stats(
        &self,
        rows: &[RawObservation],
    ) -> Result<(Vec<PivotedRecord>, NormalizeStats)> {
        let mut groups: BTreeMap<GroupKey, GroupSlots> = BTreeMap::new();
        let mut relevant_rows = 0usize;

        for row in rows {
            let Some(measure) = row.element.measure() else {
                continue;
            };
            relevant_rows += 1;

            let slots = groups
                .entry((row.area.clone(), row.year, row.item.clone()))
                .or_default();
            let slot = measure.slot();
            if slots.seen[slot] {
                return Err(HarvestError::ReshapeAmbiguityError {
                    area: row.area.clone(),
                    year: row.year,
                    item: row.item.clone(),
                    element: row.element.to_string(),
                });
            }
            slots.seen[slot] = true;
            slots.values[slot] = row.value.filter(|v| v.is_finite());
        }

        let n_groups = groups.len();
        let records: Vec<PivotedRecord> = groups
            .into_iter()
            .filter_map(|((area, year, item), slots)| match slots.values {
                [Some(area_harvested), Some(crop_yield), Some(production)] => Some(PivotedRecord {
                    area,
                    year,
                    item,
                    area_harvested,
                    crop_yield,
                    production,
                }),
                _ => None,
            })
            .collect();

        let stats = NormalizeStats {
            input_rows: rows.len(),
            relevant_rows,
            groups: n_groups,
            complete_groups: records.len(),
        };

        debug!(
            dropped_incomplete = stats.groups - stats.complete_groups,
            "Dropped groups missing a measurement"
        );
        info!(
            input_rows = stats.input_rows,
            relevant_rows = stats.relevant_rows,
            records = stats.complete_groups,
            "Normalized raw observations"
        );

        Ok((records, stats))
    }
}
