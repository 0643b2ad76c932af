//! Winner selection over scored candidates

use super::engine::{ModelCandidate, TrainedModel};
use super::models::ModelMetrics;
use crate::error::{HarvestError, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

/// One line of the model comparison table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonRow {
    pub name: String,
    /// `None` when the candidate failed
    pub metrics: Option<ModelMetrics>,
    pub error: Option<String>,
}

impl From<&ModelCandidate> for ComparisonRow {
    fn from(candidate: &ModelCandidate) -> Self {
        Self {
            name: candidate.name.clone(),
            metrics: candidate.metrics().copied(),
            error: candidate.error().map(str::to_string),
        }
    }
}

/// Selected model plus the full comparison, in registration order
#[derive(Debug, Clone)]
pub struct SelectionResult {
    pub winner: ModelCandidate,
    pub comparison: Vec<ComparisonRow>,
}

impl SelectionResult {
    pub fn winner_name(&self) -> &str {
        &self.winner.name
    }

    /// The winner's fitted model
    pub fn model(&self) -> Result<&TrainedModel> {
        self.winner.model().ok_or(HarvestError::NoCandidatesError)
    }

    /// The winner's held-out metrics
    pub fn metrics(&self) -> Result<&ModelMetrics> {
        self.winner.metrics().ok_or(HarvestError::NoCandidatesError)
    }
}

/// Picks the candidate with the highest held-out R²
#[derive(Debug, Clone, Copy, Default)]
pub struct ModelSelector;

impl ModelSelector {
    pub fn new() -> Self {
        Self
    }

    /// Linear scan in registration order. The incumbent is replaced only by a
    /// strictly greater R², so ties go to the earliest candidate. Failed
    /// candidates and non-finite scores are never eligible.
    pub fn select(&self, candidates: Vec<ModelCandidate>) -> Result<SelectionResult> {
        let comparison: Vec<ComparisonRow> = candidates.iter().map(ComparisonRow::from).collect();

        let mut best: Option<(usize, f64)> = None;
        for (pos, candidate) in candidates.iter().enumerate() {
            let Some(metrics) = candidate.metrics().filter(|m| m.r2.is_finite()) else {
                continue;
            };
            match best {
                Some((_, best_r2)) if metrics.r2 <= best_r2 => {}
                _ => best = Some((pos, metrics.r2)),
            }
        }

        let (pos, r2) = best.ok_or(HarvestError::NoCandidatesError)?;
        let winner = candidates
            .into_iter()
            .nth(pos)
            .ok_or(HarvestError::NoCandidatesError)?;

        info!(winner = %winner.name, r2, "Selected best model");
        Ok(SelectionResult { winner, comparison })
    }
}
