//! Training configuration and the candidate roster

use crate::error::{HarvestError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// A regression family on the candidate roster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    LinearRegression,
    RidgeRegression,
    LassoRegression,
    DecisionTreeRegressor,
    RandomForestRegressor,
    GradientBoostingRegressor,
    Svr,
}

impl ModelKind {
    /// Default roster in registration order
    pub const ALL: [ModelKind; 7] = [
        ModelKind::LinearRegression,
        ModelKind::RidgeRegression,
        ModelKind::LassoRegression,
        ModelKind::DecisionTreeRegressor,
        ModelKind::RandomForestRegressor,
        ModelKind::GradientBoostingRegressor,
        ModelKind::Svr,
    ];

    /// Human-readable name used in reports and artifact names
    pub fn display_name(&self) -> &'static str {
        match self {
            ModelKind::LinearRegression => "Linear Regression",
            ModelKind::RidgeRegression => "Ridge Regression",
            ModelKind::LassoRegression => "Lasso Regression",
            ModelKind::DecisionTreeRegressor => "Decision Tree Regressor",
            ModelKind::RandomForestRegressor => "Random Forest Regressor",
            ModelKind::GradientBoostingRegressor => "Gradient Boosting Regressor",
            ModelKind::Svr => "Support Vector Regressor (SVR)",
        }
    }

    /// Stable identifier stored in artifacts (`linear_regression`, `svr`, ...)
    pub fn id(&self) -> &'static str {
        match self {
            ModelKind::LinearRegression => "linear_regression",
            ModelKind::RidgeRegression => "ridge_regression",
            ModelKind::LassoRegression => "lasso_regression",
            ModelKind::DecisionTreeRegressor => "decision_tree_regressor",
            ModelKind::RandomForestRegressor => "random_forest_regressor",
            ModelKind::GradientBoostingRegressor => "gradient_boosting_regressor",
            ModelKind::Svr => "svr",
        }
    }

    /// Parse either the identifier or the display name, case-insensitively
    pub fn parse(name: &str) -> Option<Self> {
        let needle = name.trim();
        Self::ALL.into_iter().find(|kind| {
            kind.id().eq_ignore_ascii_case(needle) || kind.display_name().eq_ignore_ascii_case(needle)
        })
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Training configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Fraction of rows held out for evaluation
    pub test_size: f64,
    /// Seed for the split and every seeded model
    pub random_seed: u64,
    /// Fit candidates concurrently
    pub parallel: bool,
    /// Candidates in registration order
    pub roster: Vec<ModelKind>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            test_size: 0.2,
            random_seed: 42,
            parallel: true,
            roster: ModelKind::ALL.to_vec(),
        }
    }
}

impl TrainingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_test_size(mut self, test_size: f64) -> Self {
        self.test_size = test_size;
        self
    }

    pub fn with_random_seed(mut self, seed: u64) -> Self {
        self.random_seed = seed;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_roster(mut self, roster: Vec<ModelKind>) -> Self {
        self.roster = roster;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.test_size > 0.0 && self.test_size < 1.0) {
            return Err(HarvestError::ConfigError(format!(
                "test_size must be in (0, 1), got {}",
                self.test_size
            )));
        }
        if self.roster.is_empty() {
            return Err(HarvestError::ConfigError("roster must not be empty".to_string()));
        }
        let mut seen = HashSet::new();
        for kind in &self.roster {
            if !seen.insert(kind) {
                return Err(HarvestError::ConfigError(format!(
                    "roster lists '{}' more than once",
                    kind
                )));
            }
        }
        Ok(())
    }
}
