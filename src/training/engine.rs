//! Training harness: split, fit every roster candidate, score on held-out rows

use super::config::{ModelKind, TrainingConfig};
use super::decision_tree::DecisionTreeRegressor;
use super::gradient_boosting::{GradientBoostingConfig, GradientBoostingRegressor};
use super::linear_models::{LassoRegression, LinearRegression, RidgeRegression};
use super::models::{Evaluator, ModelMetrics, Regressor};
use super::random_forest::RandomForestRegressor;
use super::svm::{SVMConfig, SVMRegressor};
use crate::error::{HarvestError, Result};
use crate::preprocessing::FeatureSet;
use ndarray::{Array1, Array2, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// A fitted roster model, tagged by kind for persistence
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "params", rename_all = "snake_case")]
pub enum TrainedModel {
    LinearRegression(LinearRegression),
    RidgeRegression(RidgeRegression),
    LassoRegression(LassoRegression),
    DecisionTreeRegressor(DecisionTreeRegressor),
    RandomForestRegressor(RandomForestRegressor),
    GradientBoostingRegressor(GradientBoostingRegressor),
    Svr(SVMRegressor),
}

impl TrainedModel {
    /// Unfitted model for `kind` with its roster hyperparameters
    pub fn for_kind(kind: ModelKind, seed: u64) -> Self {
        match kind {
            ModelKind::LinearRegression => TrainedModel::LinearRegression(LinearRegression::new()),
            ModelKind::RidgeRegression => TrainedModel::RidgeRegression(RidgeRegression::new(1.0)),
            ModelKind::LassoRegression => TrainedModel::LassoRegression(LassoRegression::new(0.1)),
            ModelKind::DecisionTreeRegressor => {
                TrainedModel::DecisionTreeRegressor(DecisionTreeRegressor::new().with_random_state(seed))
            }
            ModelKind::RandomForestRegressor => {
                TrainedModel::RandomForestRegressor(RandomForestRegressor::new(100).with_random_state(seed))
            }
            ModelKind::GradientBoostingRegressor => {
                TrainedModel::GradientBoostingRegressor(GradientBoostingRegressor::new(GradientBoostingConfig {
                    random_state: Some(seed),
                    ..Default::default()
                }))
            }
            ModelKind::Svr => TrainedModel::Svr(SVMRegressor::new(SVMConfig {
                random_state: Some(seed),
                ..Default::default()
            })),
        }
    }

    pub fn kind(&self) -> ModelKind {
        match self {
            TrainedModel::LinearRegression(_) => ModelKind::LinearRegression,
            TrainedModel::RidgeRegression(_) => ModelKind::RidgeRegression,
            TrainedModel::LassoRegression(_) => ModelKind::LassoRegression,
            TrainedModel::DecisionTreeRegressor(_) => ModelKind::DecisionTreeRegressor,
            TrainedModel::RandomForestRegressor(_) => ModelKind::RandomForestRegressor,
            TrainedModel::GradientBoostingRegressor(_) => ModelKind::GradientBoostingRegressor,
            TrainedModel::Svr(_) => ModelKind::Svr,
        }
    }

    fn as_regressor(&self) -> &dyn Regressor {
        match self {
            TrainedModel::LinearRegression(m) => m,
            TrainedModel::RidgeRegression(m) => m,
            TrainedModel::LassoRegression(m) => m,
            TrainedModel::DecisionTreeRegressor(m) => m,
            TrainedModel::RandomForestRegressor(m) => m,
            TrainedModel::GradientBoostingRegressor(m) => m,
            TrainedModel::Svr(m) => m,
        }
    }

    fn as_regressor_mut(&mut self) -> &mut dyn Regressor {
        match self {
            TrainedModel::LinearRegression(m) => m,
            TrainedModel::RidgeRegression(m) => m,
            TrainedModel::LassoRegression(m) => m,
            TrainedModel::DecisionTreeRegressor(m) => m,
            TrainedModel::RandomForestRegressor(m) => m,
            TrainedModel::GradientBoostingRegressor(m) => m,
            TrainedModel::Svr(m) => m,
        }
    }
}

impl Regressor for TrainedModel {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        self.as_regressor_mut().fit(x, y)
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.as_regressor().predict(x)
    }
}

/// Train and test partitions of a feature set
#[derive(Debug, Clone)]
pub struct TrainTestSplit {
    pub x_train: Array2<f64>,
    pub y_train: Array1<f64>,
    pub x_test: Array2<f64>,
    pub y_test: Array1<f64>,
    /// Source row of each training row
    pub train_indices: Vec<usize>,
    /// Source row of each test row
    pub test_indices: Vec<usize>,
}

impl TrainTestSplit {
    pub fn n_train(&self) -> usize {
        self.x_train.nrows()
    }

    pub fn n_test(&self) -> usize {
        self.x_test.nrows()
    }
}

/// What happened to one candidate
#[derive(Debug, Clone)]
pub enum CandidateOutcome {
    Scored {
        model: TrainedModel,
        metrics: ModelMetrics,
    },
    Failed {
        error: String,
    },
}

/// One roster entry after training
#[derive(Debug, Clone)]
pub struct ModelCandidate {
    pub name: String,
    /// Registration index in the roster
    pub index: usize,
    pub kind: ModelKind,
    pub outcome: CandidateOutcome,
    pub fit_duration: Duration,
}

impl ModelCandidate {
    pub fn metrics(&self) -> Option<&ModelMetrics> {
        match &self.outcome {
            CandidateOutcome::Scored { metrics, .. } => Some(metrics),
            CandidateOutcome::Failed { .. } => None,
        }
    }

    pub fn model(&self) -> Option<&TrainedModel> {
        match &self.outcome {
            CandidateOutcome::Scored { model, .. } => Some(model),
            CandidateOutcome::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            CandidateOutcome::Scored { .. } => None,
            CandidateOutcome::Failed { error } => Some(error),
        }
    }

    pub fn is_scored(&self) -> bool {
        matches!(self.outcome, CandidateOutcome::Scored { .. })
    }
}

/// Fits the configured roster on a seeded split
#[derive(Debug, Clone, Default)]
pub struct TrainEngine {
    config: TrainingConfig,
}

impl TrainEngine {
    /// Create a new training engine
    pub fn new(config: TrainingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Seeded shuffle split.
    ///
    /// `n_test = ceil(test_size · n)`; the first `n_test` indices of a
    /// ChaCha8 permutation form the test set. Both sides must be non-empty.
    pub fn split(&self, features: &FeatureSet) -> Result<TrainTestSplit> {
        self.config.validate()?;

        let n = features.n_samples();
        let n_test = (self.config.test_size * n as f64).ceil() as usize;
        if n_test == 0 || n_test >= n {
            return Err(HarvestError::empty("train/test split"));
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.config.random_seed);
        let mut permutation: Vec<usize> = (0..n).collect();
        permutation.shuffle(&mut rng);

        let test_indices = permutation[..n_test].to_vec();
        let train_indices = permutation[n_test..].to_vec();

        Ok(TrainTestSplit {
            x_train: features.x.select(Axis(0), &train_indices),
            y_train: features.y.select(Axis(0), &train_indices),
            x_test: features.x.select(Axis(0), &test_indices),
            y_test: features.y.select(Axis(0), &test_indices),
            train_indices,
            test_indices,
        })
    }

    /// Split, then fit and score every roster candidate
    pub fn train(&self, features: &FeatureSet) -> Result<(TrainTestSplit, Vec<ModelCandidate>)> {
        let split = self.split(features)?;
        info!(
            train = split.n_train(),
            test = split.n_test(),
            seed = self.config.random_seed,
            "Split feature table"
        );
        let candidates = self.fit_candidates(&split);
        Ok((split, candidates))
    }

    /// Fit every roster candidate on the training partition and score it on
    /// the test partition. Results come back in registration order whether
    /// or not the roster runs in parallel; a failing or panicking candidate
    /// is recorded as failed without affecting the others.
    pub fn fit_candidates(&self, split: &TrainTestSplit) -> Vec<ModelCandidate> {
        let roster: Vec<(usize, ModelKind)> = self.config.roster.iter().copied().enumerate().collect();

        if self.config.parallel {
            roster
                .par_iter()
                .map(|&(index, kind)| self.fit_one(index, kind, split))
                .collect()
        } else {
            roster
                .iter()
                .map(|&(index, kind)| self.fit_one(index, kind, split))
                .collect()
        }
    }

    fn fit_one(&self, index: usize, kind: ModelKind, split: &TrainTestSplit) -> ModelCandidate {
        let name = kind.display_name().to_string();
        let start = Instant::now();

        let result = panic::catch_unwind(AssertUnwindSafe(|| -> Result<(TrainedModel, ModelMetrics)> {
            let mut model = TrainedModel::for_kind(kind, self.config.random_seed);
            model.fit(&split.x_train, &split.y_train)?;
            let metrics = Evaluator::evaluate(&name, &model, &split.x_test, &split.y_test)?;
            Ok((model, metrics))
        }));
        let fit_duration = start.elapsed();

        let outcome = match result {
            Ok(Ok((model, metrics))) => {
                info!(
                    model = %name,
                    mse = metrics.mse,
                    mae = metrics.mae,
                    r2 = metrics.r2,
                    secs = fit_duration.as_secs_f64(),
                    "Scored candidate"
                );
                CandidateOutcome::Scored { model, metrics }
            }
            Ok(Err(e)) => {
                let error = HarvestError::CandidateFitError {
                    model: name.clone(),
                    reason: e.to_string(),
                };
                warn!(model = %name, error = %e, "Candidate failed");
                CandidateOutcome::Failed {
                    error: error.to_string(),
                }
            }
            Err(payload) => {
                let reason = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "panic during fit".to_string());
                warn!(model = %name, reason = %reason, "Candidate panicked");
                CandidateOutcome::Failed {
                    error: HarvestError::CandidateFitError {
                        model: name.clone(),
                        reason,
                    }
                    .to_string(),
                }
            }
        };

        ModelCandidate {
            name,
            index,
            kind,
            outcome,
            fit_duration,
        }
    }
}
