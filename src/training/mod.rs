//! Model training module
//!
//! Fits the fixed regression roster on a seeded split and picks a winner:
//! - Linear models (OLS, Ridge, Lasso)
//! - Decision tree, Random Forest and Gradient Boosting
//! - Support Vector Regression
//! - Held-out evaluation and best-R² selection

mod config;
mod engine;
mod models;
mod selection;
pub mod decision_tree;
pub mod gradient_boosting;
pub mod linear_models;
pub mod random_forest;
pub mod svm;

pub use config::{ModelKind, TrainingConfig};
pub use engine::{CandidateOutcome, ModelCandidate, TrainEngine, TrainTestSplit, TrainedModel};
pub use models::{Evaluator, ModelMetrics, Regressor};
pub use selection::{ComparisonRow, ModelSelector, SelectionResult};
pub use decision_tree::{DecisionTreeRegressor, TreeNode};
pub use gradient_boosting::{GradientBoostingConfig, GradientBoostingRegressor};
pub use linear_models::{LassoRegression, LinearRegression, RidgeRegression};
pub use random_forest::RandomForestRegressor;
pub use svm::{SVMConfig, SVMRegressor, MAX_TRAINING_SAMPLES};
