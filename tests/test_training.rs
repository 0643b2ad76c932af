//! Integration test: roster training, evaluation and selection

use harvest_automl::preprocessing::FeatureSet;
use harvest_automl::training::{
    Evaluator, ModelKind, ModelMetrics, ModelSelector, Regressor, TrainEngine, TrainingConfig,
};
use harvest_automl::Result;
use ndarray::{array, Array1, Array2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Production = 2·area + 0.5·yield + small uniform noise
fn linear_features(n: usize) -> FeatureSet {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let mut x = Array2::<f64>::zeros((n, 2));
    let mut y = Array1::<f64>::zeros(n);
    for i in 0..n {
        let area: f64 = rng.gen_range(100.0..1000.0);
        let crop_yield: f64 = rng.gen_range(10.0..50.0);
        x[[i, 0]] = area;
        x[[i, 1]] = crop_yield;
        y[i] = 2.0 * area + 0.5 * crop_yield + rng.gen_range(-5.0..5.0);
    }
    FeatureSet { x, y }
}

/// Predicts a fixed value for every row
struct ConstantModel(f64);

impl Regressor for ConstantModel {
    fn fit(&mut self, _x: &Array2<f64>, _y: &Array1<f64>) -> Result<()> {
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        Ok(Array1::from_elem(x.nrows(), self.0))
    }
}

// ============================================================================
// Split
// ============================================================================

#[test]
fn test_split_sizes_and_reproducibility() {
    let features = linear_features(101);
    let engine = TrainEngine::new(TrainingConfig::default());

    let a = engine.split(&features).unwrap();
    let b = engine.split(&features).unwrap();
    assert_eq!(a.n_test(), 21);
    assert_eq!(a.n_train(), 80);
    assert_eq!(a.test_indices, b.test_indices);
    assert_eq!(a.train_indices, b.train_indices);

    let other = TrainEngine::new(TrainingConfig::default().with_random_seed(43))
        .split(&features)
        .unwrap();
    assert_ne!(a.test_indices, other.test_indices);
}

// ============================================================================
// Evaluator
// ============================================================================

#[test]
fn test_mean_predictor_metrics() {
    let x = array![[1.0, 1.0], [2.0, 2.0], [3.0, 3.0]];
    let y = array![10.0, 20.0, 30.0];

    let metrics = Evaluator::evaluate("mean", &ConstantModel(20.0), &x, &y).unwrap();
    assert!((metrics.mse - 200.0 / 3.0).abs() < 1e-10);
    assert!((metrics.mae - 20.0 / 3.0).abs() < 1e-10);
    assert!(metrics.r2.abs() < 1e-12);
    assert_eq!(metrics.n_samples, 3);
}

#[test]
fn test_non_finite_prediction_is_candidate_failure() {
    let x = array![[1.0, 1.0], [2.0, 2.0]];
    let y = array![1.0, 2.0];
    let result = Evaluator::evaluate("broken", &ConstantModel(f64::NAN), &x, &y);
    assert!(matches!(
        result,
        Err(harvest_automl::HarvestError::CandidateFitError { .. })
    ));
}

// ============================================================================
// Roster
// ============================================================================

#[test]
fn test_full_roster_on_linear_data() {
    let features = linear_features(200);
    let engine = TrainEngine::new(TrainingConfig::default());
    let (split, candidates) = engine.train(&features).unwrap();

    assert_eq!(split.n_test(), 40);
    assert_eq!(candidates.len(), ModelKind::ALL.len());
    for (i, candidate) in candidates.iter().enumerate() {
        assert_eq!(candidate.index, i);
        assert_eq!(candidate.kind, ModelKind::ALL[i]);
        assert_eq!(candidate.name, ModelKind::ALL[i].display_name());
    }

    for kind in [
        ModelKind::LinearRegression,
        ModelKind::RidgeRegression,
        ModelKind::LassoRegression,
    ] {
        let metrics = candidates
            .iter()
            .find(|c| c.kind == kind)
            .and_then(|c| c.metrics())
            .unwrap();
        assert!(metrics.r2 > 0.9, "{} R² = {}", kind, metrics.r2);
    }

    let selection = ModelSelector::new().select(candidates).unwrap();
    assert!(
        [
            "Linear Regression",
            "Ridge Regression",
            "Lasso Regression"
        ]
        .contains(&selection.winner_name()),
        "unexpected winner {}",
        selection.winner_name()
    );
    assert_eq!(selection.comparison.len(), ModelKind::ALL.len());
}

#[test]
fn test_parallel_and_sequential_agree() {
    let features = linear_features(120);
    let roster = vec![
        ModelKind::DecisionTreeRegressor,
        ModelKind::RandomForestRegressor,
        ModelKind::GradientBoostingRegressor,
    ];

    let parallel = TrainEngine::new(TrainingConfig::default().with_roster(roster.clone()));
    let sequential = TrainEngine::new(
        TrainingConfig::default()
            .with_roster(roster)
            .with_parallel(false),
    );

    let (_, a) = parallel.train(&features).unwrap();
    let (_, b) = sequential.train(&features).unwrap();

    let metrics = |c: &[harvest_automl::training::ModelCandidate]| -> Vec<ModelMetrics> {
        c.iter().map(|c| *c.metrics().unwrap()).collect()
    };
    assert_eq!(metrics(&a), metrics(&b));
}

#[test]
fn test_rerun_reproduces_winner_and_metrics() {
    let features = linear_features(150);
    let engine = TrainEngine::new(TrainingConfig::default());

    let (_, first) = engine.train(&features).unwrap();
    let (_, second) = engine.train(&features).unwrap();

    let first = ModelSelector::new().select(first).unwrap();
    let second = ModelSelector::new().select(second).unwrap();
    assert_eq!(first.winner_name(), second.winner_name());
    assert_eq!(first.comparison, second.comparison);
}
