//! Regressor capability, evaluation metrics and the evaluator

use crate::error::{HarvestError, Result};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Fit/predict capability shared by every roster variant
pub trait Regressor: Send + Sync {
    /// Fit the model to training data
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()>;

    /// Make predictions
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>>;
}

/// Check that `x` and `y` agree on the number of samples and are non-empty
pub(crate) fn check_fit_input(x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(HarvestError::ShapeError {
            expected: format!("y length = {}", x.nrows()),
            actual: format!("y length = {}", y.len()),
        });
    }
    if x.nrows() == 0 {
        return Err(HarvestError::InvalidInput("cannot fit on zero samples".to_string()));
    }
    Ok(())
}

/// Held-out regression metrics for one candidate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    /// Mean squared error
    pub mse: f64,
    /// Root mean squared error
    pub rmse: f64,
    /// Mean absolute error
    pub mae: f64,
    /// Coefficient of determination
    pub r2: f64,
    /// Number of evaluated samples
    pub n_samples: usize,
}

impl ModelMetrics {
    /// Compute regression metrics.
    ///
    /// When the true values have zero variance, R² is 1.0 for a perfect fit
    /// and 0.0 otherwise.
    pub fn compute_regression(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<Self> {
        if y_true.len() != y_pred.len() {
            return Err(HarvestError::ShapeError {
                expected: format!("{} predictions", y_true.len()),
                actual: format!("{} predictions", y_pred.len()),
            });
        }
        if y_true.is_empty() {
            return Err(HarvestError::InvalidInput(
                "cannot score an empty test set".to_string(),
            ));
        }

        let n = y_true.len() as f64;
        let errors: Vec<f64> = y_true
            .iter()
            .zip(y_pred.iter())
            .map(|(t, p)| t - p)
            .collect();

        let ss_res: f64 = errors.iter().map(|e| e * e).sum();
        let mse = ss_res / n;
        let mae = errors.iter().map(|e| e.abs()).sum::<f64>() / n;

        let y_mean = y_true.sum() / n;
        let ss_tot: f64 = y_true.iter().map(|y| (y - y_mean).powi(2)).sum();

        let r2 = if ss_tot > 0.0 {
            1.0 - ss_res / ss_tot
        } else if ss_res == 0.0 {
            1.0
        } else {
            0.0
        };

        Ok(Self {
            mse,
            rmse: mse.sqrt(),
            mae,
            r2,
            n_samples: y_true.len(),
        })
    }
}

/// Scores fitted models on held-out data
#[derive(Debug, Clone, Copy, Default)]
pub struct Evaluator;

impl Evaluator {
    /// Predict on the test partition and compute MSE, MAE and R².
    ///
    /// Non-finite predictions or scores are a
    /// [`HarvestError::CandidateFitError`]; they are never replaced by a default.
    pub fn evaluate<M: Regressor + ?Sized>(
        name: &str,
        model: &M,
        x_test: &Array2<f64>,
        y_test: &Array1<f64>,
    ) -> Result<ModelMetrics> {
        let y_pred = model.predict(x_test)?;
        if let Some(idx) = y_pred.iter().position(|p| !p.is_finite()) {
            return Err(HarvestError::CandidateFitError {
                model: name.to_string(),
                reason: format!("non-finite prediction for test row {}", idx),
            });
        }
        let metrics = ModelMetrics::compute_regression(y_test, &y_pred)?;
        if !(metrics.mse.is_finite() && metrics.r2.is_finite()) {
            return Err(HarvestError::CandidateFitError {
                model: name.to_string(),
                reason: format!("non-finite score (mse = {}, r2 = {})", metrics.mse, metrics.r2),
            });
        }
        Ok(metrics)
    }
}
