//! Support Vector Regression
//!
//! Epsilon-insensitive SVR trained by dual coordinate descent. The bias is
//! absorbed into the kernel (`K'(a, b) = K(a, b) + 1`), which removes the
//! equality constraint of the standard dual and leaves a box-constrained
//! problem over one coefficient `beta_i ∈ [-C, C]` per training row:
//!
//! `min ½·βᵀK'β − βᵀy' + ε·‖β‖₁`
//!
//! Targets are centered on their training mean before solving. Kernel rows
//! are computed on demand, so memory stays linear in the number of rows.

use super::models::{check_fit_input, Regressor};
use crate::error::{HarvestError, Result};
use ndarray::{Array1, Array2, ArrayView1, Axis, Zip};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Largest training set the solver accepts
pub const MAX_TRAINING_SAMPLES: usize = 20_000;

/// SVM configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SVMConfig {
    /// Regularization parameter (C)
    pub c: f64,
    /// Stop once no coefficient moves more than this in a sweep
    pub tol: f64,
    /// Maximum number of sweeps
    pub max_iter: usize,
    /// Seed for the coordinate visiting order
    pub random_state: Option<u64>,
    /// Epsilon for regression (SVR tube width)
    pub epsilon: f64,
}

impl Default for SVMConfig {
    fn default() -> Self {
        Self {
            c: 1.0,
            tol: 1e-3,
            max_iter: 1000,
            random_state: Some(42),
            epsilon: 0.1,
        }
    }
}

impl SVMConfig {
    fn validate(&self) -> Result<()> {
        if !(self.c > 0.0) || !self.c.is_finite() {
            return Err(HarvestError::InvalidParameter {
                name: "c".to_string(),
                value: self.c.to_string(),
                reason: "must be positive and finite".to_string(),
            });
        }
        if !(self.epsilon >= 0.0) {
            return Err(HarvestError::InvalidParameter {
                name: "epsilon".to_string(),
                value: self.epsilon.to_string(),
                reason: "must be non-negative".to_string(),
            });
        }
        Ok(())
    }
}

/// Augmented RBF kernel `exp(-γ·‖a − b‖²) + 1`
fn rbf_kernel(gamma: f64, a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    let norm_sq: f64 = a.iter().zip(b.iter()).map(|(p, q)| (p - q) * (p - q)).sum();
    (-gamma * norm_sq).exp() + 1.0
}

/// Support Vector Regressor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SVMRegressor {
    config: SVMConfig,
    /// RBF width resolved against the training data
    gamma: Option<f64>,
    support_vectors: Option<Array2<f64>>,
    /// Dual coefficients of the support vectors
    coefficients: Option<Array1<f64>>,
    /// Training target mean
    offset: f64,
    /// Sweeps used by the last fit
    pub n_iter: usize,
}

impl Default for SVMRegressor {
    fn default() -> Self {
        Self::new(SVMConfig::default())
    }
}

impl SVMRegressor {
    /// Create a new SVM regressor
    pub fn new(config: SVMConfig) -> Self {
        Self {
            config,
            gamma: None,
            support_vectors: None,
            coefficients: None,
            offset: 0.0,
            n_iter: 0,
        }
    }

    pub fn config(&self) -> &SVMConfig {
        &self.config
    }

    /// `1 / (n_features · Var(X))`, falling back to 1.0 for constant input
    pub fn scale_gamma(x: &Array2<f64>) -> f64 {
        let var = x.var(0.0);
        let denom = x.ncols() as f64 * var;
        if denom > 0.0 && denom.is_finite() {
            1.0 / denom
        } else {
            1.0
        }
    }

    fn soft_threshold(val: f64, threshold: f64) -> f64 {
        if val > threshold {
            val - threshold
        } else if val < -threshold {
            val + threshold
        } else {
            0.0
        }
    }

    /// Get number of support vectors
    pub fn n_support_vectors(&self) -> usize {
        self.support_vectors.as_ref().map(|sv| sv.nrows()).unwrap_or(0)
    }
}

impl Regressor for SVMRegressor {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        self.config.validate()?;

        let n = x.nrows();
        if n > MAX_TRAINING_SAMPLES {
            return Err(HarvestError::InvalidInput(format!(
                "Dataset has {} samples, exceeding the maximum {} for SVR. \
                 Consider subsampling or using a different algorithm.",
                n, MAX_TRAINING_SAMPLES
            )));
        }

        let gamma = Self::scale_gamma(x);
        let offset = y.mean().unwrap_or(0.0);
        let c = self.config.c;
        let eps = self.config.epsilon;

        let diag: Vec<f64> = (0..n).map(|i| rbf_kernel(gamma, x.row(i), x.row(i))).collect();
        let mut beta = Array1::<f64>::zeros(n);
        // Gradient of the smooth part: K'β − y'
        let mut grad: Array1<f64> = y.mapv(|v| offset - v);

        let mut rng = match self.config.random_state {
            Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
            None => Xoshiro256PlusPlus::from_entropy(),
        };
        let mut order: Vec<usize> = (0..n).collect();
        let mut converged = false;

        for sweep in 0..self.config.max_iter {
            order.shuffle(&mut rng);
            let mut max_delta = 0.0f64;

            for &i in &order {
                let kii = diag[i];
                if kii <= 0.0 {
                    continue;
                }
                let old = beta[i];
                let z = kii * old - grad[i];
                let new = (Self::soft_threshold(z, eps) / kii).clamp(-c, c);
                let delta = new - old;
                if delta == 0.0 {
                    continue;
                }
                beta[i] = new;
                max_delta = max_delta.max(delta.abs());

                let xi = x.row(i);
                Zip::from(&mut grad)
                    .and(x.rows())
                    .par_for_each(|g, xj| *g += delta * rbf_kernel(gamma, xi, xj));
            }

            self.n_iter = sweep + 1;
            if !max_delta.is_finite() || grad.iter().any(|g| !g.is_finite()) {
                return Err(HarvestError::ComputationError(
                    "SVR dual coordinate descent produced non-finite values".to_string(),
                ));
            }
            if max_delta < self.config.tol {
                converged = true;
                break;
            }
        }

        if !converged {
            warn!(
                max_iter = self.config.max_iter,
                "SVR coordinate descent did not converge; keeping the last iterate"
            );
        }

        let support_indices: Vec<usize> = (0..n).filter(|&i| beta[i] != 0.0).collect();
        debug!(
            gamma,
            support_vectors = support_indices.len(),
            sweeps = self.n_iter,
            "Fitted SVR"
        );

        self.support_vectors = Some(x.select(Axis(0), &support_indices));
        self.coefficients = Some(beta.select(Axis(0), &support_indices));
        self.gamma = Some(gamma);
        self.offset = offset;
        Ok(())
    }

    /// Predict target values
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let (gamma, sv, coefficients) = match (self.gamma, &self.support_vectors, &self.coefficients) {
            (Some(g), Some(sv), Some(c)) => (g, sv, c),
            _ => return Err(HarvestError::ModelNotFitted),
        };
        if sv.nrows() > 0 && x.ncols() != sv.ncols() {
            return Err(HarvestError::ShapeError {
                expected: format!("{} features", sv.ncols()),
                actual: format!("{} features", x.ncols()),
            });
        }

        let predictions: Vec<f64> = x
            .axis_iter(Axis(0))
            .into_par_iter()
            .map(|sample| {
                sv.axis_iter(Axis(0))
                    .zip(coefficients.iter())
                    .map(|(s, &b)| b * rbf_kernel(gamma, s, sample))
                    .sum::<f64>()
                    + self.offset
            })
            .collect();

        Ok(Array1::from_vec(predictions))
    }
}
