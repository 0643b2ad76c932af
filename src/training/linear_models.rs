//! Linear model implementations

use super::models::{check_fit_input, Regressor};
use crate::error::{HarvestError, Result};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Solve symmetric positive-definite system Ax = b using Cholesky decomposition.
/// Retries once with a small diagonal jitter if the matrix is not positive definite.
fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    cholesky_solve_inner(a, b).or_else(|| {
        let n = a.nrows();
        if n == 0 {
            return None;
        }
        let ridge = 1e-8 * a.diag().iter().map(|v| v.abs()).sum::<f64>() / n as f64;
        if ridge <= 0.0 {
            return None;
        }
        let mut a_reg = a.clone();
        for k in 0..n {
            a_reg[[k, k]] += ridge;
        }
        cholesky_solve_inner(&a_reg, b)
    })
}

fn cholesky_solve_inner(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    if n != a.ncols() || n != b.len() {
        return None;
    }

    // A = L * L^T
    let mut l = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let sum: f64 = (0..j).map(|k| l[[i, k]] * l[[j, k]]).sum();
            if i == j {
                let diag = a[[i, i]] - sum;
                if diag <= 0.0 || !diag.is_finite() {
                    return None;
                }
                l[[i, j]] = diag.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
            }
        }
    }

    // Forward substitution: L * y = b
    let mut y = Array1::<f64>::zeros(n);
    for i in 0..n {
        let sum: f64 = (0..i).map(|j| l[[i, j]] * y[j]).sum();
        y[i] = (b[i] - sum) / l[[i, i]];
    }

    // Backward substitution: L^T * x = y
    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let sum: f64 = ((i + 1)..n).map(|j| l[[j, i]] * x[j]).sum();
        x[i] = (y[i] - sum) / l[[i, i]];
    }

    Some(x)
}

/// Matrix inversion via Gauss-Jordan elimination with partial pivoting (fallback)
fn matrix_inverse(m: &Array2<f64>) -> Option<Array2<f64>> {
    let n = m.nrows();
    if n != m.ncols() {
        return None;
    }

    // Augmented matrix [M | I]
    let mut aug = Array2::<f64>::zeros((n, 2 * n));
    for i in 0..n {
        for j in 0..n {
            aug[[i, j]] = m[[i, j]];
        }
        aug[[i, n + i]] = 1.0;
    }

    for col in 0..n {
        let mut max_row = col;
        for row in col + 1..n {
            if aug[[row, col]].abs() > aug[[max_row, col]].abs() {
                max_row = row;
            }
        }
        if max_row != col {
            for j in 0..2 * n {
                aug.swap([col, j], [max_row, j]);
            }
        }

        if aug[[col, col]].abs() < 1e-10 {
            return None;
        }

        let pivot = aug[[col, col]];
        for j in 0..2 * n {
            aug[[col, j]] /= pivot;
        }

        for row in 0..n {
            if row != col {
                let factor = aug[[row, col]];
                for j in 0..2 * n {
                    aug[[row, j]] -= factor * aug[[col, j]];
                }
            }
        }
    }

    Some(aug.slice(ndarray::s![.., n..]).to_owned())
}

/// Solve `(X^T X + alpha*I) w = X^T y`, Cholesky first, Gauss-Jordan as fallback
fn solve_normal_equations(x: &Array2<f64>, y: &Array1<f64>, alpha: f64) -> Option<Array1<f64>> {
    let mut xtx = x.t().dot(x);
    for i in 0..xtx.nrows() {
        xtx[[i, i]] += alpha;
    }
    let xty = x.t().dot(y);

    cholesky_solve(&xtx, &xty).or_else(|| matrix_inverse(&xtx).map(|inv| inv.dot(&xty)))
}

/// Column means and centered copies of `x` and `y`
fn center(x: &Array2<f64>, y: &Array1<f64>) -> Result<(Array2<f64>, Array1<f64>, Array1<f64>, f64)> {
    let x_mean = x
        .mean_axis(Axis(0))
        .ok_or_else(|| HarvestError::InvalidInput("cannot center zero samples".to_string()))?;
    let y_mean = y.mean().unwrap_or(0.0);
    let x_c = x - &x_mean.clone().insert_axis(Axis(0));
    let y_c = y - y_mean;
    Ok((x_c, y_c, x_mean, y_mean))
}

fn linear_predict(coefficients: Option<&Array1<f64>>, intercept: f64, x: &Array2<f64>) -> Result<Array1<f64>> {
    let coefficients = coefficients.ok_or(HarvestError::ModelNotFitted)?;
    if x.ncols() != coefficients.len() {
        return Err(HarvestError::ShapeError {
            expected: format!("{} features", coefficients.len()),
            actual: format!("{} features", x.ncols()),
        });
    }
    Ok(x.dot(coefficients) + intercept)
}

/// Ordinary least squares with intercept
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinearRegression {
    /// Fitted coefficients (weights)
    pub coefficients: Option<Array1<f64>>,
    /// Fitted intercept (bias)
    pub intercept: f64,
}

impl LinearRegression {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Regressor for LinearRegression {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        let (x_c, y_c, x_mean, y_mean) = center(x, y)?;

        let coefficients = solve_normal_equations(&x_c, &y_c, 0.0).ok_or_else(|| {
            HarvestError::ComputationError("Matrix is singular, cannot solve least squares".to_string())
        })?;

        self.intercept = y_mean - coefficients.dot(&x_mean);
        self.coefficients = Some(coefficients);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        linear_predict(self.coefficients.as_ref(), self.intercept, x)
    }
}

/// Ridge Regression (L2-regularized; the intercept is not penalized)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RidgeRegression {
    pub coefficients: Option<Array1<f64>>,
    pub intercept: f64,
    /// L2 regularization strength
    pub alpha: f64,
}

impl Default for RidgeRegression {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl RidgeRegression {
    pub fn new(alpha: f64) -> Self {
        Self {
            coefficients: None,
            intercept: 0.0,
            alpha,
        }
    }
}

impl Regressor for RidgeRegression {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        if !(self.alpha >= 0.0) {
            return Err(HarvestError::InvalidParameter {
                name: "alpha".to_string(),
                value: self.alpha.to_string(),
                reason: "must be non-negative".to_string(),
            });
        }
        let (x_c, y_c, x_mean, y_mean) = center(x, y)?;

        let coefficients = solve_normal_equations(&x_c, &y_c, self.alpha)
            .ok_or_else(|| HarvestError::ComputationError("Singular matrix".to_string()))?;

        self.intercept = y_mean - coefficients.dot(&x_mean);
        self.coefficients = Some(coefficients);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        linear_predict(self.coefficients.as_ref(), self.intercept, x)
    }
}

/// Lasso Regression (L1-regularized via cyclic coordinate descent).
///
/// Minimizes `1/(2n)·‖y − Xw − b‖² + alpha·‖w‖₁`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LassoRegression {
    pub coefficients: Option<Array1<f64>>,
    pub intercept: f64,
    /// L1 regularization strength
    pub alpha: f64,
    pub max_iter: usize,
    pub tol: f64,
    /// Iterations used by the last fit
    pub n_iter: usize,
}

impl Default for LassoRegression {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl LassoRegression {
    pub fn new(alpha: f64) -> Self {
        Self {
            coefficients: None,
            intercept: 0.0,
            alpha,
            max_iter: 1000,
            tol: 1e-4,
            n_iter: 0,
        }
    }

    /// Soft-threshold operator for L1 proximal step
    fn soft_threshold(val: f64, threshold: f64) -> f64 {
        if val > threshold {
            val - threshold
        } else if val < -threshold {
            val + threshold
        } else {
            0.0
        }
    }
}

impl Regressor for LassoRegression {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        check_fit_input(x, y)?;
        let n_samples = x.nrows();
        let n_features = x.ncols();
        let (x_c, y_c, x_mean, y_mean) = center(x, y)?;

        let col_norms: Vec<f64> = (0..n_features)
            .map(|j| x_c.column(j).mapv(|v| v * v).sum())
            .collect();

        let mut w = Array1::<f64>::zeros(n_features);
        let mut r = y_c.clone();
        let lambda = self.alpha * n_samples as f64;
        let mut converged = false;

        for iter in 0..self.max_iter {
            let mut max_delta = 0.0f64;
            let mut max_w = 0.0f64;

            for j in 0..n_features {
                if col_norms[j] < 1e-15 {
                    w[j] = 0.0;
                    continue;
                }
                let old_wj = w[j];
                let rho = x_c.column(j).dot(&r) + col_norms[j] * old_wj;
                let new_wj = Self::soft_threshold(rho, lambda) / col_norms[j];
                if new_wj != old_wj {
                    r.scaled_add(old_wj - new_wj, &x_c.column(j));
                    w[j] = new_wj;
                }
                max_delta = max_delta.max((new_wj - old_wj).abs());
                max_w = max_w.max(new_wj.abs());
            }

            if !max_delta.is_finite() {
                return Err(HarvestError::ComputationError(
                    "coordinate descent diverged".to_string(),
                ));
            }

            self.n_iter = iter + 1;
            if max_w == 0.0 || max_delta / max_w < self.tol {
                converged = true;
                break;
            }
        }

        if !converged {
            warn!(
                max_iter = self.max_iter,
                "Lasso coordinate descent did not converge"
            );
        }

        self.intercept = y_mean - w.dot(&x_mean);
        self.coefficients = Some(w);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        linear_predict(self.coefficients.as_ref(), self.intercept, x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn plane() -> (Array2<f64>, Array1<f64>) {
        let x = array![
            [1.0, 2.0],
            [2.0, 1.0],
            [3.0, 4.0],
            [4.0, 3.0],
            [5.0, 6.0],
            [6.0, 5.0],
        ];
        let y = x.column(0).mapv(|v| 2.0 * v) + x.column(1).mapv(|v| 0.5 * v) + 1.0;
        (x, y)
    }

    #[test]
    fn test_linear_regression_exact() {
        let (x, y) = plane();
        let mut model = LinearRegression::new();
        model.fit(&x, &y).unwrap();

        let coef = model.coefficients.as_ref().unwrap();
        assert!((coef[0] - 2.0).abs() < 1e-8);
        assert!((coef[1] - 0.5).abs() < 1e-8);
        assert!((model.intercept - 1.0).abs() < 1e-8);
    }

    #[test]
    fn test_ridge_shrinks_coefficients() {
        let (x, y) = plane();
        let mut ols = LinearRegression::new();
        ols.fit(&x, &y).unwrap();
        let mut ridge = RidgeRegression::new(10.0);
        ridge.fit(&x, &y).unwrap();

        let ols_norm = ols.coefficients.unwrap().mapv(|v| v * v).sum();
        let ridge_norm = ridge.coefficients.unwrap().mapv(|v| v * v).sum();
        assert!(ridge_norm < ols_norm);
    }

    #[test]
    fn test_lasso_small_alpha_close_to_ols() {
        let (x, y) = plane();
        let mut lasso = LassoRegression::new(1e-4);
        lasso.fit(&x, &y).unwrap();

        let predictions = lasso.predict(&x).unwrap();
        for (p, t) in predictions.iter().zip(y.iter()) {
            assert!((p - t).abs() < 0.05, "pred {} vs {}", p, t);
        }
    }

    #[test]
    fn test_lasso_large_alpha_zeroes_weights() {
        let (x, y) = plane();
        let mut lasso = LassoRegression::new(1e6);
        lasso.fit(&x, &y).unwrap();

        assert!(lasso.coefficients.as_ref().unwrap().iter().all(|&w| w == 0.0));
        assert!((lasso.intercept - y.mean().unwrap()).abs() < 1e-9);
    }

    #[test]
    fn test_predict_before_fit() {
        let model = LinearRegression::new();
        assert!(matches!(
            model.predict(&array![[1.0, 2.0]]),
            Err(HarvestError::ModelNotFitted)
        ));
    }

    #[test]
    fn test_shape_mismatch() {
        let mut model = RidgeRegression::default();
        let err = model.fit(&array![[1.0], [2.0]], &array![1.0]).unwrap_err();
        assert!(matches!(err, HarvestError::ShapeError { .. }));
    }
}
