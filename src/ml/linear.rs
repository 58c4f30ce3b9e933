//! Ordinary least squares linear regression
//!
//! Solves the normal equations `(X'X) β = X'y` by Cholesky decomposition.
//! With an intercept the system is built from centred data and the
//! intercept is recovered as `ȳ - x̄·β`.

use super::{check_prediction_width, check_training_data, ImportanceKind, Predictor, Regressor};
use crate::error::{Error, Result};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Relative pivot size below which the matrix is treated as singular
const PIVOT_TOLERANCE: f64 = 1e-12;
/// First diagonal jitter, relative to the largest diagonal entry
const INITIAL_JITTER: f64 = 1e-10;
const MAX_JITTER_ATTEMPTS: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinearRegressionConfig {
    #[serde(default = "default_fit_intercept")]
    pub fit_intercept: bool,
}

fn default_fit_intercept() -> bool {
    true
}

impl Default for LinearRegressionConfig {
    fn default() -> Self {
        Self {
            fit_intercept: default_fit_intercept(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LinearRegressionModel {
    coefficients: Array1<f64>,
    intercept: f64,
}

impl LinearRegressionModel {
    pub fn coefficients(&self) -> &Array1<f64> {
        &self.coefficients
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }
}

impl Regressor for LinearRegressionConfig {
    type Fitted = LinearRegressionModel;

    fn fit(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<LinearRegressionModel> {
        check_training_data(x, y)?;

        let (x_design, y_design, x_mean, y_mean) = if self.fit_intercept {
            let x_mean = x.mean_axis(Axis(0)).ok_or(Error::EmptyTrainingSet)?;
            let y_mean = y.mean().ok_or(Error::EmptyTrainingSet)?;
            (x - &x_mean, y - y_mean, Some(x_mean), y_mean)
        } else {
            (x.clone(), y.clone(), None, 0.0)
        };

        let xtx = x_design.t().dot(&x_design);
        let xty = x_design.t().dot(&y_design);
        let coefficients = solve_normal_equations(&xtx, &xty)?;

        let intercept = match x_mean {
            Some(x_mean) => y_mean - x_mean.dot(&coefficients),
            None => 0.0,
        };

        Ok(LinearRegressionModel {
            coefficients,
            intercept,
        })
    }
}

impl Predictor for LinearRegressionModel {
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        check_prediction_width(x, self.coefficients.len())?;
        Ok(x.dot(&self.coefficients) + self.intercept)
    }

    fn importances(&self) -> &Array1<f64> {
        &self.coefficients
    }

    fn importance_kind(&self) -> ImportanceKind {
        ImportanceKind::Coefficient
    }

    fn name(&self) -> &str {
        "Linear Regression"
    }
}

/// Solve a symmetric positive semi-definite system, adding diagonal jitter
/// when collinear columns make it singular
fn solve_normal_equations(a: &Array2<f64>, b: &Array1<f64>) -> Result<Array1<f64>> {
    if let Some(beta) = cholesky_solve(a, b) {
        return Ok(beta);
    }

    let scale = a.diag().iter().fold(0.0_f64, |m, v| m.max(v.abs())).max(1.0);
    let mut jitter = INITIAL_JITTER * scale;

    for _ in 0..MAX_JITTER_ATTEMPTS {
        let mut regularized = a.clone();
        regularized.diag_mut().mapv_inplace(|v| v + jitter);
        if let Some(beta) = cholesky_solve(&regularized, b) {
            tracing::debug!(jitter, "Normal equations regularized");
            return Ok(beta);
        }
        jitter *= 100.0;
    }

    Err(Error::Internal("normal equations could not be solved".to_string()))
}

/// `None` when a pivot collapses
fn cholesky_solve(a: &Array2<f64>, b: &Array1<f64>) -> Option<Array1<f64>> {
    let n = a.nrows();
    let mut l = Array2::<f64>::zeros((n, n));

    for i in 0..n {
        for j in 0..=i {
            let mut sum = 0.0;
            for k in 0..j {
                sum += l[[i, k]] * l[[j, k]];
            }

            if i == j {
                let pivot = a[[i, i]] - sum;
                if !pivot.is_finite() || pivot <= PIVOT_TOLERANCE * a[[i, i]].abs() {
                    return None;
                }
                l[[i, j]] = pivot.sqrt();
            } else {
                l[[i, j]] = (a[[i, j]] - sum) / l[[j, j]];
            }
        }
    }

    // L z = b
    let mut z = Array1::<f64>::zeros(n);
    for i in 0..n {
        let mut sum = 0.0;
        for j in 0..i {
            sum += l[[i, j]] * z[j];
        }
        z[i] = (b[i] - sum) / l[[i, i]];
    }

    // L' x = z
    let mut x = Array1::<f64>::zeros(n);
    for i in (0..n).rev() {
        let mut sum = 0.0;
        for j in (i + 1)..n {
            sum += l[[j, i]] * x[j];
        }
        x[i] = (z[i] - sum) / l[[i, i]];
    }

    Some(x)
}
