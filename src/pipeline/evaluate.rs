//! Regression metrics on the held-out split

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// Mean squared error
    pub mse: f64,
    /// Mean absolute error
    pub mae: f64,
    /// Coefficient of determination, negative when worse than predicting the mean
    pub r2: f64,
}

impl EvaluationResult {
    /// Metrics rounded to `decimals` places for display, halves to even
    pub fn rounded(&self, decimals: i32) -> Self {
        let factor = 10f64.powi(decimals);
        let round = |v: f64| (v * factor).round_ties_even() / factor;
        Self {
            mse: round(self.mse),
            mae: round(self.mae),
            r2: round(self.r2),
        }
    }
}

pub fn evaluate(y_true: &[f64], y_pred: &[f64]) -> Result<EvaluationResult> {
    if y_true.len() != y_pred.len() {
        return Err(Error::LengthMismatch {
            expected: y_true.len(),
            actual: y_pred.len(),
        });
    }
    if y_true.is_empty() {
        return Err(Error::InsufficientData("no samples to evaluate".to_string()));
    }

    Ok(EvaluationResult {
        mse: mean_squared_error(y_true, y_pred),
        mae: mean_absolute_error(y_true, y_pred),
        r2: r2_score(y_true, y_pred),
    })
}

fn mean_squared_error(y_true: &[f64], y_pred: &[f64]) -> f64 {
    let n = y_true.len() as f64;
    y_true
        .iter()
        .zip(y_pred)
        .map(|(t, p)| (t - p).powi(2))
        .sum::<f64>()
        / n
}

fn mean_absolute_error(y_true: &[f64], y_pred: &[f64]) -> f64 {
    let n = y_true.len() as f64;
    y_true.iter().zip(y_pred).map(|(t, p)| (t - p).abs()).sum::<f64>() / n
}

/// A constant truth gives 1.0 for a perfect fit and 0.0 otherwise
fn r2_score(y_true: &[f64], y_pred: &[f64]) -> f64 {
    let mean = y_true.iter().sum::<f64>() / y_true.len() as f64;
    let ss_tot: f64 = y_true.iter().map(|t| (t - mean).powi(2)).sum();
    let ss_res: f64 = y_true.iter().zip(y_pred).map(|(t, p)| (t - p).powi(2)).sum();

    if ss_tot == 0.0 {
        return if ss_res == 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}
