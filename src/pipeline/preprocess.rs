//! Feature scaling fit on training rows only

use crate::error::{Error, Result};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Preprocessing choice offered to the user
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Preprocessing {
    #[default]
    #[serde(rename = "None", alias = "none", alias = "identity")]
    Identity,
    #[serde(rename = "MinMaxScaler", alias = "minmax", alias = "min_max")]
    MinMax,
    #[serde(rename = "StandardScaler", alias = "standard", alias = "standardize")]
    Standardize,
}

impl Preprocessing {
    pub fn label(&self) -> &'static str {
        match self {
            Preprocessing::Identity => "None",
            Preprocessing::MinMax => "MinMaxScaler",
            Preprocessing::Standardize => "StandardScaler",
        }
    }
}

impl fmt::Display for Preprocessing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Preprocessing {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "none" | "identity" => Ok(Preprocessing::Identity),
            "minmaxscaler" | "minmax" | "min_max" => Ok(Preprocessing::MinMax),
            "standardscaler" | "standard" | "standardize" => Ok(Preprocessing::Standardize),
            other => Err(Error::InvalidSelection(format!("unknown preprocessing method '{}'", other))),
        }
    }
}

/// Fitted per-column parameters: `x' = (x - offset) / scale`
#[derive(Debug, Clone, PartialEq)]
pub enum ScalerParams {
    Identity { n_features: usize },
    Affine { offset: Array1<f64>, scale: Array1<f64> },
}

impl ScalerParams {
    pub fn n_features(&self) -> usize {
        match self {
            ScalerParams::Identity { n_features } => *n_features,
            ScalerParams::Affine { offset, .. } => offset.len(),
        }
    }
}

impl Preprocessing {
    /// Fit on `x_train` and return the transformed copy with the parameters
    pub fn fit_transform(
        &self,
        x_train: &Array2<f64>,
        feature_names: &[String],
    ) -> Result<(Array2<f64>, ScalerParams)> {
        let params = self.fit(x_train, feature_names)?;
        let transformed = transform(x_train, &params)?;
        Ok((transformed, params))
    }

    fn fit(&self, x: &Array2<f64>, feature_names: &[String]) -> Result<ScalerParams> {
        let n_features = x.ncols();
        match self {
            Preprocessing::Identity => Ok(ScalerParams::Identity { n_features }),
            Preprocessing::MinMax => {
                let (min, max) = column_min_max(x);
                let scale = (&max - &min).mapv(|range| if range > 0.0 { range } else { 1.0 });
                Ok(ScalerParams::Affine { offset: min, scale })
            }
            Preprocessing::Standardize => {
                if x.nrows() == 0 {
                    return Err(Error::EmptyTrainingSet);
                }
                let mean = x.mean_axis(Axis(0)).ok_or(Error::EmptyTrainingSet)?;
                let std = x.std_axis(Axis(0), 0.0);

                for (j, (&s, &m)) in std.iter().zip(mean.iter()).enumerate() {
                    if is_degenerate(s, m) {
                        let column = feature_names
                            .get(j)
                            .cloned()
                            .unwrap_or_else(|| format!("#{}", j));
                        return Err(Error::DegenerateColumn { column });
                    }
                }

                Ok(ScalerParams::Affine { offset: mean, scale: std })
            }
        }
    }
}

/// Apply fitted parameters; values outside the training range are not clipped
pub fn transform(x: &Array2<f64>, params: &ScalerParams) -> Result<Array2<f64>> {
    if x.ncols() != params.n_features() {
        return Err(Error::LengthMismatch {
            expected: params.n_features(),
            actual: x.ncols(),
        });
    }

    match params {
        ScalerParams::Identity { .. } => Ok(x.clone()),
        ScalerParams::Affine { offset, scale } => Ok((x - offset) / scale),
    }
}

fn column_min_max(x: &Array2<f64>) -> (Array1<f64>, Array1<f64>) {
    let min = x.fold_axis(Axis(0), f64::INFINITY, |acc, &v| acc.min(v));
    let max = x.fold_axis(Axis(0), f64::NEG_INFINITY, |acc, &v| acc.max(v));
    (min, max)
}

/// Zero spread relative to the column's magnitude
fn is_degenerate(std: f64, mean: f64) -> bool {
    !std.is_finite() || std <= f64::EPSILON * mean.abs().max(1.0)
}
