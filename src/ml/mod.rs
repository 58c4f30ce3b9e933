//! Regression models
//!
//! Provides the models offered on the dashboard:
//! - Ordinary least squares linear regression (signed coefficients as importance)
//! - Random forest of CART regression trees (impurity-based importance)
//!
//! Models are chosen through the tagged [`ModelSpec`]; display names are
//! parsed once with [`ModelKind::from_str`].

pub mod forest;
pub mod linear;
mod tree;


pub use forest::{RandomForestConfig, RandomForestModel};
pub use linear::{LinearRegressionConfig, LinearRegressionModel};

use crate::config::ModelDefaults;
use crate::error::{Error, Result};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What an importance value means for a given model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportanceKind {
    /// Signed fitted coefficient, in units of the (scaled) input
    Coefficient,
    /// Normalised impurity decrease, non-negative, sums to 1
    Impurity,
}

/// A fitted model
pub trait Predictor: fmt::Debug + Send + Sync {
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>>;

    /// One value per feature, positionally aligned with the training columns
    fn importances(&self) -> &Array1<f64>;

    fn importance_kind(&self) -> ImportanceKind;

    /// Model name for logging
    fn name(&self) -> &str;
}

/// An unfitted model configuration
pub trait Regressor {
    type Fitted: Predictor + 'static;

    fn fit(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<Self::Fitted>;
}

/// Model family, as selected by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    LinearRegression,
    RandomForest,
}

impl ModelKind {
    pub fn label(&self) -> &'static str {
        match self {
            ModelKind::LinearRegression => "Linear Regression",
            ModelKind::RandomForest => "Random Forest",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ModelKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let key: String = s
            .chars()
            .filter(|c| !matches!(c, ' ' | '_' | '-'))
            .collect::<String>()
            .to_lowercase();

        match key.as_str() {
            "linearregression" | "linear" | "ols" => Ok(ModelKind::LinearRegression),
            "randomforest" | "forest" | "rf" => Ok(ModelKind::RandomForest),
            _ => Err(Error::UnsupportedModel(s.to_string())),
        }
    }
}

/// Optional hyperparameter overrides, as sent by the CLI or the dashboard
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelParams {
    #[serde(default)]
    pub fit_intercept: Option<bool>,
    #[serde(default)]
    pub n_estimators: Option<usize>,
    #[serde(default)]
    pub max_depth: Option<usize>,
    #[serde(default)]
    pub min_samples_split: Option<usize>,
    #[serde(default)]
    pub min_samples_leaf: Option<usize>,
    #[serde(default)]
    pub seed: Option<u64>,
}

/// Fully specified model choice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelSpec {
    LinearRegression(LinearRegressionConfig),
    RandomForest(RandomForestConfig),
}

impl Default for ModelSpec {
    fn default() -> Self {
        ModelSpec::LinearRegression(LinearRegressionConfig::default())
    }
}

impl ModelSpec {
    /// Combine a model family with overrides on top of configured defaults
    pub fn resolve(kind: ModelKind, params: &ModelParams, defaults: &ModelDefaults) -> Result<Self> {
        let spec = match kind {
            ModelKind::LinearRegression => ModelSpec::LinearRegression(LinearRegressionConfig {
                fit_intercept: params.fit_intercept.unwrap_or(true),
            }),
            ModelKind::RandomForest => ModelSpec::RandomForest(RandomForestConfig {
                n_estimators: params.n_estimators.unwrap_or(defaults.n_estimators),
                max_depth: params.max_depth.or(defaults.max_depth),
                min_samples_split: params.min_samples_split.unwrap_or(defaults.min_samples_split),
                min_samples_leaf: params.min_samples_leaf.unwrap_or(defaults.min_samples_leaf),
                seed: params.seed.unwrap_or(defaults.seed),
            }),
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Parse a display name such as "Random Forest"
    pub fn from_name(name: &str, params: &ModelParams, defaults: &ModelDefaults) -> Result<Self> {
        Self::resolve(name.parse()?, params, defaults)
    }

    pub fn kind(&self) -> ModelKind {
        match self {
            ModelSpec::LinearRegression(_) => ModelKind::LinearRegression,
            ModelSpec::RandomForest(_) => ModelKind::RandomForest,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            ModelSpec::LinearRegression(_) => Ok(()),
            ModelSpec::RandomForest(config) => config.validate(),
        }
    }

    /// Fit the selected model on training rows
    pub fn fit(&self, x: &Array2<f64>, y: &Array1<f64>, feature_names: &[String]) -> Result<TrainedModel> {
        if feature_names.len() != x.ncols() {
            return Err(Error::LengthMismatch {
                expected: x.ncols(),
                actual: feature_names.len(),
            });
        }

        let inner: Box<dyn Predictor> = match self {
            ModelSpec::LinearRegression(config) => Box::new(config.fit(x, y)?),
            ModelSpec::RandomForest(config) => Box::new(config.fit(x, y)?),
        };

        tracing::debug!(
            model = inner.name(),
            rows = x.nrows(),
            features = x.ncols(),
            "Model fitted"
        );

        Ok(TrainedModel {
            inner,
            feature_names: feature_names.to_vec(),
        })
    }
}

/// Fitted state plus the feature names its importances are aligned with
#[derive(Debug)]
pub struct TrainedModel {
    inner: Box<dyn Predictor>,
    feature_names: Vec<String>,
}

impl TrainedModel {
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.inner.predict(x)
    }

    pub fn importances(&self) -> &Array1<f64> {
        self.inner.importances()
    }

    pub fn importance_kind(&self) -> ImportanceKind {
        self.inner.importance_kind()
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }
}

/// Shape and finiteness checks shared by every model's `fit`
pub(crate) fn check_training_data(x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
    if x.nrows() == 0 {
        return Err(Error::EmptyTrainingSet);
    }
    if y.len() != x.nrows() {
        return Err(Error::LengthMismatch {
            expected: x.nrows(),
            actual: y.len(),
        });
    }
    if x.ncols() == 0 {
        return Err(Error::InvalidSelection("no feature columns to train on".to_string()));
    }
    if !x.iter().all(|v| v.is_finite()) {
        return Err(Error::InvalidSelection("training features contain NaN or infinite values".to_string()));
    }
    if !y.iter().all(|v| v.is_finite()) {
        return Err(Error::InvalidSelection("training target contains NaN or infinite values".to_string()));
    }
    Ok(())
}

/// Column count and finiteness check shared by every model's `predict`
pub(crate) fn check_prediction_width(x: &Array2<f64>, n_features: usize) -> Result<()> {
    if x.ncols() != n_features {
        return Err(Error::LengthMismatch {
            expected: n_features,
            actual: x.ncols(),
        });
    }
    if !x.iter().all(|v| v.is_finite()) {
        return Err(Error::InvalidSelection("prediction features contain NaN or infinite values".to_string()));
    }
    Ok(())
}
