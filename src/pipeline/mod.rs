//! End-to-end prediction pipeline
//!
//! ```text
//! StockTable → split → preprocess → fit → predict → evaluate → PipelineResult
//! ```
//!
//! Every run starts from scratch; nothing is carried over between runs.

pub mod evaluate;
pub mod preprocess;
pub mod split;

#[cfg(test)]
mod tests;

pub use evaluate::{evaluate, EvaluationResult};
pub use preprocess::{Preprocessing, ScalerParams};
pub use split::{split, Split, SplitSizes, DEFAULT_TEST_FRACTION};

use crate::config::Config;
use crate::data::{DataStore, StockTable, TablePreview};
use crate::error::{Error, Result};
use crate::ml::{ImportanceKind, ModelKind, ModelParams, ModelSpec, TrainedModel};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Everything one run needs, with the model already resolved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub symbol: String,
    pub features: Vec<String>,
    pub target: String,
    pub test_fraction: f64,
    pub preprocessing: Preprocessing,
    pub model: ModelSpec,
    pub preview_rows: usize,
}

/// User request as received from the dashboard or the CLI.
/// The model is named by its display string and resolved against the
/// configured defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRequest {
    pub symbol: String,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub test_fraction: Option<f64>,
    #[serde(default)]
    pub preprocessing: Preprocessing,
    #[serde(default = "default_model_name")]
    pub model: String,
    #[serde(default)]
    pub params: ModelParams,
}

fn default_model_name() -> String {
    ModelKind::LinearRegression.label().to_string()
}

impl PipelineRequest {
    /// Linear regression on the configured default features
    pub fn for_symbol(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            features: Vec::new(),
            target: None,
            test_fraction: None,
            preprocessing: Preprocessing::default(),
            model: default_model_name(),
            params: ModelParams::default(),
        }
    }

    /// Fill gaps from configuration and resolve the model name
    pub fn resolve(&self, config: &Config) -> Result<PipelineConfig> {
        let features = if self.features.is_empty() {
            config.pipeline.default_features.clone()
        } else {
            self.features.clone()
        };

        Ok(PipelineConfig {
            symbol: self.symbol.clone(),
            features,
            target: self.target.clone().unwrap_or_else(|| config.data.target.clone()),
            test_fraction: self.test_fraction.unwrap_or(config.pipeline.test_fraction),
            preprocessing: self.preprocessing,
            model: ModelSpec::from_name(&self.model, &self.params, &config.model)?,
            preview_rows: config.pipeline.preview_rows,
        })
    }
}

/// One ranked row of the importance table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    /// Signed coefficient or impurity importance
    pub value: f64,
    /// `|value|`, the ranking key
    pub magnitude: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChartPoint {
    pub index: usize,
    pub value: f64,
}

/// Three line series indexed by row position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSeries {
    pub train_actual: Vec<ChartPoint>,
    pub test_actual: Vec<ChartPoint>,
    pub predictions: Vec<ChartPoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub symbol: String,
    pub target: String,
    pub features: Vec<String>,
    pub preprocessing: Preprocessing,
    pub model: ModelSpec,
    pub sizes: SplitSizes,
    pub preview: TablePreview,
    pub importance_kind: ImportanceKind,
    pub importances: Vec<FeatureImportance>,
    pub metrics: EvaluationResult,
    pub chart: ChartSeries,
}

/// Run every stage on one table
pub fn run_pipeline(table: &StockTable, config: &PipelineConfig) -> Result<PipelineResult> {
    if table.symbol() != config.symbol {
        return Err(Error::InvalidSelection(format!(
            "table for {} passed to a run for {}",
            table.symbol(),
            config.symbol
        )));
    }
    config.model.validate()?;

    let split = split::split(table, &config.target, &config.features, config.test_fraction)?;
    if split.x_train.nrows() == 0 {
        return Err(Error::EmptyTrainingSet);
    }

    let (x_train, params) = config
        .preprocessing
        .fit_transform(&split.x_train, &split.feature_names)?;
    let x_test = preprocess::transform(&split.x_test, &params)?;
    tracing::debug!(preprocessing = %config.preprocessing, "Features scaled");

    let model = config.model.fit(&x_train, &split.y_train, &split.feature_names)?;
    let predictions = model.predict(&x_test)?;

    let y_test = split.y_test.to_vec();
    let predictions = predictions.to_vec();
    let metrics = evaluate::evaluate(&y_test, &predictions)?;

    let sizes = split.sizes();
    let result = PipelineResult {
        run_id: Uuid::new_v4(),
        generated_at: Utc::now(),
        symbol: config.symbol.clone(),
        target: config.target.clone(),
        features: split.feature_names.clone(),
        preprocessing: config.preprocessing,
        model: config.model.clone(),
        sizes,
        preview: table.head(config.preview_rows),
        importance_kind: model.importance_kind(),
        importances: rank_importances(&model),
        metrics,
        chart: chart_series(&split.y_train.to_vec(), &y_test, &predictions),
    };

    tracing::info!(
        run_id = %result.run_id,
        symbol = %result.symbol,
        model = model.name(),
        n_train = sizes.n_train,
        n_test = sizes.n_test,
        "Pipeline run: MSE {:.4}, MAE {:.4}, R² {:.4}",
        metrics.mse,
        metrics.mae,
        metrics.r2
    );

    Ok(result)
}

/// Sort by magnitude, descending; ties keep the feature order
pub fn rank_importances(model: &TrainedModel) -> Vec<FeatureImportance> {
    let mut ranked: Vec<FeatureImportance> = model
        .feature_names()
        .iter()
        .zip(model.importances().iter())
        .map(|(feature, &value)| FeatureImportance {
            feature: feature.clone(),
            value,
            magnitude: value.abs(),
        })
        .collect();

    ranked.sort_by(|a, b| b.magnitude.total_cmp(&a.magnitude));
    ranked
}

/// Train actuals at `0..n_train`, test actuals and predictions at `n_train..N`
pub fn chart_series(y_train: &[f64], y_test: &[f64], predictions: &[f64]) -> ChartSeries {
    let offset = y_train.len();
    let points = |values: &[f64], start: usize| -> Vec<ChartPoint> {
        values
            .iter()
            .enumerate()
            .map(|(i, &value)| ChartPoint { index: start + i, value })
            .collect()
    };

    ChartSeries {
        train_actual: points(y_train, 0),
        test_actual: points(y_test, offset),
        predictions: points(predictions, offset),
    }
}

/// Pipeline bound to a data store
pub struct Pipeline<'a> {
    store: &'a DataStore,
}

impl<'a> Pipeline<'a> {
    pub fn new(store: &'a DataStore) -> Self {
        Self { store }
    }

    /// Look up the symbol, then run every stage
    pub fn run(&self, config: &PipelineConfig) -> Result<PipelineResult> {
        let table = self.store.load(&config.symbol)?;
        run_pipeline(&table, config)
    }
}
