//! Random forest regressor
//!
//! Bagged CART trees. Tree `i` draws its bootstrap sample from an RNG
//! seeded with `seed + i`, so identical hyperparameters reproduce the
//! same forest.

use super::tree::{RegressionTree, TreeParams};
use super::{check_prediction_width, check_training_data, ImportanceKind, Predictor, Regressor};
use crate::error::{Error, Result};
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Random forest configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RandomForestConfig {
    /// Number of trees in the forest
    #[serde(default = "default_n_estimators")]
    pub n_estimators: usize,
    /// Maximum depth of each tree, unbounded when `None`
    #[serde(default = "default_max_depth")]
    pub max_depth: Option<usize>,
    /// Minimum samples required to split a node
    #[serde(default = "default_min_samples_split")]
    pub min_samples_split: usize,
    /// Minimum samples in a leaf
    #[serde(default = "default_min_samples_leaf")]
    pub min_samples_leaf: usize,
    /// Random seed for bootstrap sampling
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_n_estimators() -> usize {
    100
}

fn default_max_depth() -> Option<usize> {
    Some(10)
}

fn default_min_samples_split() -> usize {
    2
}

fn default_min_samples_leaf() -> usize {
    1
}

fn default_seed() -> u64 {
    42
}

impl Default for RandomForestConfig {
    fn default() -> Self {
        Self {
            n_estimators: default_n_estimators(),
            max_depth: default_max_depth(),
            min_samples_split: default_min_samples_split(),
            min_samples_leaf: default_min_samples_leaf(),
            seed: default_seed(),
        }
    }
}

impl RandomForestConfig {
    pub fn validate(&self) -> Result<()> {
        if self.n_estimators == 0 {
            return Err(Error::InvalidHyperparameter("n_estimators must be at least 1".to_string()));
        }
        if self.max_depth == Some(0) {
            return Err(Error::InvalidHyperparameter("max_depth must be at least 1".to_string()));
        }
        if self.min_samples_split < 2 {
            return Err(Error::InvalidHyperparameter(format!(
                "min_samples_split must be at least 2, got {}",
                self.min_samples_split
            )));
        }
        if self.min_samples_leaf == 0 {
            return Err(Error::InvalidHyperparameter("min_samples_leaf must be at least 1".to_string()));
        }
        Ok(())
    }

    fn tree_params(&self) -> TreeParams {
        TreeParams {
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            min_samples_leaf: self.min_samples_leaf,
        }
    }
}

/// Fitted random forest
#[derive(Debug, Clone)]
pub struct RandomForestModel {
    trees: Vec<RegressionTree>,
    n_features: usize,
    feature_importances: Array1<f64>,
}

impl RandomForestModel {
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn max_tree_depth(&self) -> usize {
        self.trees.iter().map(|t| t.depth()).max().unwrap_or(0)
    }
}

impl Regressor for RandomForestConfig {
    type Fitted = RandomForestModel;

    fn fit(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<RandomForestModel> {
        self.validate()?;
        check_training_data(x, y)?;

        let n_samples = x.nrows();
        let params = self.tree_params();

        let trees: Vec<RegressionTree> = (0..self.n_estimators)
            .map(|i| {
                let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(i as u64));
                let bootstrap: Vec<usize> = (0..n_samples).map(|_| rng.random_range(0..n_samples)).collect();
                RegressionTree::fit(x, y, bootstrap, params)
            })
            .collect();

        let feature_importances = aggregate_importances(&trees, x.ncols());

        tracing::debug!(
            trees = trees.len(),
            nodes = trees.iter().map(|t| t.n_nodes()).sum::<usize>(),
            "Random forest grown"
        );

        Ok(RandomForestModel {
            trees,
            n_features: x.ncols(),
            feature_importances,
        })
    }
}

/// Mean of the per-tree normalised importances, renormalised to sum 1.
/// Single-leaf trees carry no information and are skipped; all zeros when
/// no tree split at all.
fn aggregate_importances(trees: &[RegressionTree], n_features: usize) -> Array1<f64> {
    let per_tree: Vec<Array1<f64>> = trees.iter().filter_map(|t| t.normalized_importances()).collect();
    if per_tree.is_empty() {
        return Array1::zeros(n_features);
    }

    let mut total = Array1::<f64>::zeros(n_features);
    for imp in &per_tree {
        total += imp;
    }
    total /= per_tree.len() as f64;

    let sum = total.sum();
    if sum > 0.0 {
        total /= sum;
    }
    total
}

impl Predictor for RandomForestModel {
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        check_prediction_width(x, self.n_features)?;
        if self.trees.is_empty() {
            return Err(Error::Internal("random forest has no trees".to_string()));
        }

        let n_trees = self.trees.len() as f64;
        Ok(Array1::from_iter(x.rows().into_iter().map(|row| {
            self.trees.iter().map(|t| t.predict_row(row)).sum::<f64>() / n_trees
        })))
    }

    fn importances(&self) -> &Array1<f64> {
        &self.feature_importances
    }

    fn importance_kind(&self) -> ImportanceKind {
        ImportanceKind::Impurity
    }

    fn name(&self) -> &str {
        "Random Forest"
    }
}
