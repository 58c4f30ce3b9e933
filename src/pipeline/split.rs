//! Chronological train/test split

use crate::data::StockTable;
use crate::error::{Error, Result};
use ndarray::{s, Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub const DEFAULT_TEST_FRACTION: f64 = 0.2;

/// Train rows strictly precede test rows
#[derive(Debug, Clone)]
pub struct Split {
    pub feature_names: Vec<String>,
    pub x_train: Array2<f64>,
    pub x_test: Array2<f64>,
    pub y_train: Array1<f64>,
    pub y_test: Array1<f64>,
}

/// Row boundaries of a split, useful for logging and charts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitSizes {
    pub n_train: usize,
    pub n_test: usize,
}

impl SplitSizes {
    /// `n_test = ceil(fraction * n)`, the rest goes to training
    pub fn for_rows(n_rows: usize, test_fraction: f64) -> Result<Self> {
        if !(test_fraction > 0.0 && test_fraction < 1.0) {
            return Err(Error::InvalidSelection(format!(
                "test fraction must be in (0, 1), got {}",
                test_fraction
            )));
        }
        let n_test = ((test_fraction * n_rows as f64).ceil() as usize).min(n_rows);
        Ok(Self {
            n_train: n_rows - n_test,
            n_test,
        })
    }

    pub fn total(&self) -> usize {
        self.n_train + self.n_test
    }
}

impl Split {
    pub fn sizes(&self) -> SplitSizes {
        SplitSizes {
            n_train: self.x_train.nrows(),
            n_test: self.x_test.nrows(),
        }
    }
}

/// Check a feature selection against a table and target column
pub fn validate_selection(table: &StockTable, target: &str, features: &[String]) -> Result<()> {
    if features.is_empty() {
        return Err(Error::InvalidSelection("at least one feature must be selected".to_string()));
    }
    if !table.has_column(target) {
        return Err(Error::InvalidSelection(format!(
            "target column '{}' not found in {}",
            target,
            table.symbol()
        )));
    }

    let mut seen = HashSet::new();
    for feature in features {
        if feature == target {
            return Err(Error::InvalidSelection(format!(
                "target column '{}' cannot be used as a feature",
                target
            )));
        }
        if !seen.insert(feature.as_str()) {
            return Err(Error::InvalidSelection(format!("feature '{}' selected twice", feature)));
        }
        if !table.has_column(feature) {
            return Err(Error::InvalidSelection(format!(
                "feature '{}' not found in {}",
                feature,
                table.symbol()
            )));
        }
    }

    for column in features.iter().map(String::as_str).chain(std::iter::once(target)) {
        let missing = table.missing_count(column).unwrap_or(0);
        if missing > 0 {
            return Err(Error::InvalidSelection(format!(
                "column '{}' has {} missing or non-finite values in {}",
                column,
                missing,
                table.symbol()
            )));
        }
    }

    Ok(())
}

/// Partition `table` into train and test sets without shuffling
pub fn split(table: &StockTable, target: &str, features: &[String], test_fraction: f64) -> Result<Split> {
    validate_selection(table, target, features)?;
    let sizes = SplitSizes::for_rows(table.n_rows(), test_fraction)?;

    let x = table.select(features)?;
    let y = table.target(target)?;
    let boundary = sizes.n_train;

    tracing::debug!(
        symbol = table.symbol(),
        n_train = sizes.n_train,
        n_test = sizes.n_test,
        "Split table"
    );

    Ok(Split {
        feature_names: features.to_vec(),
        x_train: x.slice(s![..boundary, ..]).to_owned(),
        x_test: x.slice(s![boundary.., ..]).to_owned(),
        y_train: y.slice(s![..boundary]).to_owned(),
        y_test: y.slice(s![boundary..]).to_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(n: usize) -> StockTable {
        let ema: Vec<f64> = (0..n).map(|i| 100.0 + i as f64).collect();
        let sma: Vec<f64> = (0..n).map(|i| 50.0 + 0.5 * i as f64).collect();
        let target: Vec<f64> = (0..n).map(|i| 101.0 + i as f64).collect();
        StockTable::from_columns(
            "TEST",
            vec![("EMA50", ema), ("SMA20", sma), ("Close_forcast", target)],
        )
        .unwrap()
    }

    fn features(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_split_100_rows() {
        let t = table(100);
        let split = split(&t, "Close_forcast", &features(&["EMA50"]), 0.2).unwrap();

        assert_eq!(split.x_train.nrows(), 80);
        assert_eq!(split.x_test.nrows(), 20);
        assert_eq!(split.y_train.len(), 80);
        assert_eq!(split.y_test.len(), 20);

        // Original order, train before test
        assert_eq!(split.x_train[[0, 0]], 100.0);
        assert_eq!(split.x_train[[79, 0]], 179.0);
        assert_eq!(split.x_test[[0, 0]], 180.0);
        assert_eq!(split.x_test[[19, 0]], 199.0);
        assert_eq!(split.y_test[0], 181.0);
    }

    #[test]
    fn test_split_sizes_round_test_up() {
        let sizes = SplitSizes::for_rows(101, 0.2).unwrap();
        assert_eq!(sizes.n_test, 21);
        assert_eq!(sizes.n_train, 80);
        assert_eq!(sizes.total(), 101);

        let sizes = SplitSizes::for_rows(7, 0.2).unwrap();
        assert_eq!(sizes.n_test, 2);
        assert_eq!(sizes.n_train, 5);
    }

    #[test]
    fn test_split_covers_all_rows() {
        for n in [1, 5, 9, 33, 250] {
            let t = table(n);
            let split = split(&t, "Close_forcast", &features(&["EMA50", "SMA20"]), 0.2).unwrap();
            assert_eq!(split.x_train.nrows() + split.x_test.nrows(), n);
            assert_eq!(split.x_test.nrows(), (0.2 * n as f64).ceil() as usize);
        }
    }

    #[test]
    fn test_split_is_deterministic() {
        let t = table(57);
        let f = features(&["SMA20", "EMA50"]);
        let a = split(&t, "Close_forcast", &f, 0.2).unwrap();
        let b = split(&t, "Close_forcast", &f, 0.2).unwrap();

        assert_eq!(a.sizes(), b.sizes());
        assert_eq!(a.x_train, b.x_train);
        assert_eq!(a.x_test, b.x_test);
        assert_eq!(a.y_train, b.y_train);
        assert_eq!(a.y_test, b.y_test);
    }

    #[test]
    fn test_split_keeps_feature_order() {
        let t = table(10);
        let split = split(&t, "Close_forcast", &features(&["SMA20", "EMA50"]), 0.2).unwrap();
        assert_eq!(split.feature_names, vec!["SMA20", "EMA50"]);
        assert_eq!(split.x_train[[0, 0]], 50.0);
        assert_eq!(split.x_train[[0, 1]], 100.0);
    }

    #[test]
    fn test_zero_features_rejected() {
        let t = table(10);
        let err = split(&t, "Close_forcast", &[], 0.2).unwrap_err();
        assert!(matches!(err, Error::InvalidSelection(_)));
    }

    #[test]
    fn test_target_as_feature_rejected() {
        let t = table(10);
        let err = split(&t, "Close_forcast", &features(&["EMA50", "Close_forcast"]), 0.2).unwrap_err();
        assert!(matches!(err, Error::InvalidSelection(_)));
    }

    #[test]
    fn test_duplicate_and_unknown_features_rejected() {
        let t = table(10);
        assert!(matches!(
            split(&t, "Close_forcast", &features(&["EMA50", "EMA50"]), 0.2),
            Err(Error::InvalidSelection(_))
        ));
        assert!(matches!(
            split(&t, "Close_forcast", &features(&["RSI14"]), 0.2),
            Err(Error::InvalidSelection(_))
        ));
        assert!(matches!(
            split(&t, "Missing", &features(&["EMA50"]), 0.2),
            Err(Error::InvalidSelection(_))
        ));
    }

    #[test]
    fn test_columns_with_gaps_rejected_only_when_selected() {
        let mut sma200 = vec![f64::NAN; 5];
        sma200.extend((5..20).map(|i| i as f64));
        let mut target: Vec<f64> = (0..20).map(|i| i as f64 + 1.0).collect();
        let ema: Vec<f64> = (0..20).map(|i| i as f64).collect();
        let t = StockTable::from_columns(
            "GAP",
            vec![("EMA50", ema.clone()), ("SMA200", sma200), ("Close_forcast", target.clone())],
        )
        .unwrap();

        assert!(split(&t, "Close_forcast", &features(&["EMA50"]), 0.2).is_ok());

        let err = split(&t, "Close_forcast", &features(&["EMA50", "SMA200"]), 0.2).unwrap_err();
        assert!(matches!(err, Error::InvalidSelection(ref msg) if msg.contains("SMA200") && msg.contains('5')));

        target[3] = f64::NAN;
        let t = StockTable::from_columns("GAP", vec![("EMA50", ema), ("Close_forcast", target)]).unwrap();
        let err = split(&t, "Close_forcast", &features(&["EMA50"]), 0.2).unwrap_err();
        assert!(matches!(err, Error::InvalidSelection(ref msg) if msg.contains("Close_forcast")));
    }

    #[test]
    fn test_bad_test_fraction_rejected() {
        let t = table(10);
        for fraction in [0.0, 1.0, -0.1, 1.5, f64::NAN] {
            let err = split(&t, "Close_forcast", &features(&["EMA50"]), fraction).unwrap_err();
            assert!(matches!(err, Error::InvalidSelection(_)));
        }
    }

    #[test]
    fn test_empty_table_splits_to_nothing() {
        let t = table(0);
        let split = split(&t, "Close_forcast", &features(&["EMA50"]), 0.2).unwrap();
        assert_eq!(split.sizes(), SplitSizes { n_train: 0, n_test: 0 });
    }
}
