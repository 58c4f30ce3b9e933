//! Integration tests for the full pipeline

use super::*;
use crate::ml::{LinearRegressionConfig, RandomForestConfig};

/// 100 rows where the target is an exact linear function of EMA50
fn linear_table() -> StockTable {
    let n = 100;
    let close: Vec<f64> = (0..n).map(|i| 100.0 + (i as f64 * 0.3).sin() * 4.0 + i as f64 * 0.5).collect();
    let ema50: Vec<f64> = (0..n).map(|i| 95.0 + i as f64 * 0.45).collect();
    let volume: Vec<f64> = (0..n).map(|i| 1_000.0 + ((i * 37) % 11) as f64 * 10.0).collect();
    let target: Vec<f64> = ema50.iter().map(|e| 2.0 * e + 5.0).collect();

    StockTable::from_columns(
        "SYNTH",
        vec![
            ("Close", close),
            ("EMA50", ema50),
            ("Volume", volume),
            ("Close_forcast", target),
        ],
    )
    .unwrap()
}

fn config(features: &[&str], preprocessing: Preprocessing, model: ModelSpec) -> PipelineConfig {
    PipelineConfig {
        symbol: "SYNTH".to_string(),
        features: features.iter().map(|s| s.to_string()).collect(),
        target: "Close_forcast".to_string(),
        test_fraction: DEFAULT_TEST_FRACTION,
        preprocessing,
        model,
        preview_rows: 5,
    }
}

#[test]
fn test_linear_run_on_exact_target() {
    let table = linear_table();
    let cfg = config(&["EMA50"], Preprocessing::Identity, ModelSpec::default());

    let result = run_pipeline(&table, &cfg).unwrap();

    assert_eq!(result.sizes, SplitSizes { n_train: 80, n_test: 20 });
    assert!((result.metrics.r2 - 1.0).abs() < 1e-9);
    assert!(result.metrics.mse < 1e-12);
    assert_eq!(result.importance_kind, ImportanceKind::Coefficient);
    assert_eq!(result.importances.len(), 1);
    assert!((result.importances[0].value - 2.0).abs() < 1e-9);
    assert_eq!(result.preview.rows.len(), 5);
}

#[test]
fn test_every_preprocessing_fits_exact_line() {
    let table = linear_table();
    for preprocessing in [Preprocessing::Identity, Preprocessing::MinMax, Preprocessing::Standardize] {
        let cfg = config(&["EMA50"], preprocessing, ModelSpec::default());
        let result = run_pipeline(&table, &cfg).unwrap();
        assert!(
            (result.metrics.r2 - 1.0).abs() < 1e-8,
            "{} gave r2 {}",
            preprocessing,
            result.metrics.r2
        );
    }
}

#[test]
fn test_chart_series_layout() {
    let table = linear_table();
    let cfg = config(&["EMA50", "Volume"], Preprocessing::MinMax, ModelSpec::default());
    let result = run_pipeline(&table, &cfg).unwrap();

    let chart = &result.chart;
    assert_eq!(chart.train_actual.len(), 80);
    assert_eq!(chart.test_actual.len(), 20);
    assert_eq!(chart.predictions.len(), 20);
    assert_eq!(chart.train_actual[0].index, 0);
    assert_eq!(chart.train_actual[79].index, 79);
    assert_eq!(chart.test_actual[0].index, 80);
    assert_eq!(chart.predictions[19].index, 99);

    let target = table.column("Close_forcast").unwrap();
    assert_eq!(chart.train_actual[10].value, target[10]);
    assert_eq!(chart.test_actual[5].value, target[85]);
}

#[test]
fn test_importances_ranked_by_magnitude() {
    // Target falls steeply with A and rises gently with B
    let a: Vec<f64> = (0..50).map(|i| (i % 7) as f64).collect();
    let b: Vec<f64> = (0..50).map(|i| (i % 5) as f64 * 2.0).collect();
    let target: Vec<f64> = a.iter().zip(&b).map(|(a, b)| -4.0 * a + 0.5 * b + 1.0).collect();
    let table = StockTable::from_columns(
        "SYNTH",
        vec![("B", b), ("A", a), ("Close_forcast", target)],
    )
    .unwrap();

    let cfg = config(&["B", "A"], Preprocessing::Identity, ModelSpec::default());
    let result = run_pipeline(&table, &cfg).unwrap();

    assert_eq!(result.importances[0].feature, "A");
    assert!(result.importances[0].value < 0.0);
    assert!((result.importances[0].magnitude - 4.0).abs() < 1e-8);
    assert_eq!(result.importances[1].feature, "B");
}

#[test]
fn test_rank_keeps_order_on_ties() {
    let x = ndarray::array![[1.0, 1.0], [2.0, 2.0], [3.0, 3.0]];
    let y = ndarray::array![5.0, 5.0, 5.0];
    let names = vec!["first".to_string(), "second".to_string()];
    let model = ModelSpec::RandomForest(RandomForestConfig { n_estimators: 2, ..Default::default() })
        .fit(&x, &y, &names)
        .unwrap();

    let ranked = rank_importances(&model);
    assert_eq!(ranked[0].feature, "first");
    assert_eq!(ranked[1].feature, "second");
}

#[test]
fn test_random_forest_run_is_reproducible() {
    let table = linear_table();
    let model = ModelSpec::RandomForest(RandomForestConfig {
        n_estimators: 10,
        max_depth: Some(6),
        ..Default::default()
    });
    let cfg = config(&["EMA50", "Close", "Volume"], Preprocessing::Standardize, model);

    let first = run_pipeline(&table, &cfg).unwrap();
    let second = run_pipeline(&table, &cfg).unwrap();

    assert_eq!(first.metrics, second.metrics);
    assert_eq!(first.chart, second.chart);
    assert_ne!(first.run_id, second.run_id);

    assert_eq!(first.importance_kind, ImportanceKind::Impurity);
    let total: f64 = first.importances.iter().map(|i| i.value).sum();
    assert!((total - 1.0).abs() < 1e-9);
    assert!(first.importances.iter().all(|i| i.value >= 0.0));
}

#[test]
fn test_zero_features_is_invalid_selection() {
    let table = linear_table();
    let cfg = config(&[], Preprocessing::Identity, ModelSpec::default());
    let err = run_pipeline(&table, &cfg).unwrap_err();
    assert!(matches!(err, Error::InvalidSelection(_)));
}

#[test]
fn test_standardize_degenerate_column() {
    let table = StockTable::from_columns(
        "SYNTH",
        vec![
            ("Flat", vec![3.0; 10]),
            ("Close_forcast", (0..10).map(|i| i as f64).collect()),
        ],
    )
    .unwrap();
    let cfg = config(&["Flat"], Preprocessing::Standardize, ModelSpec::default());

    let err = run_pipeline(&table, &cfg).unwrap_err();
    assert!(matches!(err, Error::DegenerateColumn { ref column } if column == "Flat"));
}

#[test]
fn test_empty_table_is_empty_training_set() {
    let table = StockTable::from_columns("SYNTH", vec![("EMA50", vec![]), ("Close_forcast", vec![])]).unwrap();
    let cfg = config(&["EMA50"], Preprocessing::Identity, ModelSpec::default());
    let err = run_pipeline(&table, &cfg).unwrap_err();
    assert!(matches!(err, Error::EmptyTrainingSet));
}

#[test]
fn test_invalid_forest_hyperparameters_fail_before_fitting() {
    let table = linear_table();
    let model = ModelSpec::RandomForest(RandomForestConfig { n_estimators: 0, ..Default::default() });
    let err = run_pipeline(&table, &config(&["EMA50"], Preprocessing::Identity, model)).unwrap_err();
    assert!(matches!(err, Error::InvalidHyperparameter(_)));
}

#[test]
fn test_pipeline_unknown_symbol() {
    let store = DataStore::from_tables(vec![linear_table()]);
    let mut cfg = config(&["EMA50"], Preprocessing::Identity, ModelSpec::default());
    cfg.symbol = "ZZZ".to_string();

    let err = Pipeline::new(&store).run(&cfg).unwrap_err();
    assert!(matches!(err, Error::NotFound { ref symbol } if symbol == "ZZZ"));
}

#[test]
fn test_pipeline_runs_through_store() {
    let store = DataStore::from_tables(vec![linear_table()]);
    let cfg = config(&["EMA50"], Preprocessing::Identity, ModelSpec::default());
    let result = Pipeline::new(&store).run(&cfg).unwrap();
    assert_eq!(result.symbol, "SYNTH");
}

#[test]
fn test_request_resolution_uses_config_defaults() {
    let app_config = Config::default();
    let request = PipelineRequest::for_symbol("SYNTH");

    let resolved = request.resolve(&app_config).unwrap();
    assert_eq!(resolved.features, vec!["EMA50"]);
    assert_eq!(resolved.target, "Close_forcast");
    assert_eq!(resolved.test_fraction, 0.2);
    assert_eq!(resolved.preprocessing, Preprocessing::Identity);
    assert_eq!(
        resolved.model,
        ModelSpec::LinearRegression(LinearRegressionConfig { fit_intercept: true })
    );
}

#[test]
fn test_request_from_json() {
    let json = r#"{
        "symbol": "SYNTH",
        "features": ["EMA50", "Volume"],
        "preprocessing": "StandardScaler",
        "model": "Random Forest",
        "params": {"n_estimators": 30, "max_depth": 4}
    }"#;
    let request: PipelineRequest = serde_json::from_str(json).unwrap();
    let resolved = request.resolve(&Config::default()).unwrap();

    assert_eq!(resolved.preprocessing, Preprocessing::Standardize);
    match resolved.model {
        ModelSpec::RandomForest(rf) => {
            assert_eq!(rf.n_estimators, 30);
            assert_eq!(rf.max_depth, Some(4));
            assert_eq!(rf.min_samples_leaf, 1);
        }
        other => panic!("expected random forest, got {:?}", other),
    }
}

#[test]
fn test_request_with_unsupported_model() {
    let mut request = PipelineRequest::for_symbol("SYNTH");
    request.model = "Support Vector Machine".to_string();
    let err = request.resolve(&Config::default()).unwrap_err();
    assert!(matches!(err, Error::UnsupportedModel(_)));
}

#[test]
fn test_mismatched_table_and_symbol() {
    let table = linear_table();
    let mut cfg = config(&["EMA50"], Preprocessing::Identity, ModelSpec::default());
    cfg.symbol = "OTHER".to_string();
    assert!(matches!(run_pipeline(&table, &cfg), Err(Error::InvalidSelection(_))));
}

#[test]
fn test_result_serializes_for_dashboard() {
    let table = linear_table();
    let result = run_pipeline(&table, &config(&["EMA50"], Preprocessing::MinMax, ModelSpec::default())).unwrap();
    let json = serde_json::to_value(&result).unwrap();

    assert_eq!(json["symbol"], "SYNTH");
    assert_eq!(json["preprocessing"], "MinMaxScaler");
    assert_eq!(json["model"]["kind"], "linear_regression");
    assert_eq!(json["importance_kind"], "coefficient");
    assert_eq!(json["chart"]["predictions"].as_array().unwrap().len(), 20);
}
