//! Dashboard HTTP API
//!
//! Serves the symbol list, table previews and pipeline runs. Each run
//! executes on a blocking worker; the last successful result is kept for
//! `GET /latest` and dropped as soon as a later run fails. Runs are ordered
//! by when they started, so a slow earlier run never overwrites a newer one.

use crate::config::Config;
use crate::data::{DataStore, TablePreview};
use crate::error::Error;
use crate::pipeline::{run_pipeline, PipelineRequest, PipelineResult};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Dashboard state shared across handlers
pub struct DashboardState {
    pub store: DataStore,
    pub config: Config,
    next_run: AtomicU64,
    latest: RwLock<LatestRun>,
}

/// Outcome of the newest run to finish, stamped with its start sequence
#[derive(Default)]
struct LatestRun {
    seq: u64,
    result: Option<PipelineResult>,
}

impl DashboardState {
    pub fn new(store: DataStore, config: Config) -> Self {
        Self {
            store,
            config,
            next_run: AtomicU64::new(0),
            latest: RwLock::new(LatestRun::default()),
        }
    }

    /// Last successful result, if the most recent run succeeded
    pub async fn latest(&self) -> Option<PipelineResult> {
        self.latest.read().await.result.clone()
    }

    /// Resolve and run a request. The outcome replaces the stored result
    /// unless a run started later has already been recorded.
    pub async fn run(&self, request: PipelineRequest) -> Result<PipelineResult, Error> {
        let seq = self.begin_run();
        let outcome = self.execute(request).await;
        self.record(seq, &outcome).await;
        outcome
    }

    fn begin_run(&self) -> u64 {
        self.next_run.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn record(&self, seq: u64, outcome: &Result<PipelineResult, Error>) {
        let mut latest = self.latest.write().await;
        if seq <= latest.seq {
            tracing::debug!(seq, newest = latest.seq, "Discarding outcome of a superseded run");
            return;
        }
        latest.seq = seq;
        latest.result = outcome.as_ref().ok().cloned();
    }

    async fn execute(&self, request: PipelineRequest) -> Result<PipelineResult, Error> {
        let config = request.resolve(&self.config)?;
        let table = self.store.load(&config.symbol)?;

        tokio::task::spawn_blocking(move || run_pipeline(&table, &config))
            .await
            .map_err(|e| Error::Internal(format!("pipeline worker failed: {}", e)))?
    }
}

/// JSON error body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

/// Error returned by handlers
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    fn no_result() -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            body: ErrorBody {
                error: "no_result".to_string(),
                message: "no successful pipeline run yet".to_string(),
            },
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn kind(&self) -> &str {
        &self.body.error
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = match &err {
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            e if e.is_user_error() => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!(error = %err, "Request failed");
        } else {
            tracing::warn!(error = %err, "Request rejected");
        }

        Self {
            status,
            body: ErrorBody {
                error: err.kind().to_string(),
                message: err.to_string(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

// ============ HTTP API Handlers ============

/// Health check
async fn health_check() -> &'static str {
    "OK"
}

/// Known symbols, sorted
async fn list_symbols(State(state): State<Arc<DashboardState>>) -> Json<Vec<String>> {
    Json(state.store.symbols())
}

/// Symbol detail response
#[derive(Debug, Serialize, Deserialize)]
pub struct SymbolDetail {
    pub symbol: String,
    pub rows: usize,
    pub target: String,
    pub feature_candidates: Vec<String>,
    pub preview: TablePreview,
}

/// Preview of one symbol and the columns selectable as features
async fn get_symbol(
    State(state): State<Arc<DashboardState>>,
    Path(symbol): Path<String>,
) -> Result<Json<SymbolDetail>, ApiError> {
    let table = state.store.load(&symbol)?;
    let target = state.config.data.target.clone();

    Ok(Json(SymbolDetail {
        symbol: table.symbol().to_string(),
        rows: table.n_rows(),
        feature_candidates: table.feature_candidates(&target),
        preview: table.head(state.config.pipeline.preview_rows),
        target,
    }))
}

/// Run the pipeline for a request
async fn predict(
    State(state): State<Arc<DashboardState>>,
    Json(request): Json<PipelineRequest>,
) -> Result<Json<PipelineResult>, ApiError> {
    tracing::info!(symbol = %request.symbol, model = %request.model, "Prediction requested");
    let result = state.run(request).await?;
    Ok(Json(result))
}

/// Last successful result
async fn get_latest(State(state): State<Arc<DashboardState>>) -> Result<Json<PipelineResult>, ApiError> {
    state.latest().await.map(Json).ok_or_else(ApiError::no_result)
}

/// Create dashboard router
pub fn create_router(state: Arc<DashboardState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/symbols", get(list_symbols))
        .route("/symbols/{symbol}", get(get_symbol))
        .route("/predict", post(predict))
        .route("/latest", get(get_latest))
        .with_state(state)
}

/// Start dashboard server
pub async fn start_dashboard(state: Arc<DashboardState>, host: &str, port: u16) -> crate::error::Result<()> {
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    tracing::info!("Dashboard server starting on http://{}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::StockTable;
    use crate::ml::ModelParams;

    fn state() -> Arc<DashboardState> {
        let ema: Vec<f64> = (0..40).map(|i| 20.0 + i as f64 * 0.5).collect();
        let close: Vec<f64> = (0..40).map(|i| 21.0 + ((i * 13) % 7) as f64).collect();
        let target: Vec<f64> = ema.iter().map(|e| 1.5 * e - 2.0).collect();
        let demo = StockTable::from_columns(
            "DEMO",
            vec![("Close", close), ("EMA50", ema), ("Close_forcast", target)],
        )
        .unwrap();
        let flat = StockTable::from_columns(
            "FLAT",
            vec![("EMA50", vec![1.0; 10]), ("Close_forcast", (0..10).map(|i| i as f64).collect())],
        )
        .unwrap();

        Arc::new(DashboardState::new(
            DataStore::from_tables(vec![flat, demo]),
            Config::default(),
        ))
    }

    fn request(symbol: &str) -> PipelineRequest {
        PipelineRequest::for_symbol(symbol)
    }

    #[tokio::test]
    async fn test_health_check() {
        assert_eq!(health_check().await, "OK");
    }

    #[tokio::test]
    async fn test_symbols_are_sorted() {
        let Json(symbols) = list_symbols(State(state())).await;
        assert_eq!(symbols, vec!["DEMO", "FLAT"]);
    }

    #[tokio::test]
    async fn test_symbol_detail_excludes_target() {
        let Json(detail) = get_symbol(State(state()), Path("DEMO".to_string())).await.unwrap();
        assert_eq!(detail.rows, 40);
        assert_eq!(detail.feature_candidates, vec!["Close", "EMA50"]);
        assert_eq!(detail.preview.rows.len(), 5);
    }

    #[tokio::test]
    async fn test_unknown_symbol_is_404() {
        let err = get_symbol(State(state()), Path("ZZZ".to_string())).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.kind(), "not_found");
    }

    #[tokio::test]
    async fn test_predict_stores_latest() {
        let state = state();
        assert_eq!(
            get_latest(State(state.clone())).await.unwrap_err().status(),
            StatusCode::NOT_FOUND
        );

        let Json(result) = predict(State(state.clone()), Json(request("DEMO"))).await.unwrap();
        assert!((result.metrics.r2 - 1.0).abs() < 1e-9);
        assert_eq!(result.sizes.n_test, 8);

        let Json(latest) = get_latest(State(state)).await.unwrap();
        assert_eq!(latest.run_id, result.run_id);
    }

    #[tokio::test]
    async fn test_failed_run_clears_latest() {
        let state = state();
        let Json(first) = predict(State(state.clone()), Json(request("DEMO"))).await.unwrap();
        assert_eq!(state.latest().await.map(|r| r.run_id), Some(first.run_id));

        let mut bad = request("FLAT");
        bad.preprocessing = crate::pipeline::Preprocessing::Standardize;
        let err = predict(State(state.clone()), Json(bad)).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.kind(), "degenerate_column");

        assert!(state.latest().await.is_none());
    }

    #[tokio::test]
    async fn test_older_run_finishing_late_does_not_overwrite() {
        let state = state();
        let older = state.begin_run();
        let newer = state.begin_run();
        assert!(newer > older);

        let table = state.store.load("DEMO").unwrap();
        let config = request("DEMO").resolve(&state.config).unwrap();
        let newest_result = run_pipeline(&table, &config).unwrap();
        let newest_id = newest_result.run_id;
        state.record(newer, &Ok(newest_result)).await;

        // A stale failure must not clear the newer result
        state.record(older, &Err(Error::EmptyTrainingSet)).await;
        assert_eq!(state.latest().await.map(|r| r.run_id), Some(newest_id));

        // A stale success must not replace it either
        let stale = run_pipeline(&table, &config).unwrap();
        state.record(older, &Ok(stale)).await;
        assert_eq!(state.latest().await.map(|r| r.run_id), Some(newest_id));

        // The next request supersedes everything before it
        let Json(latest) = predict(State(state.clone()), Json(request("DEMO"))).await.unwrap();
        assert_eq!(state.latest().await.map(|r| r.run_id), Some(latest.run_id));
    }

    #[tokio::test]
    async fn test_random_forest_request() {
        let mut req = request("DEMO");
        req.model = "Random Forest".to_string();
        req.features = vec!["EMA50".to_string(), "Close".to_string()];
        req.params = ModelParams {
            n_estimators: Some(5),
            ..Default::default()
        };

        let Json(result) = predict(State(state()), Json(req)).await.unwrap();
        let total: f64 = result.importances.iter().map(|i| i.value).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_error_status_mapping() {
        let cases = [
            (Error::NotFound { symbol: "X".into() }, StatusCode::NOT_FOUND),
            (Error::InvalidSelection("no features".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (Error::UnsupportedModel("SVM".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (Error::EmptyTrainingSet, StatusCode::UNPROCESSABLE_ENTITY),
            (Error::Internal("boom".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            let api = ApiError::from(err);
            assert_eq!(api.status(), status);
            assert_eq!(api.into_response().status(), status);
        }
    }

    #[tokio::test]
    async fn test_unsupported_model_request() {
        let mut req = request("DEMO");
        req.model = "XGBoost".to_string();
        let err = predict(State(state()), Json(req)).await.unwrap_err();
        assert_eq!(err.kind(), "unsupported_model");
    }
}
