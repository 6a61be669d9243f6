//! HTTP request handlers for the REST API.

use super::{api_error, AppState};
use crate::metrics::MetricsSnapshot;
use crate::types::prediction::{ConfusionMatrix, DashboardMetrics, PredictionResponse, PredictionsList};
use crate::types::record::ClientRecord;
use axum::body::Bytes;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::error;

/// Routes mounted at the root
pub fn root_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(welcome))
        .route("/health", get(health_check))
}

/// Build all `/api` routes.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/predict", post(predict))
        // Dashboard endpoints
        .route("/dashboard/metrics", get(dashboard_metrics))
        .route("/dashboard/predictions", get(dashboard_predictions))
        .route("/dashboard/confusion-matrix", get(confusion_matrix))
        // Pipeline monitoring
        .route("/pipeline/metrics", get(pipeline_metrics))
}

async fn welcome() -> Json<Value> {
    Json(json!({
        "message": "Bank deposit prediction API",
        "docs": "POST /api/predict with a client record",
        "status": "ok",
    }))
}

async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "artifacts_loaded": state.engine.is_available(),
        "model": state.engine.model_name(),
        "uptime_secs": state.started_at.elapsed().as_secs(),
    }))
}

/// `POST /api/predict`
///
/// The body is parsed and validated by hand rather than through
/// `Json<ClientRecord>` so that every violation is reported, not only the
/// first, and malformed bodies get the JSON error envelope.
async fn predict(State(state): State<AppState>, body: Bytes) -> Response {
    let body: Value = match serde_json::from_slice(&body) {
        Ok(body) => body,
        Err(e) => {
            return api_error(
                StatusCode::UNPROCESSABLE_ENTITY,
                "validation_error",
                &format!("Request body is not valid JSON: {e}"),
            )
        }
    };
    let record = match ClientRecord::from_json(&body) {
        Ok(record) => record,
        Err(errors) => return errors.into_response(),
    };

    match state.engine.predict(&record).await {
        Ok(result) => Json::<PredictionResponse>(result.to_response()).into_response(),
        Err(e) => e.into_response(),
    }
}

fn store_failure(e: impl std::fmt::Display) -> Response {
    error!(error = %e, "Dashboard query failed");
    api_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "store_unavailable",
        &e.to_string(),
    )
}

async fn dashboard_metrics(State(state): State<AppState>) -> Response {
    let predictions = match state.store.fetch_predictions(None).await {
        Ok(rows) => rows,
        Err(e) => return store_failure(e),
    };
    let truth = match state.store.fetch_with_truth().await {
        Ok(rows) => rows,
        Err(e) => return store_failure(e),
    };
    Json(DashboardMetrics::compute(&predictions, &truth)).into_response()
}

#[derive(Debug, Deserialize)]
struct PredictionsParams {
    limit: Option<u32>,
}

async fn dashboard_predictions(
    State(state): State<AppState>,
    params: Result<Query<PredictionsParams>, QueryRejection>,
) -> Response {
    let Query(params) = match params {
        Ok(params) => params,
        Err(rejection) => {
            return api_error(
                StatusCode::UNPROCESSABLE_ENTITY,
                "validation_error",
                &rejection.body_text(),
            )
        }
    };
    match state.store.fetch_predictions(params.limit).await {
        Ok(predictions) => Json(PredictionsList { predictions }).into_response(),
        Err(e) => store_failure(e),
    }
}

async fn confusion_matrix(State(state): State<AppState>) -> Response {
    match state.store.fetch_with_truth().await {
        Ok(pairs) => Json(ConfusionMatrix::from_pairs(&pairs)).into_response(),
        Err(e) => store_failure(e),
    }
}

async fn pipeline_metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.engine.metrics().snapshot())
}
