//! HTTP-level tests driving the router against the in-memory store and the
//! bundled demo artifacts.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use bank_deposit_predictor::api::{build_router, AppState};
use bank_deposit_predictor::config::ArtifactsConfig;
use bank_deposit_predictor::metrics::PipelineMetrics;
use bank_deposit_predictor::models::InferenceEngine;
use bank_deposit_predictor::store::{ClientMatch, MemoryStore, NewPrediction, PredictionStore};
use bank_deposit_predictor::types::prediction::{StoredPrediction, TruthPair};
use bank_deposit_predictor::StoreError;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tower::ServiceExt;

fn artifacts_dir() -> std::path::PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("artifacts")
}

fn build_app(artifacts: ArtifactsConfig) -> (Arc<MemoryStore>, Router) {
    let store = Arc::new(MemoryStore::new());
    let app = build_app_with_store(artifacts, store.clone());
    (store, app)
}

fn build_app_with_store(artifacts: ArtifactsConfig, store: Arc<dyn PredictionStore>) -> Router {
    let engine = Arc::new(InferenceEngine::from_config(
        &artifacts,
        store.clone(),
        Arc::new(PipelineMetrics::new()),
    ));
    build_router(AppState::new(engine, store), &[])
}

/// Store whose database is gone
struct UnreachableStore;

#[async_trait]
impl PredictionStore for UnreachableStore {
    async fn find_client(&self, _criteria: &ClientMatch) -> Result<Option<i64>, StoreError> {
        Err(StoreError::Connection("connection refused".to_string()))
    }

    async fn save_prediction(&self, _prediction: &NewPrediction) -> Result<(), StoreError> {
        Err(StoreError::Connection("connection refused".to_string()))
    }

    async fn fetch_predictions(&self, _limit: Option<u32>) -> Result<Vec<StoredPrediction>, StoreError> {
        Err(StoreError::Connection("connection refused".to_string()))
    }

    async fn fetch_with_truth(&self) -> Result<Vec<TruthPair>, StoreError> {
        Err(StoreError::Connection("connection refused".to_string()))
    }

    fn backend(&self) -> &'static str {
        "unreachable"
    }
}

fn client_json() -> Value {
    json!({
        "age": 45,
        "job": "management",
        "marital": "married",
        "education": "tertiary",
        "default": "no",
        "balance": 1200,
        "housing": "yes",
        "loan": "no",
        "contact": "cellular",
        "day": 12,
        "month": "may",
        "duration": 300,
        "campaign": 2,
        "pdays": -1,
        "previous": 0,
        "poutcome": "unknown"
    })
}

fn management_client() -> ClientMatch {
    ClientMatch {
        age: 45,
        job: "management".to_string(),
        marital: "married".to_string(),
        education: "tertiary".to_string(),
    }
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    let resp = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = resp.status();
    let body = axum::body::to_bytes(resp.into_body(), 1 << 20).await.unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

async fn post_predict(app: &Router, body: &Value) -> (StatusCode, Value) {
    post_raw(app, serde_json::to_vec(body).unwrap(), Some("application/json")).await
}

async fn post_raw(app: &Router, body: Vec<u8>, content_type: Option<&str>) -> (StatusCode, Value) {
    let mut request = Request::builder().method("POST").uri("/api/predict");
    if let Some(content_type) = content_type {
        request = request.header("content-type", content_type);
    }
    let resp = app
        .clone()
        .oneshot(request.body(Body::from(body)).unwrap())
        .await
        .unwrap();
    let status = resp.status();
    let body = axum::body::to_bytes(resp.into_body(), 1 << 20).await.unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn test_welcome_and_health() {
    let (_store, app) = build_app(ArtifactsConfig::in_dir(artifacts_dir()));

    let (status, json) = get(&app, "/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");

    let (status, json) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["artifacts_loaded"], true);
    assert_eq!(json["model"], "decision_tree");
}

#[tokio::test]
async fn test_predict_returns_label_and_probability() {
    let (store, app) = build_app(ArtifactsConfig::in_dir(artifacts_dir()));

    let (status, json) = post_predict(&app, &client_json()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["prediction"], "yes");
    let probability = json["probability"].as_f64().unwrap();
    assert!((probability - 0.6).abs() < 1e-9);
    assert_eq!(json["message"], "Client is likely to accept the campaign.");
    assert_eq!(json["linked_client_id"], Value::Null);
    assert_eq!(store.prediction_count().await, 1);
}

#[tokio::test]
async fn test_predict_links_known_client() {
    let (store, app) = build_app(ArtifactsConfig::in_dir(artifacts_dir()));
    let client_id = store.add_client(&management_client(), Some(true), Utc::now()).await;

    let (status, json) = post_predict(&app, &client_json()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["linked_client_id"], client_id);
}

#[tokio::test]
async fn test_optional_fields_take_defaults() {
    let (_store, app) = build_app(ArtifactsConfig::in_dir(artifacts_dir()));
    let mut body = client_json();
    let obj = body.as_object_mut().unwrap();
    obj.remove("default");
    obj.remove("poutcome");
    obj.insert("campaign_id".to_string(), json!("spring"));

    let (status, _) = post_predict(&app, &body).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_validation_errors_are_collected() {
    let (store, app) = build_app(ArtifactsConfig::in_dir(artifacts_dir()));
    let mut body = client_json();
    let obj = body.as_object_mut().unwrap();
    obj.insert("age".to_string(), json!(10));
    obj.insert("month".to_string(), json!("smarch"));
    obj.remove("job");

    let (status, json) = post_predict(&app, &body).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["error"]["type"], "validation_error");
    let fields: Vec<&str> = json["error"]["fields"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["field"].as_str().unwrap())
        .collect();
    assert_eq!(fields.len(), 3);
    assert!(fields.contains(&"age"));
    assert!(fields.contains(&"month"));
    assert!(fields.contains(&"job"));
    assert_eq!(store.prediction_count().await, 0);
}

#[tokio::test]
async fn test_missing_artifacts_answer_503() {
    let (store, app) = build_app(ArtifactsConfig::in_dir("/nonexistent/artifacts"));

    let (status, json) = post_predict(&app, &client_json()).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["error"]["type"], "artifacts_unavailable");
    assert_eq!(store.prediction_count().await, 0);

    // The dashboard keeps working
    let (status, json) = get(&app, "/api/dashboard/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total"], 0);

    let (_, json) = get(&app, "/health").await;
    assert_eq!(json["artifacts_loaded"], false);
}

#[tokio::test]
async fn test_dashboard_reflects_stored_predictions() {
    let (store, app) = build_app(ArtifactsConfig::in_dir(artifacts_dir()));
    // Known outcome "no": the "yes" prediction is a false positive
    store.add_client(&management_client(), Some(false), Utc::now()).await;

    let mut short_call = client_json();
    short_call["duration"] = json!(100);
    short_call["job"] = json!("technician");

    post_predict(&app, &client_json()).await;
    post_predict(&app, &short_call).await;

    let (status, json) = get(&app, "/api/dashboard/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total"], 2);
    assert_eq!(json["positive"], 1);
    assert_eq!(json["positive_rate"], 50.0);
    assert_eq!(json["accuracy"], 0.0);
    assert!(json["last_update"].is_string());

    let (status, json) = get(&app, "/api/dashboard/predictions?limit=1").await;
    assert_eq!(status, StatusCode::OK);
    let rows = json["predictions"].as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["job"], "technician");
    assert_eq!(rows[0]["result"], 0);

    let (status, json) = get(&app, "/api/dashboard/confusion-matrix").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["matrix"], json!([[0, 1], [0, 0]]));
}

#[tokio::test]
async fn test_empty_confusion_matrix_is_zeros() {
    let (_store, app) = build_app(ArtifactsConfig::in_dir(artifacts_dir()));
    let (status, json) = get(&app, "/api/dashboard/confusion-matrix").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["matrix"], json!([[0, 0], [0, 0]]));
}

#[tokio::test]
async fn test_pipeline_metrics_snapshot() {
    let (_store, app) = build_app(ArtifactsConfig::in_dir(artifacts_dir()));
    post_predict(&app, &client_json()).await;

    let (status, json) = get(&app, "/api/pipeline/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["predictions_processed"], 1);
    assert_eq!(json["accepted"], 1);
}

#[tokio::test]
async fn test_empty_predictions_list() {
    let (_store, app) = build_app(ArtifactsConfig::in_dir(artifacts_dir()));
    let (status, json) = get(&app, "/api/dashboard/predictions").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({ "predictions": [] }));
}

#[tokio::test]
async fn test_malformed_body_uses_error_envelope() {
    let (store, app) = build_app(ArtifactsConfig::in_dir(artifacts_dir()));

    let (status, json) = post_raw(&app, br#"{"age": 45,"#.to_vec(), Some("application/json")).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["error"]["type"], "validation_error");
    assert!(json["error"]["message"].as_str().unwrap().contains("not valid JSON"));
    assert_eq!(store.prediction_count().await, 0);
}

#[tokio::test]
async fn test_body_without_content_type_is_accepted() {
    let (_store, app) = build_app(ArtifactsConfig::in_dir(artifacts_dir()));
    let body = serde_json::to_vec(&client_json()).unwrap();

    let (status, json) = post_raw(&app, body, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["prediction"], "yes");
}

#[tokio::test]
async fn test_bad_limit_uses_error_envelope() {
    let (_store, app) = build_app(ArtifactsConfig::in_dir(artifacts_dir()));

    let (status, json) = get(&app, "/api/dashboard/predictions?limit=-1").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json["error"]["type"], "validation_error");
    assert!(json["error"]["message"].is_string());
}

#[tokio::test]
async fn test_store_outage_answers_500() {
    let app = build_app_with_store(ArtifactsConfig::in_dir(artifacts_dir()), Arc::new(UnreachableStore));

    let (status, json) = post_predict(&app, &client_json()).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"]["type"], "store_unavailable");

    let (status, json) = get(&app, "/api/dashboard/metrics").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"]["type"], "store_unavailable");

    let (_, json) = get(&app, "/api/pipeline/metrics").await;
    assert_eq!(json["failures_by_kind"]["store_unavailable"], 1);
}

#[tokio::test]
async fn test_text_in_unencoded_column_answers_400() {
    let dir = tempfile::tempdir().unwrap();
    for entry in std::fs::read_dir(artifacts_dir()).unwrap() {
        let entry = entry.unwrap();
        std::fs::copy(entry.path(), dir.path().join(entry.file_name())).unwrap();
    }
    let encoders_path = dir.path().join("encoders.json");
    let mut encoders: Value = serde_json::from_slice(&std::fs::read(&encoders_path).unwrap()).unwrap();
    encoders.as_object_mut().unwrap().remove("job");
    std::fs::write(&encoders_path, serde_json::to_vec(&encoders).unwrap()).unwrap();

    let (store, app) = build_app(ArtifactsConfig::in_dir(dir.path()));
    let (status, json) = post_predict(&app, &client_json()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["type"], "invalid_input");
    assert!(json["error"]["message"].as_str().unwrap().contains("job"));
    assert_eq!(store.prediction_count().await, 0);
}
