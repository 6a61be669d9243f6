//! REST API for predictions and the campaign dashboard.
//!
//! The dashboard is a separate web app; it reads the stored predictions
//! through the `/api/dashboard` routes and is allowed in by CORS.

pub mod handlers;

use crate::error::PredictError;
use crate::models::InferenceEngine;
use crate::store::PredictionStore;
use crate::types::record::{FieldViolation, ValidationErrors};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared state accessible by all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<InferenceEngine>,
    pub store: Arc<dyn PredictionStore>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(engine: Arc<InferenceEngine>, store: Arc<dyn PredictionStore>) -> Self {
        Self {
            engine,
            store,
            started_at: Instant::now(),
        }
    }
}

/// Build the API router with all routes.
pub fn build_router(state: AppState, cors_origins: &[String]) -> Router {
    let cors = if cors_origins.is_empty() {
        CorsLayer::permissive()
    } else {
        let origins: Vec<_> = cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    };

    Router::new()
        .merge(handlers::root_routes())
        .nest("/api", handlers::api_routes())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Standard API error envelope.
#[derive(Debug, Serialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Serialize)]
struct ApiErrorDetail {
    message: String,
    #[serde(rename = "type")]
    error_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<Vec<FieldViolation>>,
}

/// Build a JSON error response.
pub(crate) fn api_error(status: StatusCode, error_type: &str, message: &str) -> Response {
    let body = ApiError {
        error: ApiErrorDetail {
            message: message.to_string(),
            error_type: error_type.to_string(),
            fields: None,
        },
    };
    (status, Json(body)).into_response()
}

impl IntoResponse for ValidationErrors {
    fn into_response(self) -> Response {
        let body = ApiError {
            error: ApiErrorDetail {
                message: self.to_string(),
                error_type: "validation_error".to_string(),
                fields: Some(self.0),
            },
        };
        (StatusCode::UNPROCESSABLE_ENTITY, Json(body)).into_response()
    }
}

impl IntoResponse for PredictError {
    fn into_response(self) -> Response {
        let status = match &self {
            PredictError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            PredictError::ArtifactsUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            PredictError::StoreUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        api_error(status, self.kind(), &self.to_string())
    }
}
