//! Error kinds surfaced by the inference pipeline and the store

use thiserror::Error;

/// Failure of a single `predict` call
#[derive(Debug, Error)]
pub enum PredictError {
    /// Model or preprocessing artifacts failed to load at startup
    #[error("prediction artifacts are not available")]
    ArtifactsUnavailable,

    /// Malformed input, or any failure while encoding, aligning or invoking the model
    #[error("prediction error: {0}")]
    InvalidInput(String),

    /// The client/prediction store call failed; the computed prediction is discarded
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
}

impl PredictError {
    /// Short name used in logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            PredictError::ArtifactsUnavailable => "artifacts_unavailable",
            PredictError::InvalidInput(_) => "invalid_input",
            PredictError::StoreUnavailable(_) => "store_unavailable",
        }
    }
}

impl From<StoreError> for PredictError {
    fn from(err: StoreError) -> Self {
        PredictError::StoreUnavailable(err.to_string())
    }
}

/// Failure of a prediction store backend
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to connect to store: {0}")]
    Connection(String),

    #[error("store query failed: {0}")]
    Query(String),
}
