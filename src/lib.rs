//! Bank Deposit Predictor Library
//!
//! Predicts whether a bank client will subscribe to a term deposit, using a
//! classifier trained on the bank-marketing campaign data, and records every
//! prediction for the campaign dashboard.

pub mod api;
pub mod config;
pub mod error;
pub mod feature_extractor;
pub mod metrics;
pub mod models;
pub mod store;
pub mod types;

pub use config::AppConfig;
pub use error::{PredictError, StoreError};
pub use feature_extractor::FeatureExtractor;
pub use models::inference::InferenceEngine;
pub use types::{ClientRecord, Label, PredictionResult};
