//! Type definitions for the prediction service

pub mod prediction;
pub mod record;

pub use prediction::{Label, PredictionResponse, PredictionResult};
pub use record::{ClientRecord, FieldViolation, ValidationErrors};
