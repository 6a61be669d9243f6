//! Inference pipeline for deposit-acceptance prediction

use crate::config::ArtifactsConfig;
use crate::error::PredictError;
use crate::feature_extractor::{FieldValue, RawRow};
use crate::metrics::PipelineMetrics;
use crate::models::loader::{ArtifactLoader, Artifacts};
use crate::store::{ClientMatch, NewPrediction, PredictionStore};
use crate::types::prediction::{Label, PredictionResult};
use crate::types::record::ClientRecord;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// A trained binary classifier over an aligned feature vector.
pub trait Classifier: Send + Sync {
    /// Model name for logs
    fn name(&self) -> &str;

    /// Number of input features, when the model declares it
    fn n_features(&self) -> Option<usize>;

    /// Predicted class (1 = accepts the deposit)
    fn predict(&self, features: &[f32]) -> anyhow::Result<i64>;

    /// Positive-class probability. `None` when the model cannot estimate one.
    fn predict_proba(&self, _features: &[f32]) -> Option<anyhow::Result<f64>> {
        None
    }
}

/// Runs the full prediction pipeline for one record at a time.
///
/// Artifacts are loaded once and shared read-only; when they failed to load
/// every call fails with [`PredictError::ArtifactsUnavailable`].
pub struct InferenceEngine {
    artifacts: Option<Arc<Artifacts>>,
    store: Arc<dyn PredictionStore>,
    metrics: Arc<PipelineMetrics>,
}

impl InferenceEngine {
    pub fn new(
        artifacts: Option<Artifacts>,
        store: Arc<dyn PredictionStore>,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            artifacts: artifacts.map(Arc::new),
            store,
            metrics,
        }
    }

    /// Load artifacts from configuration. A load failure is logged and leaves
    /// the engine disabled rather than failing startup.
    pub fn from_config(
        config: &ArtifactsConfig,
        store: Arc<dyn PredictionStore>,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        let artifacts = match ArtifactLoader::new(config).load() {
            Ok(artifacts) => {
                info!(
                    model = %artifacts.classifier.name(),
                    features = artifacts.features.feature_count(),
                    encoded_columns = artifacts.features.encoders().len(),
                    "Inference engine initialized"
                );
                Some(artifacts)
            }
            Err(e) => {
                error!(
                    dir = %config.dir.display(),
                    error = format!("{e:#}"),
                    "Failed to load artifacts, predictions disabled"
                );
                None
            }
        };
        Self::new(artifacts, store, metrics)
    }

    pub fn is_available(&self) -> bool {
        self.artifacts.is_some()
    }

    /// Name of the loaded model
    pub fn model_name(&self) -> Option<&str> {
        self.artifacts.as_ref().map(|a| a.classifier.name())
    }

    pub fn metrics(&self) -> &Arc<PipelineMetrics> {
        &self.metrics
    }

    /// Predict, link the record to a client and persist the prediction.
    pub async fn predict(&self, record: &ClientRecord) -> Result<PredictionResult, PredictError> {
        let start_time = Instant::now();
        let request_id = Uuid::new_v4();

        let outcome = self.predict_and_store(record, request_id).await;
        let processing_time = start_time.elapsed();

        match &outcome {
            Ok(result) => {
                self.metrics.record_prediction(processing_time, result);
                info!(
                    request_id = %request_id,
                    prediction = result.label.as_str(),
                    probability = result.probability,
                    calibrated = result.calibrated,
                    linked_client_id = ?result.linked_client_id,
                    processing_time_us = processing_time.as_micros(),
                    "Prediction served"
                );
            }
            Err(e) => {
                self.metrics.record_failure(e.kind());
                warn!(request_id = %request_id, kind = e.kind(), error = %e, "Prediction failed");
            }
        }
        outcome
    }

    async fn predict_and_store(
        &self,
        record: &ClientRecord,
        request_id: Uuid,
    ) -> Result<PredictionResult, PredictError> {
        let (result, normalized) = self.run(record, request_id)?;

        let criteria = client_match(&normalized)?;
        let client_id = self.store.find_client(&criteria).await?;

        let balance = number(&normalized, "balance")?;
        self.store
            .save_prediction(&NewPrediction {
                client_id,
                age: criteria.age,
                job: criteria.job,
                marital: criteria.marital,
                education: criteria.education,
                balance,
                label: result.label,
            })
            .await?;

        Ok(result.with_linked_client(client_id))
    }

    /// Normalize, encode, align and invoke the model without touching the store.
    pub fn infer(&self, record: &ClientRecord) -> Result<PredictionResult, PredictError> {
        self.run(record, Uuid::new_v4()).map(|(result, _)| result)
    }

    fn run(
        &self,
        record: &ClientRecord,
        request_id: Uuid,
    ) -> Result<(PredictionResult, RawRow), PredictError> {
        let artifacts = self
            .artifacts
            .as_ref()
            .ok_or(PredictError::ArtifactsUnavailable)?;

        let extraction = artifacts.features.extract(record)?;
        for unseen in &extraction.unseen {
            self.metrics.record_unseen_category(&unseen.column);
        }
        debug!(
            request_id = %request_id,
            features = ?extraction.features,
            "Feature vector prepared"
        );

        let classifier = &artifacts.classifier;
        let class = classifier
            .predict(&extraction.features)
            .map_err(|e| PredictError::InvalidInput(format!("{e:#}")))?;
        let label = Label::from_class(class);

        let (probability, calibrated) = match classifier.predict_proba(&extraction.features) {
            Some(Ok(p)) => (p.clamp(0.0, 1.0), true),
            Some(Err(e)) => return Err(PredictError::InvalidInput(format!("{e:#}"))),
            None => {
                debug!(
                    request_id = %request_id,
                    model = %classifier.name(),
                    "Model has no probability estimate, synthesizing from label"
                );
                (if label == Label::Accept { 1.0 } else { 0.0 }, false)
            }
        };

        Ok((
            PredictionResult::new(label, probability, calibrated),
            extraction.normalized,
        ))
    }
}

fn text(row: &RawRow, column: &str) -> Result<String, PredictError> {
    match row.get(column) {
        Some(FieldValue::Text(value)) => Ok(value.clone()),
        _ => Err(PredictError::InvalidInput(format!("column '{column}' is not text"))),
    }
}

fn number(row: &RawRow, column: &str) -> Result<f64, PredictError> {
    match row.get(column) {
        Some(FieldValue::Number(value)) => Ok(*value),
        _ => Err(PredictError::InvalidInput(format!("column '{column}' is not numeric"))),
    }
}

fn client_match(row: &RawRow) -> Result<ClientMatch, PredictError> {
    Ok(ClientMatch {
        age: number(row, "age")? as i64,
        job: text(row, "job")?,
        marital: text(row, "marital")?,
        education: text(row, "education")?,
    })
}
