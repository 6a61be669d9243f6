//! ONNX classifier backend, enabled with the `onnx` feature.
//!
//! Accepts binary classifiers exported with skl2onnx or onnxmltools. The
//! positive-class probability is read either from a `[batch, classes]` float
//! tensor or from the `seq(map(int64, float))` output those exporters emit
//! for tree ensembles.

use crate::models::inference::Classifier;
use anyhow::{anyhow, Context, Result};
use ort::memory::Allocator;
use ort::session::{builder::GraphOptimizationLevel, Session, SessionOutputs};
use ort::value::{DowncastableTarget, DynMapValueType, DynSequenceValueType, DynValue, Tensor};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

pub struct OnnxClassifier {
    name: String,
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
}

impl OnnxClassifier {
    /// Load an ONNX model from file
    pub fn load<P: AsRef<Path>>(path: P, threads: usize) -> Result<Self> {
        let path = path.as_ref();
        ort::init().commit()?;

        info!(path = %path.display(), threads, "Loading ONNX model");
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(threads)?
            .commit_from_file(path)
            .with_context(|| format!("Failed to load model from {}", path.display()))?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "float_input".to_string());
        let output_name = session
            .outputs
            .iter()
            .find(|o| o.name.contains("prob"))
            .or_else(|| session.outputs.last())
            .map(|o| o.name.clone())
            .unwrap_or_else(|| "probabilities".to_string());

        info!(input = %input_name, output = %output_name, "ONNX model loaded");

        Ok(Self {
            name: path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "onnx".to_string()),
            session: Mutex::new(session),
            input_name,
            output_name,
        })
    }

    fn positive_probability(&self, features: &[f32]) -> Result<f64> {
        let shape = vec![1_i64, features.len() as i64];
        let input = Tensor::from_array((shape, features.to_vec())).context("Failed to create input tensor")?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| anyhow!("ONNX session lock poisoned"))?;
        let outputs = session.run(ort::inputs![self.input_name.as_str() => input])?;
        let probability = extract_probability(&outputs, &self.output_name)?;
        debug!(model = %self.name, probability, "ONNX inference");
        Ok(probability)
    }
}

impl Classifier for OnnxClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn n_features(&self) -> Option<usize> {
        None
    }

    fn predict(&self, features: &[f32]) -> Result<i64> {
        Ok(i64::from(self.positive_probability(features)? > 0.5))
    }

    fn predict_proba(&self, features: &[f32]) -> Option<Result<f64>> {
        Some(self.positive_probability(features))
    }
}

fn extract_probability(outputs: &SessionOutputs, output_name: &str) -> Result<f64> {
    let output = outputs
        .get(output_name)
        .ok_or_else(|| anyhow!("model has no output named '{output_name}'"))?;

    if let Ok((shape, data)) = output.try_extract_tensor::<f32>() {
        let classes = shape.last().copied().unwrap_or(0);
        return match (classes, data) {
            (c, [_, positive, ..]) if c >= 2 => Ok(f64::from(*positive)),
            (1, [single, ..]) => Ok(f64::from(*single)),
            _ => Err(anyhow!("unexpected probability tensor shape {shape:?}")),
        };
    }

    if DynSequenceValueType::can_downcast(&output.dtype()) {
        return extract_from_sequence_map(output);
    }

    Err(anyhow!("output '{output_name}' holds no probabilities"))
}

/// Positive-class probability from a `seq(map(int64, float))` output
fn extract_from_sequence_map(output: &DynValue) -> Result<f64> {
    let allocator = Allocator::default();
    let sequence = output
        .downcast_ref::<DynSequenceValueType>()
        .map_err(|e| anyhow!("Failed to downcast to sequence: {e}"))?;
    let maps = sequence.try_extract_sequence::<DynMapValueType>(&allocator)?;
    let first = maps.first().ok_or_else(|| anyhow!("Empty sequence"))?;

    let pairs = first.try_extract_key_values::<i64, f32>()?;
    if let Some((_, p)) = pairs.iter().find(|(class, _)| *class == 1) {
        return Ok(f64::from(*p));
    }
    if let Some((_, p)) = pairs.iter().find(|(class, _)| *class == 0) {
        return Ok(1.0 - f64::from(*p));
    }
    Err(anyhow!("No probability found in map"))
}
