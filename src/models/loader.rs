//! Artifact loader

use crate::config::{ArtifactsConfig, ModelFormat};
use crate::feature_extractor::{DefaultCodeTable, EncodingTable, FeatureExtractor, FeatureOrder};
use crate::models::inference::Classifier;
use crate::models::tree::DecisionTree;
use anyhow::{ensure, Context, Result};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

/// Everything produced by training that inference needs, loaded once
pub struct Artifacts {
    pub classifier: Box<dyn Classifier>,
    pub features: FeatureExtractor,
}

/// Loader for the model and preprocessing artifacts
pub struct ArtifactLoader<'a> {
    config: &'a ArtifactsConfig,
}

impl<'a> ArtifactLoader<'a> {
    pub fn new(config: &'a ArtifactsConfig) -> Self {
        Self { config }
    }

    /// Load every artifact and check they agree with each other
    pub fn load(&self) -> Result<Artifacts> {
        let config = self.config;
        info!(dir = %config.dir.display(), format = ?config.model_format, "Loading artifacts");

        let classes: HashMap<String, Vec<String>> = read_json(&config.encoders_path())?;
        let encoders = EncodingTable::from_classes(classes);

        let default_codes = self.load_default_codes()?;

        let columns: Vec<String> = read_json(&config.feature_names_path())?;
        let feature_order = FeatureOrder::new(columns, &config.label_column);
        ensure!(!feature_order.is_empty(), "feature list is empty");

        let classifier = self.load_classifier()?;
        if let Some(expected) = classifier.n_features() {
            ensure!(
                expected == feature_order.len(),
                "model expects {expected} features but the feature list has {}",
                feature_order.len()
            );
        }

        info!(
            model = %classifier.name(),
            features = feature_order.len(),
            encoded_columns = encoders.len(),
            "Artifacts loaded"
        );

        Ok(Artifacts {
            classifier,
            features: FeatureExtractor::new(encoders, default_codes, feature_order),
        })
    }

    fn load_default_codes(&self) -> Result<DefaultCodeTable> {
        let path = self.config.default_codes_path();
        if !path.exists() {
            warn!(
                path = %path.display(),
                "Default codes not found, unseen categories will encode as 0"
            );
            return Ok(DefaultCodeTable::default());
        }
        let codes: HashMap<String, i64> = read_json(&path)?;
        Ok(DefaultCodeTable::new(codes))
    }

    fn load_classifier(&self) -> Result<Box<dyn Classifier>> {
        let path = self.config.model_path();
        match self.config.model_format {
            ModelFormat::Tree => {
                let tree = DecisionTree::from_file(&path)?;
                info!(nodes = tree.node_count(), path = %path.display(), "Decision tree loaded");
                Ok(Box::new(tree))
            }
            #[cfg(feature = "onnx")]
            ModelFormat::Onnx => {
                let model = crate::models::onnx::OnnxClassifier::load(&path, self.config.onnx_threads)?;
                Ok(Box::new(model))
            }
            #[cfg(not(feature = "onnx"))]
            ModelFormat::Onnx => {
                anyhow::bail!("ONNX model requested but the `onnx` feature is disabled")
            }
        }
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
}
