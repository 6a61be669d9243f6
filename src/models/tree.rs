//! Decision-tree classifier exported from a fitted scikit-learn tree.
//!
//! The artifact mirrors the estimator's `tree_` arrays:
//!
//! ```json
//! {
//!   "n_features": 16,
//!   "classes": [0, 1],
//!   "children_left":  [1, -1, -1],
//!   "children_right": [2, -1, -1],
//!   "feature":   [11, -2, -2],
//!   "threshold": [206.5, -2.0, -2.0],
//!   "value": [[40, 35], [30, 5], [10, 30]]
//! }
//! ```
//!
//! Leaves have `children_left == -1`. At an internal node the sample goes left
//! when `x[feature] <= threshold`.

use crate::models::inference::Classifier;
use anyhow::{bail, ensure, Context, Result};
use serde::Deserialize;
use std::path::Path;

const TREE_LEAF: i64 = -1;

/// On-disk layout of the tree artifact
#[derive(Debug, Clone, Deserialize)]
pub struct TreeArtifact {
    pub n_features: usize,
    pub classes: Vec<i64>,
    pub children_left: Vec<i64>,
    pub children_right: Vec<i64>,
    pub feature: Vec<i64>,
    pub threshold: Vec<f64>,
    /// Per-node class weights (counts or fractions)
    pub value: Vec<Vec<f64>>,
}

#[derive(Debug, Clone)]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        weights: [f64; 2],
    },
}

/// Validated binary decision tree
#[derive(Debug, Clone)]
pub struct DecisionTree {
    name: String,
    n_features: usize,
    classes: [i64; 2],
    nodes: Vec<Node>,
}

impl DecisionTree {
    /// Load and validate a tree artifact from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read model from {}", path.display()))?;
        let artifact: TreeArtifact = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse model {}", path.display()))?;
        Self::from_artifact(artifact).with_context(|| format!("Invalid model {}", path.display()))
    }

    /// Validate the raw arrays and build the tree
    pub fn from_artifact(artifact: TreeArtifact) -> Result<Self> {
        let n_nodes = artifact.children_left.len();
        ensure!(n_nodes > 0, "tree has no nodes");
        ensure!(
            artifact.children_right.len() == n_nodes
                && artifact.feature.len() == n_nodes
                && artifact.threshold.len() == n_nodes
                && artifact.value.len() == n_nodes,
            "tree arrays have mismatched lengths"
        );
        let classes: [i64; 2] = match artifact.classes.as_slice() {
            [negative, positive] => [*negative, *positive],
            other => bail!("expected a binary classifier, found {} classes", other.len()),
        };

        let mut nodes = Vec::with_capacity(n_nodes);
        for i in 0..n_nodes {
            let left = artifact.children_left[i];
            let right = artifact.children_right[i];

            if left == TREE_LEAF {
                ensure!(right == TREE_LEAF, "node {i} has only one child");
                let weights = match artifact.value[i].as_slice() {
                    [negative, positive] => [*negative, *positive],
                    other => bail!("node {i} has {} class weights, expected 2", other.len()),
                };
                ensure!(
                    weights.iter().all(|w| w.is_finite() && *w >= 0.0) && weights[0] + weights[1] > 0.0,
                    "node {i} has invalid class weights"
                );
                nodes.push(Node::Leaf { weights });
                continue;
            }

            // Children always follow their parent, which also rules out cycles.
            let in_range = |child: i64| child > i as i64 && (child as usize) < n_nodes;
            ensure!(
                in_range(left) && in_range(right),
                "node {i} has out-of-range children ({left}, {right})"
            );
            let feature = artifact.feature[i];
            ensure!(
                feature >= 0 && (feature as usize) < artifact.n_features,
                "node {i} splits on feature {feature}, model has {}",
                artifact.n_features
            );
            ensure!(artifact.threshold[i].is_finite(), "node {i} has a non-finite threshold");

            nodes.push(Node::Split {
                feature: feature as usize,
                threshold: artifact.threshold[i],
                left: left as usize,
                right: right as usize,
            });
        }

        Ok(Self {
            name: "decision_tree".to_string(),
            n_features: artifact.n_features,
            classes,
            nodes,
        })
    }

    /// Number of nodes, leaves included
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn leaf_weights(&self, features: &[f32]) -> Result<[f64; 2]> {
        ensure!(
            features.len() == self.n_features,
            "expected {} features, got {}",
            self.n_features,
            features.len()
        );

        let mut index = 0;
        loop {
            match &self.nodes[index] {
                Node::Leaf { weights } => return Ok(*weights),
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if f64::from(features[*feature]) <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }
}

impl Classifier for DecisionTree {
    fn name(&self) -> &str {
        &self.name
    }

    fn n_features(&self) -> Option<usize> {
        Some(self.n_features)
    }

    fn predict(&self, features: &[f32]) -> Result<i64> {
        let [negative, positive] = self.leaf_weights(features)?;
        // First class wins ties
        Ok(if positive > negative {
            self.classes[1]
        } else {
            self.classes[0]
        })
    }

    fn predict_proba(&self, features: &[f32]) -> Option<Result<f64>> {
        Some(
            self.leaf_weights(features)
                .map(|[negative, positive]| positive / (negative + positive)),
        )
    }
}
