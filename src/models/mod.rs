//! Model loading and inference components

pub mod inference;
pub mod loader;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod tree;

pub use inference::{Classifier, InferenceEngine};
pub use loader::{ArtifactLoader, Artifacts};
pub use tree::DecisionTree;
