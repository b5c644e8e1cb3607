//! ONNX backend for exported classifier graphs.
//!
//! The graph takes a `[1, 13, 1]` float tensor (one clip, thirteen steps, one
//! channel) and its first output holds the five class scores.

use std::path::Path;

#[cfg(feature = "onnx")]
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::Value,
};
#[cfg(feature = "onnx")]
use std::sync::Mutex;

use super::{EmotionScorer, Scores};
use crate::error::{EmotionError, Result};
use crate::features::FeatureVector;
#[cfg(feature = "onnx")]
use {super::EmotionLabel, crate::features::N_MFCC};

/// ONNX Runtime session holding the classifier graph
#[cfg(feature = "onnx")]
pub struct OnnxModel {
    session: Mutex<Session>,
}

#[cfg(feature = "onnx")]
impl OnnxModel {
    pub fn load(path: &Path, n_threads: usize) -> Result<Self> {
        let session = Session::builder()
            .map_err(|e: ort::Error| EmotionError::ModelLoadError(e.to_string()))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e: ort::Error| EmotionError::ModelLoadError(e.to_string()))?
            .with_intra_threads(n_threads.max(1))
            .map_err(|e: ort::Error| EmotionError::ModelLoadError(e.to_string()))?
            .commit_from_file(path)
            .map_err(|e: ort::Error| EmotionError::ModelLoadError(e.to_string()))?;

        tracing::info!("ONNX emotion model loaded from {:?}", path);

        Ok(Self {
            session: Mutex::new(session),
        })
    }
}

#[cfg(feature = "onnx")]
impl EmotionScorer for OnnxModel {
    fn score(&self, features: &FeatureVector) -> Result<Scores> {
        let input_shape = [1_usize, N_MFCC, 1];
        let input_tensor = Value::from_array((input_shape, features.as_slice().to_vec()))
            .map_err(|e: ort::Error| EmotionError::InferenceError(e.to_string()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| EmotionError::InferenceError("ONNX session lock poisoned".to_string()))?;

        let outputs = session
            .run(ort::inputs![input_tensor])
            .map_err(|e: ort::Error| EmotionError::InferenceError(e.to_string()))?;

        let output = outputs
            .iter()
            .next()
            .ok_or_else(|| EmotionError::InferenceError("No output from model".to_string()))?;

        let output_tensor = output
            .1
            .try_extract_tensor::<f32>()
            .map_err(|e: ort::Error| EmotionError::InferenceError(e.to_string()))?;

        let values: Vec<f32> = output_tensor.1.iter().copied().collect();
        tracing::debug!("ONNX scores: {:?}", values);

        values
            .as_slice()
            .try_into()
            .map_err(|_| EmotionError::ShapeError {
                expected: EmotionLabel::COUNT,
                actual: values.len(),
            })
    }

    fn backend(&self) -> &'static str {
        "onnx"
    }
}

// Stub implementation when feature is not enabled
#[cfg(not(feature = "onnx"))]
pub struct OnnxModel;

#[cfg(not(feature = "onnx"))]
impl OnnxModel {
    pub fn load(_path: &Path, _n_threads: usize) -> Result<Self> {
        Err(EmotionError::FeatureNotEnabled("onnx"))
    }
}

#[cfg(not(feature = "onnx"))]
impl EmotionScorer for OnnxModel {
    fn score(&self, _features: &FeatureVector) -> Result<Scores> {
        Err(EmotionError::FeatureNotEnabled("onnx"))
    }

    fn backend(&self) -> &'static str {
        "onnx"
    }
}
