//! Feed-forward network stored as JSON.
//!
//! Weights use the `(inputs, outputs)` kernel layout of the training
//! framework, so an exported kernel can be written out without transposing.
//! The file carries its own label list, which must match [`EmotionLabel::ALL`].

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use super::{EmotionLabel, EmotionScorer, Scores};
use crate::error::{EmotionError, Result};
use crate::features::{FeatureVector, N_MFCC};

pub const MODEL_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    #[default]
    Linear,
    Relu,
    Tanh,
    Sigmoid,
    Softmax,
}

impl Activation {
    fn apply(self, mut x: Array1<f32>) -> Array1<f32> {
        match self {
            Self::Linear => x,
            Self::Relu => x.mapv_into(|v| v.max(0.0)),
            Self::Tanh => x.mapv_into(f32::tanh),
            Self::Sigmoid => x.mapv_into(|v| 1.0 / (1.0 + (-v).exp())),
            Self::Softmax => {
                let max = x.iter().copied().fold(f32::NEG_INFINITY, f32::max);
                x.mapv_inplace(|v| (v - max).exp());
                let sum = x.sum();
                if sum > 0.0 {
                    x /= sum;
                }
                x
            }
        }
    }
}

/// One dense layer as stored on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseLayerSpec {
    /// Kernel with one row per input and one column per output
    pub weights: Vec<Vec<f32>>,
    pub bias: Vec<f32>,
    #[serde(default)]
    pub activation: Activation,
}

/// On-disk model file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseModelFile {
    pub format_version: u32,
    /// Output labels in score order
    pub labels: Vec<String>,
    pub input_dim: usize,
    pub layers: Vec<DenseLayerSpec>,
}

impl DenseModelFile {
    /// A file for `layers` with the current version and label order filled in
    pub fn new(layers: Vec<DenseLayerSpec>) -> Self {
        Self {
            format_version: MODEL_FORMAT_VERSION,
            labels: EmotionLabel::ALL.iter().map(|l| l.as_str().to_string()).collect(),
            input_dim: N_MFCC,
            layers,
        }
    }
}

struct DenseLayer {
    weights: Array2<f32>,
    bias: Array1<f32>,
    activation: Activation,
}

/// Validated, ready-to-run dense network
pub struct DenseModel {
    layers: Vec<DenseLayer>,
}

impl DenseModel {
    /// Load and validate a JSON model file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            EmotionError::ModelLoadError(format!("Failed to read {:?}: {}", path, e))
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let file: DenseModelFile = serde_json::from_str(content)
            .map_err(|e| EmotionError::ModelLoadError(format!("Invalid model file: {}", e)))?;
        Self::from_file(file)
    }

    pub fn from_file(file: DenseModelFile) -> Result<Self> {
        if file.format_version != MODEL_FORMAT_VERSION {
            return Err(EmotionError::ModelLoadError(format!(
                "Unsupported model format version {} (expected {})",
                file.format_version, MODEL_FORMAT_VERSION
            )));
        }

        let expected_labels: Vec<&str> = EmotionLabel::ALL.iter().map(|l| l.as_str()).collect();
        let labels_match = file.labels.len() == expected_labels.len()
            && file
                .labels
                .iter()
                .zip(&expected_labels)
                .all(|(a, b)| a.eq_ignore_ascii_case(b));
        if !labels_match {
            return Err(EmotionError::ModelLoadError(format!(
                "Model label order {:?} does not match {:?}",
                file.labels, expected_labels
            )));
        }

        if file.input_dim != N_MFCC {
            return Err(EmotionError::ModelLoadError(format!(
                "Model expects {} inputs, features have {}",
                file.input_dim, N_MFCC
            )));
        }

        if file.layers.is_empty() {
            return Err(EmotionError::ModelLoadError("Model has no layers".to_string()));
        }

        let mut layers = Vec::with_capacity(file.layers.len());
        let mut width = file.input_dim;

        for (idx, spec) in file.layers.into_iter().enumerate() {
            let layer = build_layer(idx, spec, width)?;
            width = layer.bias.len();
            layers.push(layer);
        }

        if width != EmotionLabel::COUNT {
            return Err(EmotionError::ModelLoadError(format!(
                "Model produces {} outputs, expected {}",
                width,
                EmotionLabel::COUNT
            )));
        }

        debug!("Dense model validated: {} layers", layers.len());
        Ok(Self { layers })
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    fn forward(&self, input: &[f32]) -> Array1<f32> {
        self.layers.iter().fold(Array1::from(input.to_vec()), |x, layer| {
            let z = x.dot(&layer.weights) + &layer.bias;
            layer.activation.apply(z)
        })
    }
}

fn build_layer(idx: usize, spec: DenseLayerSpec, inputs: usize) -> Result<DenseLayer> {
    let outputs = spec.bias.len();

    if spec.weights.len() != inputs {
        return Err(EmotionError::ModelLoadError(format!(
            "Layer {} has {} weight rows, expected {}",
            idx,
            spec.weights.len(),
            inputs
        )));
    }
    if let Some(row) = spec.weights.iter().position(|r| r.len() != outputs) {
        return Err(EmotionError::ModelLoadError(format!(
            "Layer {} weight row {} has {} columns, expected {}",
            idx,
            row,
            spec.weights[row].len(),
            outputs
        )));
    }

    let flat: Vec<f32> = spec.weights.into_iter().flatten().collect();
    if flat.iter().chain(&spec.bias).any(|v| !v.is_finite()) {
        return Err(EmotionError::ModelLoadError(format!(
            "Layer {} contains non-finite parameters",
            idx
        )));
    }

    let weights = Array2::from_shape_vec((inputs, outputs), flat)
        .map_err(|e| EmotionError::ModelLoadError(format!("Layer {}: {}", idx, e)))?;

    Ok(DenseLayer {
        weights,
        bias: Array1::from(spec.bias),
        activation: spec.activation,
    })
}

impl EmotionScorer for DenseModel {
    fn score(&self, features: &FeatureVector) -> Result<Scores> {
        let output = self.forward(features.as_slice());
        let values = output.as_slice().ok_or_else(|| {
            EmotionError::InferenceError("non-contiguous model output".to_string())
        })?;
        values.try_into().map_err(|_| EmotionError::ShapeError {
            expected: EmotionLabel::COUNT,
            actual: values.len(),
        })
    }

    fn backend(&self) -> &'static str {
        "dense"
    }
}
