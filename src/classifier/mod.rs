//! Emotion classification from MFCC feature vectors.
//!
//! A pre-trained model is loaded once into an [`EmotionClassifier`] and then
//! shared read-only by every prediction. The model itself sits behind the
//! [`EmotionScorer`] trait so the serialization format can change without
//! touching the rest of the pipeline.

mod dense;
mod onnx;

pub use dense::{Activation, DenseLayerSpec, DenseModel, DenseModelFile, MODEL_FORMAT_VERSION};
pub use onnx::OnnxModel;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::{debug, info};

use crate::error::{EmotionError, Result};
use crate::features::{FeatureVector, N_MFCC};

/// Emotion classes, in the order of the model's output scores.
///
/// The discriminants are the training-time class indices. Reordering the
/// variants silently corrupts every prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmotionLabel {
    Angry = 0,
    Fear = 1,
    Happy = 2,
    Neutral = 3,
    Sad = 4,
}

impl EmotionLabel {
    pub const COUNT: usize = 5;

    /// All labels in output-index order
    pub const ALL: [EmotionLabel; Self::COUNT] = [
        Self::Angry,
        Self::Fear,
        Self::Happy,
        Self::Neutral,
        Self::Sad,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Angry => "angry",
            Self::Fear => "fear",
            Self::Happy => "happy",
            Self::Neutral => "neutral",
            Self::Sad => "sad",
        }
    }

    /// Capitalized name for display
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Angry => "Angry",
            Self::Fear => "Fear",
            Self::Happy => "Happy",
            Self::Neutral => "Neutral",
            Self::Sad => "Sad",
        }
    }
}

impl fmt::Display for EmotionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EmotionLabel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "angry" => Ok(Self::Angry),
            "fear" => Ok(Self::Fear),
            "happy" => Ok(Self::Happy),
            "neutral" => Ok(Self::Neutral),
            "sad" => Ok(Self::Sad),
            _ => Err(format!("Unknown emotion label: {}", s)),
        }
    }
}

/// Raw model output: one score per label, in label order
pub type Scores = [f32; EmotionLabel::COUNT];

/// A loaded model that scores a feature vector against every emotion
pub trait EmotionScorer: Send + Sync {
    fn score(&self, features: &FeatureVector) -> Result<Scores>;

    /// Short backend name for logs
    fn backend(&self) -> &'static str;
}

/// Serialization format of a model artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFormat {
    /// JSON dense network
    Dense,
    /// ONNX graph, run with ONNX Runtime
    Onnx,
}

impl ModelFormat {
    /// Pick the format from the file extension
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        match ext.as_deref() {
            Some("json") => Ok(Self::Dense),
            Some("onnx") => Ok(Self::Onnx),
            _ => Err(EmotionError::ModelLoadError(format!(
                "Unrecognized model format: {:?} (expected .json or .onnx)",
                path
            ))),
        }
    }
}

/// Pre-trained emotion classifier, immutable after load
pub struct EmotionClassifier {
    scorer: Box<dyn EmotionScorer>,
}

impl EmotionClassifier {
    pub fn new(scorer: Box<dyn EmotionScorer>) -> Self {
        Self { scorer }
    }

    /// Load a model artifact from disk.
    ///
    /// `n_threads` only applies to the ONNX backend.
    pub fn load(path: &Path, n_threads: usize) -> Result<Self> {
        if !path.exists() {
            return Err(EmotionError::ModelLoadError(format!(
                "Model not found at {:?}",
                path
            )));
        }

        let scorer: Box<dyn EmotionScorer> = match ModelFormat::from_path(path)? {
            ModelFormat::Dense => Box::new(DenseModel::load(path)?),
            ModelFormat::Onnx => Box::new(OnnxModel::load(path, n_threads)?),
        };

        info!(
            "Emotion classifier loaded from {:?} ({} backend)",
            path,
            scorer.backend()
        );
        Ok(Self::new(scorer))
    }

    /// Score a feature vector against all labels
    pub fn scores(&self, features: &FeatureVector) -> Result<Scores> {
        self.scorer.score(features)
    }

    /// Classify a feature vector into exactly one label
    pub fn classify(&self, features: &FeatureVector) -> Result<EmotionLabel> {
        let scores = self.scores(features)?;
        let label = label_for_scores(&scores);
        debug!("Scores {:?} -> {}", scores, label);
        Ok(label)
    }

    /// Classify a raw slice, which must hold exactly 13 values
    pub fn classify_slice(&self, values: &[f32]) -> Result<EmotionLabel> {
        if values.len() != N_MFCC {
            return Err(EmotionError::ShapeError {
                expected: N_MFCC,
                actual: values.len(),
            });
        }
        self.classify(&FeatureVector::try_from(values)?)
    }

    pub fn backend(&self) -> &'static str {
        self.scorer.backend()
    }
}

/// Index of the highest score, ties going to the lowest index.
///
/// NaN scores never win over a finite one; all-NaN input yields 0.
pub fn argmax(scores: &[f32]) -> usize {
    let mut best: Option<(usize, f32)> = None;
    for (i, &score) in scores.iter().enumerate() {
        if score.is_nan() {
            continue;
        }
        match best {
            Some((_, b)) if score <= b => {}
            _ => best = Some((i, score)),
        }
    }
    best.map(|(i, _)| i).unwrap_or(0)
}

/// Map model scores to the winning label
pub fn label_for_scores(scores: &Scores) -> EmotionLabel {
    // argmax over a fixed-size array is always in range
    EmotionLabel::ALL[argmax(scores)]
}
