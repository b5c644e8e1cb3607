//! Audio-to-label inference pipeline.

use serde::Serialize;
use std::time::Instant;
use tracing::debug;

use crate::classifier::{label_for_scores, EmotionClassifier, EmotionLabel, Scores};
use crate::error::Result;
use crate::features::{FeatureVector, MfccExtractor};

/// Outcome of one prediction
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Prediction {
    pub label: EmotionLabel,
    /// Raw model scores in label order
    pub scores: Scores,
}

impl Prediction {
    pub fn score_for(&self, label: EmotionLabel) -> f32 {
        self.scores[label.index()]
    }
}

/// Feature extractor plus a loaded classifier.
///
/// Holds no per-request state, so one instance can serve any number of
/// predictions, including from several threads at once.
pub struct EmotionPipeline {
    extractor: MfccExtractor,
    classifier: EmotionClassifier,
}

impl EmotionPipeline {
    pub fn new(classifier: EmotionClassifier) -> Self {
        Self::with_extractor(MfccExtractor::default(), classifier)
    }

    pub fn with_extractor(extractor: MfccExtractor, classifier: EmotionClassifier) -> Self {
        Self {
            extractor,
            classifier,
        }
    }

    /// Extract features from WAV bytes
    pub fn extract(&self, audio_bytes: &[u8]) -> Result<FeatureVector> {
        self.extractor.extract(audio_bytes)
    }

    /// Classify an already extracted feature vector
    pub fn classify(&self, features: &FeatureVector) -> Result<EmotionLabel> {
        self.classifier.classify(features)
    }

    /// Run the whole pipeline on WAV bytes
    pub fn predict(&self, audio_bytes: &[u8]) -> Result<Prediction> {
        let start_time = Instant::now();

        let features = self.extractor.extract(audio_bytes)?;
        let scores = self.classifier.scores(&features)?;
        let label = label_for_scores(&scores);

        debug!(
            "Prediction complete in {:?}: {} (scores: {:?})",
            start_time.elapsed(),
            label,
            scores
        );

        Ok(Prediction { label, scores })
    }

    /// Run the whole pipeline and keep only the label
    pub fn predict_label(&self, audio_bytes: &[u8]) -> Result<EmotionLabel> {
        self.predict(audio_bytes).map(|p| p.label)
    }
}
