//! Error types shared by the decoding, feature extraction and inference stages.

use thiserror::Error;

/// Errors that can occur while turning audio into an emotion label
#[derive(Debug, Error)]
pub enum EmotionError {
    /// Input bytes are not a readable WAV container, or hold no samples
    #[error("Failed to decode audio: {0}")]
    DecodeError(String),

    /// A vector of unexpected length reached the classifier
    #[error("Shape mismatch: expected {expected} values, got {actual}")]
    ShapeError { expected: usize, actual: usize },

    /// The classifier model could not be loaded
    #[error("Failed to load model: {0}")]
    ModelLoadError(String),

    #[error("Inference error: {0}")]
    InferenceError(String),

    #[error("Feature not enabled: {0}")]
    FeatureNotEnabled(&'static str),
}

impl EmotionError {
    /// True for failures that only affect a single prediction request.
    ///
    /// Model load failures are the one process-fatal case.
    pub fn is_per_request(&self) -> bool {
        !matches!(
            self,
            EmotionError::ModelLoadError(_) | EmotionError::FeatureNotEnabled(_)
        )
    }
}

impl From<hound::Error> for EmotionError {
    fn from(e: hound::Error) -> Self {
        EmotionError::DecodeError(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EmotionError>;
