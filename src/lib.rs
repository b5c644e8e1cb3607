//! Emotion classification for short spoken-Tamil audio clips.
//!
//! WAV bytes go through [`features::extract`] to become a 13-value MFCC
//! mean vector, which a pre-trained [`classifier::EmotionClassifier`] maps to
//! one of five [`classifier::EmotionLabel`]s. [`pipeline::EmotionPipeline`]
//! ties the two together.

pub mod audio;
pub mod classifier;
pub mod config;
pub mod error;
pub mod features;
pub mod pipeline;

pub use classifier::{EmotionClassifier, EmotionLabel, EmotionScorer};
pub use error::{EmotionError, Result};
pub use features::{extract, FeatureVector, MfccExtractor};
pub use pipeline::{EmotionPipeline, Prediction};

#[cfg(test)]
mod pipeline_tests;
