//! Acoustic feature extraction.
//!
//! Converts raw WAV bytes into a fixed-size [`FeatureVector`]: decode,
//! resample to 22050 Hz, 13 MFCCs per frame, mean over time.

pub mod mel;
pub mod mfcc;

pub use mfcc::{extract, FeatureVector, MfccConfig, MfccExtractor, N_MFCC};
