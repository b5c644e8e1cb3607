//! MFCC feature extraction.
//!
//! Turns a waveform into the 13-coefficient, time-averaged feature vector
//! the emotion classifier consumes.

use ndarray::{Array2, Axis};
use realfft::{RealFftPlanner, RealToComplex};
use serde::Serialize;
use std::f32::consts::PI;
use std::sync::Arc;
use tracing::{debug, warn};

use super::mel::mel_filterbank;
use crate::audio::{decode_wav, resample, TARGET_SAMPLE_RATE};
use crate::error::{EmotionError, Result};

/// Number of cepstral coefficients kept per frame
pub const N_MFCC: usize = 13;

/// Parameters of the MFCC front end
#[derive(Debug, Clone, PartialEq)]
pub struct MfccConfig {
    pub sample_rate: u32,
    pub n_fft: usize,
    pub hop_length: usize,
    pub n_mels: usize,
    pub fmin: f32,
    /// Upper filter edge; `None` means Nyquist
    pub fmax: Option<f32>,
    /// Dynamic range kept below the loudest mel bin, in dB
    pub top_db: f32,
    /// Power floor applied before the log
    pub amin: f32,
}

impl Default for MfccConfig {
    fn default() -> Self {
        Self {
            sample_rate: TARGET_SAMPLE_RATE,
            n_fft: 2048,
            hop_length: 512,
            n_mels: 128,
            fmin: 0.0,
            fmax: None,
            top_db: 80.0,
            amin: 1e-10,
        }
    }
}

/// Time-averaged MFCCs of one clip
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FeatureVector([f32; N_MFCC]);

impl FeatureVector {
    pub fn new(values: [f32; N_MFCC]) -> Self {
        Self(values)
    }

    pub fn zeros() -> Self {
        Self([0.0; N_MFCC])
    }

    pub fn as_array(&self) -> &[f32; N_MFCC] {
        &self.0
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|v| v.is_finite())
    }
}

impl TryFrom<&[f32]> for FeatureVector {
    type Error = EmotionError;

    fn try_from(values: &[f32]) -> Result<Self> {
        let array: [f32; N_MFCC] = values.try_into().map_err(|_| EmotionError::ShapeError {
            expected: N_MFCC,
            actual: values.len(),
        })?;
        Ok(Self(array))
    }
}

/// MFCC extractor with pre-computed filterbank, DCT basis and FFT plan
pub struct MfccExtractor {
    config: MfccConfig,
    fft: Arc<dyn RealToComplex<f32>>,
    window: Vec<f32>,
    mel_filterbank: Array2<f32>,
    dct_basis: Array2<f32>,
}

impl MfccExtractor {
    pub fn new(config: MfccConfig) -> Self {
        // Periodic Hann window
        let window: Vec<f32> = (0..config.n_fft)
            .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f32 / config.n_fft as f32).cos())
            .collect();

        let nyquist = config.sample_rate as f32 / 2.0;
        let mel_filterbank = mel_filterbank(
            config.n_mels,
            config.n_fft,
            config.sample_rate as f64,
            config.fmin as f64,
            config.fmax.unwrap_or(nyquist) as f64,
        );

        let dct_basis = dct_ortho_basis(N_MFCC, config.n_mels);

        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(config.n_fft);

        Self {
            config,
            fft,
            window,
            mel_filterbank,
            dct_basis,
        }
    }

    pub fn config(&self) -> &MfccConfig {
        &self.config
    }

    /// Decode WAV bytes and extract their feature vector
    pub fn extract(&self, audio_bytes: &[u8]) -> Result<FeatureVector> {
        let clip = decode_wav(audio_bytes)?;
        debug!(
            "Decoded clip: {} samples at {} Hz ({:.2}s)",
            clip.len(),
            clip.sample_rate,
            clip.duration_secs()
        );

        let samples = resample(&clip.samples, clip.sample_rate, self.config.sample_rate)?;
        self.extract_samples(&samples)
    }

    /// Extract the feature vector of samples already at `config.sample_rate`
    pub fn extract_samples(&self, samples: &[f32]) -> Result<FeatureVector> {
        let mfccs = self.mfcc_matrix(samples)?;

        let means = mfccs
            .mean_axis(Axis(1))
            .ok_or_else(|| EmotionError::DecodeError("no analysis frames".to_string()))?;

        let features = FeatureVector::try_from(
            means
                .as_slice()
                .ok_or_else(|| EmotionError::DecodeError("non-contiguous features".to_string()))?,
        )?;

        if !features.is_finite() {
            return Err(EmotionError::DecodeError(
                "audio produced non-finite features".to_string(),
            ));
        }

        Ok(features)
    }

    /// Compute the MFCC matrix with shape `(N_MFCC, frames)`
    pub fn mfcc_matrix(&self, samples: &[f32]) -> Result<Array2<f32>> {
        if samples.is_empty() {
            return Err(EmotionError::DecodeError("audio contains no samples".to_string()));
        }
        if samples.iter().any(|s| !s.is_finite()) {
            return Err(EmotionError::DecodeError(
                "audio contains non-finite samples".to_string(),
            ));
        }
        if samples.len() < self.config.n_fft {
            warn!(
                "Clip is shorter than one analysis window: {} samples (window: {})",
                samples.len(),
                self.config.n_fft
            );
        }

        let power = self.power_spectrogram(samples)?;
        let mel = self.mel_filterbank.dot(&power);
        let log_mel = self.power_to_db(mel);
        Ok(self.dct_basis.dot(&log_mel))
    }

    /// Centered, zero-padded STFT power with shape `(n_fft / 2 + 1, frames)`
    fn power_spectrogram(&self, samples: &[f32]) -> Result<Array2<f32>> {
        let n_fft = self.config.n_fft;
        let hop = self.config.hop_length;
        let pad = n_fft / 2;

        let mut padded = vec![0.0f32; samples.len() + 2 * pad];
        padded[pad..pad + samples.len()].copy_from_slice(samples);

        let n_frames = 1 + (padded.len() - n_fft) / hop;
        let n_bins = n_fft / 2 + 1;
        let mut power = Array2::<f32>::zeros((n_bins, n_frames));

        let mut fft_input = self.fft.make_input_vec();
        let mut fft_output = self.fft.make_output_vec();

        for frame_idx in 0..n_frames {
            let start = frame_idx * hop;
            for ((dst, &sample), &w) in fft_input
                .iter_mut()
                .zip(&padded[start..start + n_fft])
                .zip(&self.window)
            {
                *dst = sample * w;
            }

            self.fft
                .process(&mut fft_input, &mut fft_output)
                .map_err(|e| EmotionError::DecodeError(format!("FFT failed: {}", e)))?;

            for (bin, c) in fft_output.iter().enumerate() {
                power[[bin, frame_idx]] = c.re * c.re + c.im * c.im;
            }
        }

        debug!("STFT: {} frames x {} bins", n_frames, n_bins);
        Ok(power)
    }

    /// Convert mel power to decibels, clipped to `top_db` below the peak
    fn power_to_db(&self, mel: Array2<f32>) -> Array2<f32> {
        let amin = self.config.amin;
        let mut db = mel.mapv_into(|p| 10.0 * p.max(amin).log10());
        let peak = db.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let floor = peak - self.config.top_db;
        db.mapv_inplace(|v| v.max(floor));
        db
    }
}

impl Default for MfccExtractor {
    fn default() -> Self {
        Self::new(MfccConfig::default())
    }
}

/// Orthonormal DCT-II basis with shape `(n_coeffs, n_inputs)`
fn dct_ortho_basis(n_coeffs: usize, n_inputs: usize) -> Array2<f32> {
    let n = n_inputs as f64;
    Array2::from_shape_fn((n_coeffs, n_inputs), |(k, i)| {
        let scale = if k == 0 { (1.0 / n).sqrt() } else { (2.0 / n).sqrt() };
        let angle = std::f64::consts::PI * k as f64 * (2.0 * i as f64 + 1.0) / (2.0 * n);
        (scale * angle.cos()) as f32
    })
}

/// Decode WAV bytes and extract their feature vector with the default front end
pub fn extract(audio_bytes: &[u8]) -> Result<FeatureVector> {
    MfccExtractor::default().extract(audio_bytes)
}
