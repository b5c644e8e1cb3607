//! Slaney-style mel scale and filterbank.
//!
//! Matches the defaults of the reference MFCC front end the classifier was
//! trained with: linear below 1 kHz, logarithmic above, and triangular
//! filters normalized to constant area.

use ndarray::Array2;

const F_SP: f64 = 200.0 / 3.0;
const MIN_LOG_HZ: f64 = 1000.0;
const MIN_LOG_MEL: f64 = MIN_LOG_HZ / F_SP;

fn log_step() -> f64 {
    6.4f64.ln() / 27.0
}

/// Convert frequency to mel scale
pub fn hz_to_mel(hz: f64) -> f64 {
    if hz >= MIN_LOG_HZ {
        MIN_LOG_MEL + (hz / MIN_LOG_HZ).ln() / log_step()
    } else {
        hz / F_SP
    }
}

/// Convert mel scale to frequency
pub fn mel_to_hz(mel: f64) -> f64 {
    if mel >= MIN_LOG_MEL {
        MIN_LOG_HZ * (log_step() * (mel - MIN_LOG_MEL)).exp()
    } else {
        F_SP * mel
    }
}

/// Create a mel filterbank matrix of shape `(n_mels, n_fft / 2 + 1)`
///
/// # Arguments
/// * `n_mels` - Number of mel bands
/// * `n_fft` - FFT size the filterbank is applied to
/// * `sample_rate` - Audio sample rate in Hz
/// * `fmin` - Lowest filter edge in Hz
/// * `fmax` - Highest filter edge in Hz
pub fn mel_filterbank(
    n_mels: usize,
    n_fft: usize,
    sample_rate: f64,
    fmin: f64,
    fmax: f64,
) -> Array2<f32> {
    let n_bins = n_fft / 2 + 1;

    let fft_freqs: Vec<f64> = (0..n_bins)
        .map(|i| i as f64 * sample_rate / n_fft as f64)
        .collect();

    // n_mels + 2 edges equally spaced on the mel scale
    let mel_min = hz_to_mel(fmin);
    let mel_max = hz_to_mel(fmax);
    let edges: Vec<f64> = (0..n_mels + 2)
        .map(|i| mel_to_hz(mel_min + (mel_max - mel_min) * i as f64 / (n_mels + 1) as f64))
        .collect();

    let mut filterbank = Array2::<f32>::zeros((n_mels, n_bins));

    for m in 0..n_mels {
        let (left, center, right) = (edges[m], edges[m + 1], edges[m + 2]);
        let norm = 2.0 / (right - left);

        for (bin, &freq) in fft_freqs.iter().enumerate() {
            let rising = (freq - left) / (center - left);
            let falling = (right - freq) / (right - center);
            let weight = rising.min(falling).max(0.0);
            filterbank[[m, bin]] = (weight * norm) as f32;
        }
    }

    filterbank
}
