use rubato::{FftFixedIn, Resampler};
use tracing::debug;

use crate::error::{EmotionError, Result};

/// Sample rate the MFCC front end and the classifier were built for
pub const TARGET_SAMPLE_RATE: u32 = 22050;

/// Whole-clip resampler from a source rate to a fixed target rate
pub struct AudioResampler {
    resampler: FftFixedIn<f32>,
    input_buffer: Vec<Vec<f32>>,
    output_buffer: Vec<Vec<f32>>,
    input_frames: usize,
    source_rate: u32,
    target_rate: u32,
}

impl AudioResampler {
    /// Create a new resampler from `source_rate` to `target_rate`
    pub fn new(source_rate: u32, target_rate: u32) -> Result<Self> {
        if source_rate == 0 || target_rate == 0 {
            return Err(EmotionError::DecodeError(format!(
                "cannot resample {} Hz -> {} Hz",
                source_rate, target_rate
            )));
        }

        let ratio = target_rate as f64 / source_rate as f64;
        debug!(
            "Creating resampler: {} Hz -> {} Hz (ratio: {:.4})",
            source_rate, target_rate, ratio
        );

        let input_frames = 1024;
        let channels = 1;

        let resampler = FftFixedIn::new(
            source_rate as usize,
            target_rate as usize,
            input_frames,
            2, // sub_chunks for quality
            channels,
        )
        .map_err(|e| EmotionError::DecodeError(format!("Failed to create resampler: {}", e)))?;

        let input_buffer = vec![vec![0.0f32; input_frames]; channels];
        let output_buffer = resampler.output_buffer_allocate(true);

        Ok(Self {
            resampler,
            input_buffer,
            output_buffer,
            input_frames,
            source_rate,
            target_rate,
        })
    }

    /// Number of output samples a clip of `input_len` samples maps to
    pub fn expected_output_len(&self, input_len: usize) -> usize {
        (input_len as u64 * self.target_rate as u64).div_ceil(self.source_rate as u64) as usize
    }

    /// Resample a complete clip.
    ///
    /// The tail is zero-padded to whole chunks and the resampler's delay is
    /// trimmed, so the output is aligned with the input and exactly
    /// `expected_output_len(samples.len())` long.
    pub fn process_clip(&mut self, samples: &[f32]) -> Result<Vec<f32>> {
        self.resampler.reset();

        let expected = self.expected_output_len(samples.len());
        let delay = self.resampler.output_delay();
        let mut output = Vec::with_capacity(expected + delay + self.output_buffer[0].len());
        let mut position = 0;

        // Calls return no output until a whole FFT block has been buffered,
        // which can span many input chunks when the rates share a small gcd
        let max_input = samples.len()
            + self.input_span(delay + self.resampler.output_frames_max())
            + 2 * self.input_frames;

        while output.len() < expected + delay {
            if position > max_input {
                return Err(EmotionError::DecodeError(format!(
                    "Resampler produced {} of {} samples after {} input frames",
                    output.len().saturating_sub(delay),
                    expected,
                    position
                )));
            }

            let input = &mut self.input_buffer[0];
            input.fill(0.0);
            if position < samples.len() {
                let end = (position + self.input_frames).min(samples.len());
                input[..end - position].copy_from_slice(&samples[position..end]);
            }
            position += self.input_frames;

            let (_, output_frames) = self
                .resampler
                .process_into_buffer(&self.input_buffer, &mut self.output_buffer, None)
                .map_err(|e| EmotionError::DecodeError(format!("Resampling failed: {}", e)))?;

            output.extend_from_slice(&self.output_buffer[0][..output_frames]);
        }

        output.drain(..delay);
        output.truncate(expected);
        Ok(output)
    }

    /// Input frames corresponding to `output_frames` at the target rate
    fn input_span(&self, output_frames: usize) -> usize {
        (output_frames as u64 * self.source_rate as u64).div_ceil(self.target_rate as u64) as usize
    }

    pub fn source_rate(&self) -> u32 {
        self.source_rate
    }

    pub fn target_rate(&self) -> u32 {
        self.target_rate
    }
}

/// Resample `samples` to `target_rate`, returning them unchanged when the rates match
pub fn resample(samples: &[f32], source_rate: u32, target_rate: u32) -> Result<Vec<f32>> {
    if source_rate == target_rate {
        return Ok(samples.to_vec());
    }
    AudioResampler::new(source_rate, target_rate)?.process_clip(samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    #[test]
    fn test_resampler_44100_to_22050_length() {
        let mut resampler = AudioResampler::new(44100, TARGET_SAMPLE_RATE).unwrap();
        let input = vec![0.0f32; 44100];
        let output = resampler.process_clip(&input).unwrap();
        assert_eq!(output.len(), 22050);
    }

    #[test]
    fn test_resampler_odd_length_rounds_up() {
        let mut resampler = AudioResampler::new(48000, TARGET_SAMPLE_RATE).unwrap();
        // 1001 * 22050 / 48000 = 459.84...
        assert_eq!(resampler.expected_output_len(1001), 460);
        let output = resampler.process_clip(&vec![0.1f32; 1001]).unwrap();
        assert_eq!(output.len(), 460);
    }

    #[test]
    fn test_resampler_16k_upsamples() {
        let input = vec![0.0f32; 16000];
        let output = resample(&input, 16000, TARGET_SAMPLE_RATE).unwrap();
        assert_eq!(output.len(), 22050);
    }

    #[test]
    fn test_resample_same_rate_is_identity() {
        let input: Vec<f32> = (0..100).map(|i| i as f32 / 100.0).collect();
        let output = resample(&input, 22050, 22050).unwrap();
        assert_eq!(output, input);
    }

    #[test]
    fn test_resampler_preserves_low_tone_amplitude() {
        // 440 Hz is far below both Nyquist limits, so the level should survive
        let input: Vec<f32> = (0..44100)
            .map(|i| (2.0 * PI * 440.0 * i as f32 / 44100.0).sin() * 0.5)
            .collect();
        let output = resample(&input, 44100, TARGET_SAMPLE_RATE).unwrap();

        // Ignore the edges where zero padding bleeds in
        let middle = &output[2000..20000];
        let peak = middle.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!((peak - 0.5).abs() < 0.05, "peak was {}", peak);
    }

    #[test]
    fn test_resampler_is_deterministic() {
        let input: Vec<f32> = (0..5000).map(|i| ((i * 7919) % 200) as f32 / 100.0 - 1.0).collect();
        let a = resample(&input, 32000, TARGET_SAMPLE_RATE).unwrap();
        let b = resample(&input, 32000, TARGET_SAMPLE_RATE).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_resampler_rates_with_large_fft_blocks() {
        // These rates share a small gcd with 22050, so rubato buffers
        // several input chunks before emitting anything
        for rate in [192000u32, 44101, 22051, 7999] {
            let input = vec![0.1f32; rate as usize / 2 + 1];
            let output = resample(&input, rate, TARGET_SAMPLE_RATE)
                .unwrap_or_else(|e| panic!("{} Hz failed: {}", rate, e));
            let expected = (input.len() as u64 * 22050).div_ceil(rate as u64) as usize;
            assert_eq!(output.len(), expected, "length mismatch at {} Hz", rate);
            assert!(output.iter().all(|s| s.is_finite()));
        }
    }

    #[test]
    fn test_resampler_short_clip_at_192k() {
        let mut resampler = AudioResampler::new(192000, TARGET_SAMPLE_RATE).unwrap();
        // 300 * 22050 / 192000 = 34.45...
        let output = resampler.process_clip(&vec![0.2f32; 300]).unwrap();
        assert_eq!(output.len(), 35);
    }

    #[test]
    fn test_resampler_rejects_zero_rate() {
        assert!(matches!(
            AudioResampler::new(0, TARGET_SAMPLE_RATE),
            Err(EmotionError::DecodeError(_))
        ));
    }
}
