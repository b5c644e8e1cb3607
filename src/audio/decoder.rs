use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::io::Cursor;
use tracing::debug;

use crate::error::{EmotionError, Result};

/// Decoded mono audio, owned by the caller for the duration of one prediction
#[derive(Debug, Clone, PartialEq)]
pub struct AudioClip {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioClip {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_secs(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

/// Decode WAV bytes into a mono clip.
///
/// Integer PCM of any bit depth up to 32 and 32-bit float are accepted.
/// Integer samples are scaled into [-1, 1] by their bit depth and
/// multi-channel frames are averaged down to one channel.
pub fn decode_wav(bytes: &[u8]) -> Result<AudioClip> {
    if bytes.is_empty() {
        return Err(EmotionError::DecodeError("input is empty".to_string()));
    }

    let reader = WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();

    if spec.channels == 0 {
        return Err(EmotionError::DecodeError("WAV header declares zero channels".to_string()));
    }
    if spec.sample_rate == 0 {
        return Err(EmotionError::DecodeError("WAV header declares a zero sample rate".to_string()));
    }

    debug!(
        "Decoding WAV: {} Hz, {} channels, {} bits, {:?}",
        spec.sample_rate, spec.channels, spec.bits_per_sample, spec.sample_format
    );

    let interleaved = read_interleaved(reader, spec)?;
    let samples = downmix(&interleaved, spec.channels as usize);

    if samples.is_empty() {
        return Err(EmotionError::DecodeError("audio contains no samples".to_string()));
    }

    Ok(AudioClip::new(samples, spec.sample_rate))
}

fn read_interleaved(mut reader: WavReader<Cursor<&[u8]>>, spec: WavSpec) -> Result<Vec<f32>> {
    match spec.sample_format {
        SampleFormat::Float => {
            if spec.bits_per_sample != 32 {
                return Err(EmotionError::DecodeError(format!(
                    "unsupported float bit depth: {}",
                    spec.bits_per_sample
                )));
            }
            reader
                .samples::<f32>()
                .map(|s| s.map_err(EmotionError::from))
                .collect()
        }
        SampleFormat::Int => {
            if spec.bits_per_sample == 0 || spec.bits_per_sample > 32 {
                return Err(EmotionError::DecodeError(format!(
                    "unsupported integer bit depth: {}",
                    spec.bits_per_sample
                )));
            }
            let scale = (1u64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale).map_err(EmotionError::from))
                .collect()
        }
    }
}

/// Average interleaved frames down to mono
fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels == 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Encode mono samples as a 16-bit PCM WAV file held in memory
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec)?;
        for &sample in samples {
            let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16;
            writer.write_sample(value)?;
        }
        writer.finalize()?;
    }

    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav_bytes<T: hound::Sample + Copy>(spec: WavSpec, samples: &[T]) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
            for &s in samples {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_decode_i16_mono() {
        let spec = WavSpec {
            channels: 1,
            sample_rate: 16000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let bytes = wav_bytes(spec, &[0i16, 16384, -16384, i16::MIN]);
        let clip = decode_wav(&bytes).unwrap();

        assert_eq!(clip.sample_rate, 16000);
        assert_eq!(clip.samples, vec![0.0, 0.5, -0.5, -1.0]);
    }

    #[test]
    fn test_decode_stereo_is_averaged() {
        let spec = WavSpec {
            channels: 2,
            sample_rate: 44100,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let bytes = wav_bytes(spec, &[1.0f32, 0.0, -0.5, -0.5, 0.25, 0.75]);
        let clip = decode_wav(&bytes).unwrap();

        assert_eq!(clip.samples, vec![0.5, -0.5, 0.5]);
        assert_eq!(clip.sample_rate, 44100);
    }

    #[test]
    fn test_decode_24_bit() {
        let spec = WavSpec {
            channels: 1,
            sample_rate: 22050,
            bits_per_sample: 24,
            sample_format: SampleFormat::Int,
        };
        let bytes = wav_bytes(spec, &[4_194_304i32, -8_388_608]);
        let clip = decode_wav(&bytes).unwrap();

        assert_eq!(clip.samples, vec![0.5, -1.0]);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let result = decode_wav(b"definitely not a wav file");
        assert!(matches!(result, Err(EmotionError::DecodeError(_))));
    }

    #[test]
    fn test_decode_rejects_empty_input() {
        let result = decode_wav(&[]);
        assert!(matches!(result, Err(EmotionError::DecodeError(_))));
    }

    #[test]
    fn test_decode_rejects_zero_length_waveform() {
        let spec = WavSpec {
            channels: 1,
            sample_rate: 22050,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let bytes = wav_bytes::<i16>(spec, &[]);
        let result = decode_wav(&bytes);
        assert!(matches!(result, Err(EmotionError::DecodeError(_))));
    }

    #[test]
    fn test_encode_then_decode_preserves_rate_and_length() {
        let samples: Vec<f32> = (0..800).map(|i| (i as f32 / 100.0).sin() * 0.5).collect();
        let bytes = encode_wav(&samples, 8000).unwrap();
        let clip = decode_wav(&bytes).unwrap();

        assert_eq!(clip.sample_rate, 8000);
        assert_eq!(clip.len(), samples.len());
        for (a, b) in clip.samples.iter().zip(samples.iter()) {
            assert!((a - b).abs() < 1e-3);
        }
    }

    #[test]
    fn test_encode_clamps_out_of_range() {
        let bytes = encode_wav(&[2.0, -2.0], 8000).unwrap();
        let clip = decode_wav(&bytes).unwrap();
        assert!((clip.samples[0] - 1.0).abs() < 1e-3);
        assert!((clip.samples[1] + 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_clip_duration() {
        let clip = AudioClip::new(vec![0.0; 44100], 22050);
        assert!((clip.duration_secs() - 2.0).abs() < 1e-6);
        assert!(!clip.is_empty());
    }
}
