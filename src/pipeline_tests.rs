// Integration tests for the audio-to-label pipeline
// These tests use synthetic audio and a small known-weights model on disk

#[cfg(test)]
mod tests {
    use crate::audio::encode_wav;
    use crate::classifier::{Activation, DenseLayerSpec, DenseModelFile, EmotionClassifier};
    use crate::error::EmotionError;
    use crate::features::{extract, FeatureVector, N_MFCC};
    use crate::{EmotionLabel, EmotionPipeline};
    use hound::{SampleFormat, WavSpec, WavWriter};
    use std::io::Cursor;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    // Model that tracks overall loudness through c0:
    // loud clips score highest on happy (index 2), near-silent ones on sad
    fn loudness_model() -> DenseModelFile {
        let mut weights = vec![vec![0.0f32; 5]; N_MFCC];
        weights[0][2] = 0.01;
        weights[0][4] = -0.01;
        DenseModelFile::new(vec![DenseLayerSpec {
            weights,
            bias: vec![0.0, 0.0, 8.0, 0.0, -8.0],
            activation: Activation::Softmax,
        }])
    }

    fn write_model(dir: &Path) -> PathBuf {
        let path = dir.join("emotion_classifier.json");
        let json = serde_json::to_string_pretty(&loudness_model()).unwrap();
        std::fs::write(&path, json).unwrap();
        path
    }

    fn load_pipeline(dir: &Path) -> EmotionPipeline {
        let classifier = EmotionClassifier::load(&write_model(dir), 1).unwrap();
        EmotionPipeline::new(classifier)
    }

    // Generate a speech-like signal (sine waves)
    fn generate_speech_signal(samples: usize, sample_rate: u32) -> Vec<f32> {
        (0..samples)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                let f1 = (2.0 * std::f32::consts::PI * 200.0 * t).sin() * 0.4;
                let f2 = (2.0 * std::f32::consts::PI * 400.0 * t).sin() * 0.3;
                let f3 = (2.0 * std::f32::consts::PI * 800.0 * t).sin() * 0.2;
                f1 + f2 + f3
            })
            .collect()
    }

    // Interleaved 16-bit stereo WAV, the usual shape of a browser recording
    fn stereo_wav(left: &[f32], right: &[f32], sample_rate: u32) -> Vec<u8> {
        let spec = WavSpec {
            channels: 2,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
            for (&l, &r) in left.iter().zip(right) {
                writer.write_sample((l * 32767.0) as i16).unwrap();
                writer.write_sample((r * 32767.0) as i16).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_two_second_clip_predicts_happy() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = load_pipeline(dir.path());

        let signal = generate_speech_signal(2 * 44100, 44100);
        let bytes = stereo_wav(&signal, &signal, 44100);

        let features = extract(&bytes).unwrap();
        assert_eq!(features.as_slice().len(), N_MFCC);
        assert!(features.is_finite());

        let prediction = pipeline.predict(&bytes).unwrap();
        assert_eq!(prediction.label, EmotionLabel::Happy);
        assert_eq!(
            crate::classifier::argmax(&prediction.scores),
            EmotionLabel::Happy.index()
        );
        assert_eq!(pipeline.classify(&features).unwrap(), EmotionLabel::Happy);
    }

    #[test]
    fn test_silent_clip_predicts_sad() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = load_pipeline(dir.path());

        let bytes = encode_wav(&vec![0.0; 22050], 22050).unwrap();
        assert_eq!(pipeline.predict_label(&bytes).unwrap(), EmotionLabel::Sad);
    }

    #[test]
    fn test_zero_vector_is_reproducible() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = load_pipeline(dir.path());

        let first = pipeline.classify(&FeatureVector::zeros()).unwrap();
        for _ in 0..10 {
            assert_eq!(pipeline.classify(&FeatureVector::zeros()).unwrap(), first);
        }
        // bias alone favours happy
        assert_eq!(first, EmotionLabel::Happy);

        // A freshly loaded copy of the same model agrees
        let reloaded = load_pipeline(dir.path());
        assert_eq!(reloaded.classify(&FeatureVector::zeros()).unwrap(), first);
    }

    #[test]
    fn test_same_file_twice_same_label() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = load_pipeline(dir.path());

        let clip_path = dir.path().join("clip.wav");
        let signal = generate_speech_signal(16000, 16000);
        std::fs::write(&clip_path, encode_wav(&signal, 16000).unwrap()).unwrap();

        let first = pipeline.predict(&std::fs::read(&clip_path).unwrap()).unwrap();
        let second = pipeline.predict(&std::fs::read(&clip_path).unwrap()).unwrap();
        assert_eq!(first.label, second.label);
        assert_eq!(first.scores, second.scores);
    }

    #[test]
    fn test_bad_input_does_not_poison_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = load_pipeline(dir.path());

        assert!(matches!(
            pipeline.predict(b"\x00\x01\x02 not a wav"),
            Err(EmotionError::DecodeError(_))
        ));
        assert!(matches!(
            pipeline.predict(&encode_wav(&[], 22050).unwrap()),
            Err(EmotionError::DecodeError(_))
        ));

        let bytes = encode_wav(&generate_speech_signal(22050, 22050), 22050).unwrap();
        assert_eq!(pipeline.predict_label(&bytes).unwrap(), EmotionLabel::Happy);
    }

    #[test]
    fn test_pipeline_shared_across_threads() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Arc::new(load_pipeline(dir.path()));
        let bytes = Arc::new(encode_wav(&generate_speech_signal(22050, 22050), 22050).unwrap());

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let pipeline = pipeline.clone();
                let bytes = bytes.clone();
                std::thread::spawn(move || pipeline.predict(&bytes).unwrap())
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(results.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(results[0].label, EmotionLabel::Happy);
    }

    #[test]
    fn test_model_with_wrong_label_order_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut model = loudness_model();
        model.labels = vec!["sad", "neutral", "happy", "fear", "angry"]
            .into_iter()
            .map(String::from)
            .collect();
        let path = dir.path().join("reordered.json");
        std::fs::write(&path, serde_json::to_string(&model).unwrap()).unwrap();

        let err = EmotionClassifier::load(&path, 1).err().unwrap();
        assert!(matches!(err, EmotionError::ModelLoadError(_)));
        assert!(!err.is_per_request());
    }
}
