pub mod capture;
pub mod decoder;
pub mod resampler;

pub use capture::{calculate_ring_buffer_capacity, list_input_devices, record_clip, AudioDevice};
pub use decoder::{decode_wav, encode_wav, AudioClip};
pub use resampler::{resample, AudioResampler, TARGET_SAMPLE_RATE};
