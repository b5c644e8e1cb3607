//! Live microphone recording.
//!
//! Captures mono samples from an input device into a lock-free ring buffer
//! and hands back a complete [`AudioClip`] once recording stops.

#[cfg(not(feature = "record"))]
use anyhow::Result;
#[cfg(not(feature = "record"))]
use std::sync::{atomic::AtomicBool, Arc};
use std::time::Duration;

use super::decoder::AudioClip;

/// Audio device information
#[derive(Debug, Clone)]
pub struct AudioDevice {
    pub id: String,
    pub name: String,
    pub is_default: bool,
}

/// Calculate ring buffer capacity for a recording of `max_duration`
pub fn calculate_ring_buffer_capacity(device_sample_rate: u32, max_duration: Duration) -> usize {
    // One extra second so the final callbacks never overflow
    let seconds = max_duration.as_secs_f64() + 1.0;
    (device_sample_rate as f64 * seconds).ceil() as usize
}

/// Average one interleaved frame down to a mono sample
#[cfg_attr(not(feature = "record"), allow(dead_code))]
fn frame_to_mono<T: Copy>(frame: &[T], convert: impl Fn(T) -> f32) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    frame.iter().map(|&s| convert(s)).sum::<f32>() / frame.len() as f32
}

#[cfg(feature = "record")]
mod imp {
    use anyhow::{Context, Result};
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use cpal::{Device, SampleFormat, Stream, StreamConfig};
    use ringbuf::traits::{Consumer as ConsumerTrait, Observer, Producer as ProducerTrait, Split};
    use ringbuf::{HeapProd, HeapRb};
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};
    use tracing::{debug, error, info, warn};

    use super::{calculate_ring_buffer_capacity, frame_to_mono, AudioClip, AudioDevice};

    /// List available input devices
    pub fn list_input_devices() -> Result<Vec<AudioDevice>> {
        let host = cpal::default_host();
        let default_name = host
            .default_input_device()
            .and_then(|d| d.name().ok())
            .unwrap_or_default();

        let mut devices = Vec::new();
        for device in host.input_devices().context("Failed to enumerate input devices")? {
            if let Ok(name) = device.name() {
                devices.push(AudioDevice {
                    id: name.clone(),
                    is_default: name == default_name,
                    name,
                });
            }
        }

        Ok(devices)
    }

    /// Get device by ID (name) or return default
    pub fn get_device(device_id: Option<&str>) -> Result<Device> {
        let host = cpal::default_host();

        match device_id {
            Some(id) if id != "default" => {
                for device in host.input_devices().context("Failed to enumerate devices")? {
                    if let Ok(name) = device.name() {
                        if name == id {
                            return Ok(device);
                        }
                    }
                }
                anyhow::bail!("Device not found: {}", id);
            }
            _ => host
                .default_input_device()
                .context("No default input device available"),
        }
    }

    /// Selected audio configuration with both stream config and sample format
    pub struct SelectedConfig {
        pub config: StreamConfig,
        pub sample_format: SampleFormat,
    }

    /// Prefer a mono config, otherwise the device default (downmixed in the callback)
    pub fn select_input_config(device: &Device) -> Result<SelectedConfig> {
        if let Ok(supported) = device.supported_input_configs() {
            for config_range in supported {
                if config_range.channels() == 1 {
                    let supported_config = config_range.with_max_sample_rate();
                    debug!(
                        "Selected mono config: {} Hz, format {:?}",
                        supported_config.sample_rate().0,
                        supported_config.sample_format()
                    );
                    return Ok(SelectedConfig {
                        config: supported_config.clone().into(),
                        sample_format: supported_config.sample_format(),
                    });
                }
            }
        }

        let supported_config = device
            .default_input_config()
            .context("No default input config")?;
        debug!(
            "Using default config (will downmix): {} Hz, {} channels, format {:?}",
            supported_config.sample_rate().0,
            supported_config.channels(),
            supported_config.sample_format()
        );
        Ok(SelectedConfig {
            config: supported_config.clone().into(),
            sample_format: supported_config.sample_format(),
        })
    }

    /// Audio capture handle
    pub struct AudioCapture {
        stream: Stream,
        overflow_counter: Arc<AtomicU64>,
        is_running: Arc<AtomicBool>,
    }

    impl AudioCapture {
        /// Build an input stream that writes mono samples to the given producer
        pub fn new(
            device: &Device,
            config: &StreamConfig,
            sample_format: SampleFormat,
            mut producer: HeapProd<f32>,
        ) -> Result<Self> {
            let channels = config.channels as usize;
            let sample_rate = config.sample_rate.0;
            let overflow_counter = Arc::new(AtomicU64::new(0));
            let overflow_clone = overflow_counter.clone();
            let is_running = Arc::new(AtomicBool::new(false));
            let running = is_running.clone();

            info!(
                "Building input stream: {} Hz, {} channels, format {:?}",
                sample_rate, channels, sample_format
            );

            let error_callback = |err| {
                error!("Audio stream error: {}", err);
            };

            let stream = match sample_format {
                SampleFormat::F32 => device.build_input_stream(
                    config,
                    move |data: &[f32], _| {
                        if running.load(Ordering::Relaxed) {
                            push_frames(data, channels, &mut producer, &overflow_clone, |s| s);
                        }
                    },
                    error_callback,
                    None,
                ),
                SampleFormat::I16 => device.build_input_stream(
                    config,
                    move |data: &[i16], _| {
                        if running.load(Ordering::Relaxed) {
                            push_frames(data, channels, &mut producer, &overflow_clone, |s| {
                                s as f32 / 32768.0
                            });
                        }
                    },
                    error_callback,
                    None,
                ),
                SampleFormat::U8 => device.build_input_stream(
                    config,
                    move |data: &[u8], _| {
                        if running.load(Ordering::Relaxed) {
                            // u8 is unsigned: 0-255, with 128 as center
                            push_frames(data, channels, &mut producer, &overflow_clone, |s| {
                                (s as f32 - 128.0) / 128.0
                            });
                        }
                    },
                    error_callback,
                    None,
                ),
                _ => anyhow::bail!("Unsupported sample format: {:?}", sample_format),
            }
            .context("Failed to build input stream")?;

            Ok(Self {
                stream,
                overflow_counter,
                is_running,
            })
        }

        pub fn start(&self) -> Result<()> {
            self.is_running.store(true, Ordering::SeqCst);
            self.stream.play().context("Failed to start audio stream")?;
            info!("Audio capture started");
            Ok(())
        }

        pub fn stop(&self) -> Result<()> {
            self.is_running.store(false, Ordering::SeqCst);
            self.stream.pause().context("Failed to stop audio stream")?;
            info!("Audio capture stopped");
            Ok(())
        }

        pub fn overflow_count(&self) -> u64 {
            self.overflow_counter.load(Ordering::Relaxed)
        }
    }

    /// Downmix each frame and push it to the ring buffer
    fn push_frames<T: Copy>(
        data: &[T],
        channels: usize,
        producer: &mut HeapProd<f32>,
        overflow_counter: &AtomicU64,
        convert: impl Fn(T) -> f32,
    ) {
        for frame in data.chunks(channels.max(1)) {
            if producer.try_push(frame_to_mono(frame, &convert)).is_err() {
                overflow_counter.fetch_add(1, Ordering::Relaxed);
                break;
            }
        }
    }

    /// Record from `device_id` until `max_duration` elapses or `stop_flag` is set
    pub fn record_clip(
        device_id: Option<&str>,
        max_duration: Duration,
        stop_flag: Arc<AtomicBool>,
    ) -> Result<AudioClip> {
        let device = get_device(device_id)?;
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        info!("Using audio device: {}", device_name);

        let selected = select_input_config(&device)?;
        let sample_rate = selected.config.sample_rate.0;

        let capacity = calculate_ring_buffer_capacity(sample_rate, max_duration);
        let (producer, mut consumer) = HeapRb::<f32>::new(capacity).split();
        debug!("Ring buffer capacity: {} samples", capacity);

        let capture = AudioCapture::new(&device, &selected.config, selected.sample_format, producer)?;

        let started = Instant::now();
        capture.start()?;
        while started.elapsed() < max_duration && !stop_flag.load(Ordering::Relaxed) {
            std::thread::sleep(Duration::from_millis(20));
        }
        capture.stop()?;

        if capture.overflow_count() > 0 {
            warn!("Audio overflows detected: {}", capture.overflow_count());
        }

        let mut samples = vec![0.0f32; consumer.occupied_len()];
        let read = consumer.pop_slice(&mut samples);
        samples.truncate(read);

        info!(
            "Recorded {:.1}s of audio at {} Hz",
            samples.len() as f32 / sample_rate as f32,
            sample_rate
        );

        Ok(AudioClip::new(samples, sample_rate))
    }
}

#[cfg(feature = "record")]
pub use imp::{get_device, list_input_devices, record_clip, select_input_config, AudioCapture};

// Stub implementation when feature is not enabled
#[cfg(not(feature = "record"))]
pub fn list_input_devices() -> Result<Vec<AudioDevice>> {
    Err(crate::error::EmotionError::FeatureNotEnabled("record").into())
}

#[cfg(not(feature = "record"))]
pub fn record_clip(
    _device_id: Option<&str>,
    _max_duration: Duration,
    _stop_flag: Arc<AtomicBool>,
) -> Result<AudioClip> {
    Err(crate::error::EmotionError::FeatureNotEnabled("record").into())
}
