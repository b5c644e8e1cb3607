use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use tamil_emotion::audio::{encode_wav, list_input_devices, record_clip};
use tamil_emotion::config::{Config, OutputFormat};
use tamil_emotion::{EmotionClassifier, EmotionPipeline, Prediction};

/// Predict the emotion (angry, fear, happy, neutral, sad) of spoken-Tamil audio
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// WAV files to classify
    #[arg(required_unless_present_any = ["record", "list_devices"])]
    files: Vec<PathBuf>,

    /// Path to the classifier model (.json or .onnx)
    #[arg(short, long)]
    model: Option<PathBuf>,

    /// Path to the config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output format: "text" or "json"
    #[arg(short, long)]
    format: Option<String>,

    /// Record a clip from the microphone and classify it
    #[arg(short, long)]
    record: bool,

    /// Maximum recording length in seconds
    #[arg(long)]
    duration: Option<u32>,

    /// Input device ID for recording (use "default" or run with --list-devices)
    #[arg(short, long)]
    device: Option<String>,

    /// List available input devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Number of threads for ONNX inference
    #[arg(long)]
    threads: Option<usize>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Serialize)]
struct PredictionReport<'a> {
    source: &'a str,
    #[serde(flatten)]
    prediction: Prediction,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    if args.list_devices {
        return list_devices_and_exit();
    }

    let config = resolve_config(&args)?;
    let model_path = config.get_model_path()?;
    info!("Model: {:?}", model_path);

    if !model_path.exists() {
        error!("Model file not found: {:?}", model_path);
        eprintln!("\nModel file not found: {:?}", model_path);
        eprintln!("\nPlace the trained emotion classifier at the expected location,");
        eprintln!("or specify a custom path with: --model /path/to/model.json");
        return Ok(ExitCode::FAILURE);
    }

    // A model that cannot be loaded means no prediction can be served
    let classifier = EmotionClassifier::load(&model_path, config.n_threads)
        .with_context(|| format!("Failed to load emotion model from {:?}", model_path))?;
    let pipeline = EmotionPipeline::new(classifier);

    let mut failures = 0usize;

    for path in &args.files {
        let source = path.display().to_string();
        let result = std::fs::read(path)
            .with_context(|| format!("Failed to read {:?}", path))
            .and_then(|bytes| Ok(pipeline.predict(&bytes)?));
        if !report(&source, result, config.output_format)? {
            failures += 1;
        }
    }

    if args.record {
        let result = record_from_microphone(&config)
            .await
            .and_then(|bytes| Ok(pipeline.predict(&bytes)?));
        if !report("microphone", result, config.output_format)? {
            failures += 1;
        }
    }

    if failures > 0 {
        info!("{} input(s) could not be classified", failures);
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

/// Load the config file and apply command-line overrides
fn resolve_config(args: &Args) -> Result<Config> {
    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => Config::default_config_path()?,
    };
    debug!("Config: {:?}", config_path);

    let mut config = Config::load(&config_path)?;

    if let Some(model) = &args.model {
        config.model_path = Some(model.clone());
    }
    if let Some(format) = &args.format {
        config.output_format = format.parse::<OutputFormat>().map_err(anyhow::Error::msg)?;
    }
    if let Some(duration) = args.duration {
        config.max_record_secs = duration;
    }
    if let Some(device) = &args.device {
        config.input_device_id = Some(device.clone());
    }
    if let Some(threads) = args.threads {
        config.n_threads = threads;
    }

    Ok(config)
}

/// Record a clip and encode it as WAV, the same container file uploads use
async fn record_from_microphone(config: &Config) -> Result<Vec<u8>> {
    let stop_flag = Arc::new(AtomicBool::new(false));

    // Set up Ctrl+C handler
    let stop_flag_ctrlc = stop_flag.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, stopping...");
        stop_flag_ctrlc.store(true, Ordering::SeqCst);
    });

    let device_id = config.input_device_id.clone();
    let max_duration = Duration::from_secs(config.max_record_secs as u64);

    eprintln!(
        "\nRecording for up to {}s... Press Ctrl+C to stop early.\n",
        config.max_record_secs
    );

    let clip = tokio::task::spawn_blocking(move || {
        record_clip(device_id.as_deref(), max_duration, stop_flag)
    })
    .await
    .context("Recording task failed")??;

    Ok(encode_wav(&clip.samples, clip.sample_rate)?)
}

/// Print one outcome; returns whether the prediction succeeded
fn report(source: &str, result: Result<Prediction>, format: OutputFormat) -> Result<bool> {
    match (result, format) {
        (Ok(prediction), OutputFormat::Text) => {
            println!(
                "{}: Predicted emotion: {}",
                source,
                prediction.label.display_name()
            );
            Ok(true)
        }
        (Ok(prediction), OutputFormat::Json) => {
            let line = serde_json::to_string(&PredictionReport { source, prediction })?;
            println!("{}", line);
            Ok(true)
        }
        (Err(e), OutputFormat::Text) => {
            error!("{}: prediction failed: {:#}", source, e);
            Ok(false)
        }
        (Err(e), OutputFormat::Json) => {
            error!("{}: prediction failed: {:#}", source, e);
            let line = serde_json::json!({ "source": source, "error": format!("{:#}", e) });
            println!("{}", line);
            Ok(false)
        }
    }
}

fn list_devices_and_exit() -> Result<ExitCode> {
    println!("Available input devices:\n");

    match list_input_devices() {
        Ok(devices) => {
            if devices.is_empty() {
                println!("  No input devices found.");
            } else {
                for device in devices {
                    let default_marker = if device.is_default { " (default)" } else { "" };
                    println!("  - {}{}", device.name, default_marker);
                }
            }
        }
        Err(e) => {
            error!("Failed to list devices: {}", e);
            println!("  Error: {}", e);
            return Ok(ExitCode::FAILURE);
        }
    }

    Ok(ExitCode::SUCCESS)
}
