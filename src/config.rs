use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default model artifact name inside the models directory
pub const DEFAULT_MODEL_FILENAME: &str = "emotion_classifier.json";

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub schema_version: u32,

    // Model
    pub model_path: Option<PathBuf>,
    pub n_threads: usize,

    // Recording
    pub input_device_id: Option<String>,
    pub max_record_secs: u32,

    pub output_format: OutputFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schema_version: 1,
            model_path: None,
            n_threads: 1,
            input_device_id: None,
            max_record_secs: 5,
            output_format: OutputFormat::Text,
        }
    }
}

impl Config {
    /// Load config from file, or create default
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path).context("Failed to read config file")?;
            serde_json::from_str(&content).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content).context("Failed to write config file")
    }

    /// Get the default config directory
    pub fn default_config_dir() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Failed to get home directory")?;
        Ok(home.join(".tamil-emotion"))
    }

    /// Get the default config file path
    pub fn default_config_path() -> Result<PathBuf> {
        Ok(Self::default_config_dir()?.join("config.json"))
    }

    /// Get the default models directory
    pub fn default_models_dir() -> Result<PathBuf> {
        Ok(Self::default_config_dir()?.join("models"))
    }

    /// Get the model file path
    pub fn get_model_path(&self) -> Result<PathBuf> {
        if let Some(ref path) = self.model_path {
            Ok(path.clone())
        } else {
            Ok(Self::default_models_dir()?.join(DEFAULT_MODEL_FILENAME))
        }
    }
}

/// Output format for predictions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}
