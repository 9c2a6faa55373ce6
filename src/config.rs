//! # Configuration Management
//!
//! This module handles loading and managing application configuration from
//! multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Command-line flags (applied by main after loading)
//! 2. Environment variables (APP_MODELS_WHISPER_MODEL, etc.)
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impl)

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Main application configuration that contains all settings.
///
/// ## Why separate config structs:
/// Breaking configuration into logical groups (scan, encoder, models) keeps
/// each concern next to the module that consumes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub scan: ScanConfig,
    pub encoder: EncoderConfig,
    pub models: ModelsConfig,
}

/// Directory scan settings.
///
/// ## Fields:
/// - `directory`: directory to scan for audio files; empty means the user's
///   Downloads directory resolved at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    pub directory: String,
}

/// Fixed encoding policy for the external encoder.
///
/// ## Fields:
/// - `binary`: encoder executable, resolved through PATH
/// - `bitrate`: target bitrate passed as `-b:a`
/// - `sample_rate`: output sample rate in Hz passed as `-ar`
/// - `channels`: output channel count passed as `-ac`
/// - `vbr_quality`: LAME variable-bitrate quality passed as `-q:a`
///   (0 = best fidelity, 9 = smallest file)
///
/// The defaults are chosen to minimize file size at the expense of
/// fidelity: mono, 22.05 kHz, 64 kbps target, lowest-quality VBR setting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderConfig {
    pub binary: String,
    pub bitrate: String,
    pub sample_rate: u32,
    pub channels: u8,
    pub vbr_quality: u8,
}

/// Speech-recognition model settings.
///
/// ## Fields:
/// - `whisper_model`: which Whisper model to load ("tiny", "base", "small",
///   "medium", "large")
/// - `language`: ISO 639-1 language hint for inference
/// - `device`: inference device preference ("auto", "cpu", "cuda", "metal")
/// - `cache_dir`: where downloaded model weights live; empty means
///   `~/.cache/downsample-audio/models`
///
/// ## Model size trade-offs:
/// - Smaller models: faster processing, less memory, lower accuracy
/// - Larger models: slower processing, more memory, higher accuracy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    pub whisper_model: String,
    pub language: String,
    pub device: String,
    pub cache_dir: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            scan: ScanConfig {
                directory: String::new(), // resolved to ~/Downloads at startup
            },
            encoder: EncoderConfig {
                binary: "ffmpeg".to_string(),
                bitrate: "64k".to_string(),
                sample_rate: 22050,
                channels: 1,
                vbr_quality: 9, // smallest output the encoder will produce
            },
            models: ModelsConfig {
                whisper_model: "large".to_string(),
                language: "en".to_string(),
                device: "auto".to_string(),
                cache_dir: String::new(), // resolved under ~/.cache at startup
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Configuration Loading Process:
    /// 1. Start with built-in defaults
    /// 2. Override with values from config.toml (if it exists)
    /// 3. Override with environment variables prefixed with APP_
    ///
    /// ## Environment Variable Examples:
    /// - `APP_MODELS_WHISPER_MODEL=base`: override the whisper model
    /// - `APP_ENCODER_BINARY=/opt/ffmpeg/bin/ffmpeg`: override the encoder
    pub fn load() -> Result<Self> {
        let settings = config::Config::builder()
            // 1. Start with defaults - converts our Default impl to config format
            .add_source(config::Config::try_from(&AppConfig::default())?)
            // 2. Load from config.toml (if it exists) - required(false) means
            //    "don't error if missing"
            .add_source(config::File::with_name("config").required(false))
            // 3. Load from environment variables with APP_ prefix
            // Example: APP_ENCODER_BITRATE becomes encoder.bitrate
            .add_source(config::Environment::with_prefix("APP").separator("_"));

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// ## What this checks:
    /// - The encoder binary and bitrate are non-empty
    /// - Sample rate is non-zero and channels are mono or stereo
    /// - VBR quality is within the 0-9 range the encoder accepts
    /// - The model name is one of the sizes we can load
    pub fn validate(&self) -> Result<()> {
        if self.encoder.binary.trim().is_empty() {
            return Err(anyhow::anyhow!("Encoder binary cannot be empty"));
        }

        if self.encoder.bitrate.trim().is_empty() {
            return Err(anyhow::anyhow!("Encoder bitrate cannot be empty"));
        }

        if self.encoder.sample_rate == 0 {
            return Err(anyhow::anyhow!("Encoder sample rate cannot be 0"));
        }

        if self.encoder.channels == 0 || self.encoder.channels > 2 {
            return Err(anyhow::anyhow!(
                "Encoder channels must be 1 (mono) or 2 (stereo), got {}",
                self.encoder.channels
            ));
        }

        if self.encoder.vbr_quality > 9 {
            return Err(anyhow::anyhow!(
                "VBR quality must be 0-9, got {}",
                self.encoder.vbr_quality
            ));
        }

        self.models
            .whisper_model
            .parse::<crate::transcription::ModelSize>()
            .map_err(|e| anyhow::anyhow!("Invalid whisper model: {}", e))?;

        Ok(())
    }
}
