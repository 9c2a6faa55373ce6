//! # downsample-audio - Main Entry Point
//!
//! Batch-converts audio files in the downloads directory to minimal-size
//! MP3s through the external encoder, optionally transcribing each
//! converted file with a locally-loaded Whisper model.
//!
//! ## Application Architecture:
//! - **config**: layered configuration (TOML file + environment variables)
//! - **locator**: flat directory scan with extension filtering
//! - **convert**: the external-encoder adapter (temp write + promote)
//! - **transcription**: Whisper model loading, inference, JSON output
//! - **batch**: the sequential per-file orchestrator
//! - **error**: explicit result types shared by the adapters
//!
//! ## Exit Status:
//! Per-file failures are logged and counted but never change the exit
//! status; a completed batch exits 0. Only startup problems (bad flags,
//! invalid configuration, unreadable scan directory) exit non-zero.

mod audio;
mod batch;
mod config;
mod convert;
mod device;
mod error;
mod locator;
mod transcription;

use anyhow::Result;
use batch::Batch;
use clap::Parser;
use config::AppConfig;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use transcription::{EngineSettings, ModelSize, TranscriptionEngine};

#[derive(Parser, Debug)]
#[command(author, version, about = "Shrink downloaded audio files to minimal-size MP3s")]
struct Args {
    /// Transcribe each converted file and write the transcript JSON
    #[arg(long)]
    transcribe: bool,

    /// Also re-encode files that are already .mp3 down to the minimal-size
    /// policy
    #[arg(long)]
    reconvert_mp3: bool,

    /// Whisper model to use when transcribing (tiny, base, small, medium,
    /// large)
    #[arg(long)]
    model: Option<String>,

    /// Language hint for transcription (ISO 639-1 code)
    #[arg(long)]
    language: Option<String>,

    /// Directory to scan instead of the downloads directory
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Inference device preference (auto, cpu, cuda, metal)
    #[arg(long)]
    device: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env if present; fine when missing.
    dotenv::dotenv().ok();

    init_tracing()?;

    let args = Args::parse();

    let mut config = AppConfig::load()?;
    // Command-line flags outrank every other configuration source.
    if let Some(model) = &args.model {
        config.models.whisper_model = model.clone();
    }
    if let Some(language) = &args.language {
        config.models.language = language.clone();
    }
    if let Some(device) = &args.device {
        config.models.device = device.clone();
    }
    config.validate()?;

    info!("Starting downsample-audio v{}", env!("CARGO_PKG_VERSION"));

    let scan_dir = resolve_scan_dir(&args, &config)?;
    let extensions = locator::extension_set(args.reconvert_mp3);

    let engine = if args.transcribe {
        let model: ModelSize = config.models.whisper_model.parse()?;
        let settings = EngineSettings {
            model,
            language: Some(config.models.language.clone()),
            decoder_binary: config.encoder.binary.clone(),
            cache_dir: resolve_cache_dir(&config)?,
        };
        let device = device::select_device_from_str(&config.models.device);
        Some(TranscriptionEngine::new(settings, device))
    } else {
        None
    };

    let mut batch = Batch::new(scan_dir, extensions, config.encoder.clone(), engine);
    batch.run().await?;

    Ok(())
}

/// Scan directory precedence: `--dir` flag, then configuration, then the
/// platform downloads directory, then `~/Downloads`.
fn resolve_scan_dir(args: &Args, config: &AppConfig) -> Result<PathBuf> {
    if let Some(dir) = &args.dir {
        return Ok(dir.clone());
    }
    if !config.scan.directory.trim().is_empty() {
        return Ok(PathBuf::from(&config.scan.directory));
    }
    if let Some(dir) = dirs::download_dir() {
        return Ok(dir);
    }
    dirs::home_dir()
        .map(|home| home.join("Downloads"))
        .ok_or_else(|| anyhow::anyhow!("Cannot determine the downloads directory"))
}

/// Model cache precedence: configuration, then
/// `~/.cache/downsample-audio/models`.
fn resolve_cache_dir(config: &AppConfig) -> Result<PathBuf> {
    if !config.models.cache_dir.trim().is_empty() {
        return Ok(PathBuf::from(&config.models.cache_dir));
    }
    dirs::home_dir()
        .map(|home| home.join(".cache").join("downsample-audio").join("models"))
        .ok_or_else(|| anyhow::anyhow!("Cannot determine the model cache directory"))
}

/// Initialize the tracing (logging) system.
///
/// `RUST_LOG` controls what gets logged (e.g. "debug",
/// "downsample_audio=debug"); without it, the crate logs at info.
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "downsample_audio=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}
