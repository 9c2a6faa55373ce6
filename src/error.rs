//! # Error Handling
//!
//! This module defines the error types used across the batch pipeline.
//!
//! ## Design:
//! Every adapter returns an explicit `Result` with a structured reason code
//! instead of logging and swallowing its own failures. The orchestrator is
//! the only place that decides what a failure means for the run: log it,
//! count it, and move on to the next file. Nothing here aborts the batch.
//!
//! ## Error Categories:
//! - **Config**: configuration file or environment variable problems
//! - **Scan**: the target directory could not be enumerated
//! - **Convert**: the external encoder failed for one file
//! - **Transcribe**: model load, audio decode, inference, or persistence
//!   failed for one file

use std::fmt;
use std::path::PathBuf;

/// Top-level error type for the application.
///
/// ## Usage Example:
/// ```rust,ignore
/// return Err(AppError::Config("scan directory is not set".to_string()));
/// ```
#[derive(Debug)]
pub enum AppError {
    /// Configuration file or environment variable problems
    Config(String),

    /// The scan directory could not be read
    Scan { dir: PathBuf, message: String },

    /// A single file failed to convert
    Convert(ConvertError),

    /// A single file failed to transcribe
    Transcribe(TranscribeError),
}

/// Reason codes for a failed conversion.
///
/// ## Failure kinds (one per branch of the adapter):
/// - **Spawn**: the encoder binary could not be launched at all
/// - **Encoder**: the encoder ran and exited non-zero
/// - **Io**: filesystem work around the encoder failed (stat, rename, unlink)
///
/// In every case the temporary output has already been cleaned up and the
/// input file is untouched.
#[derive(Debug)]
pub enum ConvertError {
    /// The encoder process could not be started (missing binary, permissions)
    Spawn(String),

    /// The encoder exited non-zero; carries the exit code and trimmed stderr
    Encoder { status: Option<i32>, stderr: String },

    /// Filesystem error before or after the encoder ran
    Io(String),
}

/// Reason codes for a failed transcription.
#[derive(Debug)]
pub enum TranscribeError {
    /// The audio could not be decoded to PCM
    Decode(String),

    /// The speech model could not be downloaded or loaded
    ModelLoad(String),

    /// Inference over the decoded audio failed
    Inference(String),

    /// The transcript JSON could not be written
    Persist(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(msg) => write!(f, "configuration error: {}", msg),
            AppError::Scan { dir, message } => {
                write!(f, "cannot scan {}: {}", dir.display(), message)
            }
            AppError::Convert(err) => write!(f, "conversion failed: {}", err),
            AppError::Transcribe(err) => write!(f, "transcription failed: {}", err),
        }
    }
}

impl fmt::Display for ConvertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConvertError::Spawn(msg) => write!(f, "could not launch encoder: {}", msg),
            ConvertError::Encoder { status, stderr } => match status {
                Some(code) => write!(f, "encoder exited with status {}: {}", code, stderr),
                None => write!(f, "encoder terminated by signal: {}", stderr),
            },
            ConvertError::Io(msg) => write!(f, "i/o error: {}", msg),
        }
    }
}

impl fmt::Display for TranscribeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranscribeError::Decode(msg) => write!(f, "audio decode failed: {}", msg),
            TranscribeError::ModelLoad(msg) => write!(f, "model load failed: {}", msg),
            TranscribeError::Inference(msg) => write!(f, "inference failed: {}", msg),
            TranscribeError::Persist(msg) => write!(f, "could not write transcript: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}
impl std::error::Error for ConvertError {}
impl std::error::Error for TranscribeError {}

/// Automatic conversion so `?` lifts adapter errors into the top-level type.
impl From<ConvertError> for AppError {
    fn from(err: ConvertError) -> Self {
        AppError::Convert(err)
    }
}

impl From<TranscribeError> for AppError {
    fn from(err: TranscribeError) -> Self {
        AppError::Transcribe(err)
    }
}

/// Configuration loading can fail for various reasons (missing files,
/// invalid syntax); they all surface as configuration errors.
impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Config(err.to_string())
    }
}

/// Type alias for Results that use our error type.
///
/// `AppResult<String>` reads better than `Result<String, AppError>` at the
/// dozens of call sites in the batch runner.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_reason() {
        let err = ConvertError::Encoder {
            status: Some(1),
            stderr: "unknown codec".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("status 1"));
        assert!(msg.contains("unknown codec"));
    }

    #[test]
    fn test_adapter_errors_lift_into_app_error() {
        let err: AppError = TranscribeError::Decode("bad stream".to_string()).into();
        assert!(matches!(err, AppError::Transcribe(_)));
        assert!(err.to_string().contains("bad stream"));
    }
}
