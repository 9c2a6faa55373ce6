//! # Transcription Module
//!
//! Speech-to-text for converted files using Whisper models via the
//! Candle-rs framework (pure Rust, no FFI bindings to whisper.cpp).
//!
//! ## Key Components:
//! - **Model Management**: loading and caching Whisper model weights
//! - **Transcription Engine**: the per-run context that owns the model and
//!   turns audio files into result structures
//! - **Output**: persisting the full result as JSON next to the downloads

pub mod engine;
pub mod model;
pub mod output;

pub use engine::{EngineSettings, TranscriptionEngine, TranscriptionResult};
pub use model::ModelSize;
pub use output::{format_transcript, write_transcript};
