//! # Transcription Engine
//!
//! The engine owns the speech model for the lifetime of a run. It is an
//! explicit context object handed to the batch runner, not hidden global
//! state: the model is loaded on first use through `ensure_loaded()`, held
//! until the process exits, and the load counter makes the reuse observable.
//!
//! ## Per-file Process:
//! 1. Ensure the model is loaded (no-op after the first file)
//! 2. Decode the audio to 16 kHz mono float PCM
//! 3. Run inference over successive 30-second windows
//! 4. Assemble the full text plus per-window segments into a result

use crate::audio::{decode_to_f32, WHISPER_SAMPLE_RATE};
use crate::error::TranscribeError;
use crate::transcription::model::{ModelSize, WhisperModel};
use candle_core::Device;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

/// Whisper works on fixed 30-second inputs; longer audio is windowed.
const WINDOW_SECONDS: f64 = 30.0;

/// Settings fixed for the lifetime of an engine.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Which model to load on first use
    pub model: ModelSize,

    /// ISO 639-1 language hint passed to the decoder prompt
    pub language: Option<String>,

    /// Binary used to decode input audio to PCM
    pub decoder_binary: String,

    /// Where downloaded model weights are cached
    pub cache_dir: PathBuf,
}

/// One inference window of the transcript, with offsets in seconds.
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Full result of transcribing one file. Serialized verbatim to the
/// transcript JSON.
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptionResult {
    /// The complete transcribed text
    pub text: String,

    /// Per-window segments with start/end offsets
    pub segments: Vec<TranscriptSegment>,

    /// Language hint used for inference
    pub language: String,

    /// Model the text was produced with
    pub model: String,

    /// Duration of the decoded audio (seconds)
    pub audio_duration: f64,

    /// Wall-clock inference time (milliseconds)
    pub processing_time_ms: u64,

    /// When the transcription finished
    pub created_at: String,
}

/// Speech-to-text engine holding the lazily-loaded model.
pub struct TranscriptionEngine {
    settings: EngineSettings,
    device: Device,
    model: Option<WhisperModel>,
    load_count: u64,
}

impl TranscriptionEngine {
    /// Create an engine; nothing is downloaded or loaded until the first
    /// `ensure_loaded()`.
    pub fn new(settings: EngineSettings, device: Device) -> Self {
        Self {
            settings,
            device,
            model: None,
            load_count: 0,
        }
    }

    /// Load the model if it is not resident yet. Idempotent: the second and
    /// later calls in a process return immediately without reloading.
    pub async fn ensure_loaded(&mut self) -> Result<(), TranscribeError> {
        if self.model.is_some() {
            return Ok(());
        }

        let model = WhisperModel::load(
            self.settings.model,
            self.device.clone(),
            &self.settings.cache_dir,
        )
        .await
        .map_err(|e| TranscribeError::ModelLoad(e.to_string()))?;

        self.model = Some(model);
        self.load_count += 1;
        Ok(())
    }

    /// Whether the model is currently resident.
    pub fn is_loaded(&self) -> bool {
        self.model.is_some()
    }

    /// How many times the model has actually been loaded. Stays at 1 for
    /// the whole run however many files are transcribed.
    pub fn load_count(&self) -> u64 {
        self.load_count
    }

    /// Transcribe one audio file to a full result structure.
    pub async fn transcribe_file(
        &mut self,
        path: &Path,
    ) -> Result<TranscriptionResult, TranscribeError> {
        self.ensure_loaded().await?;
        let start_time = Instant::now();

        let samples = decode_to_f32(path, &self.settings.decoder_binary).await?;
        if samples.is_empty() {
            return Err(TranscribeError::Decode(format!(
                "{} decoded to an empty stream",
                path.display()
            )));
        }
        let audio_duration = samples.len() as f64 / WHISPER_SAMPLE_RATE as f64;

        let language = self.settings.language.clone();
        let model = self
            .model
            .as_mut()
            .ok_or_else(|| TranscribeError::Inference("model not loaded".to_string()))?;

        let windows = plan_windows(samples.len(), WHISPER_SAMPLE_RATE);
        debug!(
            "Transcribing {} ({:.2}s, {} window(s))",
            path.display(),
            audio_duration,
            windows.len()
        );

        let mut segments = Vec::with_capacity(windows.len());
        for (start, end) in windows {
            let text = model
                .transcribe(&samples[start..end], language.as_deref())
                .await
                .map_err(|e| TranscribeError::Inference(e.to_string()))?;
            let text = text.trim().to_string();
            if text.is_empty() {
                continue;
            }
            segments.push(TranscriptSegment {
                start: start as f64 / WHISPER_SAMPLE_RATE as f64,
                end: end as f64 / WHISPER_SAMPLE_RATE as f64,
                text,
            });
        }

        let model_name = model.size().to_string();
        let processing_time_ms = start_time.elapsed().as_millis() as u64;
        let result = TranscriptionResult {
            text: join_segment_text(&segments),
            language: language.unwrap_or_else(|| "auto".to_string()),
            model: model_name,
            audio_duration,
            processing_time_ms,
            created_at: chrono::Utc::now().to_rfc3339(),
            segments,
        };

        info!(
            "Transcribed {}: {:.2}s audio -> {} chars in {}ms",
            path.display(),
            audio_duration,
            result.text.len(),
            processing_time_ms
        );

        Ok(result)
    }
}

/// Split `total_samples` into consecutive 30-second windows as
/// half-open `(start, end)` sample ranges. The final window is short.
fn plan_windows(total_samples: usize, sample_rate: u32) -> Vec<(usize, usize)> {
    let window_len = (WINDOW_SECONDS * sample_rate as f64) as usize;
    if total_samples == 0 || window_len == 0 {
        return Vec::new();
    }

    let mut windows = Vec::new();
    let mut start = 0;
    while start < total_samples {
        let end = (start + window_len).min(total_samples);
        windows.push((start, end));
        start = end;
    }
    windows
}

/// The full text is the segment texts joined with single spaces.
fn join_segment_text(segments: &[TranscriptSegment]) -> String {
    segments
        .iter()
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{select_device, DevicePreference};

    #[test]
    fn test_plan_windows_covers_everything_without_overlap() {
        let rate = WHISPER_SAMPLE_RATE;
        let windows = plan_windows(rate as usize * 70, rate);
        assert_eq!(
            windows,
            vec![
                (0, rate as usize * 30),
                (rate as usize * 30, rate as usize * 60),
                (rate as usize * 60, rate as usize * 70),
            ]
        );
    }

    #[test]
    fn test_plan_windows_short_audio_is_one_window() {
        let windows = plan_windows(16_000, WHISPER_SAMPLE_RATE);
        assert_eq!(windows, vec![(0, 16_000)]);
        assert!(plan_windows(0, WHISPER_SAMPLE_RATE).is_empty());
    }

    #[test]
    fn test_join_segment_text() {
        let segments = vec![
            TranscriptSegment {
                start: 0.0,
                end: 30.0,
                text: "hello there".to_string(),
            },
            TranscriptSegment {
                start: 30.0,
                end: 42.0,
                text: "general greeting".to_string(),
            },
        ];
        assert_eq!(join_segment_text(&segments), "hello there general greeting");
        assert_eq!(join_segment_text(&[]), "");
    }

    #[test]
    fn test_engine_starts_unloaded() {
        let settings = EngineSettings {
            model: ModelSize::Tiny,
            language: Some("en".to_string()),
            decoder_binary: "ffmpeg".to_string(),
            cache_dir: std::env::temp_dir(),
        };
        let engine = TranscriptionEngine::new(settings, select_device(DevicePreference::Cpu));
        assert!(!engine.is_loaded());
        assert_eq!(engine.load_count(), 0);
    }

    /// Downloads the tiny model; run with `cargo test -- --ignored` when
    /// network access is available.
    #[tokio::test]
    #[ignore]
    async fn test_model_is_loaded_exactly_once() {
        let cache = tempfile::tempdir().unwrap();
        let settings = EngineSettings {
            model: ModelSize::Tiny,
            language: Some("en".to_string()),
            decoder_binary: "ffmpeg".to_string(),
            cache_dir: cache.path().to_path_buf(),
        };
        let mut engine = TranscriptionEngine::new(settings, select_device(DevicePreference::Cpu));

        engine.ensure_loaded().await.unwrap();
        engine.ensure_loaded().await.unwrap();

        assert!(engine.is_loaded());
        assert_eq!(engine.load_count(), 1);
    }
}
