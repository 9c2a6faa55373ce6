//! Transcript persistence: one JSON file per source audio file, named after
//! the audio file's stem, in a `transcriptions/` directory under the scan
//! root.

use crate::error::TranscribeError;
use crate::transcription::engine::TranscriptionResult;
use std::path::{Path, PathBuf};
use tracing::info;

/// Where the transcript for `audio_path` lives: `<dir>/<stem>.json`.
pub fn transcript_path(output_dir: &Path, audio_path: &Path) -> PathBuf {
    let stem = audio_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "transcript".to_string());
    output_dir.join(format!("{}.json", stem))
}

/// Write the full result structure as pretty JSON, creating the output
/// directory on demand. Returns the path written.
pub fn write_transcript(
    output_dir: &Path,
    audio_path: &Path,
    result: &TranscriptionResult,
) -> Result<PathBuf, TranscribeError> {
    std::fs::create_dir_all(output_dir).map_err(|e| {
        TranscribeError::Persist(format!("cannot create {}: {}", output_dir.display(), e))
    })?;

    let path = transcript_path(output_dir, audio_path);
    let json = serde_json::to_string_pretty(result)
        .map_err(|e| TranscribeError::Persist(e.to_string()))?;
    std::fs::write(&path, json)
        .map_err(|e| TranscribeError::Persist(format!("cannot write {}: {}", path.display(), e)))?;

    info!("Wrote transcript {}", path.display());
    Ok(path)
}

/// Formatting hook applied to the text before display. Currently a
/// pass-through; kept as the seam where punctuation or paragraph cleanup
/// would go.
pub fn format_transcript(text: &str) -> String {
    text.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcription::engine::TranscriptSegment;

    fn sample_result() -> TranscriptionResult {
        TranscriptionResult {
            text: "hello world".to_string(),
            segments: vec![TranscriptSegment {
                start: 0.0,
                end: 2.5,
                text: "hello world".to_string(),
            }],
            language: "en".to_string(),
            model: "tiny".to_string(),
            audio_duration: 2.5,
            processing_time_ms: 120,
            created_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_transcript_path_uses_the_audio_stem() {
        let path = transcript_path(Path::new("/out"), Path::new("/downloads/episode.mp3"));
        assert_eq!(path, PathBuf::from("/out/episode.json"));
    }

    #[test]
    fn test_write_transcript_creates_directory_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let output_dir = dir.path().join("transcriptions");
        let audio = dir.path().join("episode.mp3");

        let written = write_transcript(&output_dir, &audio, &sample_result()).unwrap();
        assert_eq!(written, output_dir.join("episode.json"));

        let raw = std::fs::read_to_string(&written).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["text"], "hello world");
        assert!(!value["text"].as_str().unwrap().is_empty());
        assert_eq!(value["segments"][0]["end"], 2.5);
    }

    #[test]
    fn test_format_transcript_is_a_pass_through() {
        assert_eq!(format_transcript("as-is text"), "as-is text");
    }
}
