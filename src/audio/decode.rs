//! # PCM Decoding
//!
//! Decodes an audio file to raw PCM through the external decoder and
//! converts it to the float format the speech model consumes.
//!
//! ## Why a subprocess:
//! The pipeline already requires the encoder binary for conversion, and the
//! same binary reads every container we produce. Decoding through it keeps
//! one audio backend instead of a second in-process demuxer stack.

use crate::error::TranscribeError;
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;
use std::path::Path;
use tokio::process::Command;
use tracing::debug;

/// Sample rate the speech model expects (16 kHz mono).
pub const WHISPER_SAMPLE_RATE: u32 = 16_000;

/// Decode `path` to 16 kHz mono f32 samples in [-1.0, 1.0].
///
/// Runs `<binary> -i <path> -f s16le -acodec pcm_s16le -ar 16000 -ac 1 -`
/// and parses the little-endian 16-bit stream from stdout.
pub async fn decode_to_f32(path: &Path, binary: &str) -> Result<Vec<f32>, TranscribeError> {
    let output = Command::new(binary)
        .arg("-i")
        .arg(path)
        .arg("-f")
        .arg("s16le")
        .arg("-acodec")
        .arg("pcm_s16le")
        .arg("-ar")
        .arg(WHISPER_SAMPLE_RATE.to_string())
        .arg("-ac")
        .arg("1")
        .arg("-")
        .output()
        .await
        .map_err(|e| TranscribeError::Decode(format!("could not launch decoder: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(TranscribeError::Decode(format!(
            "decoder exited with {:?}: {}",
            output.status.code(),
            stderr.lines().last().unwrap_or("").trim()
        )));
    }

    let samples = pcm_bytes_to_f32(&output.stdout)?;
    debug!(
        "Decoded {} -> {} samples ({:.2}s)",
        path.display(),
        samples.len(),
        samples.len() as f64 / WHISPER_SAMPLE_RATE as f64
    );
    Ok(samples)
}

/// Parse little-endian 16-bit PCM bytes and scale to [-1.0, 1.0].
///
/// Scaling from the 16-bit integer range [-32768, 32767] by 1/32768 is the
/// convention the model weights were trained against.
pub fn pcm_bytes_to_f32(data: &[u8]) -> Result<Vec<f32>, TranscribeError> {
    if data.len() % 2 != 0 {
        return Err(TranscribeError::Decode(
            "PCM stream length must be even for 16-bit samples".to_string(),
        ));
    }

    let mut cursor = Cursor::new(data);
    let mut samples = Vec::with_capacity(data.len() / 2);
    while let Ok(sample) = cursor.read_i16::<LittleEndian>() {
        samples.push(sample as f32 / 32768.0);
    }
    Ok(samples)
}
