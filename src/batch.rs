//! # Batch Orchestrator
//!
//! Drives the locate -> convert -> (optional) transcribe sequence over the
//! scan directory, one file at a time, in enumeration order.
//!
//! ## Failure Policy:
//! A failed file never stops the batch. Each adapter returns an explicit
//! result; this module logs the reason, counts it in the run summary, and
//! moves on. Only the initial directory scan can abort a run, since there
//! is nothing to iterate without it.

use crate::config::EncoderConfig;
use crate::convert::{convert_to_mp3, Conversion};
use crate::error::AppResult;
use crate::locator::scan_audio_files;
use crate::transcription::{format_transcript, write_transcript, TranscriptionEngine};
use std::path::PathBuf;
use tracing::{debug, error, info};

/// Counters accumulated across one run and logged at the end.
#[derive(Debug, Default, Clone)]
pub struct RunSummary {
    /// Candidate files found by the scan
    pub scanned: usize,

    /// Files successfully converted
    pub converted: usize,

    /// Files the encoder failed on
    pub conversion_failures: usize,

    /// Transcripts successfully written
    pub transcribed: usize,

    /// Files that converted but failed to transcribe or persist
    pub transcription_failures: usize,

    /// Total input bytes across successful conversions
    pub original_bytes: u64,

    /// Total output bytes across successful conversions
    pub converted_bytes: u64,
}

impl RunSummary {
    pub fn record_conversion(&mut self, conversion: &Conversion) {
        self.converted += 1;
        self.original_bytes += conversion.original_bytes;
        self.converted_bytes += conversion.converted_bytes;
    }

    /// Bytes shaved off across the run. Re-converting an already-small file
    /// can grow it, hence the saturation.
    pub fn bytes_saved(&self) -> u64 {
        self.original_bytes.saturating_sub(self.converted_bytes)
    }

    fn log(&self) {
        info!(
            "Run complete: {} scanned, {} converted, {} failed",
            self.scanned, self.converted, self.conversion_failures
        );
        if self.converted > 0 {
            info!(
                "Saved {:.2} MB across {} file(s)",
                self.bytes_saved() as f64 / (1024.0 * 1024.0),
                self.converted
            );
        }
        if self.transcribed > 0 || self.transcription_failures > 0 {
            info!(
                "Transcripts: {} written, {} failed",
                self.transcribed, self.transcription_failures
            );
        }
    }
}

/// One batch run over a directory.
pub struct Batch {
    scan_dir: PathBuf,
    extensions: &'static [&'static str],
    encoder: EncoderConfig,
    /// Present only when transcription was requested for this run
    engine: Option<TranscriptionEngine>,
}

impl Batch {
    pub fn new(
        scan_dir: PathBuf,
        extensions: &'static [&'static str],
        encoder: EncoderConfig,
        engine: Option<TranscriptionEngine>,
    ) -> Self {
        Self {
            scan_dir,
            extensions,
            encoder,
            engine,
        }
    }

    /// Process every candidate file sequentially and return the summary.
    pub async fn run(&mut self) -> AppResult<RunSummary> {
        let files = scan_audio_files(&self.scan_dir, self.extensions)?;
        let transcripts_dir = self.scan_dir.join("transcriptions");

        let mut summary = RunSummary {
            scanned: files.len(),
            ..RunSummary::default()
        };
        info!(
            "Processing {} file(s) in {}",
            files.len(),
            self.scan_dir.display()
        );

        for file in &files {
            let conversion = match convert_to_mp3(file, &self.encoder).await {
                Ok(conversion) => conversion,
                Err(e) => {
                    error!("Could not convert {}: {}", file.display(), e);
                    summary.conversion_failures += 1;
                    continue;
                }
            };
            summary.record_conversion(&conversion);

            let Some(engine) = self.engine.as_mut() else {
                continue;
            };
            match engine.transcribe_file(&conversion.output).await {
                Ok(result) => {
                    debug!("Transcript text: {}", format_transcript(&result.text));
                    match write_transcript(&transcripts_dir, &conversion.output, &result) {
                        Ok(_) => summary.transcribed += 1,
                        Err(e) => {
                            error!("Could not persist transcript for {}: {}", file.display(), e);
                            summary.transcription_failures += 1;
                        }
                    }
                }
                Err(e) => {
                    error!("Could not transcribe {}: {}", conversion.output.display(), e);
                    summary.transcription_failures += 1;
                }
            }
        }

        summary.log();
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::DEFAULT_EXTENSIONS;
    use std::fs;
    use std::path::Path;

    fn encoder_with_binary(binary: &str) -> EncoderConfig {
        EncoderConfig {
            binary: binary.to_string(),
            bitrate: "64k".to_string(),
            sample_rate: 22050,
            channels: 1,
            vbr_quality: 9,
        }
    }

    #[cfg(unix)]
    fn stub_encoder(dir: &Path) -> String {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("stub-encoder.sh");
        fs::write(
            &path,
            "#!/bin/sh\ninput=\"$2\"\nfor last; do :; done\ncp \"$input\" \"$last\"\n",
        )
        .unwrap();
        let mut perms = fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).unwrap();
        path.to_string_lossy().to_string()
    }

    #[test]
    fn test_summary_accounting() {
        let mut summary = RunSummary::default();
        summary.record_conversion(&Conversion {
            input: "a.wav".into(),
            output: "a.mp3".into(),
            original_bytes: 3_000_000,
            converted_bytes: 1_000_000,
        });
        summary.record_conversion(&Conversion {
            input: "b.m4a".into(),
            output: "b.mp3".into(),
            original_bytes: 500_000,
            converted_bytes: 700_000, // re-encode that grew
        });

        assert_eq!(summary.converted, 2);
        assert_eq!(summary.bytes_saved(), 1_800_000);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_converts_every_candidate() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("one.m4a"), b"first").unwrap();
        fs::write(dir.path().join("two.wav"), b"second").unwrap();
        fs::write(dir.path().join("skip.txt"), b"not audio").unwrap();

        let encoder = encoder_with_binary(&stub_encoder(dir.path()));
        let mut batch = Batch::new(dir.path().to_path_buf(), DEFAULT_EXTENSIONS, encoder, None);
        let summary = batch.run().await.unwrap();

        assert_eq!(summary.scanned, 2);
        assert_eq!(summary.converted, 2);
        assert_eq!(summary.conversion_failures, 0);
        assert!(dir.path().join("one.mp3").exists());
        assert!(dir.path().join("two.mp3").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_continues_past_failures() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("one.m4a"), b"first").unwrap();
        fs::write(dir.path().join("two.wav"), b"second").unwrap();

        // Every invocation fails; the run still completes and reports.
        let encoder = encoder_with_binary("false");
        let mut batch = Batch::new(dir.path().to_path_buf(), DEFAULT_EXTENSIONS, encoder, None);
        let summary = batch.run().await.unwrap();

        assert_eq!(summary.scanned, 2);
        assert_eq!(summary.converted, 0);
        assert_eq!(summary.conversion_failures, 2);
    }
}
