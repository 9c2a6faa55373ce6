//! # Transcoder Adapter
//!
//! Converts a single audio file to a minimal-size MP3 by driving the
//! external encoder as a blocking subprocess.
//!
//! ## Contract:
//! - The output path is the input path with its extension replaced by
//!   `.mp3`, in the same directory.
//! - The encoder writes to a temporary sibling (`<stem>.temp.mp3`) which is
//!   promoted to the final path only after a successful encode, so a failed
//!   run never clobbers a previous result.
//! - The temporary path is computed before the encoder is spawned, and it is
//!   removed on every failure branch; no temp file survives this function.
//! - A pre-existing final output is deleted before the promote, making the
//!   operation last-run-wins at the path level.

use crate::config::EncoderConfig;
use crate::error::ConvertError;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info};

/// Outcome of a successful conversion, with the byte sizes needed for the
/// compression statistics.
#[derive(Debug, Clone)]
pub struct Conversion {
    pub input: PathBuf,
    pub output: PathBuf,
    pub original_bytes: u64,
    pub converted_bytes: u64,
}

impl Conversion {
    pub fn original_megabytes(&self) -> f64 {
        self.original_bytes as f64 / (1024.0 * 1024.0)
    }

    pub fn converted_megabytes(&self) -> f64 {
        self.converted_bytes as f64 / (1024.0 * 1024.0)
    }

    /// Size reduction as a percentage of the original.
    pub fn reduction_percent(&self) -> f64 {
        if self.original_bytes == 0 {
            return 0.0;
        }
        (1.0 - self.converted_bytes as f64 / self.original_bytes as f64) * 100.0
    }
}

/// Derive the final output path: same directory, extension swapped to `.mp3`.
pub fn mp3_output_path(input: &Path) -> PathBuf {
    input.with_extension("mp3")
}

/// Temporary sibling the encoder writes to before the promote.
fn temp_output_path(output: &Path) -> PathBuf {
    output.with_extension("temp.mp3")
}

/// Convert one file to MP3 at the configured minimal-size policy.
///
/// ## Steps:
/// 1. Compute output and temp paths (before anything can fail)
/// 2. Run `<binary> -i <input> -codec:a libmp3lame -b:a <bitrate>
///    -ar <rate> -ac <channels> -q:a <quality> <temp>` and wait for it
/// 3. On success: record sizes, delete a pre-existing output, rename
///    temp to output
/// 4. On any failure: delete the temp file, return the reason code;
///    the input file is left untouched
pub async fn convert_to_mp3(
    input: &Path,
    encoder: &EncoderConfig,
) -> Result<Conversion, ConvertError> {
    let output = mp3_output_path(input);
    let temp = temp_output_path(&output);

    debug!("Encoding {} -> {}", input.display(), temp.display());

    let result = Command::new(&encoder.binary)
        .arg("-i")
        .arg(input)
        .arg("-codec:a")
        .arg("libmp3lame")
        .arg("-b:a")
        .arg(&encoder.bitrate)
        .arg("-ar")
        .arg(encoder.sample_rate.to_string())
        .arg("-ac")
        .arg(encoder.channels.to_string())
        .arg("-q:a")
        .arg(encoder.vbr_quality.to_string())
        .arg(&temp)
        .output()
        .await;

    let process_output = match result {
        Ok(process_output) => process_output,
        Err(e) => {
            remove_temp(&temp);
            return Err(ConvertError::Spawn(e.to_string()));
        }
    };

    if !process_output.status.success() {
        remove_temp(&temp);
        let stderr = String::from_utf8_lossy(&process_output.stderr);
        return Err(ConvertError::Encoder {
            status: process_output.status.code(),
            stderr: last_stderr_line(&stderr),
        });
    }

    let original_bytes = match std::fs::metadata(input) {
        Ok(meta) => meta.len(),
        Err(e) => {
            remove_temp(&temp);
            return Err(ConvertError::Io(format!(
                "cannot stat {}: {}",
                input.display(),
                e
            )));
        }
    };
    let converted_bytes = match std::fs::metadata(&temp) {
        Ok(meta) => meta.len(),
        Err(e) => {
            remove_temp(&temp);
            return Err(ConvertError::Io(format!(
                "cannot stat {}: {}",
                temp.display(),
                e
            )));
        }
    };

    // Promote: last run wins at the final path.
    if output.exists() {
        if let Err(e) = std::fs::remove_file(&output) {
            remove_temp(&temp);
            return Err(ConvertError::Io(format!(
                "cannot replace {}: {}",
                output.display(),
                e
            )));
        }
    }
    if let Err(e) = std::fs::rename(&temp, &output) {
        remove_temp(&temp);
        return Err(ConvertError::Io(format!(
            "cannot promote {}: {}",
            temp.display(),
            e
        )));
    }

    let conversion = Conversion {
        input: input.to_path_buf(),
        output,
        original_bytes,
        converted_bytes,
    };

    info!(
        "Converted {} ({:.2} MB -> {:.2} MB, {:.1}% smaller)",
        conversion.output.display(),
        conversion.original_megabytes(),
        conversion.converted_megabytes(),
        conversion.reduction_percent()
    );

    Ok(conversion)
}

/// Best-effort temp cleanup used by every failure branch.
fn remove_temp(temp: &Path) {
    if temp.exists() {
        if let Err(e) = std::fs::remove_file(temp) {
            debug!("Could not remove temp file {}: {}", temp.display(), e);
        }
    }
}

/// The encoder's stderr is long and chatty; the last non-empty line is the
/// actual error.
fn last_stderr_line(stderr: &str) -> String {
    stderr
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .unwrap_or("")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn encoder_with_binary(binary: &str) -> EncoderConfig {
        EncoderConfig {
            binary: binary.to_string(),
            bitrate: "64k".to_string(),
            sample_rate: 22050,
            channels: 1,
            vbr_quality: 9,
        }
    }

    /// A stand-in for the real encoder: copies the input argument (`$2`)
    /// to the last argument, mirroring the `-i <input> ... <output>` shape.
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
    fn test_output_path_swaps_extension() {
        assert_eq!(mp3_output_path(Path::new("/d/a.m4a")), PathBuf::from("/d/a.mp3"));
        assert_eq!(mp3_output_path(Path::new("/d/a.webm")), PathBuf::from("/d/a.mp3"));
        // Re-converting an mp3 targets the same path (last run wins).
        assert_eq!(mp3_output_path(Path::new("/d/a.mp3")), PathBuf::from("/d/a.mp3"));
    }

    #[test]
    fn test_temp_path_is_a_sibling() {
        let temp = temp_output_path(Path::new("/d/a.mp3"));
        assert_eq!(temp, PathBuf::from("/d/a.temp.mp3"));
    }

    #[test]
    fn test_reduction_percent() {
        let conversion = Conversion {
            input: PathBuf::from("a.wav"),
            output: PathBuf::from("a.mp3"),
            original_bytes: 1000,
            converted_bytes: 250,
        };
        assert!((conversion.reduction_percent() - 75.0).abs() < f64::EPSILON);

        let empty = Conversion {
            original_bytes: 0,
            converted_bytes: 0,
            ..conversion
        };
        assert_eq!(empty.reduction_percent(), 0.0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_successful_conversion_promotes_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("talk.m4a");
        fs::write(&input, b"pretend audio payload").unwrap();

        let encoder = encoder_with_binary(&stub_encoder(dir.path()));
        let conversion = convert_to_mp3(&input, &encoder).await.unwrap();

        assert_eq!(conversion.output, dir.path().join("talk.mp3"));
        assert!(conversion.output.exists());
        assert!(!dir.path().join("talk.temp.mp3").exists());
        assert_eq!(conversion.original_bytes, conversion.converted_bytes);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_rerun_replaces_previous_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("talk.m4a");
        fs::write(&input, b"new payload").unwrap();
        let output = dir.path().join("talk.mp3");
        fs::write(&output, b"stale result from an earlier run").unwrap();

        let encoder = encoder_with_binary(&stub_encoder(dir.path()));
        let conversion = convert_to_mp3(&input, &encoder).await.unwrap();

        assert_eq!(conversion.output, output);
        assert_eq!(fs::read(&output).unwrap(), b"new payload");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_encoder_failure_leaves_input_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("talk.wav");
        fs::write(&input, b"original bytes").unwrap();

        // `false` exits 1 without writing anything.
        let encoder = encoder_with_binary("false");
        let err = convert_to_mp3(&input, &encoder).await.unwrap_err();

        assert!(matches!(err, ConvertError::Encoder { status: Some(1), .. }));
        assert_eq!(fs::read(&input).unwrap(), b"original bytes");
        assert!(!dir.path().join("talk.mp3").exists());
        assert!(!dir.path().join("talk.temp.mp3").exists());
    }

    #[tokio::test]
    async fn test_missing_encoder_is_a_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("talk.wav");
        fs::write(&input, b"x").unwrap();

        let encoder = encoder_with_binary("/definitely/not/an/encoder");
        let err = convert_to_mp3(&input, &encoder).await.unwrap_err();
        assert!(matches!(err, ConvertError::Spawn(_)));
        assert!(!dir.path().join("talk.temp.mp3").exists());
    }

    #[test]
    fn test_last_stderr_line() {
        let stderr = "ffmpeg version 6.0\nbuilt with gcc\n\nUnknown encoder 'libmp3lame'\n\n";
        assert_eq!(last_stderr_line(stderr), "Unknown encoder 'libmp3lame'");
        assert_eq!(last_stderr_line(""), "");
    }
}
