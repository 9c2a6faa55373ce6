//! # File Locator
//!
//! Finds candidate audio files in the scan directory. The scan is flat
//! (no recursion) and matches on a case-insensitive extension suffix;
//! everything else in the directory is ignored.

use crate::error::{AppError, AppResult};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Extensions converted by default. Files that are already `.mp3` are
/// skipped unless the re-convert flag widens the set.
pub const DEFAULT_EXTENSIONS: &[&str] = &[".m4a", ".wav", ".webm"];

/// Extension set used with `--reconvert-mp3`: existing MP3s are picked up
/// again and re-encoded down to the minimal-size policy.
pub const RECONVERT_EXTENSIONS: &[&str] = &[".m4a", ".wav", ".mp3", ".webm"];

/// Select the extension set for this run.
pub fn extension_set(reconvert_mp3: bool) -> &'static [&'static str] {
    if reconvert_mp3 {
        RECONVERT_EXTENSIONS
    } else {
        DEFAULT_EXTENSIONS
    }
}

/// Enumerate regular files in `dir` whose lowercased name ends with one of
/// `extensions`.
///
/// Subdirectories are never descended into, and no ordering is imposed
/// beyond whatever the directory listing yields.
pub fn scan_audio_files(dir: &Path, extensions: &[&str]) -> AppResult<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| AppError::Scan {
        dir: dir.to_path_buf(),
        message: e.to_string(),
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!("Skipping unreadable directory entry: {}", e);
                continue;
            }
        };

        let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
        if !is_file {
            continue;
        }

        let name = entry.file_name().to_string_lossy().to_lowercase();
        if extensions.iter().any(|ext| name.ends_with(ext)) {
            files.push(entry.path());
        }
    }

    debug!("Found {} candidate file(s) in {}", files.len(), dir.display());
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::fs;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), b"").unwrap();
    }

    fn names(files: &[PathBuf]) -> HashSet<String> {
        files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect()
    }

    #[test]
    fn test_scan_matches_case_insensitively_and_skips_mp3() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "a.m4a");
        touch(dir.path(), "b.MP4");
        touch(dir.path(), "c.WAV");
        touch(dir.path(), "d.mp3");

        let files = scan_audio_files(dir.path(), &[".m4a", ".wav"]).unwrap();
        let expected: HashSet<String> = ["a.m4a", "c.WAV"].iter().map(|s| s.to_string()).collect();
        assert_eq!(names(&files), expected);
    }

    #[test]
    fn test_reconvert_set_includes_existing_mp3() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "a.m4a");
        touch(dir.path(), "b.MP4");
        touch(dir.path(), "c.WAV");
        touch(dir.path(), "d.mp3");

        let files = scan_audio_files(dir.path(), extension_set(true)).unwrap();
        assert!(names(&files).contains("d.mp3"));
    }

    #[test]
    fn test_scan_ignores_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("nested.m4a")).unwrap();
        touch(dir.path(), "real.m4a");

        let files = scan_audio_files(dir.path(), DEFAULT_EXTENSIONS).unwrap();
        assert_eq!(names(&files), ["real.m4a".to_string()].into_iter().collect());
    }

    #[test]
    fn test_missing_directory_is_a_scan_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let err = scan_audio_files(&missing, DEFAULT_EXTENSIONS).unwrap_err();
        assert!(matches!(err, AppError::Scan { .. }));
    }
}
