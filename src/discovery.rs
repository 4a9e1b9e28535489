//! Video file discovery.
//!
//! Only the top level of a directory is scanned. Extensions are matched
//! case-insensitively and results are sorted by path.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Extensions recognised as video containers.
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "mkv", "flv", "wmv", "y4m"];

pub fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            VIDEO_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
}

/// List video files directly inside `dir`, sorted by path. An empty result is not an error.
pub fn find_video_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let read_dir = std::fs::read_dir(dir).map_err(|source| Error::Discovery {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut files: Vec<PathBuf> = read_dir
        .filter_map(|entry| {
            let path = entry.ok()?.path();
            (path.is_file() && is_video_file(&path)).then_some(path)
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Resolve the set of videos to process.
///
/// An explicit file is taken as-is, an explicit directory is scanned, and with no
/// explicit input the configured `default_dir` is scanned.
pub fn resolve_inputs(input: Option<&Path>, default_dir: &Path) -> Result<Vec<PathBuf>> {
    let dir = match input {
        Some(path) if path.is_file() => return Ok(vec![path.to_path_buf()]),
        Some(path) => path,
        None => default_dir,
    };
    if !dir.is_dir() {
        return Err(Error::InputNotFound(dir.to_path_buf()));
    }
    let files = find_video_files(dir)?;
    if files.is_empty() {
        return Err(Error::NoVideosFound(dir.to_path_buf()));
    }
    Ok(files)
}
