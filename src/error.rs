use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Coarse error categories used by the driver to decide what is fatal.
///
/// - `Configuration` aborts the run before any video is touched.
/// - `InputResolution` is reported and ends the run without an error status.
/// - `PerFile` is isolated to the file that raised it; the batch continues.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    InputResolution,
    PerFile,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("config file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),

    #[error("invalid config {}: {reason}", path.display())]
    InvalidConfig { path: PathBuf, reason: String },

    #[error("input not found: {}", .0.display())]
    InputNotFound(PathBuf),

    #[error("no video files found in {}", .0.display())]
    NoVideosFound(PathBuf),

    #[error("failed to scan {}: {source}", path.display())]
    Discovery {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("video not found: {}", .0.display())]
    VideoNotFound(PathBuf),

    #[error("cannot open video {}: {reason}", path.display())]
    SourceOpen { path: PathBuf, reason: String },

    #[error("cannot create video writer {}: {reason}", path.display())]
    SinkOpen { path: PathBuf, reason: String },

    #[error("failed to decode frame {index} of {}: {reason}", path.display())]
    Decode {
        path: PathBuf,
        index: u64,
        reason: String,
    },

    #[error("failed to encode frame {index} into {}: {reason}", path.display())]
    Encode {
        path: PathBuf,
        index: u64,
        reason: String,
    },

    #[error("frame buffer of {len} bytes does not match {width}x{height} RGB24")]
    FrameSize { width: u32, height: u32, len: usize },

    #[error("detection failed on frame {index}: {reason}")]
    Detection { index: u64, reason: String },

    #[error("interrupted after {frames} frames")]
    Interrupted { frames: u64 },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::ConfigNotFound(_) | Error::InvalidConfig { .. } => ErrorKind::Configuration,
            Error::InputNotFound(_) | Error::NoVideosFound(_) | Error::Discovery { .. } => {
                ErrorKind::InputResolution
            }
            _ => ErrorKind::PerFile,
        }
    }

    pub(crate) fn invalid_config(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::InvalidConfig {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
