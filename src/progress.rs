//! Progress hooks for long-running video jobs.

use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::frame::VideoProperties;

/// Outcome of one processed video.
#[derive(Clone, Debug, PartialEq)]
pub struct ProcessSummary {
    pub input: PathBuf,
    pub output: PathBuf,
    pub properties: VideoProperties,
    pub frames_written: u64,
    /// Frames that went through the detector.
    pub frames_annotated: u64,
    pub detections: u64,
}

/// Receives events from `VideoProcessor`. Every hook defaults to a no-op.
pub trait ProgressObserver {
    fn on_start(&mut self, _input: &Path, _output: &Path, _properties: &VideoProperties) {}

    /// Called after frame `index` (0-based) has been written.
    fn on_frame(&mut self, _index: u64, _annotated: bool, _detections: usize) {}

    fn on_finish(&mut self, _summary: &ProcessSummary) {}

    /// Called when a file fails; the batch moves on to the next one unless interrupted.
    fn on_error(&mut self, _input: &Path, _error: &Error) {}
}

/// Observer that ignores every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct SilentObserver;

impl ProgressObserver for SilentObserver {}
