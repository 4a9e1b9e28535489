//! Video object detection and annotation.
//!
//! Runs a pretrained detector over video files, draws boxes and labels on the
//! detected objects and writes an annotated copy of each video with the same
//! resolution, frame rate and frame count.
//!
//! # Module Structure
//!
//! - `config`: typed settings loaded once at startup
//! - `discovery`: video file lookup in input directories
//! - `detect`: detector backends (stub, tract) behind `DetectorBackend`
//! - `render`: box, label and frame-counter overlays
//! - `video`: frame sources and sinks (YUV4MPEG2 built in, FFmpeg optional)
//! - `processor`: the frame loop and batch driver
//! - `progress`: observer hooks and per-file summaries

pub mod config;
pub mod detect;
pub mod discovery;
pub mod error;
pub mod frame;
pub mod processor;
pub mod progress;
pub mod render;
pub mod video;

pub use config::DetectConfig;
pub use detect::{backend_from_config, BoundingBox, Detection, DetectorBackend, StubBackend};
#[cfg(feature = "backend-tract")]
pub use detect::TractBackend;
pub use discovery::{find_video_files, resolve_inputs, VIDEO_EXTENSIONS};
pub use error::{Error, ErrorKind, Result};
pub use frame::{Frame, FrameRate, VideoProperties};
pub use processor::{BatchReport, VideoProcessor};
pub use progress::{ProcessSummary, ProgressObserver, SilentObserver};
pub use render::OverlayStyle;
pub use video::{FileVideoIo, FrameSink, FrameSource, VideoIo};
