//! Video containers: frame sources, frame sinks and the file dispatcher.
//!
//! `FileVideoIo` picks a backend from the file extension. YUV4MPEG2 (`.y4m`)
//! is always available; every other container goes through FFmpeg and needs
//! the `video-ffmpeg` feature.

#[cfg(feature = "video-ffmpeg")]
mod ffmpeg;
pub mod y4m;

use std::path::Path;

use crate::error::{Error, Result};
use crate::frame::{Frame, VideoProperties};

/// Sequential reader over decoded frames.
pub trait FrameSource {
    /// Properties read when the source was opened.
    fn properties(&self) -> &VideoProperties;

    /// Next frame in presentation order, or `None` at end of stream.
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}

/// Sequential writer. Dropping a sink releases its file handle; `finish`
/// flushes buffered data and writes any trailer.
pub trait FrameSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<()>;

    fn finish(&mut self) -> Result<()>;
}

/// Opens sources and sinks for paths.
pub trait VideoIo {
    /// Whether `path` names an input this backend can try to open.
    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn open_source(&self, path: &Path) -> Result<Box<dyn FrameSource>>;

    /// Create a sink at `path` that encodes at the given resolution and rate.
    fn open_sink(&self, path: &Path, properties: &VideoProperties) -> Result<Box<dyn FrameSink>>;

    /// Declared frame count of `path`, 0 when the container does not say.
    fn probe_frame_count(&self, path: &Path) -> Result<u64> {
        let source = self.open_source(path)?;
        Ok(source.properties().frame_count)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Container {
    Y4m,
    Ffmpeg,
}

fn container_for(path: &Path) -> Container {
    let is_y4m = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("y4m"))
        .unwrap_or(false);
    if is_y4m {
        Container::Y4m
    } else {
        Container::Ffmpeg
    }
}

/// Default extension for the annotated copy of `input`.
pub fn default_output_extension(input: &Path) -> &'static str {
    match container_for(input) {
        Container::Y4m => "y4m",
        Container::Ffmpeg => "mp4",
    }
}

/// Filesystem-backed `VideoIo`.
#[derive(Clone, Copy, Debug, Default)]
pub struct FileVideoIo;

impl VideoIo for FileVideoIo {
    fn open_source(&self, path: &Path) -> Result<Box<dyn FrameSource>> {
        match container_for(path) {
            Container::Y4m => Ok(Box::new(y4m::Y4mSource::open(path)?)),
            Container::Ffmpeg => open_ffmpeg_source(path),
        }
    }

    fn open_sink(&self, path: &Path, properties: &VideoProperties) -> Result<Box<dyn FrameSink>> {
        match container_for(path) {
            Container::Y4m => Ok(Box::new(y4m::Y4mSink::create(path, properties)?)),
            Container::Ffmpeg => open_ffmpeg_sink(path, properties),
        }
    }

    fn probe_frame_count(&self, path: &Path) -> Result<u64> {
        match container_for(path) {
            Container::Y4m => y4m::estimate_frame_count(path),
            Container::Ffmpeg => {
                let source = open_ffmpeg_source(path)?;
                Ok(source.properties().frame_count)
            }
        }
    }
}

#[cfg(feature = "video-ffmpeg")]
fn open_ffmpeg_source(path: &Path) -> Result<Box<dyn FrameSource>> {
    Ok(Box::new(ffmpeg::FfmpegSource::open(path)?))
}

#[cfg(not(feature = "video-ffmpeg"))]
fn open_ffmpeg_source(path: &Path) -> Result<Box<dyn FrameSource>> {
    Err(Error::SourceOpen {
        path: path.to_path_buf(),
        reason: "decoding this container requires the video-ffmpeg feature".to_string(),
    })
}

#[cfg(feature = "video-ffmpeg")]
fn open_ffmpeg_sink(path: &Path, properties: &VideoProperties) -> Result<Box<dyn FrameSink>> {
    Ok(Box::new(ffmpeg::FfmpegSink::create(path, properties)?))
}

#[cfg(not(feature = "video-ffmpeg"))]
fn open_ffmpeg_sink(path: &Path, _properties: &VideoProperties) -> Result<Box<dyn FrameSink>> {
    Err(Error::SinkOpen {
        path: path.to_path_buf(),
        reason: "encoding this container requires the video-ffmpeg feature".to_string(),
    })
}
