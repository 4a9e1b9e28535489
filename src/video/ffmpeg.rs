//! FFmpeg-backed sources and sinks for common containers (mp4, avi, mkv, ...).
//!
//! Sources decode the best video stream to RGB24 and drain the decoder at end
//! of file. Sinks encode MPEG-4 Part 2 in YUV420P at the source frame rate.

use std::path::{Path, PathBuf};

use ffmpeg_next as ffmpeg;
use ffmpeg::format::Pixel;
use ffmpeg::software::scaling::{self, flag::Flags};
use ffmpeg::Rational;

use crate::error::{Error, Result};
use crate::frame::{Frame, FrameRate, VideoProperties};
use crate::video::{FrameSink, FrameSource};

/// Container durations are in microseconds.
const AV_TIME_BASE: f64 = 1_000_000.0;

fn init() -> std::result::Result<(), ffmpeg::Error> {
    ffmpeg::init()?;
    ffmpeg::util::log::set_level(ffmpeg::util::log::Level::Error);
    Ok(())
}

// ----------------------------------------------------------------------------
// Source
// ----------------------------------------------------------------------------

pub(crate) struct FfmpegSource {
    path: PathBuf,
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::decoder::Video,
    scaler: scaling::Context,
    properties: VideoProperties,
    flushed: bool,
    index: u64,
}

impl FfmpegSource {
    pub(crate) fn open(path: &Path) -> Result<Self> {
        let open_err = |reason: String| Error::SourceOpen {
            path: path.to_path_buf(),
            reason,
        };

        init().map_err(|e| open_err(format!("initialize ffmpeg: {e}")))?;
        let input = ffmpeg::format::input(&path).map_err(|e| open_err(e.to_string()))?;
        let stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| open_err("file has no video track".to_string()))?;
        let stream_index = stream.index();

        let context = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
            .map_err(|e| open_err(format!("load decoder parameters: {e}")))?;
        let decoder = context
            .decoder()
            .video()
            .map_err(|e| open_err(format!("open video decoder: {e}")))?;
        if decoder.width() == 0 || decoder.height() == 0 {
            return Err(open_err("stream reports zero-sized frames".to_string()));
        }

        let frame_rate = stream_frame_rate(stream.avg_frame_rate())
            .or_else(|| stream_frame_rate(stream.rate()))
            .unwrap_or_else(|| {
                log::debug!("{}: stream has no frame rate, assuming 25", path.display());
                FrameRate::new(25, 1)
            });
        let frame_count = match stream.frames() {
            n if n > 0 => n as u64,
            _ if input.duration() > 0 => {
                let seconds = input.duration() as f64 / AV_TIME_BASE;
                (seconds * frame_rate.as_f64()).round() as u64
            }
            _ => 0,
        };

        let scaler = scaling::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            Flags::BILINEAR,
        )
        .map_err(|e| open_err(format!("create scaler: {e}")))?;

        let properties = VideoProperties {
            width: decoder.width(),
            height: decoder.height(),
            frame_rate,
            frame_count,
        };
        log::debug!(
            "opened {} ({}x{} @ {} fps, ~{} frames)",
            path.display(),
            properties.width,
            properties.height,
            properties.frame_rate,
            properties.frame_count
        );

        Ok(Self {
            path: path.to_path_buf(),
            input,
            stream_index,
            decoder,
            scaler,
            properties,
            flushed: false,
            index: 0,
        })
    }

    fn decode_err(&self, reason: impl Into<String>) -> Error {
        Error::Decode {
            path: self.path.clone(),
            index: self.index,
            reason: reason.into(),
        }
    }

    fn convert(&mut self, decoded: &ffmpeg::frame::Video) -> Result<Frame> {
        let mut rgb = ffmpeg::frame::Video::empty();
        if let Err(e) = self.scaler.run(decoded, &mut rgb) {
            return Err(self.decode_err(format!("scale frame to RGB: {e}")));
        }
        let (pixels, width, height) =
            frame_to_pixels(&rgb).map_err(|reason| self.decode_err(reason))?;
        Frame::from_rgb(pixels, width, height)
    }
}

impl FrameSource for FfmpegSource {
    fn properties(&self) -> &VideoProperties {
        &self.properties
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let mut decoded = ffmpeg::frame::Video::empty();
        loop {
            if self.decoder.receive_frame(&mut decoded).is_ok() {
                let frame = self.convert(&decoded)?;
                self.index += 1;
                return Ok(Some(frame));
            }
            if self.flushed {
                return Ok(None);
            }

            let sent = match self.input.packets().next() {
                Some((stream, packet)) => {
                    if stream.index() != self.stream_index {
                        continue;
                    }
                    self.decoder.send_packet(&packet)
                }
                None => {
                    self.flushed = true;
                    self.decoder.send_eof()
                }
            };
            if let Err(e) = sent {
                return Err(self.decode_err(e.to_string()));
            }
        }
    }
}

fn stream_frame_rate(rate: Rational) -> Option<FrameRate> {
    let (num, den) = (rate.numerator(), rate.denominator());
    if num > 0 && den > 0 {
        Some(FrameRate::new(num as u32, den as u32))
    } else {
        None
    }
}

fn frame_to_pixels(frame: &ffmpeg::frame::Video) -> std::result::Result<(Vec<u8>, u32, u32), String> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = width as usize * 3;
    let stride = frame.stride(0);
    let data = frame.data(0);

    if stride == row_bytes {
        return Ok((data[..row_bytes * height as usize].to_vec(), width, height));
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        pixels.extend_from_slice(
            data.get(start..start + row_bytes)
                .ok_or_else(|| "decoded row is out of bounds".to_string())?,
        );
    }
    Ok((pixels, width, height))
}

// ----------------------------------------------------------------------------
// Sink
// ----------------------------------------------------------------------------

pub(crate) struct FfmpegSink {
    path: PathBuf,
    output: ffmpeg::format::context::Output,
    encoder: ffmpeg::encoder::video::Encoder,
    scaler: scaling::Context,
    stream_index: usize,
    encoder_time_base: Rational,
    width: u32,
    height: u32,
    next_pts: i64,
    finished: bool,
}

impl FfmpegSink {
    pub(crate) fn create(path: &Path, properties: &VideoProperties) -> Result<Self> {
        let sink_err = |reason: String| Error::SinkOpen {
            path: path.to_path_buf(),
            reason,
        };
        init().map_err(|e| sink_err(format!("initialize ffmpeg: {e}")))?;

        let (width, height) = (properties.width, properties.height);
        let rate = if properties.frame_rate.is_valid() {
            properties.frame_rate
        } else {
            FrameRate::new(25, 1)
        };
        let frame_rate = Rational::new(rate.num as i32, rate.den as i32);
        let time_base = frame_rate.invert();

        let mut output = ffmpeg::format::output(&path).map_err(|e| sink_err(e.to_string()))?;
        let codec = ffmpeg::encoder::find(ffmpeg::codec::Id::MPEG4)
            .ok_or_else(|| sink_err("MPEG-4 encoder unavailable".to_string()))?;
        let global_header = output
            .format()
            .flags()
            .contains(ffmpeg::format::Flags::GLOBAL_HEADER);

        let mut stream = output
            .add_stream(codec)
            .map_err(|e| sink_err(format!("add stream: {e}")))?;
        let stream_index = stream.index();

        let mut encoder = ffmpeg::codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()
            .map_err(|e| sink_err(format!("create encoder: {e}")))?;
        encoder.set_width(width);
        encoder.set_height(height);
        encoder.set_format(Pixel::YUV420P);
        encoder.set_time_base(time_base);
        encoder.set_frame_rate(Some(frame_rate));
        if global_header {
            encoder.set_flags(ffmpeg::codec::Flags::GLOBAL_HEADER);
        }
        let encoder = encoder
            .open_as(codec)
            .map_err(|e| sink_err(format!("open encoder: {e}")))?;
        stream.set_parameters(&encoder);
        stream.set_time_base(time_base);

        output
            .write_header()
            .map_err(|e| sink_err(format!("write header: {e}")))?;

        let scaler = scaling::Context::get(
            Pixel::RGB24,
            width,
            height,
            Pixel::YUV420P,
            width,
            height,
            Flags::BILINEAR,
        )
        .map_err(|e| sink_err(format!("create scaler: {e}")))?;

        Ok(Self {
            path: path.to_path_buf(),
            output,
            encoder,
            scaler,
            stream_index,
            encoder_time_base: time_base,
            width,
            height,
            next_pts: 0,
            finished: false,
        })
    }

    fn encode_err(&self, reason: impl Into<String>) -> Error {
        Error::Encode {
            path: self.path.clone(),
            index: self.next_pts as u64,
            reason: reason.into(),
        }
    }

    fn write_packets(&mut self) -> Result<()> {
        let stream_time_base = self
            .output
            .stream(self.stream_index)
            .map(|stream| stream.time_base())
            .unwrap_or(self.encoder_time_base);
        let mut packet = ffmpeg::Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(self.stream_index);
            packet.rescale_ts(self.encoder_time_base, stream_time_base);
            if let Err(e) = packet.write_interleaved(&mut self.output) {
                return Err(self.encode_err(format!("write packet: {e}")));
            }
        }
        Ok(())
    }

    fn finalize(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        if let Err(e) = self.encoder.send_eof() {
            return Err(self.encode_err(format!("flush encoder: {e}")));
        }
        self.write_packets()?;
        if let Err(e) = self.output.write_trailer() {
            return Err(self.encode_err(format!("write trailer: {e}")));
        }
        Ok(())
    }
}

impl FrameSink for FfmpegSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        if frame.width() != self.width || frame.height() != self.height {
            return Err(self.encode_err(format!(
                "frame is {}x{}, stream is {}x{}",
                frame.width(),
                frame.height(),
                self.width,
                self.height
            )));
        }

        let mut rgb = ffmpeg::frame::Video::new(Pixel::RGB24, self.width, self.height);
        let row_bytes = self.width as usize * 3;
        let stride = rgb.stride(0);
        let plane = rgb.data_mut(0);
        for (row, src) in frame.pixels().chunks_exact(row_bytes).enumerate() {
            plane[row * stride..row * stride + row_bytes].copy_from_slice(src);
        }

        let mut yuv = ffmpeg::frame::Video::empty();
        if let Err(e) = self.scaler.run(&rgb, &mut yuv) {
            return Err(self.encode_err(format!("scale frame to YUV: {e}")));
        }
        yuv.set_pts(Some(self.next_pts));

        if let Err(e) = self.encoder.send_frame(&yuv) {
            return Err(self.encode_err(e.to_string()));
        }
        self.next_pts += 1;
        self.write_packets()
    }

    fn finish(&mut self) -> Result<()> {
        self.finalize()
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        if let Err(e) = self.finalize() {
            log::warn!("{}: {}", self.path.display(), e);
        }
    }
}
