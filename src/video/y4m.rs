//! YUV4MPEG2 reader and writer.
//!
//! Reads 4:2:0 (any siting), 4:2:2, 4:4:4 and mono streams. Writes 4:4:4 so
//! annotated frames keep full chroma. Conversion uses BT.601 limited range.
//! The format has no frame count field; `estimate_frame_count` derives one
//! from the file size.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, ErrorKind as IoErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::frame::{Frame, FrameRate, VideoProperties};
use crate::video::{FrameSink, FrameSource};

const MAGIC: &str = "YUV4MPEG2";
const FRAME_TAG: &str = "FRAME";
const MAX_HEADER_LEN: u64 = 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Chroma {
    C420,
    C422,
    C444,
    Mono,
}

impl Chroma {
    fn parse(tag: &str) -> Option<Self> {
        match tag {
            "420" | "420jpeg" | "420paldv" | "420mpeg2" => Some(Chroma::C420),
            "422" => Some(Chroma::C422),
            "444" => Some(Chroma::C444),
            "mono" => Some(Chroma::Mono),
            _ => None,
        }
    }

    /// Dimensions of one chroma plane.
    fn plane_size(self, width: usize, height: usize) -> (usize, usize) {
        match self {
            Chroma::C420 => (width.div_ceil(2), height.div_ceil(2)),
            Chroma::C422 => (width.div_ceil(2), height),
            Chroma::C444 => (width, height),
            Chroma::Mono => (0, 0),
        }
    }

    /// Bytes in one frame's planes, `None` when the size does not fit in `usize`.
    fn frame_bytes(self, width: usize, height: usize) -> Option<usize> {
        let (cw, ch) = self.plane_size(width, height);
        let chroma = cw.checked_mul(ch)?.checked_mul(2)?;
        width.checked_mul(height)?.checked_add(chroma)
    }
}

#[derive(Debug)]
struct Header {
    width: u32,
    height: u32,
    frame_rate: FrameRate,
    chroma: Chroma,
    frame_bytes: usize,
    /// Bytes including the trailing newline.
    len: u64,
}

fn read_header<R: BufRead>(reader: &mut R, path: &Path) -> Result<Header> {
    let open_err = |reason: String| Error::SourceOpen {
        path: path.to_path_buf(),
        reason,
    };

    let mut line = Vec::new();
    reader
        .take(MAX_HEADER_LEN)
        .read_until(b'\n', &mut line)
        .map_err(|e| open_err(e.to_string()))?;
    if line.last() != Some(&b'\n') {
        return Err(open_err("missing or oversized YUV4MPEG2 header".to_string()));
    }
    let len = line.len() as u64;
    let text = std::str::from_utf8(&line[..line.len() - 1])
        .map_err(|_| open_err("header is not ASCII".to_string()))?;

    let mut tokens = text.split(' ').filter(|t| !t.is_empty());
    if tokens.next() != Some(MAGIC) {
        return Err(open_err("not a YUV4MPEG2 stream".to_string()));
    }

    let mut width = None;
    let mut height = None;
    let mut frame_rate = None;
    let mut chroma = Chroma::C420;
    for token in tokens {
        let mut chars = token.chars();
        let tag = chars.next();
        let value = chars.as_str();
        match tag {
            Some('W') => width = value.parse::<u32>().ok(),
            Some('H') => height = value.parse::<u32>().ok(),
            Some('F') => frame_rate = parse_ratio(value).map(|(n, d)| FrameRate::new(n, d)),
            Some('C') => {
                chroma = Chroma::parse(value)
                    .ok_or_else(|| open_err(format!("unsupported chroma '{value}'")))?
            }
            // Interlacing, aspect ratio and extensions do not affect decoding.
            _ => {}
        }
    }

    let (width, height) = match (width, height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err(open_err("header lacks valid W/H".to_string())),
    };
    let frame_rate = match frame_rate {
        Some(rate) if rate.is_valid() => rate,
        _ => {
            log::debug!("{}: no usable frame rate in header, assuming 25", path.display());
            FrameRate::new(25, 1)
        }
    };
    let frame_bytes = chroma
        .frame_bytes(width as usize, height as usize)
        .ok_or_else(|| open_err("frame size overflows".to_string()))?;

    Ok(Header {
        width,
        height,
        frame_rate,
        chroma,
        frame_bytes,
        len,
    })
}

fn parse_ratio(value: &str) -> Option<(u32, u32)> {
    let (num, den) = value.split_once(':')?;
    Some((num.parse().ok()?, den.parse().ok()?))
}

/// Frame count implied by the file size, assuming frames without parameters.
pub fn estimate_frame_count(path: &Path) -> Result<u64> {
    let file = File::open(path).map_err(|e| Error::SourceOpen {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let file_len = file
        .metadata()
        .map_err(|e| Error::SourceOpen {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?
        .len();
    let header = read_header(&mut BufReader::new(file), path)?;
    Ok(frame_count_for(&header, file_len))
}

fn frame_count_for(header: &Header, file_len: u64) -> u64 {
    let per_frame = ((FRAME_TAG.len() + 1) as u64).saturating_add(header.frame_bytes as u64);
    file_len.saturating_sub(header.len) / per_frame
}

// ----------------------------------------------------------------------------
// Reader
// ----------------------------------------------------------------------------

pub struct Y4mSource {
    path: PathBuf,
    reader: BufReader<File>,
    properties: VideoProperties,
    chroma: Chroma,
    frame_bytes: usize,
    /// Sized on the first FRAME marker.
    buffer: Vec<u8>,
    index: u64,
}

impl Y4mSource {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| Error::SourceOpen {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let file_len = file
            .metadata()
            .map_err(|e| Error::SourceOpen {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?
            .len();
        let mut reader = BufReader::new(file);
        let header = read_header(&mut reader, path)?;
        // A stream with frame data must hold at least one full frame.
        if file_len > header.len && header.frame_bytes as u64 > file_len {
            return Err(Error::SourceOpen {
                path: path.to_path_buf(),
                reason: format!(
                    "frame size {} exceeds file size {file_len}",
                    header.frame_bytes
                ),
            });
        }

        let properties = VideoProperties {
            width: header.width,
            height: header.height,
            frame_rate: header.frame_rate,
            frame_count: frame_count_for(&header, file_len),
        };
        log::debug!(
            "opened {} ({}x{} @ {} fps, {:?})",
            path.display(),
            properties.width,
            properties.height,
            properties.frame_rate,
            header.chroma
        );

        Ok(Self {
            path: path.to_path_buf(),
            reader,
            properties,
            chroma: header.chroma,
            frame_bytes: header.frame_bytes,
            buffer: Vec::new(),
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

    fn to_rgb(&self) -> Vec<u8> {
        let width = self.properties.width as usize;
        let height = self.properties.height as usize;
        let (cw, ch) = self.chroma.plane_size(width, height);
        let luma = &self.buffer[..width * height];
        let u_plane = &self.buffer[width * height..width * height + cw * ch];
        let v_plane = &self.buffer[width * height + cw * ch..];

        let mut rgb = Vec::with_capacity(width * height * 3);
        for y in 0..height {
            for x in 0..width {
                let (u, v) = if self.chroma == Chroma::Mono {
                    (128, 128)
                } else {
                    let cx = x * cw / width;
                    let cy = y * ch / height;
                    (u_plane[cy * cw + cx], v_plane[cy * cw + cx])
                };
                rgb.extend_from_slice(&yuv_to_rgb(luma[y * width + x], u, v));
            }
        }
        rgb
    }
}

impl FrameSource for Y4mSource {
    fn properties(&self) -> &VideoProperties {
        &self.properties
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let mut tag = Vec::new();
        let result = (&mut self.reader)
            .take(MAX_HEADER_LEN)
            .read_until(b'\n', &mut tag);
        let read = match result {
            Ok(read) => read,
            Err(e) => return Err(self.decode_err(e.to_string())),
        };
        if read == 0 {
            return Ok(None);
        }
        if !tag.starts_with(FRAME_TAG.as_bytes()) || tag.last() != Some(&b'\n') {
            return Err(self.decode_err("missing FRAME marker"));
        }
        if self.buffer.len() != self.frame_bytes {
            self.buffer.resize(self.frame_bytes, 0);
        }

        if let Err(e) = self.reader.read_exact(&mut self.buffer) {
            let reason = if e.kind() == IoErrorKind::UnexpectedEof {
                "truncated frame data".to_string()
            } else {
                e.to_string()
            };
            return Err(self.decode_err(reason));
        }

        let frame = Frame::from_rgb(self.to_rgb(), self.properties.width, self.properties.height)?;
        self.index += 1;
        Ok(Some(frame))
    }
}

// ----------------------------------------------------------------------------
// Writer
// ----------------------------------------------------------------------------

pub struct Y4mSink {
    path: PathBuf,
    writer: BufWriter<File>,
    width: u32,
    height: u32,
    planes: Vec<u8>,
    index: u64,
}

impl Y4mSink {
    pub fn create(path: &Path, properties: &VideoProperties) -> Result<Self> {
        let sink_err = |reason: String| Error::SinkOpen {
            path: path.to_path_buf(),
            reason,
        };
        if properties.width == 0 || properties.height == 0 {
            return Err(sink_err("zero-sized frames".to_string()));
        }
        let rate = if properties.frame_rate.is_valid() {
            properties.frame_rate
        } else {
            FrameRate::new(25, 1)
        };

        let file = File::create(path).map_err(|e| sink_err(e.to_string()))?;
        let mut writer = BufWriter::new(file);
        writeln!(
            writer,
            "{MAGIC} W{} H{} F{}:{} Ip A1:1 C444",
            properties.width, properties.height, rate.num, rate.den
        )
        .map_err(|e| sink_err(e.to_string()))?;

        Ok(Self {
            path: path.to_path_buf(),
            writer,
            width: properties.width,
            height: properties.height,
            planes: Vec::with_capacity(properties.width as usize * properties.height as usize * 3),
            index: 0,
        })
    }

    fn encode_err(&self, reason: impl Into<String>) -> Error {
        Error::Encode {
            path: self.path.clone(),
            index: self.index,
            reason: reason.into(),
        }
    }
}

impl FrameSink for Y4mSink {
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

        let pixels = frame.pixels();
        let count = pixels.len() / 3;
        self.planes.clear();
        self.planes.resize(count * 3, 0);
        for (i, px) in pixels.chunks_exact(3).enumerate() {
            let [y, u, v] = rgb_to_yuv(px[0], px[1], px[2]);
            self.planes[i] = y;
            self.planes[count + i] = u;
            self.planes[2 * count + i] = v;
        }

        let mut write = || -> std::io::Result<()> {
            self.writer.write_all(FRAME_TAG.as_bytes())?;
            self.writer.write_all(b"\n")?;
            self.writer.write_all(&self.planes)
        };
        if let Err(e) = write() {
            return Err(self.encode_err(e.to_string()));
        }
        self.index += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer
            .flush()
            .map_err(|e| self.encode_err(e.to_string()))
    }
}

// ----------------------------------------------------------------------------
// BT.601 limited-range conversion
// ----------------------------------------------------------------------------

fn clamp_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = 1.164 * (y as f32 - 16.0);
    let d = u as f32 - 128.0;
    let e = v as f32 - 128.0;
    [
        clamp_u8(c + 1.596 * e),
        clamp_u8(c - 0.392 * d - 0.813 * e),
        clamp_u8(c + 2.017 * d),
    ]
}

fn rgb_to_yuv(r: u8, g: u8, b: u8) -> [u8; 3] {
    let (r, g, b) = (r as f32, g as f32, b as f32);
    [
        clamp_u8(16.0 + 0.257 * r + 0.504 * g + 0.098 * b),
        clamp_u8(128.0 - 0.148 * r - 0.291 * g + 0.439 * b),
        clamp_u8(128.0 + 0.439 * r - 0.368 * g - 0.071 * b),
    ]
}
