//! Frame-by-frame annotation of video files.
//!
//! `VideoProcessor` streams a source through the detector, overlays the
//! results on sampled frames and writes every frame to a sink of identical
//! resolution and frame rate. Only frames whose zero-based index is a multiple
//! of `video.frame_skip` go through the detector; the rest are copied through
//! untouched, so the output always has as many frames as the input.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::DetectConfig;
use crate::detect::DetectorBackend;
use crate::error::{Error, Result};
use crate::frame::Frame;
use crate::progress::{ProcessSummary, ProgressObserver};
use crate::render::{self, OverlayStyle};
use crate::video::{self, FileVideoIo, VideoIo};

/// Outcome of a batch: one summary per finished file, one error per failed file.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub succeeded: Vec<ProcessSummary>,
    pub failed: Vec<(PathBuf, Error)>,
}

impl BatchReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn interrupted(&self) -> bool {
        self.failed
            .iter()
            .any(|(_, err)| matches!(err, Error::Interrupted { .. }))
    }
}

pub struct VideoProcessor<D, V = FileVideoIo> {
    config: Arc<DetectConfig>,
    detector: D,
    io: V,
    cancel: Option<Arc<AtomicBool>>,
}

impl<D: DetectorBackend> VideoProcessor<D, FileVideoIo> {
    pub fn new(config: Arc<DetectConfig>, detector: D) -> Self {
        Self {
            config,
            detector,
            io: FileVideoIo,
            cancel: None,
        }
    }
}

impl<D: DetectorBackend, V: VideoIo> VideoProcessor<D, V> {
    /// Swap the container backend.
    pub fn with_io<W: VideoIo>(self, io: W) -> VideoProcessor<D, W> {
        VideoProcessor {
            config: self.config,
            detector: self.detector,
            io,
            cancel: self.cancel,
        }
    }

    /// Stop between frames once `flag` is set.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn detector(&self) -> &D {
        &self.detector
    }

    /// `<video.output_path>/detected_<stem>.<ext>`.
    pub fn default_output_path(&self, input: &Path) -> PathBuf {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "video".to_string());
        let ext = self
            .config
            .video
            .output_extension
            .as_deref()
            .unwrap_or_else(|| video::default_output_extension(input));
        self.config
            .video
            .output_path
            .join(format!("detected_{stem}.{ext}"))
    }

    /// Declared frame count of `path`, without decoding frame content.
    ///
    /// Containers do not always declare an exact count; 0 means unknown.
    pub fn frame_count(&self, path: &Path) -> Result<u64> {
        if !self.io.exists(path) {
            return Err(Error::VideoNotFound(path.to_path_buf()));
        }
        self.io.probe_frame_count(path)
    }

    /// Annotate `input` and write the result to `output` (or the derived default).
    ///
    /// On error the sink is dropped, so whatever was written stays on disk as a
    /// truncated file. A missing input fails before any directory is created.
    pub fn process_video(
        &mut self,
        input: &Path,
        output: Option<&Path>,
        observer: &mut dyn ProgressObserver,
    ) -> Result<ProcessSummary> {
        if !self.io.exists(input) {
            return Err(Error::VideoNotFound(input.to_path_buf()));
        }
        let mut source = self.io.open_source(input)?;
        let properties = source.properties().clone();

        let output = match output {
            Some(path) => path.to_path_buf(),
            None => self.default_output_path(input),
        };
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| Error::SinkOpen {
                path: output.clone(),
                reason: format!("create {}: {e}", parent.display()),
            })?;
        }
        let mut sink = self.io.open_sink(&output, &properties)?;

        log::info!(
            "processing {} -> {} ({}x{} @ {} fps, {} frames)",
            input.display(),
            output.display(),
            properties.width,
            properties.height,
            properties.frame_rate,
            properties.frame_count
        );
        observer.on_start(input, &output, &properties);

        let frame_skip = u64::from(self.config.video.frame_skip.max(1));
        let style = OverlayStyle::from(&self.config.visualization);
        let mut summary = ProcessSummary {
            input: input.to_path_buf(),
            output,
            properties,
            frames_written: 0,
            frames_annotated: 0,
            detections: 0,
        };

        let mut index = 0u64;
        loop {
            if self.is_cancelled() {
                log::warn!("{}: interrupted after {} frames", input.display(), index);
                return Err(Error::Interrupted { frames: index });
            }
            let Some(frame) = source.next_frame()? else {
                break;
            };

            let sampled = index % frame_skip == 0;
            let (frame, found) = if sampled {
                self.annotate(frame, index, &style)?
            } else {
                (frame, 0)
            };
            sink.write_frame(&frame)?;

            summary.frames_written += 1;
            if sampled {
                summary.frames_annotated += 1;
                summary.detections += found as u64;
            }
            observer.on_frame(index, sampled, found);
            index += 1;
        }

        sink.finish()?;
        if summary.properties.frame_count > 0 && summary.properties.frame_count != index {
            log::debug!(
                "{}: container declared {} frames, decoded {}",
                input.display(),
                summary.properties.frame_count,
                index
            );
        }
        log::info!(
            "wrote {} frames to {} ({} annotated, {} detections)",
            summary.frames_written,
            summary.output.display(),
            summary.frames_annotated,
            summary.detections
        );
        observer.on_finish(&summary);
        Ok(summary)
    }

    /// Process each input in turn. Failures are recorded and the batch moves on;
    /// an interrupt ends the batch after the current file.
    ///
    /// With one input, `output` is the output file. With several it is the
    /// directory that receives `detected_<stem>.<ext>` files.
    pub fn process_batch(
        &mut self,
        inputs: &[PathBuf],
        output: Option<&Path>,
        observer: &mut dyn ProgressObserver,
    ) -> BatchReport {
        let mut report = BatchReport::default();
        for input in inputs {
            let target = match output {
                Some(path) if inputs.len() == 1 => Some(path.to_path_buf()),
                Some(dir) => self
                    .default_output_path(input)
                    .file_name()
                    .map(|name| dir.join(name)),
                None => None,
            };

            match self.process_video(input, target.as_deref(), observer) {
                Ok(summary) => report.succeeded.push(summary),
                Err(err) => {
                    log::error!("error processing {}: {}", input.display(), err);
                    observer.on_error(input, &err);
                    let stop = matches!(err, Error::Interrupted { .. });
                    report.failed.push((input.clone(), err));
                    if stop {
                        break;
                    }
                }
            }
        }
        report
    }

    fn annotate(&mut self, frame: Frame, index: u64, style: &OverlayStyle) -> Result<(Frame, usize)> {
        let detections = self
            .detector
            .detect(&frame)
            .map_err(|e| Error::Detection {
                index,
                reason: format!("{e:#}"),
            })?;
        log::trace!("frame {}: {} detections", index, detections.len());

        let visual = &self.config.visualization;
        if !visual.draw_boxes {
            return Ok((frame, detections.len()));
        }
        let mut annotated = self.detector.draw_detections(&frame, &detections, style);
        if visual.frame_counter {
            annotated = render::draw_frame_counter(annotated, index);
        }
        Ok((annotated, detections.len()))
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map(|flag| flag.load(Ordering::SeqCst))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::rc::Rc;

    use crate::detect::{BoundingBox, Detection, StubBackend};
    use crate::frame::{FrameRate, VideoProperties};
    use crate::video::{FrameSink, FrameSource};

    type Written = Rc<RefCell<HashMap<PathBuf, Vec<Frame>>>>;

    struct MemorySource {
        properties: VideoProperties,
        frames: std::vec::IntoIter<Frame>,
    }

    impl FrameSource for MemorySource {
        fn properties(&self) -> &VideoProperties {
            &self.properties
        }

        fn next_frame(&mut self) -> Result<Option<Frame>> {
            Ok(self.frames.next())
        }
    }

    struct MemorySink {
        path: PathBuf,
        written: Written,
    }

    impl FrameSink for MemorySink {
        fn write_frame(&mut self, frame: &Frame) -> Result<()> {
            self.written
                .borrow_mut()
                .entry(self.path.clone())
                .or_default()
                .push(frame.clone());
            Ok(())
        }

        fn finish(&mut self) -> Result<()> {
            Ok(())
        }
    }

    /// In-memory container: inputs are frame lists, `corrupt` inputs fail to open.
    #[derive(Default)]
    struct MemoryIo {
        inputs: HashMap<PathBuf, Vec<Frame>>,
        corrupt: Vec<PathBuf>,
        written: Written,
        sinks_opened: Rc<RefCell<u32>>,
    }

    impl MemoryIo {
        fn with_input(mut self, path: &str, frames: Vec<Frame>) -> Self {
            self.inputs.insert(PathBuf::from(path), frames);
            self
        }

        fn with_corrupt(mut self, path: &str) -> Self {
            self.corrupt.push(PathBuf::from(path));
            self
        }
    }

    impl VideoIo for MemoryIo {
        fn exists(&self, path: &Path) -> bool {
            self.inputs.contains_key(path) || self.corrupt.iter().any(|p| p == path)
        }

        fn open_source(&self, path: &Path) -> Result<Box<dyn FrameSource>> {
            let frames = self.inputs.get(path).cloned().ok_or_else(|| Error::SourceOpen {
                path: path.to_path_buf(),
                reason: "corrupt".to_string(),
            })?;
            Ok(Box::new(MemorySource {
                properties: VideoProperties {
                    width: 32,
                    height: 32,
                    frame_rate: FrameRate::new(30, 1),
                    frame_count: frames.len() as u64,
                },
                frames: frames.into_iter(),
            }))
        }

        fn open_sink(&self, path: &Path, _properties: &VideoProperties) -> Result<Box<dyn FrameSink>> {
            *self.sinks_opened.borrow_mut() += 1;
            Ok(Box::new(MemorySink {
                path: path.to_path_buf(),
                written: Rc::clone(&self.written),
            }))
        }
    }

    struct FailingBackend;

    impl DetectorBackend for FailingBackend {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn detect(&mut self, _frame: &Frame) -> anyhow::Result<Vec<Detection>> {
            anyhow::bail!("model exploded")
        }
    }

    fn frames(n: usize) -> Vec<Frame> {
        (0..n).map(|i| Frame::filled(32, 32, [i as u8, 0, 0])).collect()
    }

    fn person() -> Detection {
        Detection::new(BoundingBox::new(4, 20, 28, 30), 0.9, 0, "person")
    }

    fn config_in(dir: &Path, frame_skip: u32, draw_boxes: bool) -> Arc<DetectConfig> {
        let mut config = DetectConfig::default();
        config.video.output_path = dir.to_path_buf();
        config.video.frame_skip = frame_skip;
        config.visualization.draw_boxes = draw_boxes;
        Arc::new(config)
    }

    struct Recorder {
        frames: Vec<(u64, bool)>,
        errors: Vec<PathBuf>,
        finished: u32,
    }

    impl ProgressObserver for Recorder {
        fn on_frame(&mut self, index: u64, annotated: bool, _detections: usize) {
            self.frames.push((index, annotated));
        }

        fn on_finish(&mut self, _summary: &ProcessSummary) {
            self.finished += 1;
        }

        fn on_error(&mut self, input: &Path, _error: &Error) {
            self.errors.push(input.to_path_buf());
        }
    }

    fn recorder() -> Recorder {
        Recorder {
            frames: Vec::new(),
            errors: Vec::new(),
            finished: 0,
        }
    }

    #[test]
    fn frame_skip_annotates_sampled_frames_only() {
        let dir = tempfile::tempdir().unwrap();
        let input = frames(5);
        let io = MemoryIo::default().with_input("in.mp4", input.clone());
        let written = Rc::clone(&io.written);
        let mut processor = VideoProcessor::new(
            config_in(dir.path(), 2, true),
            StubBackend::with_detections(vec![person()]),
        )
        .with_io(io);

        let mut observer = recorder();
        let summary = processor
            .process_video(Path::new("in.mp4"), None, &mut observer)
            .unwrap();

        assert_eq!(summary.frames_written, 5);
        assert_eq!(summary.frames_annotated, 3);
        assert_eq!(summary.detections, 3);
        assert_eq!(processor.detector().calls(), 3);
        assert_eq!(
            observer.frames,
            vec![(0, true), (1, false), (2, true), (3, false), (4, true)]
        );

        let written = written.borrow();
        let out = &written[&dir.path().join("detected_in.mp4")];
        assert_eq!(out.len(), 5);
        for (i, (got, original)) in out.iter().zip(&input).enumerate() {
            assert_eq!(got == original, i % 2 == 1, "frame {i}");
        }
    }

    #[test]
    fn disabled_drawing_still_runs_detector() {
        let dir = tempfile::tempdir().unwrap();
        let input = frames(3);
        let io = MemoryIo::default().with_input("in.mp4", input.clone());
        let written = Rc::clone(&io.written);
        let mut processor = VideoProcessor::new(
            config_in(dir.path(), 1, false),
            StubBackend::with_detections(vec![person()]),
        )
        .with_io(io);

        processor
            .process_video(Path::new("in.mp4"), None, &mut recorder())
            .unwrap();
        assert_eq!(processor.detector().calls(), 3);
        assert_eq!(written.borrow()[&dir.path().join("detected_in.mp4")], input);
    }

    #[test]
    fn missing_input_opens_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let io = MemoryIo::default();
        let sinks = Rc::clone(&io.sinks_opened);
        let mut processor =
            VideoProcessor::new(config_in(&dir.path().join("out"), 1, true), StubBackend::new())
                .with_io(io);

        let err = processor
            .process_video(Path::new("nope.mp4"), None, &mut recorder())
            .unwrap_err();
        assert!(matches!(err, Error::VideoNotFound(_)));
        assert_eq!(*sinks.borrow(), 0);
        assert!(!dir.path().join("out").exists());
        assert!(matches!(
            processor.frame_count(Path::new("nope.mp4")),
            Err(Error::VideoNotFound(_))
        ));
    }

    #[test]
    fn detector_failure_is_per_file_error() {
        let dir = tempfile::tempdir().unwrap();
        let io = MemoryIo::default().with_input("in.mp4", frames(2));
        let mut processor =
            VideoProcessor::new(config_in(dir.path(), 1, true), FailingBackend).with_io(io);
        let err = processor
            .process_video(Path::new("in.mp4"), None, &mut recorder())
            .unwrap_err();
        assert!(matches!(err, Error::Detection { index: 0, .. }));
        assert!(err.to_string().contains("model exploded"));
    }

    #[test]
    fn batch_continues_past_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let io = MemoryIo::default()
            .with_input("a.mp4", frames(2))
            .with_corrupt("b.mp4")
            .with_input("c.mp4", frames(3));
        let written = Rc::clone(&io.written);
        let mut processor =
            VideoProcessor::new(config_in(dir.path(), 1, true), StubBackend::new()).with_io(io);

        let inputs: Vec<PathBuf> = ["a.mp4", "b.mp4", "c.mp4"].iter().map(PathBuf::from).collect();
        let mut observer = recorder();
        let report = processor.process_batch(&inputs, None, &mut observer);

        assert_eq!(report.succeeded.len(), 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, PathBuf::from("b.mp4"));
        assert!(matches!(report.failed[0].1, Error::SourceOpen { .. }));
        assert_eq!(observer.errors, vec![PathBuf::from("b.mp4")]);
        assert_eq!(observer.finished, 2);
        assert_eq!(written.borrow()[&dir.path().join("detected_c.mp4")].len(), 3);
    }

    #[test]
    fn batch_output_is_directory_for_many_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let io = MemoryIo::default()
            .with_input("a.mp4", frames(1))
            .with_input("b.mp4", frames(1));
        let written = Rc::clone(&io.written);
        let mut processor =
            VideoProcessor::new(config_in(dir.path(), 1, true), StubBackend::new()).with_io(io);
        let target = dir.path().join("custom");

        let inputs = vec![PathBuf::from("a.mp4"), PathBuf::from("b.mp4")];
        let report = processor.process_batch(&inputs, Some(&target), &mut recorder());
        assert!(report.is_clean());
        let written = written.borrow();
        assert!(written.contains_key(&target.join("detected_a.mp4")));
        assert!(written.contains_key(&target.join("detected_b.mp4")));

        drop(written);
        let single = dir.path().join("one.mp4");
        let report = processor.process_batch(&inputs[..1], Some(&single), &mut recorder());
        assert_eq!(report.succeeded[0].output, single);
    }

    #[test]
    fn cancel_flag_stops_batch() {
        let dir = tempfile::tempdir().unwrap();
        let io = MemoryIo::default()
            .with_input("a.mp4", frames(2))
            .with_input("b.mp4", frames(2));
        let flag = Arc::new(AtomicBool::new(true));
        let mut processor = VideoProcessor::new(config_in(dir.path(), 1, true), StubBackend::new())
            .with_io(io)
            .with_cancel_flag(Arc::clone(&flag));

        let inputs = vec![PathBuf::from("a.mp4"), PathBuf::from("b.mp4")];
        let report = processor.process_batch(&inputs, None, &mut recorder());
        assert!(report.interrupted());
        assert_eq!(report.failed.len(), 1);
        assert!(report.succeeded.is_empty());
    }

    #[test]
    fn default_output_path_uses_configured_dir_and_extension() {
        let dir = tempfile::tempdir().unwrap();
        let processor = VideoProcessor::new(config_in(dir.path(), 1, true), StubBackend::new());
        assert_eq!(
            processor.default_output_path(Path::new("/videos/street.avi")),
            dir.path().join("detected_street.mp4")
        );
        assert_eq!(
            processor.default_output_path(Path::new("clip.y4m")),
            dir.path().join("detected_clip.y4m")
        );

        let mut config = DetectConfig::default();
        config.video.output_path = dir.path().to_path_buf();
        config.video.output_extension = Some("mkv".to_string());
        let processor = VideoProcessor::new(Arc::new(config), StubBackend::new());
        assert_eq!(
            processor.default_output_path(Path::new("clip.y4m")),
            dir.path().join("detected_clip.mkv")
        );
    }
}
