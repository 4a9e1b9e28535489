use anyhow::Result;

use crate::detect::result::Detection;
use crate::frame::Frame;
use crate::render::{self, OverlayStyle};

/// Detector backend trait.
///
/// The video processor depends only on this trait, so any model runtime that can
/// turn a frame into detections can be dropped in without touching the frame loop.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame.
    ///
    /// Results must be deterministic for identical weights, threshold and device.
    /// No ordering among the returned detections is implied.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;

    /// Render detections onto a copy of `frame`. The input frame is never modified.
    fn draw_detections(
        &self,
        frame: &Frame,
        detections: &[Detection],
        style: &OverlayStyle,
    ) -> Frame {
        render::draw_detections(frame, detections, style)
    }

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<B: DetectorBackend + ?Sized> DetectorBackend for Box<B> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        (**self).detect(frame)
    }

    fn draw_detections(
        &self,
        frame: &Frame,
        detections: &[Detection],
        style: &OverlayStyle,
    ) -> Frame {
        (**self).draw_detections(frame, detections, style)
    }

    fn warm_up(&mut self) -> Result<()> {
        (**self).warm_up()
    }
}
