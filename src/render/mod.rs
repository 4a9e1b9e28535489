//! Overlay rendering: boxes, label backgrounds, labels and the frame counter.
//!
//! All functions hand back a new `Frame`; callers never observe in-place edits
//! of a frame they still hold.

pub mod font;

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

use crate::config::VisualizationSettings;
use crate::detect::{BoundingBox, Detection};
use crate::frame::Frame;

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const DEFAULT_COLOR: [u8; 3] = [255, 255, 255];
const FRAME_COUNTER_ORIGIN: (i32, i32) = (10, 30);
const FRAME_COUNTER_SCALE: f32 = 0.7;

/// Per-class box colors (RGB). Classes not listed use white.
const CLASS_COLORS: &[(&str, [u8; 3])] = &[
    ("person", [0, 255, 0]),
    ("car", [255, 165, 0]),
    ("truck", [0, 0, 255]),
    ("bus", [0, 165, 255]),
    ("motorcycle", [255, 0, 0]),
    ("bicycle", [255, 0, 255]),
];

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OverlayStyle {
    /// Box line thickness in pixels.
    pub thickness: u32,
    /// Label size, on the OpenCV font-scale convention.
    pub font_scale: f32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            thickness: 2,
            font_scale: 0.6,
        }
    }
}

impl From<&VisualizationSettings> for OverlayStyle {
    fn from(settings: &VisualizationSettings) -> Self {
        Self {
            thickness: settings.box_thickness,
            font_scale: settings.font_scale,
        }
    }
}

pub fn class_color(class_name: &str) -> [u8; 3] {
    CLASS_COLORS
        .iter()
        .find(|(name, _)| *name == class_name)
        .map(|(_, color)| *color)
        .unwrap_or(DEFAULT_COLOR)
}

/// Draw boxes and labels for `detections` onto a copy of `frame`.
///
/// Boxes are clamped to the frame first. Boxes that are degenerate
/// (`x1 >= x2` or `y1 >= y2`) before or after clamping are skipped.
pub fn draw_detections(frame: &Frame, detections: &[Detection], style: &OverlayStyle) -> Frame {
    let mut image = frame.to_image();
    let scale = font::pixel_scale(style.font_scale);

    for det in detections {
        let bbox = det.bbox.clamped(image.width(), image.height());
        if !det.bbox.is_valid() || !bbox.is_valid() {
            log::debug!("skipping degenerate box {:?} ({})", det.bbox, det.class_name);
            continue;
        }
        let color = Rgb(class_color(&det.class_name));
        draw_box(&mut image, &bbox, style.thickness, color);

        let label = det.label();
        let (text_w, text_h) = font::text_size(&label, scale);
        let BoundingBox { x1, y1, .. } = bbox;
        fill_rect(
            &mut image,
            x1,
            y1.saturating_sub(to_i32(text_h)).saturating_sub(10),
            x1.saturating_add(to_i32(text_w)).saturating_add(5),
            y1,
            color,
        );
        font::draw_text(&mut image, x1, y1.saturating_sub(5), &label, scale, WHITE);
    }

    Frame::from_image(image)
}

/// Stamp `Frame: <index>` in the top-left corner.
pub fn draw_frame_counter(frame: Frame, index: u64) -> Frame {
    let mut image = frame.into_image();
    let (x, baseline) = FRAME_COUNTER_ORIGIN;
    font::draw_text(
        &mut image,
        x,
        baseline,
        &format!("Frame: {index}"),
        font::pixel_scale(FRAME_COUNTER_SCALE),
        WHITE,
    );
    Frame::from_image(image)
}

fn to_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

// `bbox` must already lie inside the image.
fn draw_box(image: &mut RgbImage, bbox: &BoundingBox, thickness: u32, color: Rgb<u8>) {
    for inset in 0..to_i32(thickness.max(1)) {
        let width = bbox.width() + 1 - 2 * inset;
        let height = bbox.height() + 1 - 2 * inset;
        if width <= 0 || height <= 0 {
            break;
        }
        let rect = Rect::at(bbox.x1 + inset, bbox.y1 + inset).of_size(width as u32, height as u32);
        draw_hollow_rect_mut(image, rect, color);
    }
}

// Corners are inclusive; the rectangle is cut to the image.
fn fill_rect(image: &mut RgbImage, left: i32, top: i32, right: i32, bottom: i32, color: Rgb<u8>) {
    let left = left.max(0);
    let top = top.max(0);
    let right = right.min(to_i32(image.width()) - 1);
    let bottom = bottom.min(to_i32(image.height()) - 1);
    if right < left || bottom < top {
        return;
    }
    let rect = Rect::at(left, top).of_size((right - left + 1) as u32, (bottom - top + 1) as u32);
    draw_filled_rect_mut(image, rect, color);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person(bbox: BoundingBox) -> Detection {
        Detection::new(bbox, 0.91, 0, "person")
    }

    #[test]
    fn returns_new_frame_and_keeps_input() {
        let frame = Frame::filled(64, 64, [0, 0, 0]);
        let annotated = draw_detections(
            &frame,
            &[person(BoundingBox::new(10, 30, 50, 60))],
            &OverlayStyle::default(),
        );
        assert!(frame.pixels().iter().all(|&p| p == 0));
        assert_ne!(annotated, frame);
        assert_eq!(annotated.width(), 64);
        assert_eq!(annotated.height(), 64);
    }

    #[test]
    fn box_edges_use_class_color() {
        let frame = Frame::filled(64, 64, [0, 0, 0]);
        let style = OverlayStyle {
            thickness: 2,
            font_scale: 0.3,
        };
        let annotated = draw_detections(&frame, &[person(BoundingBox::new(10, 30, 50, 60))], &style);
        let green = Some([0, 255, 0]);
        assert_eq!(annotated.pixel(10, 45), green);
        assert_eq!(annotated.pixel(11, 45), green);
        assert_eq!(annotated.pixel(50, 45), green);
        assert_eq!(annotated.pixel(30, 60), green);
        // Interior stays untouched past the line thickness.
        assert_eq!(annotated.pixel(30, 45), Some([0, 0, 0]));
    }

    #[test]
    fn label_background_sits_above_box() {
        let frame = Frame::filled(80, 80, [0, 0, 0]);
        let det = Detection::new(BoundingBox::new(20, 40, 70, 70), 0.5, 2, "car");
        let annotated = draw_detections(&frame, &[det], &OverlayStyle::default());
        // Background fill spans from y1 - text_h - 10 up to y1; the far right column
        // of the fill is padding, so it carries the class color, not text.
        let (text_w, _) = font::text_size("car 0.50", font::pixel_scale(0.6));
        let pad_x = (20 + text_w as i32 + 4) as u32;
        assert_eq!(annotated.pixel(pad_x.min(79), 39), Some([255, 165, 0]));
    }

    #[test]
    fn unknown_class_falls_back_to_white() {
        assert_eq!(class_color("giraffe"), [255, 255, 255]);
        assert_eq!(class_color("truck"), [0, 0, 255]);
    }

    #[test]
    fn degenerate_and_offscreen_boxes_do_not_panic() {
        let frame = Frame::filled(16, 16, [5, 5, 5]);
        let dets = vec![
            person(BoundingBox::new(10, 10, 10, 12)),
            person(BoundingBox::new(-40, -40, 400, 400)),
            person(BoundingBox::new(14, 2, 15, 3)),
        ];
        let annotated = draw_detections(&frame, &dets, &OverlayStyle::default());
        assert_eq!(annotated.pixels().len(), frame.pixels().len());
    }

    #[test]
    fn extreme_coordinates_are_clamped() {
        let frame = Frame::filled(16, 16, [0, 0, 0]);
        let dets = vec![
            person(BoundingBox::new(0, 0, i32::MAX, 10)),
            person(BoundingBox::new(i32::MIN, i32::MIN, i32::MAX, i32::MAX)),
            person(BoundingBox::new(i32::MAX - 1, 4, i32::MAX, 8)),
        ];
        let style = OverlayStyle {
            thickness: u32::MAX,
            font_scale: 0.3,
        };
        let annotated = draw_detections(&frame, &dets, &style);
        assert_eq!(annotated.width(), 16);
        assert_eq!(annotated.height(), 16);
        // The first box ends at the right edge of the frame.
        assert_eq!(annotated.pixel(15, 10), Some([0, 255, 0]));
    }

    #[test]
    fn frame_counter_draws_white_text() {
        let frame = Frame::filled(120, 40, [0, 0, 0]);
        let stamped = draw_frame_counter(frame, 7);
        assert_eq!((stamped.width(), stamped.height()), (120, 40));
        let white = stamped
            .pixels()
            .chunks_exact(3)
            .filter(|px| px == &[255, 255, 255])
            .count();
        assert!(white > 0);
        // Nothing is drawn below the baseline.
        assert_eq!(stamped.pixel(10, 35), Some([0, 0, 0]));
    }
}
