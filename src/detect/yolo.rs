//! Post-processing for YOLOv8-style detection heads.
//!
//! The head emits one column per candidate with `4 + C` attributes:
//! `cx, cy, w, h` in model-input pixels followed by `C` class scores.

use anyhow::{anyhow, Result};

use crate::detect::classes::class_name;
use crate::detect::result::{BoundingBox, Detection};

#[derive(Clone, Copy, Debug)]
pub struct DecodeParams {
    pub confidence_threshold: f32,
    /// Square model input edge in pixels.
    pub input_size: u32,
    pub frame_width: u32,
    pub frame_height: u32,
}

/// Decode raw head output into frame-space detections (before NMS).
///
/// `shape` may be `[1, 4 + C, N]` or `[1, N, 4 + C]`; the smaller axis is taken
/// to be the attribute axis.
pub fn decode_predictions(
    data: &[f32],
    shape: &[usize],
    params: &DecodeParams,
) -> Result<Vec<Detection>> {
    let (rows, cols) = match shape {
        [1, rows, cols] => (*rows, *cols),
        [rows, cols] => (*rows, *cols),
        _ => return Err(anyhow!("unexpected detection output shape {:?}", shape)),
    };
    if rows.checked_mul(cols) != Some(data.len()) {
        return Err(anyhow!(
            "output shape {:?} does not match {} values",
            shape,
            data.len()
        ));
    }

    let attrs_major = rows <= cols;
    let (attrs, candidates) = if attrs_major {
        (rows, cols)
    } else {
        (cols, rows)
    };
    if attrs <= 4 {
        return Err(anyhow!(
            "output has {} attributes per candidate; expected box + class scores",
            attrs
        ));
    }
    let value = |attr: usize, candidate: usize| {
        if attrs_major {
            data[attr * candidates + candidate]
        } else {
            data[candidate * attrs + attr]
        }
    };

    let scale_x = params.frame_width as f32 / params.input_size as f32;
    let scale_y = params.frame_height as f32 / params.input_size as f32;

    let mut detections = Vec::new();
    for i in 0..candidates {
        let (class_idx, score) = (4..attrs)
            .map(|attr| (attr - 4, value(attr, i)))
            .fold((0usize, f32::NEG_INFINITY), |best, current| {
                if current.1 > best.1 {
                    current
                } else {
                    best
                }
            });
        if !score.is_finite() || score < params.confidence_threshold {
            continue;
        }

        let (cx, cy, w, h) = (value(0, i), value(1, i), value(2, i), value(3, i));
        let bbox = BoundingBox::new(
            ((cx - w / 2.0) * scale_x).round() as i32,
            ((cy - h / 2.0) * scale_y).round() as i32,
            ((cx + w / 2.0) * scale_x).round() as i32,
            ((cy + h / 2.0) * scale_y).round() as i32,
        )
        .clamped(params.frame_width, params.frame_height);
        if !bbox.is_valid() {
            continue;
        }

        let class_id = class_idx as u32;
        detections.push(Detection {
            bbox,
            confidence: score.min(1.0),
            class_id,
            class_name: class_name(class_id).into_owned(),
        });
    }
    Ok(detections)
}

/// Class-aware non-maximum suppression. Output is sorted by descending confidence.
pub fn non_max_suppression(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<Detection> = Vec::with_capacity(detections.len());
    for det in detections {
        let overlaps = kept
            .iter()
            .any(|k| k.class_id == det.class_id && k.bbox.iou(&det.bbox) > iou_threshold);
        if !overlaps {
            kept.push(det);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> DecodeParams {
        DecodeParams {
            confidence_threshold: 0.5,
            input_size: 640,
            frame_width: 1280,
            frame_height: 640,
        }
    }

    // Two classes, three candidates, attribute-major layout.
    fn attrs_major_output() -> (Vec<f32>, Vec<usize>) {
        let cx = [320.0, 100.0, 500.0];
        let cy = [320.0, 100.0, 500.0];
        let w = [100.0, 20.0, 40.0];
        let h = [200.0, 20.0, 40.0];
        let person = [0.9, 0.2, 0.1];
        let bicycle = [0.1, 0.3, 0.7];
        let data = [cx, cy, w, h, person, bicycle].concat();
        (data, vec![1, 6, 3])
    }

    #[test]
    fn decodes_attribute_major_output() {
        let (data, shape) = attrs_major_output();
        let dets = decode_predictions(&data, &shape, &params()).unwrap();
        assert_eq!(dets.len(), 2);

        assert_eq!(dets[0].class_name, "person");
        assert_eq!(dets[0].bbox, BoundingBox::new(540, 220, 740, 420));
        assert!((dets[0].confidence - 0.9).abs() < 1e-6);

        assert_eq!(dets[1].class_name, "bicycle");
        assert_eq!(dets[1].class_id, 1);
    }

    #[test]
    fn decodes_candidate_major_output() {
        let (data, _) = attrs_major_output();
        let mut transposed = vec![0.0; data.len()];
        for attr in 0..6 {
            for cand in 0..3 {
                transposed[cand * 6 + attr] = data[attr * 3 + cand];
            }
        }
        // 3 candidates x 6 attrs is ambiguous by size, so pad to 8 candidates.
        let mut padded = transposed;
        padded.extend(std::iter::repeat(0.0).take(5 * 6));
        let dets = decode_predictions(&padded, &[1, 8, 6], &params()).unwrap();
        assert_eq!(dets.len(), 2);
        assert_eq!(dets[0].class_name, "person");
    }

    #[test]
    fn rejects_mismatched_shape() {
        assert!(decode_predictions(&[0.0; 10], &[1, 6, 3], &params()).is_err());
        assert!(decode_predictions(&[0.0; 12], &[1, 4, 3], &params()).is_err());
    }

    #[test]
    fn nms_suppresses_same_class_overlap_only() {
        let a = Detection::new(BoundingBox::new(0, 0, 100, 100), 0.9, 0, "person");
        let b = Detection::new(BoundingBox::new(5, 5, 105, 105), 0.8, 0, "person");
        let c = Detection::new(BoundingBox::new(5, 5, 105, 105), 0.7, 2, "car");
        let d = Detection::new(BoundingBox::new(300, 300, 400, 400), 0.6, 0, "person");

        let kept = non_max_suppression(vec![d.clone(), b, c.clone(), a.clone()], 0.45);
        assert_eq!(kept, vec![a, c, d]);
    }
}
