use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub const DEFAULT_CONFIG_PATH: &str = "configs/config.toml";
const DEFAULT_DEVICE: &str = "cpu";
const DEFAULT_BACKEND: &str = "tract";
const DEFAULT_MODEL: &str = "yolov8m.onnx";
const DEFAULT_CONFIDENCE: f32 = 0.5;
const DEFAULT_IOU_THRESHOLD: f32 = 0.45;
const DEFAULT_INPUT_SIZE: u32 = 640;
const DEFAULT_INPUT_DIR: &str = "data/input_videos";
const DEFAULT_OUTPUT_DIR: &str = "data/output_videos";
const DEFAULT_FRAME_SKIP: u32 = 1;
const DEFAULT_BOX_THICKNESS: u32 = 2;
const DEFAULT_FONT_SCALE: f32 = 0.6;

pub const KNOWN_BACKENDS: &[&str] = &["stub", "tract"];

#[derive(Debug, Deserialize, Default)]
struct DetectConfigFile {
    device: Option<String>,
    detection: Option<DetectionConfigFile>,
    video: Option<VideoConfigFile>,
    visualization: Option<VisualizationConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectionConfigFile {
    backend: Option<String>,
    model: Option<PathBuf>,
    confidence: Option<f32>,
    iou_threshold: Option<f32>,
    input_size: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct VideoConfigFile {
    input_path: Option<PathBuf>,
    output_path: Option<PathBuf>,
    frame_skip: Option<u32>,
    output_extension: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct VisualizationConfigFile {
    draw_boxes: Option<bool>,
    box_thickness: Option<u32>,
    font_scale: Option<f32>,
    frame_counter: Option<bool>,
}

/// Resolved settings. Built once at startup and shared read-only.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectConfig {
    /// Compute device identifier ("cpu", "cuda", ...).
    pub device: String,
    pub detection: DetectionSettings,
    pub video: VideoSettings,
    pub visualization: VisualizationSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectionSettings {
    pub backend: String,
    pub model: PathBuf,
    pub confidence: f32,
    pub iou_threshold: f32,
    pub input_size: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoSettings {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    /// Annotate every `frame_skip`-th frame; always >= 1.
    pub frame_skip: u32,
    pub output_extension: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VisualizationSettings {
    pub draw_boxes: bool,
    pub box_thickness: u32,
    pub font_scale: f32,
    pub frame_counter: bool,
}

impl Default for DetectConfig {
    fn default() -> Self {
        Self::from_file(DetectConfigFile::default())
    }
}

impl DetectConfig {
    /// Load a config file, apply environment overrides and validate.
    ///
    /// `.json` files are parsed as JSON, everything else as TOML.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::ConfigNotFound(path.to_path_buf()));
        }
        let file_cfg = read_config_file(path)?;
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env(path)?;
        cfg.validate(path)?;
        log::debug!("loaded config from {}", path.display());
        Ok(cfg)
    }

    /// Parse a TOML document without touching the filesystem or environment.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let file: DetectConfigFile = toml::from_str(raw)
            .map_err(|e| Error::invalid_config("<inline>", e.to_string()))?;
        let cfg = Self::from_file(file);
        cfg.validate(Path::new("<inline>"))?;
        Ok(cfg)
    }

    /// Override the detection threshold (CLI `--confidence`).
    pub fn with_confidence(mut self, confidence: f32) -> Result<Self> {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(Error::invalid_config(
                "--confidence",
                format!("confidence must be within [0, 1], got {confidence}"),
            ));
        }
        self.detection.confidence = confidence;
        Ok(self)
    }

    fn from_file(file: DetectConfigFile) -> Self {
        let detection = file.detection.unwrap_or_default();
        let video = file.video.unwrap_or_default();
        let visualization = file.visualization.unwrap_or_default();
        Self {
            device: file.device.unwrap_or_else(|| DEFAULT_DEVICE.to_string()),
            detection: DetectionSettings {
                backend: detection
                    .backend
                    .unwrap_or_else(|| DEFAULT_BACKEND.to_string()),
                model: detection
                    .model
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL)),
                confidence: detection.confidence.unwrap_or(DEFAULT_CONFIDENCE),
                iou_threshold: detection.iou_threshold.unwrap_or(DEFAULT_IOU_THRESHOLD),
                input_size: detection.input_size.unwrap_or(DEFAULT_INPUT_SIZE),
            },
            video: VideoSettings {
                input_path: video
                    .input_path
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_INPUT_DIR)),
                output_path: video
                    .output_path
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
                frame_skip: video.frame_skip.unwrap_or(DEFAULT_FRAME_SKIP),
                output_extension: video
                    .output_extension
                    .map(|ext| ext.trim_start_matches('.').to_string()),
            },
            visualization: VisualizationSettings {
                draw_boxes: visualization.draw_boxes.unwrap_or(true),
                box_thickness: visualization
                    .box_thickness
                    .unwrap_or(DEFAULT_BOX_THICKNESS),
                font_scale: visualization.font_scale.unwrap_or(DEFAULT_FONT_SCALE),
                frame_counter: visualization.frame_counter.unwrap_or(true),
            },
        }
    }

    fn apply_env(&mut self, path: &Path) -> Result<()> {
        if let Ok(device) = std::env::var("DETECT_DEVICE") {
            if !device.trim().is_empty() {
                self.device = device.trim().to_string();
            }
        }
        if let Ok(model) = std::env::var("DETECT_MODEL") {
            if !model.trim().is_empty() {
                self.detection.model = PathBuf::from(model.trim());
            }
        }
        if let Ok(confidence) = std::env::var("DETECT_CONFIDENCE") {
            self.detection.confidence = confidence.trim().parse().map_err(|_| {
                Error::invalid_config(path, "DETECT_CONFIDENCE must be a number")
            })?;
        }
        if let Ok(skip) = std::env::var("DETECT_FRAME_SKIP") {
            self.video.frame_skip = skip.trim().parse().map_err(|_| {
                Error::invalid_config(path, "DETECT_FRAME_SKIP must be a positive integer")
            })?;
        }
        Ok(())
    }

    fn validate(&self, path: &Path) -> Result<()> {
        let fail = |reason: String| Err(Error::invalid_config(path, reason));

        if self.device.trim().is_empty() {
            return fail("device must not be empty".to_string());
        }
        if !KNOWN_BACKENDS.contains(&self.detection.backend.as_str()) {
            return fail(format!(
                "unknown detection.backend '{}' (expected one of {})",
                self.detection.backend,
                KNOWN_BACKENDS.join(", ")
            ));
        }
        if !(0.0..=1.0).contains(&self.detection.confidence) {
            return fail(format!(
                "detection.confidence must be within [0, 1], got {}",
                self.detection.confidence
            ));
        }
        if !(0.0..=1.0).contains(&self.detection.iou_threshold) {
            return fail(format!(
                "detection.iou_threshold must be within [0, 1], got {}",
                self.detection.iou_threshold
            ));
        }
        if self.detection.input_size < 32 || self.detection.input_size % 32 != 0 {
            return fail(format!(
                "detection.input_size must be a multiple of 32, got {}",
                self.detection.input_size
            ));
        }
        if self.video.frame_skip == 0 {
            return fail("video.frame_skip must be at least 1".to_string());
        }
        if self.visualization.box_thickness == 0 {
            return fail("visualization.box_thickness must be at least 1".to_string());
        }
        if !(self.visualization.font_scale > 0.0) {
            return fail(format!(
                "visualization.font_scale must be positive, got {}",
                self.visualization.font_scale
            ));
        }
        if let Some(ext) = &self.video.output_extension {
            if ext.is_empty() || ext.contains(|c| c == '/' || c == '\\') {
                return fail(format!("video.output_extension '{ext}' is not a file extension"));
            }
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<DetectConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| Error::invalid_config(path, format!("failed to read: {e}")))?;
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        serde_json::from_str(&raw).map_err(|e| Error::invalid_config(path, e.to_string()))
    } else {
        toml::from_str(&raw).map_err(|e| Error::invalid_config(path, e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = DetectConfig::default();
        assert_eq!(cfg.device, "cpu");
        assert_eq!(cfg.detection.backend, "tract");
        assert_eq!(cfg.detection.confidence, 0.5);
        assert_eq!(cfg.video.frame_skip, 1);
        assert_eq!(cfg.video.output_path, PathBuf::from("data/output_videos"));
        assert!(cfg.visualization.draw_boxes);
        assert_eq!(cfg.visualization.box_thickness, 2);
        assert_eq!(cfg.visualization.font_scale, 0.6);
    }

    #[test]
    fn parses_nested_sections() {
        let cfg = DetectConfig::from_toml_str(
            r#"
            device = "cuda"

            [detection]
            backend = "stub"
            model = "models/yolov8n.onnx"
            confidence = 0.35

            [video]
            frame_skip = 3
            output_extension = ".y4m"

            [visualization]
            draw_boxes = false
            "#,
        )
        .unwrap();
        assert_eq!(cfg.device, "cuda");
        assert_eq!(cfg.detection.backend, "stub");
        assert_eq!(cfg.detection.model, PathBuf::from("models/yolov8n.onnx"));
        assert_eq!(cfg.detection.confidence, 0.35);
        assert_eq!(cfg.video.frame_skip, 3);
        assert_eq!(cfg.video.output_extension.as_deref(), Some("y4m"));
        assert!(!cfg.visualization.draw_boxes);
        assert_eq!(cfg.visualization.box_thickness, 2);
    }

    #[test]
    fn rejects_out_of_range_values() {
        for raw in [
            "[detection]\nconfidence = 1.5",
            "[detection]\nbackend = \"yolo-magic\"",
            "[detection]\ninput_size = 100",
            "[video]\nframe_skip = 0",
            "[visualization]\nbox_thickness = 0",
            "[visualization]\nfont_scale = 0.0",
        ] {
            let err = DetectConfig::from_toml_str(raw).unwrap_err();
            assert!(matches!(err, Error::InvalidConfig { .. }), "{raw}");
        }
    }

    #[test]
    fn confidence_override_is_validated() {
        let cfg = DetectConfig::default().with_confidence(0.25).unwrap();
        assert_eq!(cfg.detection.confidence, 0.25);
        assert!(DetectConfig::default().with_confidence(-0.1).is_err());
    }

    #[test]
    fn missing_file_is_config_not_found() {
        let err = DetectConfig::load(Path::new("/nonexistent/config.toml")).unwrap_err();
        assert!(matches!(err, Error::ConfigNotFound(_)));
    }
}
