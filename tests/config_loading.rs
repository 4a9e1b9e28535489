use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tempfile::{Builder, NamedTempFile};

use video_detect::{DetectConfig, Error, ErrorKind};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "DETECT_DEVICE",
        "DETECT_MODEL",
        "DETECT_CONFIDENCE",
        "DETECT_FRAME_SKIP",
    ] {
        std::env::remove_var(key);
    }
}

fn write_config(suffix: &str, body: &str) -> NamedTempFile {
    let mut file = Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("temp config");
    std::io::Write::write_all(&mut file, body.as_bytes()).expect("write config");
    file
}

#[test]
fn loads_toml_with_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        ".toml",
        r#"
device = "cpu"

[detection]
backend = "stub"
model = "models/yolov8n.onnx"
confidence = 0.35

[video]
input_path = "clips"
output_path = "annotated"
frame_skip = 3

[visualization]
draw_boxes = true
box_thickness = 4
font_scale = 0.8
"#,
    );

    std::env::set_var("DETECT_DEVICE", "cuda");
    std::env::set_var("DETECT_FRAME_SKIP", "5");

    let cfg = DetectConfig::load(file.path()).expect("load config");

    assert_eq!(cfg.device, "cuda");
    assert_eq!(cfg.detection.backend, "stub");
    assert_eq!(cfg.detection.model, PathBuf::from("models/yolov8n.onnx"));
    assert!((cfg.detection.confidence - 0.35).abs() < f32::EPSILON);
    assert_eq!(cfg.video.input_path, PathBuf::from("clips"));
    assert_eq!(cfg.video.output_path, PathBuf::from("annotated"));
    assert_eq!(cfg.video.frame_skip, 5);
    assert_eq!(cfg.visualization.box_thickness, 4);
    assert!((cfg.visualization.font_scale - 0.8).abs() < f32::EPSILON);

    clear_env();
}

#[test]
fn loads_json_by_extension() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        ".json",
        r#"{
            "device": "cpu",
            "detection": { "backend": "stub", "confidence": 0.6 },
            "video": { "frame_skip": 2, "output_extension": ".y4m" },
            "visualization": { "draw_boxes": false }
        }"#,
    );

    let cfg = DetectConfig::load(file.path()).expect("load config");
    assert_eq!(cfg.video.frame_skip, 2);
    assert_eq!(cfg.video.output_extension.as_deref(), Some("y4m"));
    assert!(!cfg.visualization.draw_boxes);
    assert!((cfg.detection.confidence - 0.6).abs() < f32::EPSILON);
}

#[test]
fn missing_config_is_fatal_configuration_error() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let err = DetectConfig::load(Path::new("no/such/config.toml")).unwrap_err();
    assert!(matches!(err, Error::ConfigNotFound(_)));
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[test]
fn invalid_env_override_is_rejected() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(".toml", "[video]\nframe_skip = 2\n");
    std::env::set_var("DETECT_FRAME_SKIP", "0");
    let err = DetectConfig::load(file.path()).unwrap_err();
    assert!(matches!(err, Error::InvalidConfig { .. }));

    std::env::set_var("DETECT_FRAME_SKIP", "often");
    assert!(DetectConfig::load(file.path()).is_err());

    clear_env();
}

#[test]
fn malformed_toml_is_invalid_config() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(".toml", "[detection\nconfidence = ");
    let err = DetectConfig::load(file.path()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}
