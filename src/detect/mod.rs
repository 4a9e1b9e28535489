mod backend;
mod backends;
pub mod classes;
mod result;
pub mod yolo;

use anyhow::{anyhow, Result};

use crate::config::DetectConfig;

pub use backend::DetectorBackend;
pub use backends::StubBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use result::{BoundingBox, Detection};

/// Build the backend named by `detection.backend`.
///
/// Only CPU execution is available; any other `device` is logged and ignored.
pub fn backend_from_config(config: &DetectConfig) -> Result<Box<dyn DetectorBackend>> {
    if !config.device.eq_ignore_ascii_case("cpu") {
        log::warn!(
            "device '{}' is not supported by the available backends; running on cpu",
            config.device
        );
    }

    let mut backend: Box<dyn DetectorBackend> = match config.detection.backend.as_str() {
        "stub" => Box::new(StubBackend::new()),
        "tract" => tract_backend(config)?,
        other => return Err(anyhow!("unknown detector backend '{}'", other)),
    };
    backend.warm_up()?;
    log::info!(
        "detector backend '{}' ready (model={}, confidence={})",
        backend.name(),
        config.detection.model.display(),
        config.detection.confidence
    );
    Ok(backend)
}

#[cfg(feature = "backend-tract")]
fn tract_backend(config: &DetectConfig) -> Result<Box<dyn DetectorBackend>> {
    let backend = TractBackend::new(&config.detection.model, config.detection.input_size)?
        .with_threshold(config.detection.confidence)
        .with_iou_threshold(config.detection.iou_threshold);
    Ok(Box::new(backend))
}

#[cfg(not(feature = "backend-tract"))]
fn tract_backend(_config: &DetectConfig) -> Result<Box<dyn DetectorBackend>> {
    Err(anyhow!(
        "the tract detector backend requires the backend-tract feature"
    ))
}
