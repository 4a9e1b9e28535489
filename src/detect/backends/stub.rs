use anyhow::Result;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::Detection;
use crate::frame::Frame;

/// Scripted backend for tests and dry runs. Never looks at pixels.
///
/// Each `detect` call returns the next entry of the script, cycling when the
/// script is exhausted. An empty script yields no detections.
#[derive(Clone, Debug, Default)]
pub struct StubBackend {
    script: Vec<Vec<Detection>>,
    calls: u64,
}

impl StubBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the same detections on every call.
    pub fn with_detections(detections: Vec<Detection>) -> Self {
        Self {
            script: vec![detections],
            calls: 0,
        }
    }

    /// Return `script[n % len]` on the n-th call.
    pub fn with_script(script: Vec<Vec<Detection>>) -> Self {
        Self { script, calls: 0 }
    }

    /// Number of `detect` calls so far.
    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
        let detections = if self.script.is_empty() {
            Vec::new()
        } else {
            let idx = (self.calls % self.script.len() as u64) as usize;
            self.script[idx].clone()
        };
        self.calls += 1;
        Ok(detections)
    }
}
