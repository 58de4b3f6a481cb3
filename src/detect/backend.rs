use anyhow::Result;

use crate::detect::result::{Detection, PpeClass};

/// Static description of a detector backend, reported by `/model-info`.
#[derive(Clone, Debug)]
pub struct BackendInfo {
    pub name: &'static str,
    /// Human-readable backend kind (e.g. "synthetic", "color-heuristic").
    pub kind: &'static str,
    /// Classes this backend is able to emit.
    pub classes: Vec<PpeClass>,
}

/// Detector backend trait.
///
/// Implementations turn an RGB frame into PPE detections. They must be
/// deterministic for identical input and must never return detections
/// below the requested confidence threshold. Inference models (ONNX,
/// remote services) would plug in here; this repository deliberately
/// ships only non-ML implementations.
pub trait DetectorBackend: Send {
    /// Backend identifier used in configuration and `/model-info`.
    fn name(&self) -> &'static str;

    fn info(&self) -> BackendInfo;

    /// Run detection on an RGB8 frame (`width * height * 3` bytes,
    /// row-major).
    fn detect(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
        conf_threshold: f32,
    ) -> Result<Vec<Detection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
