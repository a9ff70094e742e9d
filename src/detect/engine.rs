//! Detection engine.
//!
//! Owns the loaded model backend and the annotator. `load_model` builds the
//! replacement backend completely before swapping it in, so a failed load
//! leaves the previous model active. `detect` applies the user confidence
//! threshold and returns detections in stable descending-confidence order.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::annotate::{AnnotateOptions, Annotator};
use crate::detect::backend::DetectionBackend;
use crate::detect::backends::StubBackend;
#[cfg(feature = "backend-tract")]
use crate::detect::backends::TractYoloBackend;
use crate::detect::result::Detection;
use crate::frame::Frame;
use crate::settings::clamp_threshold;

/// Model input resolution used when loading ONNX models.
const MODEL_INPUT_SIZE: u32 = 640;
/// IoU threshold for non-maximum suppression.
const NMS_IOU_THRESHOLD: f32 = 0.45;

#[derive(Debug, Error)]
pub enum ModelLoadError {
    #[error("model file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("unsupported model format {} (expected .onnx)", .0.display())]
    UnsupportedFormat(PathBuf),
    #[error("model backend is not compiled in (enable the {0} feature)")]
    BackendUnavailable(&'static str),
    #[error("failed to load model {}: {}", .path.display(), .reason)]
    Invalid { path: PathBuf, reason: String },
}

/// Wraps a detection model and drives per-frame inference.
#[derive(Default)]
pub struct DetectionEngine {
    backend: Option<Box<dyn DetectionBackend>>,
    model_path: Option<PathBuf>,
    annotator: Annotator,
}

impl DetectionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a model file, replacing the current one on success only.
    pub fn load_model(&mut self, path: &Path) -> Result<(), ModelLoadError> {
        let backend = build_backend(path)?;
        log::info!(
            "model loaded: {} ({} backend, {} classes)",
            path.display(),
            backend.name(),
            backend.class_names().len()
        );
        self.backend = Some(backend);
        self.model_path = Some(path.to_path_buf());
        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        self.backend.is_some()
    }

    pub fn model_path(&self) -> Option<&Path> {
        self.model_path.as_deref()
    }

    pub fn class_names(&self) -> &[String] {
        self.backend
            .as_ref()
            .map(|backend| backend.class_names())
            .unwrap_or(&[])
    }

    /// Run detection on a frame.
    ///
    /// Returns only detections with confidence >= `confidence_threshold`
    /// (clamped to [0, 1]), sorted by descending confidence. Without a
    /// loaded model this is an empty result, not an error.
    pub fn detect(
        &mut self,
        frame: &Frame,
        confidence_threshold: f32,
    ) -> anyhow::Result<Vec<Detection>> {
        let Some(backend) = self.backend.as_mut() else {
            return Ok(Vec::new());
        };

        let threshold = clamp_threshold(confidence_threshold);
        let mut detections = backend.detect(frame.pixels(), frame.width(), frame.height())?;
        detections.retain(|detection| detection.confidence >= threshold);
        detections.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(detections)
    }

    /// Render detections onto a copy of `frame`.
    pub fn annotate(
        &self,
        frame: &Frame,
        detections: &[Detection],
        options: AnnotateOptions,
    ) -> Frame {
        self.annotator.annotate(frame, detections, options)
    }

    /// Load a TTF font for label rendering. Boxes draw without one.
    pub fn load_label_font(&mut self, path: &Path) -> anyhow::Result<()> {
        self.annotator.load_font(path)
    }
}

fn build_backend(path: &Path) -> Result<Box<dyn DetectionBackend>, ModelLoadError> {
    let raw = path.to_string_lossy();
    if let Some(kind) = raw.strip_prefix("stub://") {
        let backend = if kind == "fail" {
            StubBackend::failing()
        } else {
            StubBackend::new()
        };
        return Ok(Box::new(backend));
    }

    if !path.exists() {
        return Err(ModelLoadError::NotFound(path.to_path_buf()));
    }

    match path.extension().and_then(|ext| ext.to_str()) {
        Some("onnx") => {
            #[cfg(feature = "backend-tract")]
            {
                let backend = TractYoloBackend::load(path, MODEL_INPUT_SIZE, NMS_IOU_THRESHOLD)
                    .map_err(|err| ModelLoadError::Invalid {
                        path: path.to_path_buf(),
                        reason: format!("{:#}", err),
                    })?;
                Ok(Box::new(backend))
            }
            #[cfg(not(feature = "backend-tract"))]
            {
                Err(ModelLoadError::BackendUnavailable("backend-tract"))
            }
        }
        _ => Err(ModelLoadError::UnsupportedFormat(path.to_path_buf())),
    }
}
