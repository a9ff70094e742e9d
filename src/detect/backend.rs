use anyhow::Result;

use crate::detect::result::Detection;

/// Model backend trait.
///
/// A backend owns a loaded model and turns RGB8 pixels into candidate
/// detections. Candidates are unfiltered by the user threshold; the engine
/// applies threshold filtering and final ordering on top.
pub trait DetectionBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Class names the model was trained on, indexed by class id.
    fn class_names(&self) -> &[String];

    /// Run inference on a frame.
    ///
    /// Implementations must treat the pixel slice as read-only and must not
    /// retain it beyond the call.
    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<Vec<Detection>>;
}
