//! Stub backend for tests and wiring checks.
//!
//! Loaded through `stub://` model paths. Emits a fixed script of candidate
//! detections per frame; the `stub://fail` variant errors on every call so
//! the tick-skip path can be exercised.

use anyhow::Result;

use crate::detect::backend::DetectionBackend;
use crate::detect::result::{BoundingBox, Detection};

pub struct StubBackend {
    class_names: Vec<String>,
    fail: bool,
    frames_seen: u64,
}

impl StubBackend {
    pub fn new() -> Self {
        Self {
            class_names: vec!["widget".to_string(), "defect".to_string()],
            fail: false,
            frames_seen: 0,
        }
    }

    /// A backend whose `detect` always fails.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectionBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn class_names(&self) -> &[String] {
        &self.class_names
    }

    fn detect(&mut self, _pixels: &[u8], width: u32, height: u32) -> Result<Vec<Detection>> {
        if self.fail {
            anyhow::bail!("stub backend configured to fail");
        }
        self.frames_seen += 1;

        let w = width as f32;
        let h = height as f32;
        let boxed = |x: f32, y: f32| BoundingBox {
            x: x * w,
            y: y * h,
            width: 0.2 * w,
            height: 0.2 * h,
        };

        // A spread of confidences so threshold filtering has edges to cut at.
        Ok(vec![
            Detection {
                class_id: 0,
                class_name: self.class_names[0].clone(),
                confidence: 0.9,
                bbox: boxed(0.1, 0.1),
            },
            Detection {
                class_id: 1,
                class_name: self.class_names[1].clone(),
                confidence: 0.6,
                bbox: boxed(0.5, 0.5),
            },
            Detection {
                class_id: 0,
                class_name: self.class_names[0].clone(),
                confidence: 0.3,
                bbox: boxed(0.7, 0.2),
            },
        ])
    }
}
