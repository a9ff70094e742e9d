//! Frame-differencing motion estimation.
//!
//! Tracks a sampled copy of the previous frame and reports the mean absolute
//! pixel difference against it, normalized to [0, 1]. Surfaced in session
//! statistics alongside detection counts.

use crate::frame::Frame;

/// Every Nth byte of the frame is sampled; full-resolution differencing is
/// not needed for a coarse activity level.
const SAMPLE_STRIDE: usize = 16;

#[derive(Default)]
pub struct MotionDetector {
    previous: Option<Vec<u8>>,
}

impl MotionDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Motion level of `frame` against the previous one, in [0, 1].
    ///
    /// The first frame after construction or a resolution change yields 0.
    pub fn level(&mut self, frame: &Frame) -> f32 {
        let sampled: Vec<u8> = frame.pixels().iter().step_by(SAMPLE_STRIDE).copied().collect();

        let level = match &self.previous {
            Some(previous) if previous.len() == sampled.len() && !sampled.is_empty() => {
                let total: u64 = previous
                    .iter()
                    .zip(&sampled)
                    .map(|(a, b)| u64::from(a.abs_diff(*b)))
                    .sum();
                total as f32 / (sampled.len() as f32 * 255.0)
            }
            _ => 0.0,
        };

        self.previous = Some(sampled);
        level
    }

    pub fn reset(&mut self) {
        self.previous = None;
    }
}
