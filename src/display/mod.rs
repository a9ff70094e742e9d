//! Display sinks.
//!
//! The runtime hands each annotated frame to a `Display`. Sinks:
//! - `NullDisplay`: discards frames (headless runs, tests)
//! - `PreviewFileDisplay`: keeps a JPEG of the latest frame on disk
//! - `GstWindowDisplay` (feature: display-gstreamer): live video window

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::frame::Frame;
use crate::runtime::SessionStats;

#[cfg(feature = "display-gstreamer")]
mod gstreamer;

#[cfg(feature = "display-gstreamer")]
pub use gstreamer::GstWindowDisplay;

/// A surface that annotated frames are painted onto, one per tick.
pub trait Display: Send {
    fn show(&mut self, frame: &Frame, stats: &SessionStats) -> Result<()>;
}

/// Discards every frame.
#[derive(Default)]
pub struct NullDisplay;

impl Display for NullDisplay {
    fn show(&mut self, _frame: &Frame, _stats: &SessionStats) -> Result<()> {
        Ok(())
    }
}

/// Writes the latest annotated frame to a fixed JPEG path (temp + rename so
/// readers never observe a half-written image).
pub struct PreviewFileDisplay {
    path: PathBuf,
}

impl PreviewFileDisplay {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl Display for PreviewFileDisplay {
    fn show(&mut self, frame: &Frame, _stats: &SessionStats) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("create preview directory {}", parent.display()))?;
            }
        }

        let mut tmp_name = self
            .path
            .file_name()
            .unwrap_or_default()
            .to_os_string();
        tmp_name.push(".tmp.jpg");
        let tmp = self.path.with_file_name(tmp_name);

        frame
            .to_rgb_image()
            .save_with_format(&tmp, image::ImageFormat::Jpeg)
            .with_context(|| format!("encode preview frame {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("replace preview frame {}", self.path.display()))?;
        Ok(())
    }
}
