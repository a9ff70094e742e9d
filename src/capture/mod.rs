//! Capture sources.
//!
//! This module binds exactly one capture backend at a time behind the
//! `CameraManager` surface:
//! - Standard webcams (feature: capture-v4l2, synthetic fallback otherwise)
//! - Video files (image-sequence directories; feature: capture-ffmpeg for
//!   containers)
//! - Industrial cameras (feature: industrial-gstreamer)
//!
//! Video file sources loop back to their first frame after the last one.
//! Camera sources retry a bounded number of times before surfacing a
//! capture error. Switching sources always closes the previous backend
//! before the next one is opened.

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::frame::Frame;

#[cfg(feature = "industrial-gstreamer")]
mod industrial;
mod video;
mod webcam;

#[cfg(feature = "industrial-gstreamer")]
pub use industrial::{IndustrialConfig, IndustrialSource};
pub use video::{VideoConfig, VideoSource};
pub use webcam::{WebcamConfig, WebcamSource};

/// How often a camera-kind backend is retried before a tick gives up.
const CAPTURE_RETRY_LIMIT: u32 = 3;

/// Identifies which capture backend to bind.
///
/// Wire format matches the settings file: a bare integer selects a webcam,
/// a string selects a video file path, and `{"industrial": n}` selects an
/// industrial camera by device index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceDescriptor {
    Webcam(u32),
    VideoFile(PathBuf),
    Industrial(u32),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum SourceDescriptorWire {
    Index(u32),
    Path(PathBuf),
    Industrial { industrial: u32 },
}

impl Serialize for SourceDescriptor {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let wire = match self {
            SourceDescriptor::Webcam(index) => SourceDescriptorWire::Index(*index),
            SourceDescriptor::VideoFile(path) => SourceDescriptorWire::Path(path.clone()),
            SourceDescriptor::Industrial(index) => SourceDescriptorWire::Industrial {
                industrial: *index,
            },
        };
        wire.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SourceDescriptor {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match SourceDescriptorWire::deserialize(deserializer)? {
            SourceDescriptorWire::Index(index) => SourceDescriptor::Webcam(index),
            SourceDescriptorWire::Path(path) => SourceDescriptor::VideoFile(path),
            SourceDescriptorWire::Industrial { industrial } => {
                SourceDescriptor::Industrial(industrial)
            }
        })
    }
}

impl fmt::Display for SourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceDescriptor::Webcam(index) => write!(f, "webcam {}", index),
            SourceDescriptor::VideoFile(path) => write!(f, "video file {}", path.display()),
            SourceDescriptor::Industrial(index) => write!(f, "industrial camera {}", index),
        }
    }
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no capture source is open")]
    NotOpen,
    #[error("failed to open {descriptor}: {reason}")]
    OpenFailed { descriptor: String, reason: String },
    #[error("capture from {descriptor} failed after {attempts} attempts: {reason}")]
    FrameFailed {
        descriptor: String,
        attempts: u32,
        reason: String,
    },
    #[error("no frame has been captured yet")]
    NoFrameYet,
}

/// Capture parameters shared by all backends.
#[derive(Clone, Debug)]
pub struct CaptureConfig {
    /// Preferred frame width for camera kinds.
    pub width: u32,
    /// Preferred frame height for camera kinds.
    pub height: u32,
    /// Target frame rate (frames per second).
    pub target_fps: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            target_fps: 10,
        }
    }
}

// Diagnostic count of bound backends across the process. The contract is
// that it returns to zero between close and the next open.
static ACTIVE_SOURCES: AtomicUsize = AtomicUsize::new(0);

/// Number of capture backends currently bound process-wide.
pub fn active_source_count() -> usize {
    ACTIVE_SOURCES.load(Ordering::SeqCst)
}

struct SourceHandle;

impl SourceHandle {
    fn acquire() -> Self {
        ACTIVE_SOURCES.fetch_add(1, Ordering::SeqCst);
        Self
    }
}

impl Drop for SourceHandle {
    fn drop(&mut self) {
        ACTIVE_SOURCES.fetch_sub(1, Ordering::SeqCst);
    }
}

enum SourceBackend {
    Webcam(WebcamSource),
    Video(VideoSource),
    #[cfg(feature = "industrial-gstreamer")]
    Industrial(IndustrialSource),
}

impl SourceBackend {
    fn next_frame(&mut self) -> anyhow::Result<Frame> {
        match self {
            SourceBackend::Webcam(source) => source.next_frame(),
            SourceBackend::Video(source) => source.next_frame(),
            #[cfg(feature = "industrial-gstreamer")]
            SourceBackend::Industrial(source) => source.next_frame(),
        }
    }
}

struct BoundSource {
    descriptor: SourceDescriptor,
    backend: SourceBackend,
    _handle: SourceHandle,
}

/// Owns at most one capture backend and hands out frames from it.
pub struct CameraManager {
    config: CaptureConfig,
    bound: Option<BoundSource>,
    last_frame: Option<Frame>,
}

impl CameraManager {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            config,
            bound: None,
            last_frame: None,
        }
    }

    /// Bind the backend selected by `descriptor`, closing any previous one
    /// first. No two backends are ever bound concurrently.
    pub fn open(&mut self, descriptor: SourceDescriptor) -> Result<(), CaptureError> {
        self.close();

        let backend = match &descriptor {
            SourceDescriptor::Webcam(index) => {
                let mut source = WebcamSource::new(WebcamConfig {
                    device: webcam_device(*index),
                    width: self.config.width,
                    height: self.config.height,
                    target_fps: self.config.target_fps,
                })
                .map_err(|err| open_failed(&descriptor, &err))?;
                source
                    .connect()
                    .map_err(|err| open_failed(&descriptor, &err))?;
                SourceBackend::Webcam(source)
            }
            SourceDescriptor::VideoFile(path) => {
                let mut source = VideoSource::new(VideoConfig {
                    path: path.clone(),
                    target_fps: self.config.target_fps,
                })
                .map_err(|err| open_failed(&descriptor, &err))?;
                source
                    .connect()
                    .map_err(|err| open_failed(&descriptor, &err))?;
                SourceBackend::Video(source)
            }
            SourceDescriptor::Industrial(_index) => {
                #[cfg(feature = "industrial-gstreamer")]
                {
                    let mut source = IndustrialSource::new(IndustrialConfig {
                        device_index: *_index,
                        width: self.config.width,
                        height: self.config.height,
                        target_fps: self.config.target_fps,
                    })
                    .map_err(|err| open_failed(&descriptor, &err))?;
                    source
                        .connect()
                        .map_err(|err| open_failed(&descriptor, &err))?;
                    SourceBackend::Industrial(source)
                }
                #[cfg(not(feature = "industrial-gstreamer"))]
                {
                    return Err(CaptureError::OpenFailed {
                        descriptor: descriptor.to_string(),
                        reason: "industrial camera support is not compiled in \
                                 (enable the industrial-gstreamer feature)"
                            .to_string(),
                    });
                }
            }
        };

        log::info!("capture source opened: {}", descriptor);
        self.bound = Some(BoundSource {
            descriptor,
            backend,
            _handle: SourceHandle::acquire(),
        });
        Ok(())
    }

    /// Pull the next frame from the bound backend.
    ///
    /// Video files loop internally and are not retried; camera kinds are
    /// retried up to the bounded limit before the error is surfaced.
    pub fn next_frame(&mut self) -> Result<Frame, CaptureError> {
        let bound = self.bound.as_mut().ok_or(CaptureError::NotOpen)?;

        let attempts = match bound.descriptor {
            SourceDescriptor::VideoFile(_) => 1,
            _ => CAPTURE_RETRY_LIMIT,
        };

        let mut last_err = None;
        for attempt in 1..=attempts {
            match bound.backend.next_frame() {
                Ok(frame) => {
                    self.last_frame = Some(frame.clone());
                    return Ok(frame);
                }
                Err(err) => {
                    log::warn!(
                        "frame capture attempt {}/{} from {} failed: {}",
                        attempt,
                        attempts,
                        bound.descriptor,
                        err
                    );
                    last_err = Some(err);
                }
            }
        }

        Err(CaptureError::FrameFailed {
            descriptor: bound.descriptor.to_string(),
            attempts,
            reason: last_err
                .map(|err| err.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
        })
    }

    /// The most recently captured frame.
    pub fn snapshot(&self) -> Result<Frame, CaptureError> {
        self.last_frame.clone().ok_or(CaptureError::NoFrameYet)
    }

    /// Release the bound backend, if any.
    pub fn close(&mut self) {
        if let Some(bound) = self.bound.take() {
            log::info!("capture source closed: {}", bound.descriptor);
        }
        self.last_frame = None;
    }

    pub fn is_open(&self) -> bool {
        self.bound.is_some()
    }

    pub fn descriptor(&self) -> Option<&SourceDescriptor> {
        self.bound.as_ref().map(|bound| &bound.descriptor)
    }
}

impl Drop for CameraManager {
    fn drop(&mut self) {
        self.close();
    }
}

fn open_failed(descriptor: &SourceDescriptor, err: &anyhow::Error) -> CaptureError {
    CaptureError::OpenFailed {
        descriptor: descriptor.to_string(),
        reason: format!("{:#}", err),
    }
}

#[cfg(feature = "capture-v4l2")]
fn webcam_device(index: u32) -> String {
    format!("/dev/video{}", index)
}

#[cfg(not(feature = "capture-v4l2"))]
fn webcam_device(index: u32) -> String {
    // Built without device capture: fall back to the synthetic source so
    // webcam selection still produces frames.
    log::warn!("built without capture-v4l2, webcam {} will be synthetic", index);
    format!("stub://video{}", index)
}
