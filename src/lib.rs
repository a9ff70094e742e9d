//! detektor - live object detection runtime.
//!
//! Wraps a pretrained object-detection model over live camera or video
//! input: per tick, one frame is acquired, run through the model, annotated
//! with boxes and labels, and painted onto a display sink. User settings
//! persist in a flat JSON file.
//!
//! # Module structure
//!
//! - `settings`: JSON settings record with per-field defaults
//! - `frame`: RGB8 frame container
//! - `capture`: webcam / video-file / industrial-camera sources behind one
//!   `CameraManager` surface
//! - `detect`: model backends, YOLO decoding, the `DetectionEngine`, motion
//!   estimation
//! - `annotate`: box and label rendering
//! - `display`: sinks the annotated frames are painted onto
//! - `runtime`: the per-tick cycle and session statistics
//!
//! Source backends and the inference backend are feature-gated the same way
//! throughout: every kind keeps an always-available fallback so a default
//! build runs and tests everywhere, and `capture-v4l2`, `capture-ffmpeg`,
//! `industrial-gstreamer`, `display-gstreamer` and `backend-tract` switch on
//! the real devices and decoders.

pub mod annotate;
pub mod capture;
pub mod detect;
pub mod display;
pub mod frame;
pub mod logging;
pub mod runtime;
pub mod settings;
pub mod snapshot;

pub use annotate::{AnnotateOptions, Annotator};
pub use capture::{
    active_source_count, CameraManager, CaptureConfig, CaptureError, SourceDescriptor,
};
pub use detect::{
    BoundingBox, Detection, DetectionEngine, ModelLoadError, MotionDetector, StubBackend,
};
pub use display::{Display, NullDisplay, PreviewFileDisplay};
pub use frame::Frame;
pub use runtime::{App, SessionStats, TickOutcome};
pub use settings::Settings;
