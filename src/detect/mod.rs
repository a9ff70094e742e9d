mod backend;
mod backends;
mod engine;
mod motion;
mod result;
pub mod yolo;

pub use backend::DetectionBackend;
pub use backends::StubBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractYoloBackend;
pub use engine::{DetectionEngine, ModelLoadError};
pub use motion::MotionDetector;
pub use result::{BoundingBox, Detection};
