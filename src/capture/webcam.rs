//! Webcam frame source.
//!
//! Captures frames from a local V4L2 device node (e.g. /dev/video0).
//! Device capture requires the `capture-v4l2` feature; `stub://` device
//! paths select an always-available synthetic source used in tests and in
//! builds without device support.

use anyhow::Result;
#[cfg(feature = "capture-v4l2")]
use anyhow::Context;
#[cfg(feature = "capture-v4l2")]
use ouroboros::self_referencing;

use crate::frame::Frame;

/// Configuration for a webcam source.
#[derive(Clone, Debug)]
pub struct WebcamConfig {
    /// Device path (e.g. "/dev/video0") or "stub://..." for synthetic frames.
    pub device: String,
    /// Preferred frame width.
    pub width: u32,
    /// Preferred frame height.
    pub height: u32,
    /// Target frame rate (frames per second).
    pub target_fps: u32,
}

/// Webcam frame source with device and synthetic backends.
pub struct WebcamSource {
    backend: WebcamBackend,
}

enum WebcamBackend {
    Synthetic(SyntheticWebcamSource),
    #[cfg(feature = "capture-v4l2")]
    Device(DeviceWebcamSource),
}

impl WebcamSource {
    pub fn new(config: WebcamConfig) -> Result<Self> {
        if config.device.starts_with("stub://") {
            Ok(Self {
                backend: WebcamBackend::Synthetic(SyntheticWebcamSource::new(config)),
            })
        } else {
            #[cfg(feature = "capture-v4l2")]
            {
                Ok(Self {
                    backend: WebcamBackend::Device(DeviceWebcamSource::new(config)?),
                })
            }
            #[cfg(not(feature = "capture-v4l2"))]
            {
                anyhow::bail!("webcam device capture requires the capture-v4l2 feature")
            }
        }
    }

    /// Open the device and start streaming.
    pub fn connect(&mut self) -> Result<()> {
        match &mut self.backend {
            WebcamBackend::Synthetic(source) => source.connect(),
            #[cfg(feature = "capture-v4l2")]
            WebcamBackend::Device(source) => source.connect(),
        }
    }

    /// Capture the next frame, blocking until the device produces one.
    pub fn next_frame(&mut self) -> Result<Frame> {
        match &mut self.backend {
            WebcamBackend::Synthetic(source) => source.next_frame(),
            #[cfg(feature = "capture-v4l2")]
            WebcamBackend::Device(source) => source.next_frame(),
        }
    }

    /// Frames captured since connect.
    pub fn frames_captured(&self) -> u64 {
        match &self.backend {
            WebcamBackend::Synthetic(source) => source.frame_count,
            #[cfg(feature = "capture-v4l2")]
            WebcamBackend::Device(source) => source.frame_count,
        }
    }
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://) for tests and featureless builds
// ----------------------------------------------------------------------------

struct SyntheticWebcamSource {
    config: WebcamConfig,
    frame_count: u64,
    scene_state: u8,
}

impl SyntheticWebcamSource {
    fn new(config: WebcamConfig) -> Self {
        Self {
            config,
            frame_count: 0,
            scene_state: 0,
        }
    }

    fn connect(&mut self) -> Result<()> {
        log::info!("WebcamSource: connected to {} (synthetic)", self.config.device);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        self.frame_count += 1;

        // Shift the pattern occasionally so consecutive frames differ and
        // motion estimation has something to chew on.
        if self.frame_count % 25 == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }

        let pixel_count = (self.config.width * self.config.height * 3) as usize;
        let mut pixels = vec![0u8; pixel_count];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 + self.frame_count + self.scene_state as u64) % 256) as u8;
        }

        Frame::from_rgb8(pixels, self.config.width, self.config.height)
            .ok_or_else(|| anyhow::anyhow!("synthetic frame buffer size mismatch"))
    }
}

// ----------------------------------------------------------------------------
// Device source using libv4l
// ----------------------------------------------------------------------------

#[cfg(feature = "capture-v4l2")]
struct DeviceWebcamSource {
    config: WebcamConfig,
    state: Option<DeviceWebcamState>,
    frame_count: u64,
    active_width: u32,
    active_height: u32,
}

#[cfg(feature = "capture-v4l2")]
#[self_referencing]
struct DeviceWebcamState {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

#[cfg(feature = "capture-v4l2")]
impl DeviceWebcamSource {
    fn new(config: WebcamConfig) -> Result<Self> {
        Ok(Self {
            active_width: config.width,
            active_height: config.height,
            config,
            state: None,
            frame_count: 0,
        })
    }

    fn connect(&mut self) -> Result<()> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device = v4l::Device::with_path(&self.config.device)
            .with_context(|| format!("open v4l2 device {}", self.config.device))?;
        let mut format = device.format().context("read v4l2 format")?;
        format.width = self.config.width;
        format.height = self.config.height;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "WebcamSource: failed to set format on {}: {}",
                    self.config.device,
                    err
                );
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };

        if self.config.target_fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(self.config.target_fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!(
                    "WebcamSource: failed to set fps on {}: {}",
                    self.config.device,
                    err
                );
            }
        }

        self.active_width = format.width;
        self.active_height = format.height;

        let state = DeviceWebcamStateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()?;
        self.state = Some(state);

        log::info!(
            "WebcamSource: connected to {} ({}x{})",
            self.config.device,
            self.active_width,
            self.active_height
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        use v4l::io::traits::CaptureStream;

        let state = self.state.as_mut().context("webcam device not connected")?;
        let (buf, _meta) = state
            .with_mut(|fields| fields.stream.next())
            .map_err(|err| anyhow::Error::new(err).context("capture v4l2 frame"))?;

        self.frame_count += 1;

        Frame::from_rgb8(buf.to_vec(), self.active_width, self.active_height)
            .ok_or_else(|| anyhow::anyhow!("v4l2 buffer does not match negotiated frame size"))
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn stub_config() -> WebcamConfig {
        WebcamConfig {
            device: "stub://test".to_string(),
            width: 64,
            height: 48,
            target_fps: 10,
        }
    }

    #[test]
    fn webcam_source_produces_frames() -> Result<()> {
        let mut source = WebcamSource::new(stub_config())?;
        source.connect()?;

        let frame = source.next_frame()?;
        assert_eq!(frame.width(), 64);
        assert_eq!(frame.height(), 48);
        assert_eq!(source.frames_captured(), 1);

        Ok(())
    }

    #[test]
    fn consecutive_webcam_frames_differ() -> Result<()> {
        let mut source = WebcamSource::new(stub_config())?;
        source.connect()?;

        let frame1 = source.next_frame()?;
        let frame2 = source.next_frame()?;
        assert_ne!(frame1.pixels(), frame2.pixels());

        Ok(())
    }
}
