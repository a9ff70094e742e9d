#![cfg(feature = "industrial-gstreamer")]

//! Industrial camera frame source.
//!
//! GigE Vision / GenICam cameras are reached through the GStreamer aravis
//! plugin. The whole backend is feature-gated; builds without it keep full
//! webcam and video-file operation.

use anyhow::{Context, Result};
use gstreamer::prelude::*;

use crate::frame::Frame;

/// Configuration for an industrial camera source.
#[derive(Clone, Debug)]
pub struct IndustrialConfig {
    /// Device index among the enumerated cameras.
    pub device_index: u32,
    /// Preferred frame width.
    pub width: u32,
    /// Preferred frame height.
    pub height: u32,
    /// Target frame rate (frames per second).
    pub target_fps: u32,
}

/// Industrial camera frame source (GStreamer pipeline with appsink).
pub struct IndustrialSource {
    config: IndustrialConfig,
    pipeline: gstreamer::Pipeline,
    appsink: gstreamer_app::AppSink,
    frame_count: u64,
    last_error: Option<String>,
}

impl IndustrialSource {
    /// Build the capture pipeline: aravissrc ! videoconvert ! appsink.
    pub fn new(config: IndustrialConfig) -> Result<Self> {
        gstreamer::init().context("initialize gstreamer")?;

        if config.device_index > 0 {
            // TODO: map device_index to aravissrc camera-name once device
            // enumeration is wired up; only the first camera binds today.
            log::warn!(
                "industrial camera index {} requested, binding first enumerated device",
                config.device_index
            );
        }

        let pipeline_description = format!(
            "aravissrc ! videoconvert ! video/x-raw,format=RGB,width={},height={} ! \
             appsink name=appsink sync=false max-buffers=1 drop=true",
            config.width, config.height
        );
        let pipeline = gstreamer::parse_launch(&pipeline_description)
            .context("build industrial camera pipeline")?
            .downcast::<gstreamer::Pipeline>()
            .map_err(|_| anyhow::anyhow!("industrial pipeline is not a Pipeline"))?;

        let appsink = pipeline
            .by_name("appsink")
            .context("appsink element missing from pipeline")?
            .downcast::<gstreamer_app::AppSink>()
            .map_err(|_| anyhow::anyhow!("appsink element has unexpected type"))?;

        let caps = gstreamer::Caps::builder("video/x-raw")
            .field("format", "RGB")
            .build();
        appsink.set_caps(Some(&caps));
        appsink.set_max_buffers(1);
        appsink.set_drop(true);
        appsink.set_sync(false);

        Ok(Self {
            config,
            pipeline,
            appsink,
            frame_count: 0,
            last_error: None,
        })
    }

    pub fn connect(&mut self) -> Result<()> {
        self.pipeline
            .set_state(gstreamer::State::Playing)
            .context("set industrial pipeline to Playing")?;
        log::info!(
            "IndustrialSource: acquisition started ({}x{})",
            self.config.width,
            self.config.height
        );
        Ok(())
    }

    pub fn next_frame(&mut self) -> Result<Frame> {
        self.poll_bus();
        if let Some(err) = &self.last_error {
            anyhow::bail!("industrial pipeline error: {}", err);
        }

        let sample = self
            .appsink
            .try_pull_sample(self.frame_timeout())
            .ok_or_else(|| anyhow::anyhow!("industrial camera stalled"))?;

        let (pixels, width, height) = sample_to_pixels(&sample)?;
        self.frame_count += 1;

        Frame::from_rgb8(pixels, width, height)
            .ok_or_else(|| anyhow::anyhow!("industrial sample does not match reported caps"))
    }

    pub fn frames_captured(&self) -> u64 {
        self.frame_count
    }

    fn frame_timeout(&self) -> gstreamer::ClockTime {
        let base_ms = if self.config.target_fps == 0 {
            500
        } else {
            (1000 / self.config.target_fps).saturating_mul(4)
        };
        gstreamer::ClockTime::from_mseconds(base_ms.max(500) as u64)
    }

    fn poll_bus(&mut self) {
        let Some(bus) = self.pipeline.bus() else {
            return;
        };
        while let Some(message) = bus.timed_pop(gstreamer::ClockTime::ZERO) {
            use gstreamer::MessageView;
            match message.view() {
                MessageView::Error(err) => {
                    self.last_error = Some(format!(
                        "gstreamer error from {:?}: {}",
                        err.src().map(|s| s.path_string()),
                        err.error()
                    ));
                }
                MessageView::Eos(..) => {
                    self.last_error = Some("gstreamer reached EOS".to_string());
                }
                _ => {}
            }
        }
    }
}

impl Drop for IndustrialSource {
    fn drop(&mut self) {
        if let Err(err) = self.pipeline.set_state(gstreamer::State::Null) {
            log::warn!("failed to stop industrial pipeline: {}", err);
        }
    }
}

fn sample_to_pixels(sample: &gstreamer::Sample) -> Result<(Vec<u8>, u32, u32)> {
    let buffer = sample.buffer().context("sample missing buffer")?;
    let caps = sample.caps().context("sample missing caps")?;
    let info =
        gstreamer_video::VideoInfo::from_caps(caps).context("parse caps as video info")?;

    let width = info.width();
    let height = info.height();
    let row_bytes = (width as usize) * 3;
    let stride = info.stride(0) as usize;

    let map = buffer.map_readable().context("map sample buffer")?;
    let data = map.as_slice();

    if stride == row_bytes {
        return Ok((data.to_vec(), width, height));
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let end = start + row_bytes;
        pixels.extend_from_slice(
            data.get(start..end)
                .context("sample buffer row is out of bounds")?,
        );
    }

    Ok((pixels, width, height))
}
