#![cfg(feature = "display-gstreamer")]

//! GStreamer video window display.
//!
//! Pushes annotated frames through appsrc ! videoconvert ! autovideosink.
//! The pipeline is built lazily on the first frame so the caps match the
//! actual frame size coming out of the capture source.

use anyhow::{anyhow, Context, Result};
use gstreamer::prelude::*;

use crate::frame::Frame;
use crate::runtime::SessionStats;

use super::Display;

pub struct GstWindowDisplay {
    target_fps: u32,
    inner: Option<Pipeline>,
}

struct Pipeline {
    pipeline: gstreamer::Pipeline,
    appsrc: gstreamer_app::AppSrc,
    width: u32,
    height: u32,
    frame_count: u64,
}

impl GstWindowDisplay {
    pub fn new(target_fps: u32) -> Result<Self> {
        gstreamer::init().context("initialize gstreamer")?;
        Ok(Self {
            target_fps: target_fps.max(1),
            inner: None,
        })
    }

    fn build_pipeline(&self, width: u32, height: u32) -> Result<Pipeline> {
        let pipeline = gstreamer::parse_launch(
            "appsrc name=src ! videoconvert ! autovideosink sync=false",
        )
        .context("build display pipeline")?
        .downcast::<gstreamer::Pipeline>()
        .map_err(|_| anyhow!("display pipeline is not a Pipeline"))?;

        let appsrc = pipeline
            .by_name("src")
            .context("appsrc element missing from pipeline")?
            .downcast::<gstreamer_app::AppSrc>()
            .map_err(|_| anyhow!("appsrc element has unexpected type"))?;

        let caps = gstreamer::Caps::builder("video/x-raw")
            .field("format", "RGB")
            .field("width", width as i32)
            .field("height", height as i32)
            .field("framerate", gstreamer::Fraction::new(self.target_fps as i32, 1))
            .build();
        appsrc.set_caps(Some(&caps));
        appsrc.set_format(gstreamer::Format::Time);

        pipeline
            .set_state(gstreamer::State::Playing)
            .context("set display pipeline to Playing")?;

        log::info!("display window opened ({}x{})", width, height);
        Ok(Pipeline {
            pipeline,
            appsrc,
            width,
            height,
            frame_count: 0,
        })
    }
}

impl Display for GstWindowDisplay {
    fn show(&mut self, frame: &Frame, _stats: &SessionStats) -> Result<()> {
        let rebuild = match &self.inner {
            Some(inner) => inner.width != frame.width() || inner.height != frame.height(),
            None => true,
        };
        if rebuild {
            if let Some(old) = self.inner.take() {
                let _ = old.pipeline.set_state(gstreamer::State::Null);
            }
            self.inner = Some(self.build_pipeline(frame.width(), frame.height())?);
        }

        let inner = self.inner.as_mut().expect("pipeline built above");

        let mut buffer = gstreamer::Buffer::with_size(frame.byte_len())
            .context("allocate display buffer")?;
        {
            let buffer_ref = buffer.get_mut().expect("fresh buffer is writable");
            let mut map = buffer_ref
                .map_writable()
                .context("map display buffer writable")?;
            map.copy_from_slice(frame.pixels());
        }

        let nanos_per_frame = 1_000_000_000u64 / self.target_fps as u64;
        let timestamp = inner.frame_count * nanos_per_frame;
        inner.frame_count += 1;
        {
            let buffer_ref = buffer.get_mut().expect("fresh buffer is writable");
            buffer_ref.set_pts(gstreamer::ClockTime::from_nseconds(timestamp));
            buffer_ref.set_duration(gstreamer::ClockTime::from_nseconds(nanos_per_frame));
        }

        inner
            .appsrc
            .push_buffer(buffer)
            .map_err(|err| anyhow!("failed to push display buffer: {:?}", err))?;
        Ok(())
    }
}

impl Drop for GstWindowDisplay {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            let _ = inner.appsrc.end_of_stream();
            if let Err(err) = inner.pipeline.set_state(gstreamer::State::Null) {
                log::warn!("failed to stop display pipeline: {}", err);
            }
        }
    }
}
