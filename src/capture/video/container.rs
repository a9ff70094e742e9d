//! FFmpeg-backed video container decoding.
//!
//! Decodes a local video file to RGB frames in-memory. When the demuxer
//! reaches end of stream the input is reopened so the clip plays as an
//! infinite loop.

use anyhow::{Context, Result};
use ffmpeg_next as ffmpeg;

use super::VideoConfig;
use crate::frame::Frame;

pub(super) struct ContainerVideoSource {
    config: VideoConfig,
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    frame_count: u64,
}

impl ContainerVideoSource {
    pub(super) fn new(config: VideoConfig) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let (input, stream_index, decoder, scaler) = open_clip(&config)?;
        Ok(Self {
            config,
            input,
            stream_index,
            decoder,
            scaler,
            frame_count: 0,
        })
    }

    pub(super) fn connect(&mut self) -> Result<()> {
        log::info!(
            "VideoSource: connected to {} (ffmpeg)",
            self.config.path.display()
        );
        Ok(())
    }

    pub(super) fn next_frame(&mut self) -> Result<Frame> {
        if let Some(frame) = self.decode_one()? {
            return Ok(frame);
        }

        // End of stream: reopen the clip and continue from the first frame.
        log::debug!("video looped back to first frame");
        let (input, stream_index, decoder, scaler) = open_clip(&self.config)?;
        self.input = input;
        self.stream_index = stream_index;
        self.decoder = decoder;
        self.scaler = scaler;

        self.decode_one()?
            .ok_or_else(|| anyhow::anyhow!("video file has no decodable frames"))
    }

    fn decode_one(&mut self) -> Result<Option<Frame>> {
        let mut decoded = ffmpeg::frame::Video::empty();
        let mut rgb_frame = ffmpeg::frame::Video::empty();

        for (stream, packet) in self.input.packets() {
            if stream.index() != self.stream_index {
                continue;
            }

            self.decoder
                .send_packet(&packet)
                .context("send packet to ffmpeg decoder")?;

            if self.decoder.receive_frame(&mut decoded).is_ok() {
                self.scaler
                    .run(&decoded, &mut rgb_frame)
                    .context("scale frame to RGB")?;
                let (pixels, width, height) = frame_to_pixels(&rgb_frame)?;
                self.frame_count += 1;
                let frame = Frame::from_rgb8(pixels, width, height)
                    .ok_or_else(|| anyhow::anyhow!("decoded frame size mismatch"))?;
                return Ok(Some(frame));
            }
        }

        Ok(None)
    }
}

type OpenedClip = (
    ffmpeg::format::context::Input,
    usize,
    ffmpeg::codec::decoder::Video,
    ffmpeg::software::scaling::Context,
);

fn open_clip(config: &VideoConfig) -> Result<OpenedClip> {
    let input = ffmpeg::format::input(&config.path).with_context(|| {
        format!(
            "failed to open video file '{}' with ffmpeg",
            config.path.display()
        )
    })?;
    let input_stream = input
        .streams()
        .best(ffmpeg::media::Type::Video)
        .ok_or_else(|| anyhow::anyhow!("file has no video track"))?;
    let stream_index = input_stream.index();
    let context = ffmpeg::codec::context::Context::from_parameters(input_stream.parameters())
        .context("load video decoder parameters")?;
    let decoder = context
        .decoder()
        .video()
        .context("open ffmpeg video decoder")?;

    let scaler = ffmpeg::software::scaling::context::Context::get(
        decoder.format(),
        decoder.width(),
        decoder.height(),
        ffmpeg::util::format::pixel::Pixel::RGB24,
        decoder.width(),
        decoder.height(),
        ffmpeg::software::scaling::flag::Flags::BILINEAR,
    )
    .context("create ffmpeg scaler")?;

    Ok((input, stream_index, decoder, scaler))
}

fn frame_to_pixels(frame: &ffmpeg::frame::Video) -> Result<(Vec<u8>, u32, u32)> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = (width as usize) * 3;
    let stride = frame.stride(0);
    let data = frame.data(0);

    if stride == row_bytes {
        return Ok((data.to_vec(), width, height));
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let end = start + row_bytes;
        pixels.extend_from_slice(
            data.get(start..end)
                .context("ffmpeg frame row is out of bounds")?,
        );
    }

    Ok((pixels, width, height))
}
