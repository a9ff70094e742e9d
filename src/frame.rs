//! Frame container.
//!
//! A `Frame` is one decoded image from a capture source: a packed RGB8
//! buffer plus its dimensions. Frames are produced by the capture layer,
//! handed to detection, then to annotation, and discarded after display.
//! Only snapshot requests and annotation clone the buffer.

use image::{ImageBuffer, Rgb, RgbImage};

const RGB_CHANNELS: usize = 3;

/// One decoded RGB8 frame.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl Frame {
    /// Create a frame from packed RGB8 bytes. Called by the capture layer.
    ///
    /// Returns `None` when the buffer length does not match the dimensions.
    pub fn from_rgb8(data: Vec<u8>, width: u32, height: u32) -> Option<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)?
            .checked_mul(RGB_CHANNELS)?;
        if data.len() != expected {
            return None;
        }
        Some(Self {
            data,
            width,
            height,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Packed RGB8 pixel data, row-major.
    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// View this frame as an `image::RgbImage` for drawing and encoding.
    pub fn to_rgb_image(&self) -> RgbImage {
        ImageBuffer::from_raw(self.width, self.height, self.data.clone())
            .unwrap_or_else(|| ImageBuffer::from_pixel(self.width, self.height, Rgb([0, 0, 0])))
    }

    /// Rebuild a frame from an `image::RgbImage` (after drawing).
    pub fn from_rgb_image(image: RgbImage) -> Self {
        let (width, height) = (image.width(), image.height());
        Self {
            data: image.into_raw(),
            width,
            height,
        }
    }
}
