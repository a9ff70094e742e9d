//! Detection overlay rendering.
//!
//! Draws bounding boxes and optional labels onto a frame copy. Label text
//! needs a TTF font loaded from disk; without one, boxes are still drawn
//! and text is skipped.

use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;

use crate::detect::Detection;
use crate::frame::Frame;

const LABEL_FONT_SIZE: f32 = 20.0;
const LABEL_TEXT_HEIGHT: i32 = 24;
// Average glyph width at LABEL_FONT_SIZE, rough estimate.
const LABEL_CHAR_WIDTH: f32 = 11.0;
const LABEL_TEXT_VERTICAL_PADDING: i32 = 2;
const BOX_THICKNESS: i32 = 2;

/// Per-class color cycle.
const PALETTE: [[u8; 3]; 6] = [
    [0, 255, 0],
    [255, 0, 0],
    [0, 0, 255],
    [0, 255, 255],
    [255, 0, 255],
    [255, 255, 0],
];

/// Display toggles, mapped 1:1 to settings fields.
#[derive(Clone, Copy, Debug)]
pub struct AnnotateOptions {
    pub show_class_names: bool,
    pub show_confidence: bool,
}

impl Default for AnnotateOptions {
    fn default() -> Self {
        Self {
            show_class_names: true,
            show_confidence: true,
        }
    }
}

/// Draws detections onto frames.
#[derive(Default)]
pub struct Annotator {
    font: Option<FontVec>,
}

impl Annotator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a TTF/OTF font for label text.
    pub fn load_font(&mut self, path: &Path) -> Result<()> {
        let bytes =
            std::fs::read(path).with_context(|| format!("read font file {}", path.display()))?;
        let font = FontVec::try_from_vec(bytes)
            .with_context(|| format!("parse font file {}", path.display()))?;
        self.font = Some(font);
        log::info!("label font loaded from {}", path.display());
        Ok(())
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Render `detections` onto a copy of `frame`.
    pub fn annotate(
        &self,
        frame: &Frame,
        detections: &[Detection],
        options: AnnotateOptions,
    ) -> Frame {
        if detections.is_empty() {
            return frame.clone();
        }

        let mut image = frame.to_rgb_image();
        for detection in detections {
            let color = PALETTE[detection.class_id % PALETTE.len()];
            self.draw_detection(&mut image, detection, color, options);
        }

        Frame::from_rgb_image(image)
    }

    fn draw_detection(
        &self,
        image: &mut RgbImage,
        detection: &Detection,
        color: [u8; 3],
        options: AnnotateOptions,
    ) {
        let (img_w, img_h) = (image.width() as i32, image.height() as i32);

        let x_min = (detection.bbox.x.floor() as i32).clamp(0, img_w - 1);
        let y_min = (detection.bbox.y.floor() as i32).clamp(0, img_h - 1);
        let x_max = (detection.bbox.right().ceil() as i32).clamp(0, img_w - 1);
        let y_max = (detection.bbox.bottom().ceil() as i32).clamp(0, img_h - 1);

        if x_min >= x_max || y_min >= y_max {
            return;
        }

        for inset in 0..BOX_THICKNESS {
            let width = (x_max - x_min - 2 * inset).max(1) as u32;
            let height = (y_max - y_min - 2 * inset).max(1) as u32;
            let rect = Rect::at(x_min + inset, y_min + inset).of_size(width, height);
            draw_hollow_rect_mut(image, rect, Rgb(color));
        }

        let label = label_text(detection, options);
        let Some(label) = label else {
            return;
        };
        let Some(font) = &self.font else {
            return;
        };

        let text_width = (label.len() as f32 * LABEL_CHAR_WIDTH) as i32;
        let label_x = x_min;
        let label_y = (y_min - LABEL_TEXT_HEIGHT).max(0);

        let max_width = (img_w - label_x).max(0);
        let label_width = text_width.min(max_width) as u32;
        if label_width == 0 {
            return;
        }

        let rect = Rect::at(label_x, label_y).of_size(label_width, LABEL_TEXT_HEIGHT as u32);
        draw_filled_rect_mut(image, rect, Rgb(color));
        draw_text_mut(
            image,
            Rgb([255u8, 255u8, 255u8]),
            label_x,
            label_y + LABEL_TEXT_VERTICAL_PADDING,
            PxScale::from(LABEL_FONT_SIZE),
            font,
            &label,
        );
    }
}

fn label_text(detection: &Detection, options: AnnotateOptions) -> Option<String> {
    match (options.show_class_names, options.show_confidence) {
        (true, true) => Some(format!(
            "{} {:.2}",
            detection.class_name, detection.confidence
        )),
        (true, false) => Some(detection.class_name.clone()),
        (false, true) => Some(format!("{:.2}", detection.confidence)),
        (false, false) => None,
    }
}
