#![cfg(feature = "backend-tract")]

//! Tract-based backend for ONNX inference.
//!
//! Loads a YOLO-style ONNX model from disk and runs it on RGB frames. No
//! network I/O; the model file is the only thing read from disk.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::detect::backend::DetectionBackend;
use crate::detect::result::Detection;
use crate::detect::yolo::{self, DecodeLayout, COCO_CLASSES};

/// Confidence floor applied before NMS. The user-facing threshold is applied
/// by the engine on top of this.
const CANDIDATE_FLOOR: f32 = 0.05;

pub struct TractYoloBackend {
    model: TypedSimplePlan<TypedModel>,
    input_size: u32,
    class_names: Vec<String>,
    iou_threshold: f32,
    /// (num_classes, num_anchors, channel_major), resolved from the model
    /// output shape when it is concrete.
    layout: Option<(usize, usize, bool)>,
}

impl TractYoloBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn load<P: AsRef<Path>>(model_path: P, input_size: u32, iou_threshold: f32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, input_size as usize, input_size as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        let layout = model
            .model()
            .output_fact(0)
            .ok()
            .and_then(|fact| fact.shape.as_concrete().map(|dims| dims.to_vec()))
            .and_then(|dims| resolve_layout(&dims));

        let num_classes = layout.map(|(nc, _, _)| nc);
        let class_names = load_class_names(model_path, num_classes);

        Ok(Self {
            model,
            input_size,
            class_names,
            iou_threshold,
            layout,
        })
    }

    fn build_input(&self, pixels: &[u8], width: u32, height: u32) -> Result<Tensor> {
        let expected_len = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if pixels.len() != expected_len {
            return Err(anyhow!(
                "expected {} RGB bytes, received {}",
                expected_len,
                pixels.len()
            ));
        }

        let image = image::RgbImage::from_raw(width, height, pixels.to_vec())
            .ok_or_else(|| anyhow!("frame buffer does not match dimensions"))?;
        let resized = image::imageops::resize(
            &image,
            self.input_size,
            self.input_size,
            image::imageops::FilterType::Triangle,
        );

        let size = self.input_size as usize;
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, size, size),
            |(_, channel, y, x)| resized.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0,
        );

        Ok(input.into_tensor())
    }
}

impl DetectionBackend for TractYoloBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn class_names(&self) -> &[String] {
        &self.class_names
    }

    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<Vec<Detection>> {
        let input = self.build_input(pixels, width, height)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?
            .into_dimensionality::<tract_ndarray::Ix3>()
            .context("model output is not a [1, C, A] tensor")?;

        let dims = view.shape();
        let (num_classes, num_anchors, channel_major) = self
            .layout
            .or_else(|| resolve_layout(dims))
            .ok_or_else(|| anyhow!("unrecognized prediction shape {:?}", dims))?;

        // Normalize to channel-major before decoding.
        let data: Vec<f32> = if channel_major {
            view.iter().copied().collect()
        } else {
            let mut transposed = vec![0.0f32; (4 + num_classes) * num_anchors];
            for anchor in 0..num_anchors {
                for channel in 0..4 + num_classes {
                    transposed[channel * num_anchors + anchor] = view[[0, anchor, channel]];
                }
            }
            transposed
        };

        let layout = DecodeLayout {
            num_classes,
            num_anchors,
            input_width: self.input_size,
            input_height: self.input_size,
            frame_width: width,
            frame_height: height,
        };
        let candidates =
            yolo::decode_predictions(&data, layout, CANDIDATE_FLOOR, &self.class_names);
        Ok(yolo::non_max_suppression(candidates, self.iou_threshold))
    }
}

/// Interpret a prediction shape as (num_classes, num_anchors, channel_major).
///
/// YOLOv8-style exports are `[1, 4 + nc, anchors]`; some exports transpose
/// the last two axes. The channel axis is taken to be the smaller one.
fn resolve_layout(dims: &[usize]) -> Option<(usize, usize, bool)> {
    if dims.len() != 3 || dims[0] != 1 {
        return None;
    }
    let (a, b) = (dims[1], dims[2]);
    if a <= 4 && b <= 4 {
        return None;
    }
    if a <= b {
        Some((a.checked_sub(4)?, b, true))
    } else {
        Some((b.checked_sub(4)?, a, false))
    }
}

/// Class names for a model: sidecar `.labels` file next to the model wins,
/// then COCO for 80-class models, then generated `class_{i}` names.
fn load_class_names(model_path: &Path, num_classes: Option<usize>) -> Vec<String> {
    let labels_path = model_path.with_extension("labels");
    if let Ok(raw) = std::fs::read_to_string(&labels_path) {
        let names: Vec<String> = raw
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        if !names.is_empty() {
            log::info!(
                "loaded {} class names from {}",
                names.len(),
                labels_path.display()
            );
            return names;
        }
    }

    match num_classes {
        Some(80) | None => COCO_CLASSES.iter().map(|name| name.to_string()).collect(),
        Some(n) => (0..n).map(|i| format!("class_{}", i)).collect(),
    }
}
