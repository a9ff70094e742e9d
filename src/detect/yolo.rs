//! YOLO output decoding.
//!
//! Turns a raw prediction tensor into pixel-space detections: per-anchor
//! class-score argmax, confidence floor, rescale to the original frame, and
//! per-class non-maximum suppression.
//!
//! The decoder expects the channel-major layout used by YOLOv8-style heads:
//! `[4 + num_classes, num_anchors]`, where the first four channels are the
//! box center/size in model-input pixels.

use crate::detect::result::{BoundingBox, Detection};

/// COCO dataset class names, the default label set for 80-class models.
pub const COCO_CLASSES: [&str; 80] = [
    "person",
    "bicycle",
    "car",
    "motorcycle",
    "airplane",
    "bus",
    "train",
    "truck",
    "boat",
    "traffic light",
    "fire hydrant",
    "stop sign",
    "parking meter",
    "bench",
    "bird",
    "cat",
    "dog",
    "horse",
    "sheep",
    "cow",
    "elephant",
    "bear",
    "zebra",
    "giraffe",
    "backpack",
    "umbrella",
    "handbag",
    "tie",
    "suitcase",
    "frisbee",
    "skis",
    "snowboard",
    "sports ball",
    "kite",
    "baseball bat",
    "baseball glove",
    "skateboard",
    "surfboard",
    "tennis racket",
    "bottle",
    "wine glass",
    "cup",
    "fork",
    "knife",
    "spoon",
    "bowl",
    "banana",
    "apple",
    "sandwich",
    "orange",
    "broccoli",
    "carrot",
    "hot dog",
    "pizza",
    "donut",
    "cake",
    "chair",
    "couch",
    "potted plant",
    "bed",
    "dining table",
    "toilet",
    "tv",
    "laptop",
    "mouse",
    "remote",
    "keyboard",
    "cell phone",
    "microwave",
    "oven",
    "toaster",
    "sink",
    "refrigerator",
    "book",
    "clock",
    "vase",
    "scissors",
    "teddy bear",
    "hair drier",
    "toothbrush",
];

/// Geometry of a prediction tensor.
#[derive(Clone, Copy, Debug)]
pub struct DecodeLayout {
    pub num_classes: usize,
    pub num_anchors: usize,
    /// Model input size the box coordinates are expressed in.
    pub input_width: u32,
    pub input_height: u32,
    /// Original frame size the boxes are rescaled to.
    pub frame_width: u32,
    pub frame_height: u32,
}

/// Decode a channel-major `[4 + num_classes, num_anchors]` prediction slice.
///
/// Candidates below `confidence_floor` are dropped before NMS. Returned
/// boxes are in frame pixel coordinates.
pub fn decode_predictions(
    data: &[f32],
    layout: DecodeLayout,
    confidence_floor: f32,
    class_names: &[String],
) -> Vec<Detection> {
    let channels = 4 + layout.num_classes;
    if data.len() < channels * layout.num_anchors {
        log::warn!(
            "prediction tensor too small: {} values for {}x{}",
            data.len(),
            channels,
            layout.num_anchors
        );
        return Vec::new();
    }

    let at = |channel: usize, anchor: usize| data[channel * layout.num_anchors + anchor];

    let scale_x = layout.frame_width as f32 / layout.input_width as f32;
    let scale_y = layout.frame_height as f32 / layout.input_height as f32;

    let mut detections = Vec::new();
    for anchor in 0..layout.num_anchors {
        let mut best_score = 0.0f32;
        let mut best_class = 0usize;
        for class_id in 0..layout.num_classes {
            let score = at(4 + class_id, anchor);
            if score > best_score {
                best_score = score;
                best_class = class_id;
            }
        }

        if best_score < confidence_floor {
            continue;
        }

        let cx = at(0, anchor);
        let cy = at(1, anchor);
        let w = at(2, anchor);
        let h = at(3, anchor);

        detections.push(Detection {
            class_id: best_class,
            class_name: class_names
                .get(best_class)
                .cloned()
                .unwrap_or_else(|| format!("class_{}", best_class)),
            confidence: best_score,
            bbox: BoundingBox {
                x: (cx - w / 2.0) * scale_x,
                y: (cy - h / 2.0) * scale_y,
                width: w * scale_x,
                height: h * scale_y,
            },
        });
    }

    detections
}

/// Per-class non-maximum suppression. The result is sorted by descending
/// confidence, which is also the stable iteration order used for rendering
/// and counting.
pub fn non_max_suppression(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut kept: Vec<Detection> = Vec::new();
    for candidate in detections {
        let suppressed = kept.iter().any(|winner| {
            winner.class_id == candidate.class_id
                && winner.bbox.iou(&candidate.bbox) >= iou_threshold
        });
        if !suppressed {
            kept.push(candidate);
        }
    }

    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(class_id: usize, confidence: f32, x: f32) -> Detection {
        Detection {
            class_id,
            class_name: format!("class_{}", class_id),
            confidence,
            bbox: BoundingBox {
                x,
                y: 0.0,
                width: 10.0,
                height: 10.0,
            },
        }
    }

    /// One-anchor tensor: box centered at (320, 320) with a single hot class.
    fn single_anchor_tensor(num_classes: usize, hot_class: usize, score: f32) -> Vec<f32> {
        let mut data = vec![0.0f32; 4 + num_classes];
        data[0] = 320.0;
        data[1] = 320.0;
        data[2] = 64.0;
        data[3] = 64.0;
        data[4 + hot_class] = score;
        data
    }

    #[test]
    fn decode_scales_boxes_to_frame_coordinates() {
        let layout = DecodeLayout {
            num_classes: 3,
            num_anchors: 1,
            input_width: 640,
            input_height: 640,
            frame_width: 1280,
            frame_height: 640,
        };
        let names: Vec<String> = vec!["a".into(), "b".into(), "c".into()];
        let data = single_anchor_tensor(3, 1, 0.9);

        let detections = decode_predictions(&data, layout, 0.25, &names);
        assert_eq!(detections.len(), 1);
        let d = &detections[0];
        assert_eq!(d.class_id, 1);
        assert_eq!(d.class_name, "b");
        // 2x horizontal scale, 1x vertical.
        assert_eq!(d.bbox.x, (320.0 - 32.0) * 2.0);
        assert_eq!(d.bbox.y, 320.0 - 32.0);
        assert_eq!(d.bbox.width, 128.0);
        assert_eq!(d.bbox.height, 64.0);
    }

    #[test]
    fn decode_drops_candidates_below_floor() {
        let layout = DecodeLayout {
            num_classes: 2,
            num_anchors: 1,
            input_width: 640,
            input_height: 640,
            frame_width: 640,
            frame_height: 640,
        };
        let names: Vec<String> = vec!["a".into(), "b".into()];
        let data = single_anchor_tensor(2, 0, 0.1);

        let detections = decode_predictions(&data, layout, 0.25, &names);
        assert!(detections.is_empty());
    }

    #[test]
    fn nms_suppresses_overlapping_same_class_boxes() {
        let overlapping = vec![det(0, 0.9, 0.0), det(0, 0.7, 2.0)];
        let kept = non_max_suppression(overlapping, 0.45);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].confidence, 0.9);
    }

    #[test]
    fn nms_keeps_overlapping_boxes_of_different_classes() {
        let overlapping = vec![det(0, 0.9, 0.0), det(1, 0.7, 2.0)];
        let kept = non_max_suppression(overlapping, 0.45);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn nms_sorts_by_descending_confidence() {
        let spread = vec![det(0, 0.4, 0.0), det(1, 0.8, 100.0), det(2, 0.6, 200.0)];
        let kept = non_max_suppression(spread, 0.45);
        let confidences: Vec<f32> = kept.iter().map(|d| d.confidence).collect();
        assert_eq!(confidences, vec![0.8, 0.6, 0.4]);
    }
}
