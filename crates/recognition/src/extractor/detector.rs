//! Face detection stage: locates every face in a frame.

use crate::error::{RecognitionError, Result};
use crate::session::{OnnxModel, SessionOptions};
use common::faces::BoundingBox;
use image::RgbImage;
use ndarray::{Array, IxDyn};
use std::path::Path;

/// Finds face bounding boxes in an image
pub trait FaceDetector: Send + Sync {
    /// All faces in the image, in the detector's own order; an image without
    /// faces yields an empty list
    fn detect(&self, image: &RgbImage) -> Result<Vec<BoundingBox>>;
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub input_size: u32,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub max_detections: usize,
}

impl From<&crate::config::RecognitionConfig> for DetectorSettings {
    fn from(config: &crate::config::RecognitionConfig) -> Self {
        Self {
            input_size: config.detection_input_size,
            confidence_threshold: config.detection_confidence,
            iou_threshold: config.iou_threshold,
            max_detections: config.max_detections,
        }
    }
}

/// YOLO-style single-class face detector (`[batch, 5, num_predictions]`)
pub struct OnnxFaceDetector {
    model: OnnxModel,
    settings: DetectorSettings,
}

impl OnnxFaceDetector {
    pub fn load(path: &Path, settings: DetectorSettings, options: &SessionOptions) -> Result<Self> {
        Ok(Self {
            model: OnnxModel::load("face_detection", path, options)?,
            settings,
        })
    }
}

impl FaceDetector for OnnxFaceDetector {
    fn detect(&self, image: &RgbImage) -> Result<Vec<BoundingBox>> {
        let input = preprocess(image, self.settings.input_size);
        let output = self.model.run(input, &["output0", "output", "boxes"])?;
        postprocess(&output, image.width(), image.height(), &self.settings)
    }
}

/// Resize to the square model input; NCHW, normalized to [0, 1]
fn preprocess(image: &RgbImage, size: u32) -> Array<f32, IxDyn> {
    let resized = image::imageops::resize(image, size, size, image::imageops::FilterType::Triangle);
    let mut input = Array::zeros(IxDyn(&[1, 3, size as usize, size as usize]));

    for (x, y, pixel) in resized.enumerate_pixels() {
        for channel in 0..3 {
            input[[0, channel, y as usize, x as usize]] = pixel[channel] as f32 / 255.0;
        }
    }

    input
}

fn postprocess(
    output: &Array<f32, IxDyn>,
    original_width: u32,
    original_height: u32,
    settings: &DetectorSettings,
) -> Result<Vec<BoundingBox>> {
    let shape = output.shape();
    if shape.len() != 3 || shape[1] < 5 {
        return Err(RecognitionError::Model(format!(
            "Unexpected face detection output shape {:?}",
            shape
        )));
    }

    let scale_x = original_width as f32 / settings.input_size as f32;
    let scale_y = original_height as f32 / settings.input_size as f32;

    let mut candidates = Vec::new();
    for i in 0..shape[2] {
        let confidence = output[[0, 4, i]];
        if confidence < settings.confidence_threshold {
            continue;
        }

        let cx = output[[0, 0, i]];
        let cy = output[[0, 1, i]];
        let w = output[[0, 2, i]];
        let h = output[[0, 3, i]];

        let bbox = BoundingBox::new(
            ((cx - w / 2.0) * scale_x).round() as i32,
            ((cy - h / 2.0) * scale_y).round() as i32,
            ((cx + w / 2.0) * scale_x).round() as i32,
            ((cy + h / 2.0) * scale_y).round() as i32,
        )
        .clamp_to(original_width, original_height);

        if bbox.area() > 0 {
            candidates.push((bbox, confidence));
        }
    }

    Ok(nms(candidates, settings.iou_threshold)
        .into_iter()
        .take(settings.max_detections)
        .map(|(bbox, _)| bbox)
        .collect())
}

/// Greedy non-maximum suppression, highest confidence first
fn nms(mut boxes: Vec<(BoundingBox, f32)>, iou_threshold: f32) -> Vec<(BoundingBox, f32)> {
    boxes.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let mut keep: Vec<(BoundingBox, f32)> = Vec::new();
    for candidate in boxes {
        if keep.iter().all(|(kept, _)| kept.iou(&candidate.0) < iou_threshold) {
            keep.push(candidate);
        }
    }

    keep
}
