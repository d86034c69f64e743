//! Facial landmark stage: finds the anatomical points used for alignment.

use crate::error::{RecognitionError, Result};
use crate::session::{OnnxModel, SessionOptions};
use common::faces::BoundingBox;
use image::RgbImage;
use ndarray::{Array, IxDyn};
use std::path::Path;

/// Number of points produced by the landmark model
pub const NUM_FACIAL_LANDMARKS: usize = 68;

// 68-point (iBUG) indices of the alignment anchors
const OUTER_EYE_LEFT: usize = 36;
const OUTER_EYE_RIGHT: usize = 45;
const NOSE_TIP: usize = 33;

/// A point in frame pixel coordinates
pub type Point = (f32, f32);

/// Outer eye corners and nose tip; `left`/`right` are in image space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceLandmarks {
    pub outer_eye_left: Point,
    pub outer_eye_right: Point,
    pub nose_tip: Point,
}

impl FaceLandmarks {
    pub fn points(&self) -> [Point; 3] {
        [self.outer_eye_left, self.outer_eye_right, self.nose_tip]
    }

    /// Pick the anchors out of a full 68-point set
    pub fn from_full_set(points: &[Point]) -> Result<Self> {
        if points.len() < NUM_FACIAL_LANDMARKS {
            return Err(RecognitionError::Model(format!(
                "Expected {} landmarks, got {}",
                NUM_FACIAL_LANDMARKS,
                points.len()
            )));
        }

        Ok(Self {
            outer_eye_left: points[OUTER_EYE_LEFT],
            outer_eye_right: points[OUTER_EYE_RIGHT],
            nose_tip: points[NOSE_TIP],
        })
    }
}

/// Locates alignment landmarks inside a detected face
pub trait LandmarkLocator: Send + Sync {
    fn locate(&self, image: &RgbImage, face: &BoundingBox) -> Result<FaceLandmarks>;
}

/// 68-point landmark regression model run on the face crop
pub struct OnnxLandmarkLocator {
    model: OnnxModel,
    input_size: u32,
}

impl OnnxLandmarkLocator {
    pub fn load(path: &Path, input_size: u32, options: &SessionOptions) -> Result<Self> {
        Ok(Self {
            model: OnnxModel::load("face_landmarks", path, options)?,
            input_size,
        })
    }

    fn preprocess(&self, crop: &RgbImage) -> Array<f32, IxDyn> {
        let size = self.input_size;
        let resized = image::imageops::resize(crop, size, size, image::imageops::FilterType::Triangle);
        let mut input = Array::zeros(IxDyn(&[1, 3, size as usize, size as usize]));

        for (x, y, pixel) in resized.enumerate_pixels() {
            for channel in 0..3 {
                input[[0, channel, y as usize, x as usize]] = pixel[channel] as f32 / 255.0;
            }
        }

        input
    }
}

impl LandmarkLocator for OnnxLandmarkLocator {
    fn locate(&self, image: &RgbImage, face: &BoundingBox) -> Result<FaceLandmarks> {
        let region = face.clamp_to(image.width(), image.height());
        if region.area() == 0 {
            return Err(RecognitionError::Alignment(format!(
                "face box {:?} lies outside the frame",
                face
            )));
        }

        let crop = image::imageops::crop_imm(
            image,
            region.left as u32,
            region.top as u32,
            region.width(),
            region.height(),
        )
        .to_image();

        let marks = self.model.run(self.preprocess(&crop), &["output", "output0", "landmarks"])?;
        let points = scale_marks(
            marks.iter().copied(),
            &region,
            self.input_size,
        );
        FaceLandmarks::from_full_set(&points)
    }
}

/// Map flat `(x, y)` pairs from model input space back to frame coordinates
fn scale_marks(marks: impl Iterator<Item = f32>, region: &BoundingBox, input_size: u32) -> Vec<Point> {
    let scale_x = region.width() as f32 / input_size as f32;
    let scale_y = region.height() as f32 / input_size as f32;

    let flat: Vec<f32> = marks.collect();
    flat.chunks_exact(2)
        .map(|pair| {
            (
                region.left as f32 + pair[0] * scale_x,
                region.top as f32 + pair[1] * scale_y,
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anchor_indices() {
        // Right eye 36-41, left eye 42-47, lower nose 31-35
        assert_eq!(OUTER_EYE_LEFT, 36);
        assert_eq!(OUTER_EYE_RIGHT, 45);
        assert_eq!(NOSE_TIP, 33);
        assert!(OUTER_EYE_RIGHT < NUM_FACIAL_LANDMARKS);
    }

    #[test]
    fn test_scale_marks_to_frame() {
        let region = BoundingBox::new(100, 50, 164, 114);
        let points = scale_marks([0.0, 0.0, 128.0, 64.0].into_iter(), &region, 128);
        assert_eq!(points, vec![(100.0, 50.0), (164.0, 82.0)]);
    }

    #[test]
    fn test_from_full_set_picks_anchors() {
        let points: Vec<Point> = (0..NUM_FACIAL_LANDMARKS).map(|i| (i as f32, 0.0)).collect();
        let landmarks = FaceLandmarks::from_full_set(&points).unwrap();
        assert_eq!(landmarks.outer_eye_left, (36.0, 0.0));
        assert_eq!(landmarks.outer_eye_right, (45.0, 0.0));
        assert_eq!(landmarks.nose_tip, (33.0, 0.0));
    }

    #[test]
    fn test_from_full_set_rejects_short_output() {
        let points = vec![(0.0, 0.0); 10];
        assert!(FaceLandmarks::from_full_set(&points).is_err());
    }
}
