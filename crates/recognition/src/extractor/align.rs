//! Geometric alignment of a face to a canonical frontal pose.
//!
//! The outer eye corners and the nose tip are mapped by an affine transform
//! onto fixed positions of a square patch, so the embedding network always
//! sees eyes and nose in the same place.

use super::landmarks::{FaceLandmarks, Point};
use crate::error::{RecognitionError, Result};
use image::{Rgb, RgbImage};
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};

/// Canonical anchor positions as fractions of the patch side: outer eye
/// corners, then nose tip
pub const ALIGNMENT_TEMPLATE: [Point; 3] = [(0.1945, 0.1693), (0.8055, 0.1693), (0.5, 0.5730)];

/// Landmark triangles smaller than this (in px²) cannot define a pose
const MIN_LANDMARK_AREA: f64 = 1.0;

#[derive(Debug, Clone, Copy)]
pub struct FaceAligner {
    img_dim: u32,
}

impl FaceAligner {
    pub fn new(img_dim: u32) -> Self {
        Self { img_dim }
    }

    pub fn img_dim(&self) -> u32 {
        self.img_dim
    }

    /// Warp the face described by `landmarks` into an `img_dim` square patch
    pub fn align(&self, image: &RgbImage, landmarks: &FaceLandmarks) -> Result<RgbImage> {
        let source = landmarks.points();
        if source.iter().any(|(x, y)| !x.is_finite() || !y.is_finite()) {
            return Err(RecognitionError::Alignment(
                "landmarks contain non-finite coordinates".to_string(),
            ));
        }

        let side = self.img_dim as f32;
        let target = ALIGNMENT_TEMPLATE.map(|(x, y)| (x * side, y * side));

        let [a, b, c, d, e, f] = solve_affine(&source, &target)?;
        let projection = Projection::from_matrix([a, b, c, d, e, f, 0.0, 0.0, 1.0]).ok_or_else(|| {
            RecognitionError::Alignment("alignment transform is not invertible".to_string())
        })?;

        let mut aligned = RgbImage::new(self.img_dim, self.img_dim);
        warp_into(image, &projection, Interpolation::Bilinear, Rgb([0, 0, 0]), &mut aligned);
        Ok(aligned)
    }
}

/// Affine coefficients `[a, b, c, d, e, f]` with
/// `u = a*x + b*y + c` and `v = d*x + e*y + f` mapping each source point to
/// its target
fn solve_affine(source: &[Point; 3], target: &[Point; 3]) -> Result<[f32; 6]> {
    let xs = source.map(|(x, _)| x as f64);
    let ys = source.map(|(_, y)| y as f64);
    let ones = [1.0; 3];

    let det = det3(xs, ys, ones);
    if det.abs() / 2.0 < MIN_LANDMARK_AREA {
        return Err(RecognitionError::Alignment(
            "landmarks are collinear or too close together".to_string(),
        ));
    }

    let solve = |rhs: [f64; 3]| -> [f32; 3] {
        [
            (det3(rhs, ys, ones) / det) as f32,
            (det3(xs, rhs, ones) / det) as f32,
            (det3(xs, ys, rhs) / det) as f32,
        ]
    };

    let [a, b, c] = solve(target.map(|(u, _)| u as f64));
    let [d, e, f] = solve(target.map(|(_, v)| v as f64));
    Ok([a, b, c, d, e, f])
}

/// Determinant of the 3x3 matrix with the given columns
fn det3(c0: [f64; 3], c1: [f64; 3], c2: [f64; 3]) -> f64 {
    c0[0] * (c1[1] * c2[2] - c1[2] * c2[1]) - c1[0] * (c0[1] * c2[2] - c0[2] * c2[1])
        + c2[0] * (c0[1] * c1[2] - c0[2] * c1[1])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn landmarks(points: [Point; 3]) -> FaceLandmarks {
        FaceLandmarks {
            outer_eye_left: points[0],
            outer_eye_right: points[1],
            nose_tip: points[2],
        }
    }

    #[test]
    fn test_solve_affine_recovers_scale_and_shift() {
        let source = [(0.0, 0.0), (10.0, 0.0), (0.0, 10.0)];
        let target = [(5.0, 7.0), (25.0, 7.0), (5.0, 27.0)];

        let [a, b, c, d, e, f] = solve_affine(&source, &target).unwrap();
        assert!((a - 2.0).abs() < 1e-5);
        assert!(b.abs() < 1e-5);
        assert!((c - 5.0).abs() < 1e-5);
        assert!(d.abs() < 1e-5);
        assert!((e - 2.0).abs() < 1e-5);
        assert!((f - 7.0).abs() < 1e-5);
    }

    #[test]
    fn test_collinear_landmarks_fail_alignment() {
        let aligner = FaceAligner::new(96);
        let image = RgbImage::new(200, 200);
        let collinear = landmarks([(10.0, 10.0), (50.0, 50.0), (90.0, 90.0)]);

        let result = aligner.align(&image, &collinear);
        assert!(matches!(result, Err(RecognitionError::Alignment(_))));
    }

    #[test]
    fn test_non_finite_landmarks_fail_alignment() {
        let aligner = FaceAligner::new(96);
        let image = RgbImage::new(200, 200);
        let broken = landmarks([(f32::NAN, 10.0), (50.0, 10.0), (30.0, 40.0)]);

        assert!(matches!(
            aligner.align(&image, &broken),
            Err(RecognitionError::Alignment(_))
        ));
    }

    #[test]
    fn test_aligned_patch_has_canonical_size() {
        let aligner = FaceAligner::new(96);
        let image = RgbImage::from_pixel(320, 240, Rgb([200, 100, 50]));
        let face = landmarks([(120.0, 90.0), (180.0, 92.0), (150.0, 130.0)]);

        let patch = aligner.align(&image, &face).unwrap();
        assert_eq!(patch.dimensions(), (96, 96));
        // Centre of the patch maps back inside the uniform frame
        let centre = patch.get_pixel(48, 48);
        for (actual, expected) in centre.0.iter().zip([200u8, 100, 50]) {
            assert!(actual.abs_diff(expected) <= 1);
        }
    }

    #[test]
    fn test_alignment_is_deterministic() {
        let aligner = FaceAligner::new(96);
        let image = RgbImage::from_fn(320, 240, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 7]));
        let face = landmarks([(100.0, 80.0), (170.0, 85.0), (135.0, 125.0)]);

        let first = aligner.align(&image, &face).unwrap();
        let second = aligner.align(&image, &face).unwrap();
        assert_eq!(first.as_raw(), second.as_raw());
    }
}
