//! Face recognition contracts shared by the recognition pipeline, the
//! poller and the status server.
//!
//! A frame goes through three shapes: detections (where the faces are),
//! embeddings (what each face looks like numerically) and a [`Recognition`]
//! (who each face is, ordered left to right).

use serde::{Deserialize, Serialize};

/// Identity reported for a face that no known person matches confidently.
pub const UNKNOWN_IDENTITY: &str = "Unknown";

/// Confidence reported alongside [`UNKNOWN_IDENTITY`] on the primary path.
///
/// This sits outside `[0, 1]` on purpose and must not be compared with real
/// confidences. The ensemble path reports a dissent ratio instead.
pub const UNKNOWN_CONFIDENCE: f64 = 100.0;

/// Face bounding box in pixel coordinates of the source frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl BoundingBox {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> u32 {
        (self.right - self.left).max(0) as u32
    }

    pub fn height(&self) -> u32 {
        (self.bottom - self.top).max(0) as u32
    }

    pub fn area(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    /// Horizontal centroid, used to order faces left to right
    pub fn center_x(&self) -> f32 {
        (self.left as f32 + self.right as f32) / 2.0
    }

    pub fn center_y(&self) -> f32 {
        (self.top as f32 + self.bottom as f32) / 2.0
    }

    /// Intersection over union with another box (0.0 when disjoint)
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let left = self.left.max(other.left);
        let top = self.top.max(other.top);
        let right = self.right.min(other.right);
        let bottom = self.bottom.min(other.bottom);

        let intersection = if right > left && bottom > top {
            ((right - left) as f32) * ((bottom - top) as f32)
        } else {
            0.0
        };

        let union = self.area() as f32 + other.area() as f32 - intersection;
        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }

    /// Clamp the box to an image of the given size
    pub fn clamp_to(&self, width: u32, height: u32) -> BoundingBox {
        let max_x = width as i32;
        let max_y = height as i32;
        BoundingBox {
            left: self.left.clamp(0, max_x),
            top: self.top.clamp(0, max_y),
            right: self.right.clamp(0, max_x),
            bottom: self.bottom.clamp(0, max_y),
        }
    }
}

/// A face located in a frame, not yet identified
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceDetection {
    pub bbox: BoundingBox,
    pub center_x: f32,
}

impl FaceDetection {
    pub fn new(bbox: BoundingBox) -> Self {
        Self {
            center_x: bbox.center_x(),
            bbox,
        }
    }
}

impl From<BoundingBox> for FaceDetection {
    fn from(bbox: BoundingBox) -> Self {
        Self::new(bbox)
    }
}

/// Fixed-length face descriptor produced by the embedding network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding(Vec<f32>);

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    pub fn dim(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// Values widened to `f64` for the classifiers
    pub fn to_f64(&self) -> Vec<f64> {
        self.0.iter().map(|&v| v as f64).collect()
    }

    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(values: Vec<f32>) -> Self {
        Self(values)
    }
}

/// An embedding paired with the detection it was computed from
pub type FaceSample = (Embedding, FaceDetection);

/// Identification of one face
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityResult {
    pub identity: String,
    pub confidence: f64,
}

impl IdentityResult {
    pub fn known(identity: impl Into<String>, confidence: f64) -> Self {
        Self {
            identity: identity.into(),
            confidence,
        }
    }

    /// The primary-path override for low-confidence faces
    pub fn unknown() -> Self {
        Self {
            identity: UNKNOWN_IDENTITY.to_string(),
            confidence: UNKNOWN_CONFIDENCE,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.identity == UNKNOWN_IDENTITY
    }
}

/// Classifier output for a frame: three parallel sequences, one entry per
/// face, ordered by ascending horizontal center.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Recognition {
    pub identities: Vec<String>,
    pub confidences: Vec<f64>,
    pub boxes: Vec<BoundingBox>,
}

impl Recognition {
    pub fn push(&mut self, result: IdentityResult, bbox: BoundingBox) {
        self.identities.push(result.identity);
        self.confidences.push(result.confidence);
        self.boxes.push(bbox);
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    /// True when there is at least one face and none of them is known
    pub fn all_unknown(&self) -> bool {
        !self.is_empty() && self.identities.iter().all(|i| i == UNKNOWN_IDENTITY)
    }

    /// Identity of the leftmost face, known or not
    pub fn leftmost(&self) -> Option<&str> {
        self.identities.first().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64, &BoundingBox)> {
        self.identities
            .iter()
            .zip(self.confidences.iter())
            .zip(self.boxes.iter())
            .map(|((identity, confidence), bbox)| (identity.as_str(), *confidence, bbox))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bbox_geometry() {
        let bbox = BoundingBox::new(10, 20, 50, 100);
        assert_eq!(bbox.width(), 40);
        assert_eq!(bbox.height(), 80);
        assert_eq!(bbox.center_x(), 30.0);
        assert_eq!(bbox.center_y(), 60.0);

        let inverted = BoundingBox::new(50, 20, 10, 10);
        assert_eq!(inverted.width(), 0);
        assert_eq!(inverted.area(), 0);
    }

    #[test]
    fn test_iou() {
        let a = BoundingBox::new(10, 10, 60, 60);
        let b = BoundingBox::new(30, 30, 80, 80);
        let iou = a.iou(&b);
        assert!(iou > 0.0 && iou < 1.0);
        assert!((a.iou(&a) - 1.0).abs() < 0.001);

        let far = BoundingBox::new(100, 100, 150, 150);
        assert_eq!(a.iou(&far), 0.0);
    }

    #[test]
    fn test_clamp_to_image() {
        let bbox = BoundingBox::new(-5, -10, 700, 500);
        assert_eq!(bbox.clamp_to(640, 480), BoundingBox::new(0, 0, 640, 480));
    }

    #[test]
    fn test_recognition_helpers() {
        let mut recognition = Recognition::default();
        assert!(!recognition.all_unknown());
        assert_eq!(recognition.leftmost(), None);

        recognition.push(IdentityResult::unknown(), BoundingBox::new(0, 0, 10, 10));
        assert!(recognition.all_unknown());
        assert_eq!(recognition.confidences[0], UNKNOWN_CONFIDENCE);
        assert_eq!(recognition.leftmost(), Some(UNKNOWN_IDENTITY));

        recognition.push(
            IdentityResult::known("alice", 0.9),
            BoundingBox::new(20, 0, 30, 10),
        );
        assert!(!recognition.all_unknown());
        assert_eq!(recognition.leftmost(), Some(UNKNOWN_IDENTITY));
        assert_eq!(recognition.len(), 2);
    }
}
