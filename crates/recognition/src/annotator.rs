//! Draws recognition results onto a copy of the frame for human review.

use ab_glyph::{FontVec, PxScale};
use common::faces::{BoundingBox, Recognition};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use std::path::Path;

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const BOX_THICKNESS: i32 = 2;
const LABEL_SCALE: f32 = 16.0;
/// Gap between the bottom edge of a box and its label
const LABEL_OFFSET: i32 = 4;

/// Label drawn under each face
pub fn label(identity: &str, confidence: f64) -> String {
    format!("{} @{:.2}", identity, confidence)
}

pub struct Annotator {
    font: Option<FontVec>,
}

impl Annotator {
    /// An annotator that draws boxes only
    pub fn without_labels() -> Self {
        Self { font: None }
    }

    pub fn with_font(font: FontVec) -> Self {
        Self { font: Some(font) }
    }

    /// Load a TrueType font for labels, falling back to boxes only
    pub fn from_font_path(path: &Path) -> Self {
        match load_font(path) {
            Ok(font) => Self::with_font(font),
            Err(e) => {
                tracing::warn!(path = %path.display(), "Label font unavailable, annotating boxes only: {}", e);
                Self::without_labels()
            }
        }
    }

    pub fn draws_labels(&self) -> bool {
        self.font.is_some()
    }

    /// A new image with every face boxed and labelled; `image` is untouched
    pub fn annotate(&self, image: &RgbImage, recognition: &Recognition) -> RgbImage {
        let mut annotated = image.clone();

        for (identity, confidence, bbox) in recognition.iter() {
            draw_box(&mut annotated, bbox);

            if let Some(font) = &self.font {
                draw_text_mut(
                    &mut annotated,
                    TEXT_COLOR,
                    bbox.left,
                    bbox.bottom + LABEL_OFFSET,
                    PxScale::from(LABEL_SCALE),
                    font,
                    &label(identity, confidence),
                );
            }
        }

        annotated
    }
}

fn load_font(path: &Path) -> anyhow::Result<FontVec> {
    let bytes = std::fs::read(path)?;
    Ok(FontVec::try_from_vec(bytes)?)
}

fn draw_box(image: &mut RgbImage, bbox: &BoundingBox) {
    for inset in 0..BOX_THICKNESS {
        let width = bbox.width() as i32 - 2 * inset;
        let height = bbox.height() as i32 - 2 * inset;
        // Rect panics on zero size
        let rect = Rect::at(bbox.left + inset, bbox.top + inset).of_size(width.max(1) as u32, height.max(1) as u32);
        draw_hollow_rect_mut(image, rect, BOX_COLOR);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::faces::IdentityResult;

    fn recognition() -> Recognition {
        let mut recognition = Recognition::default();
        recognition.push(IdentityResult::known("alice", 0.82), BoundingBox::new(10, 10, 50, 60));
        recognition.push(IdentityResult::unknown(), BoundingBox::new(70, 20, 72, 21));
        recognition
    }

    #[test]
    fn test_label_format() {
        assert_eq!(label("alice", 0.8234), "alice @0.82");
        assert_eq!(label("Unknown", 100.0), "Unknown @100.00");
    }

    #[test]
    fn test_annotate_is_pure_and_idempotent() {
        let annotator = Annotator::without_labels();
        let source = RgbImage::from_pixel(120, 90, Rgb([10, 20, 30]));
        let original = source.clone();

        let first = annotator.annotate(&source, &recognition());
        let second = annotator.annotate(&source, &recognition());

        assert_eq!(source.as_raw(), original.as_raw());
        assert_eq!(first.as_raw(), second.as_raw());
        assert_ne!(first.as_raw(), source.as_raw());
    }

    #[test]
    fn test_box_is_two_pixels_thick() {
        let annotator = Annotator::without_labels();
        let source = RgbImage::new(100, 100);
        let annotated = annotator.annotate(&source, &recognition());

        assert_eq!(*annotated.get_pixel(10, 30), BOX_COLOR);
        assert_eq!(*annotated.get_pixel(11, 30), BOX_COLOR);
        assert_eq!(*annotated.get_pixel(12, 30), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_boxes_outside_frame_are_clipped() {
        let annotator = Annotator::without_labels();
        let mut recognition = Recognition::default();
        recognition.push(IdentityResult::known("bob", 0.9), BoundingBox::new(-20, -20, 500, 500));

        let annotated = annotator.annotate(&RgbImage::new(64, 64), &recognition);
        assert_eq!(annotated.dimensions(), (64, 64));
    }

    fn fixture_font() -> Annotator {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/DejaVuSans.ttf");
        let annotator = Annotator::from_font_path(&path);
        assert!(annotator.draws_labels());
        annotator
    }

    #[test]
    fn test_labels_are_drawn_under_each_box() {
        let annotator = fixture_font();
        let source = RgbImage::from_pixel(120, 90, Rgb([10, 20, 30]));
        let original = source.clone();

        let first = annotator.annotate(&source, &recognition());
        let second = annotator.annotate(&source, &recognition());
        assert_eq!(source.as_raw(), original.as_raw());
        assert_eq!(first.as_raw(), second.as_raw());

        // alice's box ends at y = 60, so her label starts at y = 64
        let label_touched = (10..110)
            .flat_map(|x| (64..84).map(move |y| (x, y)))
            .any(|(x, y)| first.get_pixel(x, y) != source.get_pixel(x, y));
        assert!(label_touched);

        // Nothing is drawn in the gap between the box and the label
        for x in 12..48 {
            assert_eq!(first.get_pixel(x, 62), source.get_pixel(x, 62));
        }

        let boxes_only = Annotator::without_labels().annotate(&source, &recognition());
        assert_ne!(first.as_raw(), boxes_only.as_raw());
    }

    #[test]
    fn test_missing_font_falls_back_to_boxes() {
        let annotator = Annotator::from_font_path(Path::new("/nonexistent/font.ttf"));
        assert!(!annotator.draws_labels());
    }
}
