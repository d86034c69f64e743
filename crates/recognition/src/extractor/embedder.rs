//! Embedding stage: turns an aligned face patch into a descriptor vector.

use crate::error::{RecognitionError, Result};
use crate::session::{OnnxModel, SessionOptions};
use common::faces::Embedding;
use image::RgbImage;
use ndarray::{Array, IxDyn};
use std::path::Path;

/// Maps an aligned face patch to its embedding
///
/// Implementations must be deterministic for the same patch and weights.
pub trait EmbeddingNetwork: Send + Sync {
    fn embed(&self, aligned_face: &RgbImage) -> Result<Embedding>;
}

/// OpenFace-style embedding network (`[1, 3, dim, dim]` in, `[1, D]` out)
pub struct OnnxEmbeddingNetwork {
    model: OnnxModel,
}

impl OnnxEmbeddingNetwork {
    pub fn load(path: &Path, options: &SessionOptions) -> Result<Self> {
        Ok(Self {
            model: OnnxModel::load("face_embedding", path, options)?,
        })
    }
}

impl EmbeddingNetwork for OnnxEmbeddingNetwork {
    fn embed(&self, aligned_face: &RgbImage) -> Result<Embedding> {
        let output = self
            .model
            .run(to_tensor(aligned_face), &["output", "output0", "embedding"])?;

        // Expected shape: [batch, embedding_dim]
        if output.ndim() != 2 || output.shape()[0] != 1 || output.shape()[1] == 0 {
            return Err(RecognitionError::Model(format!(
                "Unexpected embedding output shape {:?}",
                output.shape()
            )));
        }

        Ok(l2_normalize(output.iter().copied().collect()))
    }
}

/// NCHW tensor, RGB scaled to [0, 1]
fn to_tensor(patch: &RgbImage) -> Array<f32, IxDyn> {
    let (width, height) = patch.dimensions();
    let mut input = Array::zeros(IxDyn(&[1, 3, height as usize, width as usize]));

    for (x, y, pixel) in patch.enumerate_pixels() {
        for channel in 0..3 {
            input[[0, channel, y as usize, x as usize]] = pixel[channel] as f32 / 255.0;
        }
    }

    input
}

fn l2_normalize(mut values: Vec<f32>) -> Embedding {
    let norm: f32 = values.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in &mut values {
            *value /= norm;
        }
    }
    Embedding::new(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_l2_normalize() {
        let embedding = l2_normalize(vec![3.0, 4.0]);
        assert_eq!(embedding.as_slice(), &[0.6, 0.8]);

        let zero = l2_normalize(vec![0.0, 0.0]);
        assert_eq!(zero.as_slice(), &[0.0, 0.0]);
    }

    #[test]
    fn test_to_tensor_layout() {
        let mut patch = RgbImage::new(4, 2);
        patch.put_pixel(3, 1, image::Rgb([255, 51, 0]));

        let tensor = to_tensor(&patch);
        assert_eq!(tensor.shape(), &[1, 3, 2, 4]);
        assert!((tensor[[0, 0, 1, 3]] - 1.0).abs() < 1e-6);
        assert!((tensor[[0, 1, 1, 3]] - 0.2).abs() < 1e-6);
        assert_eq!(tensor[[0, 2, 1, 3]], 0.0);
    }
}
