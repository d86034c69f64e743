//! Embedding Extractor
//!
//! Three stages per frame:
//! 1. Detection: locate every face
//! 2. Alignment: warp each face to a canonical pose using eye and nose landmarks
//! 3. Embedding: run the aligned patch through the embedding network
pub mod align;
pub mod detector;
pub mod embedder;
pub mod landmarks;

use crate::config::RecognitionConfig;
use crate::error::Result;
use crate::session::SessionOptions;
use align::FaceAligner;
use common::faces::{FaceDetection, FaceSample};
use detector::{FaceDetector, OnnxFaceDetector};
use embedder::{EmbeddingNetwork, OnnxEmbeddingNetwork};
use image::RgbImage;
use landmarks::{LandmarkLocator, OnnxLandmarkLocator};

pub struct EmbeddingExtractor {
    detector: Box<dyn FaceDetector>,
    landmarks: Box<dyn LandmarkLocator>,
    aligner: FaceAligner,
    network: Box<dyn EmbeddingNetwork>,
}

impl EmbeddingExtractor {
    pub fn new(
        detector: Box<dyn FaceDetector>,
        landmarks: Box<dyn LandmarkLocator>,
        aligner: FaceAligner,
        network: Box<dyn EmbeddingNetwork>,
    ) -> Self {
        Self {
            detector,
            landmarks,
            aligner,
            network,
        }
    }

    /// Load the three ONNX models named by the configuration
    pub fn from_config(config: &RecognitionConfig) -> Result<Self> {
        let options = SessionOptions::from(config);

        let detector = OnnxFaceDetector::load(&config.detection_model_path, config.into(), &options)?;
        let landmarks = OnnxLandmarkLocator::load(
            &config.landmark_model_path,
            config.landmark_input_size,
            &options,
        )?;
        let network = OnnxEmbeddingNetwork::load(&config.embedding_model_path, &options)?;

        Ok(Self::new(
            Box::new(detector),
            Box::new(landmarks),
            FaceAligner::new(config.img_dim),
            Box::new(network),
        ))
    }

    /// One `(embedding, detection)` per face, in detection order
    ///
    /// A frame without faces gives an empty list. Failing to align any face
    /// fails the whole frame.
    pub fn extract(&self, image: &RgbImage) -> Result<Vec<FaceSample>> {
        let boxes = self.detector.detect(image)?;
        if boxes.is_empty() {
            tracing::debug!("No faces found");
            return Ok(Vec::new());
        }

        let mut samples = Vec::with_capacity(boxes.len());
        for bbox in boxes {
            let landmarks = self.landmarks.locate(image, &bbox)?;
            let aligned = self.aligner.align(image, &landmarks)?;
            let embedding = self.network.embed(&aligned)?;
            samples.push((embedding, FaceDetection::new(bbox)));
        }

        tracing::info!("Found {} faces", samples.len());
        telemetry::metrics::FACES_DETECTED.inc_by(samples.len() as u64);
        Ok(samples)
    }
}
