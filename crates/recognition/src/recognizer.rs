//! Extractor and classifier combined behind one best-effort call.

use crate::classifier::IdentityClassifier;
use crate::config::RecognitionConfig;
use crate::error::Result;
use crate::extractor::EmbeddingExtractor;
use common::faces::Recognition;
use image::RgbImage;
use std::time::Instant;
use telemetry::metrics::{RECOGNITION_DEGRADED, RECOGNITION_LATENCY};

pub struct FaceRecognizer {
    extractor: EmbeddingExtractor,
    classifier: IdentityClassifier,
}

impl FaceRecognizer {
    pub fn new(extractor: EmbeddingExtractor, classifier: IdentityClassifier) -> Self {
        Self { extractor, classifier }
    }

    /// Load every model once; nothing is reloaded per frame
    pub fn from_config(config: &RecognitionConfig) -> Result<Self> {
        let extractor = EmbeddingExtractor::from_config(config)?;
        let classifier = IdentityClassifier::from_config(config)?;

        tracing::info!(
            mode = ?config.classifier_mode,
            threshold = config.classification_threshold,
            "Face recognizer ready"
        );
        Ok(Self::new(extractor, classifier))
    }

    /// Identities for every face in `image`, left to right
    ///
    /// Never fails: an extraction failure yields an empty result and a
    /// classification failure yields the faces classified before it, both
    /// logged as degraded.
    pub fn infer(&self, image: &RgbImage) -> Recognition {
        let start = Instant::now();

        let samples = match self.extractor.extract(image) {
            Ok(samples) => samples,
            Err(e) => {
                tracing::warn!("recognition degraded: face extraction failed: {}", e);
                RECOGNITION_DEGRADED.with_label_values(&["extract"]).inc();
                RECOGNITION_LATENCY.observe(start.elapsed().as_secs_f64());
                return Recognition::default();
            }
        };

        let classification = self.classifier.classify(samples);
        if let Some(e) = &classification.error {
            tracing::warn!(
                kept = classification.recognition.len(),
                "recognition degraded: classification stopped early: {}",
                e
            );
            RECOGNITION_DEGRADED.with_label_values(&["classify"]).inc();
        }

        RECOGNITION_LATENCY.observe(start.elapsed().as_secs_f64());
        classification.recognition
    }
}
