//! Identity Classifier
//!
//! Turns per-face embeddings into identities ordered left to right across the
//! frame. The primary path thresholds a single trained model; the ensemble path
//! resolves each face by majority vote.

pub mod ensemble;
pub mod model;

use crate::config::{ClassifierMode, RecognitionConfig};
use crate::error::Result;
use common::faces::{FaceSample, IdentityResult, Recognition};
use ensemble::Ensemble;
use model::ClassifierModel;

/// A confidence counts only strictly above the threshold
pub(crate) fn is_confident(confidence: f64, threshold: f64) -> bool {
    confidence > threshold
}

/// Outcome of a classification pass
///
/// `error` is set when a face failed to classify; `recognition` then holds
/// the faces to its left, which were classified before the failure.
#[derive(Debug, Default)]
pub struct Classification {
    pub recognition: Recognition,
    pub error: Option<crate::RecognitionError>,
}

pub enum IdentityClassifier {
    Single { model: ClassifierModel, threshold: f64 },
    Ensemble(Ensemble),
}

impl IdentityClassifier {
    pub fn single(model: ClassifierModel, threshold: f64) -> Self {
        Self::Single { model, threshold }
    }

    /// Load the artifact(s) for the configured mode once
    pub fn from_config(config: &RecognitionConfig) -> Result<Self> {
        match config.classifier_mode {
            ClassifierMode::Single => Ok(Self::single(
                ClassifierModel::load(&config.classifier_model_path)?,
                config.classification_threshold,
            )),
            ClassifierMode::Ensemble => Ok(Self::Ensemble(Ensemble::load_dir(&config.ensemble_model_dir)?)),
        }
    }

    /// Identity for a single embedding
    pub fn identify(&self, embedding: &[f64]) -> Result<IdentityResult> {
        match self {
            Self::Single { model, threshold } => {
                let (identity, confidence) = model.predict(embedding)?;
                if is_confident(confidence, *threshold) {
                    Ok(IdentityResult::known(identity, confidence))
                } else {
                    tracing::debug!(candidate = %identity, confidence, "Below threshold, reporting Unknown");
                    Ok(IdentityResult::unknown())
                }
            }
            Self::Ensemble(ensemble) => ensemble.predict(embedding),
        }
    }

    /// Classify every face of a frame, ordered by ascending horizontal center
    ///
    /// Stops at the first face that fails and keeps what was classified
    /// before it, so identities, confidences and boxes stay parallel.
    pub fn classify(&self, mut samples: Vec<FaceSample>) -> Classification {
        samples.sort_by(|a, b| a.1.center_x.total_cmp(&b.1.center_x));

        let mut classification = Classification::default();
        for (embedding, detection) in &samples {
            match self.identify(&embedding.to_f64()) {
                Ok(result) => {
                    telemetry::metrics::IDENTITIES_REPORTED
                        .with_label_values(&[if result.is_unknown() { "unknown" } else { "known" }])
                        .inc();
                    classification.recognition.push(result, detection.bbox);
                }
                Err(e) => {
                    classification.error = Some(e);
                    break;
                }
            }
        }

        classification
    }
}
