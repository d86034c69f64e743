use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Which classifier resolves identities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierMode {
    /// One classifier with a fixed confidence threshold
    #[default]
    Single,
    /// Majority vote over several independently trained classifiers
    Ensemble,
}

impl std::str::FromStr for ClassifierMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "single" => Ok(Self::Single),
            "ensemble" => Ok(Self::Ensemble),
            other => anyhow::bail!("unknown classifier mode '{}'", other),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognitionConfig {
    /// Path to the face detection ONNX model file
    pub detection_model_path: PathBuf,

    /// Path to the 68-point facial landmark ONNX model file
    pub landmark_model_path: PathBuf,

    /// Path to the face embedding ONNX model file
    pub embedding_model_path: PathBuf,

    /// Path to the primary classifier artifact
    pub classifier_model_path: PathBuf,

    /// Directory holding one artifact per ensemble variant
    pub ensemble_model_dir: PathBuf,

    #[serde(default)]
    pub classifier_mode: ClassifierMode,

    /// Primary-path identity threshold; confidences at or below it are Unknown
    #[serde(default = "default_classification_threshold")]
    pub classification_threshold: f64,

    /// Confidence threshold for face detections (0.0 to 1.0)
    #[serde(default = "default_detection_confidence")]
    pub detection_confidence: f32,

    /// IoU (Intersection over Union) threshold for NMS
    #[serde(default = "default_iou_threshold")]
    pub iou_threshold: f32,

    /// Maximum number of faces to detect per frame
    #[serde(default = "default_max_detections")]
    pub max_detections: usize,

    /// Detection model input size (width and height)
    #[serde(default = "default_detection_input_size")]
    pub detection_input_size: u32,

    /// Landmark model input size (width and height)
    #[serde(default = "default_landmark_input_size")]
    pub landmark_input_size: u32,

    /// Side of the aligned face patch fed to the embedding network
    #[serde(default = "default_img_dim")]
    pub img_dim: u32,

    /// Execution provider preference (CPU, CUDA, TensorRT)
    #[serde(default = "default_execution_provider")]
    pub execution_provider: String,

    /// GPU device ID (0, 1, 2, etc.)
    #[serde(default)]
    pub device_id: i32,

    /// Number of intra-operation threads
    #[serde(default = "default_intra_threads")]
    pub intra_threads: usize,
}

fn default_classification_threshold() -> f64 {
    0.5
}

fn default_detection_confidence() -> f32 {
    0.6
}

fn default_iou_threshold() -> f32 {
    0.4
}

fn default_max_detections() -> usize {
    50
}

fn default_detection_input_size() -> u32 {
    640
}

fn default_landmark_input_size() -> u32 {
    128
}

fn default_img_dim() -> u32 {
    96
}

fn default_execution_provider() -> String {
    "CPU".to_string()
}

fn default_intra_threads() -> usize {
    4
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            detection_model_path: PathBuf::from("models/face_detector.onnx"),
            landmark_model_path: PathBuf::from("models/face_landmarks_68.onnx"),
            embedding_model_path: PathBuf::from("models/nn4.small2.v1.onnx"),
            classifier_model_path: PathBuf::from("models/classifier.json"),
            ensemble_model_dir: PathBuf::from("models/ensemble"),
            classifier_mode: ClassifierMode::default(),
            classification_threshold: default_classification_threshold(),
            detection_confidence: default_detection_confidence(),
            iou_threshold: default_iou_threshold(),
            max_detections: default_max_detections(),
            detection_input_size: default_detection_input_size(),
            landmark_input_size: default_landmark_input_size(),
            img_dim: default_img_dim(),
            execution_provider: default_execution_provider(),
            device_id: 0,
            intra_threads: default_intra_threads(),
        }
    }
}

impl RecognitionConfig {
    /// Defaults overlaid with whatever the environment sets
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(path) = env::var("FACE_DETECTION_MODEL") {
            config.detection_model_path = PathBuf::from(path);
        }
        if let Ok(path) = env::var("FACE_LANDMARK_MODEL") {
            config.landmark_model_path = PathBuf::from(path);
        }
        if let Ok(path) = env::var("FACE_EMBEDDING_MODEL") {
            config.embedding_model_path = PathBuf::from(path);
        }
        if let Ok(path) = env::var("CLASSIFIER_MODEL") {
            config.classifier_model_path = PathBuf::from(path);
        }
        if let Ok(dir) = env::var("ENSEMBLE_MODEL_DIR") {
            config.ensemble_model_dir = PathBuf::from(dir);
        }
        if let Ok(mode) = env::var("CLASSIFIER_MODE") {
            config.classifier_mode = mode.parse().context("Invalid CLASSIFIER_MODE")?;
        }
        if let Ok(threshold) = env::var("CLASSIFICATION_THRESHOLD") {
            config.classification_threshold = threshold
                .parse()
                .context("CLASSIFICATION_THRESHOLD is not numeric")?;
            common::validation::validate_range(
                config.classification_threshold,
                0.0,
                1.0,
                "CLASSIFICATION_THRESHOLD",
            )?;
        }
        if let Ok(provider) = env::var("FACE_RECOGNITION_EXECUTION_PROVIDER") {
            config.execution_provider = provider;
        }
        if let Ok(device_id) = env::var("FACE_RECOGNITION_DEVICE_ID") {
            config.device_id = device_id
                .parse()
                .context("FACE_RECOGNITION_DEVICE_ID is not an integer")?;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = RecognitionConfig::default();
        assert_eq!(config.classification_threshold, 0.5);
        assert_eq!(config.detection_confidence, 0.6);
        assert_eq!(config.iou_threshold, 0.4);
        assert_eq!(config.max_detections, 50);
        assert_eq!(config.detection_input_size, 640);
        assert_eq!(config.landmark_input_size, 128);
        assert_eq!(config.img_dim, 96);
        assert_eq!(config.classifier_mode, ClassifierMode::Single);
    }

    #[test]
    fn test_classifier_mode_parse() {
        assert_eq!("single".parse::<ClassifierMode>().ok(), Some(ClassifierMode::Single));
        assert_eq!(" Ensemble ".parse::<ClassifierMode>().ok(), Some(ClassifierMode::Ensemble));
        assert!("vote".parse::<ClassifierMode>().is_err());
    }

    #[test]
    fn test_config_deserialize_fills_defaults() {
        let config: RecognitionConfig = serde_json::from_value(serde_json::json!({
            "detection_model_path": "a.onnx",
            "landmark_model_path": "b.onnx",
            "embedding_model_path": "c.onnx",
            "classifier_model_path": "d.json",
            "ensemble_model_dir": "e"
        }))
        .unwrap();

        assert_eq!(config.img_dim, 96);
        assert_eq!(config.execution_provider, "CPU");
    }
}
