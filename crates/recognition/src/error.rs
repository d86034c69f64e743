//! Error types for the recognition pipeline.

use thiserror::Error;

/// Main error type for the recognition pipeline
#[derive(Error, Debug)]
pub enum RecognitionError {
    /// A face could not be aligned to the canonical pose; aborts the frame
    #[error("Unable to align face: {0}")]
    Alignment(String),

    /// Model loading, inference or output decoding failed
    #[error("Model error: {0}")]
    Model(String),

    /// Embedding length does not match what the classifier was trained on
    #[error("Embedding has {actual} dimensions, model expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A classifier artifact failed validation
    #[error("Invalid classifier model '{name}': {reason}")]
    InvalidModel { name: String, reason: String },

    /// `ONNX` Runtime inference failed
    #[error("ONNX Runtime error: {0}")]
    Runtime(#[from] ort::Error),

    /// Image decoding or encoding failed
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// File I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Classifier artifact is not valid JSON
    #[error("Model format error: {0}")]
    Format(#[from] serde_json::Error),
}

impl RecognitionError {
    pub fn invalid_model(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidModel {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// Convenience type alias for Results with our Error type
pub type Result<T> = std::result::Result<T, RecognitionError>;
