//! Face recognition for doorwatch: detection, alignment, embedding,
//! identity classification and annotation.

pub mod annotator;
pub mod classifier;
pub mod config;
pub mod error;
pub mod extractor;
pub mod recognizer;
pub mod session;

pub use annotator::Annotator;
pub use classifier::{Classification, IdentityClassifier};
pub use config::{ClassifierMode, RecognitionConfig};
pub use error::{RecognitionError, Result};
pub use extractor::EmbeddingExtractor;
pub use recognizer::FaceRecognizer;
