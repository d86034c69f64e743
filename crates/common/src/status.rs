//! Status record written after every processed frame and served to the web
//! UI as `status/latest.json`.

use crate::faces::Recognition;
use serde::{Deserialize, Serialize};

/// One identified face in the status record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionSummary {
    pub name: String,
    pub score: f64,
}

/// Latest processed frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    /// Annotated image path, relative to the server root
    pub path: String,

    /// Capture time (Unix timestamp in seconds)
    #[serde(rename = "ts")]
    pub timestamp: u64,

    pub detections: Vec<DetectionSummary>,
}

impl StatusRecord {
    pub fn new(path: impl Into<String>, timestamp: u64, recognition: &Recognition) -> Self {
        let detections = recognition
            .iter()
            .map(|(name, score, _)| DetectionSummary {
                name: name.to_string(),
                score,
            })
            .collect();

        Self {
            path: path.into(),
            timestamp,
            detections,
        }
    }
}

/// Entry of the recent photo listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotoEntry {
    pub path: String,
    pub ts: u64,
}
