//! Camera polling loop: fetch, store, recognize, annotate, report, react.

use crate::camera::{Camera, CameraSource};
use crate::storage::{DataDirs, ANNOTATED_IMAGE, STATUS_DIR};
use anyhow::{Context, Result};
use common::faces::Recognition;
use common::status::StatusRecord;
use common::validation::safe_unix_timestamp;
use image::RgbImage;
use recognition::{Annotator, FaceRecognizer};
use speaker::PlaybackHandle;
use std::sync::Arc;
use std::time::Duration;
use telemetry::metrics::{CAMERA_ERRORS, FRAMES_PROCESSED};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// What the classification outcome asks of the speaker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reaction {
    /// No faces in the frame
    Nothing,
    /// Every face is Unknown
    Alarm,
    /// Song of the leftmost face, which falls back to the alarm when that
    /// face has no song of its own
    PlayFor(String),
}

impl Reaction {
    pub fn for_recognition(recognition: &Recognition) -> Self {
        match recognition.leftmost() {
            None => Reaction::Nothing,
            Some(_) if recognition.all_unknown() => Reaction::Alarm,
            Some(name) => Reaction::PlayFor(name.to_string()),
        }
    }

    pub fn apply(&self, playback: &PlaybackHandle) {
        match self {
            Reaction::Nothing => {}
            Reaction::Alarm => playback.play_alarm(),
            Reaction::PlayFor(name) => playback.play_for(name),
        }
    }
}

/// How a single camera fared in one poll
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    FetchFailed,
    NoImage,
    DecodeFailed,
    Processed(Recognition),
    Failed,
}

impl FrameOutcome {
    fn label(&self) -> &'static str {
        match self {
            FrameOutcome::FetchFailed => "fetch_error",
            FrameOutcome::NoImage => "no_image",
            FrameOutcome::DecodeFailed => "decode_error",
            FrameOutcome::Processed(_) => "processed",
            FrameOutcome::Failed => "failed",
        }
    }
}

pub struct Poller {
    source: Arc<dyn CameraSource>,
    recognizer: Arc<FaceRecognizer>,
    annotator: Arc<Annotator>,
    dirs: DataDirs,
    playback: PlaybackHandle,
    interval: Duration,
}

impl Poller {
    pub fn new(
        source: Arc<dyn CameraSource>,
        recognizer: Arc<FaceRecognizer>,
        annotator: Arc<Annotator>,
        dirs: DataDirs,
        playback: PlaybackHandle,
        interval: Duration,
    ) -> Self {
        Self {
            source,
            recognizer,
            annotator,
            dirs,
            playback,
            interval,
        }
    }

    /// Poll every camera, pause, repeat until cancelled
    pub async fn run(&self, cancel: CancellationToken) {
        info!(interval_ms = self.interval.as_millis() as u64, "Camera polling started");

        loop {
            self.poll_once().await;

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        info!("Camera polling stopped");
    }

    /// One pass over all cameras, one frame fully processed before the next
    pub async fn poll_once(&self) -> Vec<FrameOutcome> {
        let cameras = match self.source.cameras().await {
            Ok(cameras) => cameras,
            Err(e) => {
                warn!("Failed to list cameras: {:#}", e);
                return Vec::new();
            }
        };

        let mut outcomes = Vec::with_capacity(cameras.len());
        for camera in cameras {
            let outcome = self.poll_camera(camera.as_ref()).await;
            FRAMES_PROCESSED.with_label_values(&[outcome.label()]).inc();
            outcomes.push(outcome);
        }
        outcomes
    }

    async fn poll_camera(&self, camera: &dyn Camera) -> FrameOutcome {
        let bytes = match camera.get_image().await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                warn!(camera = %camera.name(), "No image from camera");
                return FrameOutcome::NoImage;
            }
            Err(e) => {
                warn!(camera = %camera.name(), "Camera fetch failed: {:#}", e);
                CAMERA_ERRORS.with_label_values(&[camera.name()]).inc();
                return FrameOutcome::FetchFailed;
            }
        };

        let image = match image::load_from_memory(&bytes) {
            Ok(image) => image.to_rgb8(),
            Err(e) => {
                warn!(camera = %camera.name(), "Camera image could not be decoded: {}", e);
                return FrameOutcome::DecodeFailed;
            }
        };

        match self.process_frame(image).await {
            Ok(recognition) => FrameOutcome::Processed(recognition),
            Err(e) => {
                warn!(camera = %camera.name(), "Frame processing failed: {:#}", e);
                FrameOutcome::Failed
            }
        }
    }

    async fn process_frame(&self, image: RgbImage) -> Result<Recognition> {
        let timestamp = safe_unix_timestamp();
        let photo = self.dirs.save_photo(&image, timestamp)?;
        info!(path = %photo.display(), "Saved image");

        // Inference and drawing are CPU bound
        let recognizer = self.recognizer.clone();
        let annotator = self.annotator.clone();
        let (recognition, annotated) = tokio::task::spawn_blocking(move || {
            let recognition = recognizer.infer(&image);
            let annotated = annotator.annotate(&image, &recognition);
            (recognition, annotated)
        })
        .await
        .context("recognition worker panicked")?;

        if let Some((name, confidence, _)) = recognition.iter().next() {
            info!(faces = recognition.len(), "Detected {} @{:.2}", name, confidence);
        }

        self.dirs.save_annotated(&annotated)?;
        let record = StatusRecord::new(format!("{}/{}", STATUS_DIR, ANNOTATED_IMAGE), timestamp, &recognition);
        self.dirs.write_status(&record)?;

        let reaction = Reaction::for_recognition(&recognition);
        reaction.apply(&self.playback);

        Ok(recognition)
    }
}
