// Metric definitions are static; a failure here is a malformed name or label
// set and must surface on first use.
#![allow(clippy::expect_used)]

use lazy_static::lazy_static;
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ==== Poller Metrics ====
    pub static ref FRAMES_PROCESSED: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "doorwatch_frames_processed_total",
                "Total number of camera frames handled, by outcome",
            ),
            &["outcome"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref CAMERA_ERRORS: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "doorwatch_camera_errors_total",
                "Total number of camera fetch failures",
            ),
            &["camera"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    // ==== Recognition Metrics ====
    pub static ref FACES_DETECTED: IntCounter = {
        let metric = IntCounter::new(
            "doorwatch_faces_detected_total",
            "Total number of faces detected",
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref IDENTITIES_REPORTED: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "doorwatch_identities_reported_total",
                "Total number of identities reported by the classifier",
            ),
            &["identity"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref RECOGNITION_DEGRADED: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "doorwatch_recognition_degraded_total",
                "Frames whose recognition returned a partial or empty result",
            ),
            &["stage"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref RECOGNITION_LATENCY: Histogram = {
        let metric = Histogram::with_opts(
            HistogramOpts::new(
                "doorwatch_recognition_latency_seconds",
                "End-to-end recognition latency per frame",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref INFERENCE_TIME: HistogramVec = {
        let metric = HistogramVec::new(
            HistogramOpts::new(
                "doorwatch_inference_time_seconds",
                "Time spent in model inference (excluding pre/post processing)",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.02, 0.05, 0.1, 0.2, 0.5, 1.0]),
            &["model", "execution_provider"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    // ==== Playback Metrics ====
    pub static ref PLAYBACK_TICKS: IntCounterVec = {
        let metric = IntCounterVec::new(
            Opts::new(
                "doorwatch_playback_ticks_total",
                "Playback reconciliation ticks, by outcome",
            ),
            &["outcome"],
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref PLAYBACK_TRIGGERS: IntCounter = {
        let metric = IntCounter::new(
            "doorwatch_playback_triggers_total",
            "Total number of playback trigger sequences issued",
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };

    pub static ref DEVICE_RECONNECTS: IntCounter = {
        let metric = IntCounter::new(
            "doorwatch_device_reconnects_total",
            "Total number of playback device reconnections",
        )
        .expect("metric can be created");
        REGISTRY.register(Box::new(metric.clone())).ok();
        metric
    };
}

/// Helper function to encode metrics for Prometheus scraping
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| {
        prometheus::Error::Msg(format!("Failed to convert metrics to UTF-8: {}", e))
    })
}
