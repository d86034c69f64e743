use anyhow::{Context, Result};
use recognition::{Annotator, FaceRecognizer, RecognitionConfig};
use speaker::{PlaybackController, SongBook, SonosConnector};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use watch_node::{AppState, DataDirs, HttpCameraSource, NodeConfig, Poller};

#[tokio::main]
async fn main() -> Result<()> {
    let _log_guard = telemetry::init_with_service("watch-node");

    // Invalid numeric settings stop the process before any loop starts
    let config = NodeConfig::from_env()?;
    let recognition_config = RecognitionConfig::from_env()?;
    let songs = SongBook::from_env()?;
    info!(
        bind = %config.bind_addr,
        data_dir = %config.data_dir.display(),
        cameras = config.camera_urls.len(),
        speaker = %config.sonos_address,
        "watch-node configuration loaded"
    );

    let dirs = DataDirs::new(&config.data_dir);
    dirs.setup()?;

    let recognizer = Arc::new(
        FaceRecognizer::from_config(&recognition_config).context("failed to load recognition models")?,
    );
    let annotator = Arc::new(Annotator::from_font_path(&config.label_font_path));

    let connector = Arc::new(SonosConnector::new(&config.sonos_address, config.speaker_timeout));
    let mut controller = PlaybackController::new(connector, songs);
    controller.start().await?;

    let source = Arc::new(HttpCameraSource::new(&config.camera_urls, config.camera_timeout)?);
    if source.is_empty() {
        warn!("No cameras configured, set CAMERA_URLS");
    }

    let poller = Poller::new(
        source,
        recognizer,
        annotator,
        dirs.clone(),
        controller.handle(),
        config.image_interval,
    );
    let cancel = CancellationToken::new();
    let polling = tokio::spawn({
        let cancel = cancel.clone();
        async move { poller.run(cancel).await }
    });

    let app = watch_node::router(AppState::new(dirs));
    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!("watch-node listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cancel.cancel();
    if let Err(e) = polling.await {
        warn!("Polling task ended abnormally: {}", e);
    }
    controller.stop().await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
