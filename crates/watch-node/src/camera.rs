//! Camera collaborators: a source that lists cameras, and cameras that hand
//! out snapshots.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;

#[async_trait]
pub trait Camera: Send + Sync {
    /// Name used in logs and metrics
    fn name(&self) -> &str;

    /// Current snapshot, or `None` when the camera has no image right now
    async fn get_image(&self) -> Result<Option<Vec<u8>>>;
}

#[async_trait]
pub trait CameraSource: Send + Sync {
    async fn cameras(&self) -> Result<Vec<Arc<dyn Camera>>>;
}

/// Camera exposing a JPEG snapshot over HTTP
pub struct HttpCamera {
    name: String,
    url: String,
    http_client: reqwest::Client,
}

impl HttpCamera {
    pub fn new(name: impl Into<String>, url: impl Into<String>, http_client: reqwest::Client) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            http_client,
        }
    }
}

#[async_trait]
impl Camera for HttpCamera {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_image(&self) -> Result<Option<Vec<u8>>> {
        let response = self
            .http_client
            .get(&self.url)
            .send()
            .await
            .with_context(|| format!("failed to reach camera {}", self.name))?;

        let status = response.status();
        if status == StatusCode::NO_CONTENT || status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(anyhow!("camera {} answered {}", self.name, status));
        }

        let body = response.bytes().await?;
        if body.is_empty() {
            return Ok(None);
        }
        Ok(Some(body.to_vec()))
    }
}

/// Fixed set of HTTP cameras, one per configured snapshot URL
pub struct HttpCameraSource {
    cameras: Vec<Arc<dyn Camera>>,
}

impl HttpCameraSource {
    pub fn new(urls: &[String], timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;

        let cameras = urls
            .iter()
            .enumerate()
            .map(|(i, url)| Arc::new(HttpCamera::new(format!("camera-{}", i), url, http_client.clone())) as Arc<dyn Camera>)
            .collect();

        Ok(Self { cameras })
    }

    pub fn len(&self) -> usize {
        self.cameras.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cameras.is_empty()
    }
}

#[async_trait]
impl CameraSource for HttpCameraSource {
    async fn cameras(&self) -> Result<Vec<Arc<dyn Camera>>> {
        Ok(self.cameras.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Router;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_http_camera_responses() {
        let base = serve(
            Router::new()
                .route("/snap.jpg", get(|| async { vec![0xFFu8, 0xD8, 0xFF] }))
                .route("/empty.jpg", get(|| async { StatusCode::NO_CONTENT }))
                .route("/broken.jpg", get(|| async { StatusCode::INTERNAL_SERVER_ERROR })),
        )
        .await;

        let urls = vec![
            format!("{}/snap.jpg", base),
            format!("{}/empty.jpg", base),
            format!("{}/broken.jpg", base),
        ];
        let source = HttpCameraSource::new(&urls, Duration::from_secs(5)).unwrap();
        let cameras = source.cameras().await.unwrap();

        assert_eq!(cameras[0].name(), "camera-0");
        assert_eq!(cameras[0].get_image().await.unwrap(), Some(vec![0xFF, 0xD8, 0xFF]));
        assert_eq!(cameras[1].get_image().await.unwrap(), None);
        assert!(cameras[2].get_image().await.is_err());
    }

    #[tokio::test]
    async fn test_unreachable_camera_is_an_error() {
        let source = HttpCameraSource::new(&["http://127.0.0.1:9/snap.jpg".to_string()], Duration::from_secs(1)).unwrap();
        let cameras = source.cameras().await.unwrap();
        assert!(cameras[0].get_image().await.is_err());
    }
}
