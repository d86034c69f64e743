use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_IMAGE_INTERVAL_SECS: f64 = 1.0;
pub const DEFAULT_DATA_DIR: &str = "/tmp";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:5000";
pub const DEFAULT_SONOS_ADDRESS: &str = "192.168.1.181";
pub const DEFAULT_LABEL_FONT_PATH: &str = "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf";
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Configuration the service cannot start without
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IMAGE_INTERVAL is not numeric: {0:?}")]
    IntervalNotNumeric(String),

    #[error("invalid {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Status/photo HTTP server address
    pub bind_addr: String,

    /// Pause after each pass over the cameras
    pub image_interval: Duration,

    /// Root of `photos/` and `status/`
    pub data_dir: PathBuf,

    /// One snapshot URL per camera
    pub camera_urls: Vec<String>,

    pub camera_timeout: Duration,

    /// Speaker host or base URL
    pub sonos_address: String,

    pub speaker_timeout: Duration,

    pub label_font_path: PathBuf,
}

impl NodeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from any variable source, `lookup` returning `None` for unset
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let image_interval = match lookup("IMAGE_INTERVAL") {
            Some(raw) => parse_interval(&raw)?,
            None => Duration::from_secs_f64(DEFAULT_IMAGE_INTERVAL_SECS),
        };

        let data_dir = lookup("DATA_DIR")
            .or_else(|| lookup("PARADROP_DATA_DIR"))
            .unwrap_or_else(|| DEFAULT_DATA_DIR.to_string());

        let camera_urls = lookup("CAMERA_URLS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|url| !url.is_empty())
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        for url in &camera_urls {
            common::validation::validate_uri(url, "CAMERA_URLS").map_err(|e| ConfigError::Invalid {
                name: "CAMERA_URLS",
                reason: e.to_string(),
            })?;
        }

        Ok(Self {
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            image_interval,
            data_dir: PathBuf::from(data_dir),
            camera_urls,
            camera_timeout: parse_timeout(lookup("CAMERA_TIMEOUT_SECS"), "CAMERA_TIMEOUT_SECS")?,
            sonos_address: lookup("SONOS_ADDRESS").unwrap_or_else(|| DEFAULT_SONOS_ADDRESS.to_string()),
            speaker_timeout: parse_timeout(lookup("SPEAKER_TIMEOUT_SECS"), "SPEAKER_TIMEOUT_SECS")?,
            label_font_path: lookup("LABEL_FONT_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LABEL_FONT_PATH)),
        })
    }
}

/// Seconds as a float; negative, non-finite and out-of-range values are
/// rejected too
pub fn parse_interval(raw: &str) -> Result<Duration, ConfigError> {
    let seconds: f64 = raw
        .trim()
        .parse()
        .map_err(|_| ConfigError::IntervalNotNumeric(raw.to_string()))?;

    Duration::try_from_secs_f64(seconds).map_err(|_| ConfigError::IntervalNotNumeric(raw.to_string()))
}

fn parse_timeout(raw: Option<String>, name: &'static str) -> Result<Duration, ConfigError> {
    let Some(raw) = raw else {
        return Ok(Duration::from_secs(DEFAULT_TIMEOUT_SECS));
    };

    let seconds: u64 = raw.trim().parse().map_err(|_| ConfigError::Invalid {
        name,
        reason: format!("{:?} is not a whole number of seconds", raw),
    })?;
    if seconds == 0 {
        return Err(ConfigError::Invalid {
            name,
            reason: "must be at least one second".to_string(),
        });
    }

    Ok(Duration::from_secs(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<NodeConfig, ConfigError> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        NodeConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.image_interval, Duration::from_secs(1));
        assert_eq!(config.data_dir, PathBuf::from("/tmp"));
        assert_eq!(config.bind_addr, "0.0.0.0:5000");
        assert_eq!(config.sonos_address, "192.168.1.181");
        assert!(config.camera_urls.is_empty());
        assert_eq!(config.speaker_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_fractional_interval() {
        let config = config(&[("IMAGE_INTERVAL", "2.5")]).unwrap();
        assert_eq!(config.image_interval, Duration::from_millis(2500));
    }

    #[test]
    fn test_non_numeric_interval_is_fatal() {
        for raw in ["soon", "", "NaN", "-1", "inf", "1e30"] {
            let error = config(&[("IMAGE_INTERVAL", raw)]).unwrap_err();
            assert!(matches!(error, ConfigError::IntervalNotNumeric(_)));
            assert!(error.to_string().starts_with("IMAGE_INTERVAL is not numeric"));
        }
    }

    #[test]
    fn test_data_dir_fallback() {
        let config_a = config(&[("PARADROP_DATA_DIR", "/data")]).unwrap();
        assert_eq!(config_a.data_dir, PathBuf::from("/data"));

        let config_b = config(&[("PARADROP_DATA_DIR", "/data"), ("DATA_DIR", "/srv/doorwatch")]).unwrap();
        assert_eq!(config_b.data_dir, PathBuf::from("/srv/doorwatch"));
    }

    #[test]
    fn test_camera_urls() {
        let config = config(&[("CAMERA_URLS", "http://cam1/snap.jpg, ,http://cam2/snap.jpg")]).unwrap();
        assert_eq!(config.camera_urls, vec!["http://cam1/snap.jpg", "http://cam2/snap.jpg"]);
    }

    #[test]
    fn test_invalid_timeout() {
        assert!(config(&[("CAMERA_TIMEOUT_SECS", "0")]).is_err());
        assert!(config(&[("SPEAKER_TIMEOUT_SECS", "ten")]).is_err());
    }
}
