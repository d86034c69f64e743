//! The doorwatch service: polls cameras, recognizes faces, reacts on the
//! speaker and serves the latest status.

pub mod api;
pub mod camera;
pub mod config;
pub mod poller;
pub mod storage;

pub use api::{router, AppState};
pub use camera::{Camera, CameraSource, HttpCameraSource};
pub use config::{ConfigError, NodeConfig};
pub use poller::{FrameOutcome, Poller, Reaction};
pub use storage::DataDirs;
