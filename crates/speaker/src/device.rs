use anyhow::Result;
use async_trait::async_trait;

/// What the device reports as currently playing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CurrentTrack {
    /// Empty when nothing is loaded
    pub uri: String,
}

/// Commands the playback controller issues to a networked speaker
///
/// Every call may fail; callers treat a failure as transient.
#[async_trait]
pub trait PlaybackDevice: Send + Sync {
    /// Whether this device is authoritative for its group's playback
    async fn is_coordinator(&self) -> Result<bool>;

    async fn get_current_track(&self) -> Result<CurrentTrack>;

    async fn clear_queue(&self) -> Result<()>;

    /// Append a track to the end of the queue
    async fn enqueue(&self, uri: &str) -> Result<()>;

    /// Select the queue as the source, jump to `index` (zero based) and
    /// start playing when `start` is set
    async fn play_from_queue(&self, index: usize, start: bool) -> Result<()>;
}

/// Produces fresh connection objects for a device
///
/// Reconnecting replaces the whole connection object, including anything it
/// cached about the device.
#[async_trait]
pub trait DeviceConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn PlaybackDevice>>;
}
