//! Audio reactions on a networked speaker.

pub mod controller;
pub mod device;
pub mod songs;
pub mod sonos;

pub use controller::{PlaybackController, PlaybackHandle, TickOutcome};
pub use device::{CurrentTrack, DeviceConnector, PlaybackDevice};
pub use songs::SongBook;
pub use sonos::{SonosConnector, SonosSpeaker};
