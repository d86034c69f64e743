//! doorwatch: camera polling, face recognition and speaker reactions.
//!
//! The functionality lives in the workspace crates; this package re-exports
//! them and hosts the cross-crate tests.

pub use common;
pub use recognition;
pub use speaker;
pub use telemetry;
pub use watch_node;
