//! # Network Audio Streaming Library (nas-stream)
//!
//! Streaming core that turns an incrementally delivered byte stream into
//! timed packets and feeds them to a render pipeline.
//!
//! **Architecture:** a synchronous [`StreamController`] state machine run by
//! an async [`StreamEngine`]; collaborators (byte source, packet parser,
//! renderer) are traits that report through an epoch-tagged mailbox.

pub mod audio;
pub mod config;
pub mod error;
pub mod events;
pub mod playback;
pub mod state;

pub use config::{StreamSettings, TomlConfig};
pub use error::{Error, Result};
pub use playback::{Collaborators, StreamController, StreamEngine, StreamHandle, StreamPosition};
pub use state::{SharedStatus, StreamStatus};
