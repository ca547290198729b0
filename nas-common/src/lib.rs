//! # NAS Common Library
//!
//! Shared code for the network audio streaming crates:
//! - Event types (StreamEvent enum) and the EventBus
//! - Stream state and error taxonomy shared with hosts
//! - Configuration file resolution
//! - Playlist (M3U/PLS) text parsing

pub mod config;
pub mod error;
pub mod events;
pub mod playlist;

pub use error::{Error, Result};
pub use events::{EventBus, StreamErrorKind, StreamEvent, StreamState};
