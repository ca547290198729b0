//! Streaming core: packet queue, bitrate estimation, stall watchdog,
//! format resolution, the stream controller and its async engine

pub mod bitrate;
pub mod controller;
pub mod engine;
pub mod format;
pub mod monitor;
pub mod position;
pub mod queue;
pub mod recorder;
pub mod types;

pub use controller::{Collaborators, StreamController};
pub use engine::{StreamEngine, StreamHandle};
pub use format::AudioFileType;
pub use position::StreamPosition;
pub use types::{FormatDescription, Packet};
