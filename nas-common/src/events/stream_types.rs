//! Stream-related type definitions
//!
//! Supporting types for stream state and the fatal error taxonomy.

use serde::{Deserialize, Serialize};

/// Stream state enumeration
///
/// Exactly one stream controller owns the current state; the state decides
/// which transport operations are meaningful next.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StreamState {
    /// No open cycle (initial state, and after close)
    #[default]
    Stopped,
    /// Accumulating packets before (re)starting the renderer
    Buffering,
    /// Renderer is consuming packets
    Playing,
    /// Renderer paused by the host
    Paused,
    /// Byte source reopened at a new offset, waiting for the first packet
    Seeking,
    /// Terminal failure for this open cycle
    Failed,
    /// Source ended and every packet was rendered
    EndOfFile,
}

impl StreamState {
    /// States in which a stream cycle is in progress (seek and pause are meaningful)
    pub fn is_active(self) -> bool {
        matches!(
            self,
            StreamState::Buffering | StreamState::Playing | StreamState::Paused | StreamState::Seeking
        )
    }

    /// States that end an open cycle without further progress
    pub fn is_terminal(self) -> bool {
        matches!(self, StreamState::Failed | StreamState::EndOfFile)
    }
}

impl std::fmt::Display for StreamState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamState::Stopped => write!(f, "STOPPED"),
            StreamState::Buffering => write!(f, "BUFFERING"),
            StreamState::Playing => write!(f, "PLAYING"),
            StreamState::Paused => write!(f, "PAUSED"),
            StreamState::Seeking => write!(f, "SEEKING"),
            StreamState::Failed => write!(f, "FAILED"),
            StreamState::EndOfFile => write!(f, "END_OF_FILE"),
        }
    }
}

/// Fatal stream errors surfaced to the host
///
/// Every kind moves the stream to `Failed`. Numeric codes are stable and
/// match the codes hosts already persist.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StreamErrorKind {
    /// Byte source (or renderer) could not be established
    Open,
    /// Parser rejected the byte stream as malformed
    StreamParse,
    /// Transport-level failure mid-stream
    Network,
    /// Content type could not be resolved to a supported format
    UnsupportedFormat,
    /// Stall watchdog exceeded the rebuffer threshold
    Bouncing,
}

impl StreamErrorKind {
    /// Stable numeric error code
    pub fn code(self) -> i32 {
        match self {
            StreamErrorKind::Open => 1,
            StreamErrorKind::StreamParse => 2,
            StreamErrorKind::Network => 3,
            StreamErrorKind::UnsupportedFormat => 4,
            StreamErrorKind::Bouncing => 5,
        }
    }

    /// Inverse of [`StreamErrorKind::code`]
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(StreamErrorKind::Open),
            2 => Some(StreamErrorKind::StreamParse),
            3 => Some(StreamErrorKind::Network),
            4 => Some(StreamErrorKind::UnsupportedFormat),
            5 => Some(StreamErrorKind::Bouncing),
            _ => None,
        }
    }
}

impl std::fmt::Display for StreamErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamErrorKind::Open => write!(f, "cannot open the audio stream"),
            StreamErrorKind::StreamParse => write!(f, "stream parse error"),
            StreamErrorKind::Network => write!(f, "network error"),
            StreamErrorKind::UnsupportedFormat => write!(f, "unsupported format"),
            StreamErrorKind::Bouncing => write!(f, "stream is bouncing"),
        }
    }
}
