//! Error types for nas-stream
//!
//! Defines module-specific error types using thiserror for clear error propagation.
//! Collaborator failures are mapped onto the fixed host taxonomy
//! ([`StreamErrorKind`]) by the stream controller.

use nas_common::events::StreamErrorKind;
use thiserror::Error;

/// Main error type for nas-stream
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration loading or validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid state for operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Fatal stream error (stream is now FAILED)
    #[error("Stream error ({}): {}", .0.code(), .0)]
    Stream(StreamErrorKind),

    /// Byte source errors
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Packet parser errors
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Renderer errors
    #[error("Renderer error: {0}")]
    Renderer(#[from] RendererError),

    /// Engine task is gone (handle outlived the engine)
    #[error("Engine stopped")]
    EngineStopped,

    /// Errors from the shared library
    #[error(transparent)]
    Common(#[from] nas_common::Error),
}

/// Convenience Result type using nas-stream Error
pub type Result<T> = std::result::Result<T, Error>;

/// Byte source failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// Connection could not be established
    #[error("cannot open {url}: {reason}")]
    Open { url: String, reason: String },

    /// No URL configured before open
    #[error("no URL set")]
    NoUrl,

    /// Transport failure after the stream was established
    #[error("transport failure: {0}")]
    Transport(String),
}

/// Packet parser failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Parser cannot handle this container format
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Byte stream is malformed
    #[error("malformed stream: {0}")]
    Malformed(String),

    /// Parser used before open
    #[error("parser not open")]
    NotOpen,
}

/// Renderer failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RendererError {
    /// Buffer pool is full; the packet was not accepted
    #[error("renderer buffer pool full")]
    Overflow,

    /// Renderer could not be initialized for the stream format
    #[error("renderer initialization failed: {0}")]
    Initialization(String),

    /// Renderer is not open
    #[error("renderer closed")]
    Closed,
}

impl ParseError {
    /// Host-facing error kind for this parser failure
    pub fn kind(&self) -> StreamErrorKind {
        match self {
            ParseError::UnsupportedFormat(_) => StreamErrorKind::UnsupportedFormat,
            ParseError::Malformed(_) | ParseError::NotOpen => StreamErrorKind::StreamParse,
        }
    }
}
