//! Common error types for NAS crates

use thiserror::Error;

/// Common result type for NAS operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the streaming crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// TOML parse error in a configuration file
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Playlist text could not be parsed
    #[error("Playlist error: {0}")]
    Playlist(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
