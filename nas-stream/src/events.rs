//! Event system for nas-stream
//!
//! # Architecture
//!
//! - **EventBus** (tokio::broadcast): host-facing [`StreamEvent`]s
//! - **Command channel** (tokio::mpsc): host commands, see [`crate::playback::engine`]
//! - **Controller mailbox** (tokio::mpsc, unbounded): collaborator callbacks
//!
//! Collaborators never touch controller state. They post [`ControllerMessage`]s
//! tagged with the [`Epoch`] they were handed; the controller drops any message
//! whose epoch is no longer current, which suppresses late callbacks after a
//! seek or close.

use crate::audio::output::RendererEvent;
use crate::audio::source::SourceEvent;

// ========================================
// Re-exports from nas-common
// ========================================

pub use nas_common::events::{EventBus, StreamErrorKind, StreamEvent, StreamState};

/// Generation tag handed to a collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Epoch(u64);

impl Epoch {
    pub fn new(value: u64) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for Epoch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Message delivered to the controller mailbox
#[derive(Debug, Clone)]
pub enum ControllerMessage {
    /// Byte source callback
    Source { token: Epoch, event: SourceEvent },

    /// Renderer callback
    Renderer { token: Epoch, event: RendererEvent },

    /// Stall watchdog period elapsed
    WatchdogTick { token: Epoch },
}

impl ControllerMessage {
    pub fn token(&self) -> Epoch {
        match self {
            ControllerMessage::Source { token, .. }
            | ControllerMessage::Renderer { token, .. }
            | ControllerMessage::WatchdogTick { token } => *token,
        }
    }
}
