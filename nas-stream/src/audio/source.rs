//! Byte source boundary
//!
//! The byte source delivers the raw stream incrementally. It reports through
//! a [`SourceEvents`] sender and never calls into the controller directly.

use crate::error::SourceError;
use crate::events::{ControllerMessage, Epoch};
use crate::playback::position::StreamPosition;
use std::collections::BTreeMap;
use tokio::sync::mpsc::UnboundedSender;

/// Byte source callback
#[derive(Debug, Clone, PartialEq)]
pub enum SourceEvent {
    /// Connection established; transport metadata known
    Ready {
        content_type: Option<String>,
        content_length: Option<u64>,
    },

    /// Next chunk of stream bytes
    BytesAvailable(Vec<u8>),

    /// No more bytes will arrive
    EndOfStream,

    /// Transport failure mid-stream
    Error(String),

    /// In-band or header metadata (e.g. ICY tags)
    MetaData(BTreeMap<String, String>),
}

/// Cloneable sender a byte source reports through
#[derive(Debug, Clone)]
pub struct SourceEvents {
    mailbox: UnboundedSender<ControllerMessage>,
    token: Epoch,
}

impl SourceEvents {
    pub fn new(mailbox: UnboundedSender<ControllerMessage>, token: Epoch) -> Self {
        Self { mailbox, token }
    }

    pub fn token(&self) -> Epoch {
        self.token
    }

    /// Post an event; `false` once the controller is gone
    pub fn send(&self, event: SourceEvent) -> bool {
        self.mailbox
            .send(ControllerMessage::Source {
                token: self.token,
                event,
            })
            .is_ok()
    }

    pub fn ready(&self, content_type: Option<String>, content_length: Option<u64>) -> bool {
        self.send(SourceEvent::Ready {
            content_type,
            content_length,
        })
    }

    pub fn bytes(&self, data: Vec<u8>) -> bool {
        self.send(SourceEvent::BytesAvailable(data))
    }

    pub fn end_of_stream(&self) -> bool {
        self.send(SourceEvent::EndOfStream)
    }

    pub fn error(&self, message: impl Into<String>) -> bool {
        self.send(SourceEvent::Error(message.into()))
    }

    pub fn metadata(&self, metadata: BTreeMap<String, String>) -> bool {
        self.send(SourceEvent::MetaData(metadata))
    }
}

/// Network byte source
pub trait ByteSource: Send {
    /// Start delivering bytes from `url`, optionally from a byte position
    ///
    /// Must not block; delivery happens through `events`.
    fn open(
        &mut self,
        url: &str,
        position: Option<&StreamPosition>,
        events: SourceEvents,
    ) -> Result<(), SourceError>;

    /// Stop delivery; no further events are posted for this open
    fn close(&mut self);

    /// Total content length, when known
    fn content_length(&self) -> Option<u64>;
}
