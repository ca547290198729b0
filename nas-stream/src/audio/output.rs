//! Renderer boundary
//!
//! Wraps the platform render queue. The renderer owns a fixed pool of
//! buffers; it copies each accepted packet into one and reports back-pressure
//! and lifecycle changes through [`RendererEvents`].

use crate::error::RendererError;
use crate::events::{ControllerMessage, Epoch};
use crate::playback::types::{FormatDescription, Packet};
use tokio::sync::mpsc::UnboundedSender;

/// Render queue run state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderState {
    #[default]
    Stopped,
    Running,
    Paused,
}

/// Renderer callback
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RendererEvent {
    /// Run state changed
    StateChanged(RenderState),

    /// Every buffer has been played; the renderer holds no audio
    BuffersEmpty,

    /// Buffer pool full; stop handing packets until space frees up
    Overflow,

    /// Render queue ran dry while running
    Underflow,

    /// Render pipeline could not be initialized
    InitFailed,

    /// Packet with this sequence number finished playing
    PacketFinished { sequence: u64 },
}

/// Cloneable sender a renderer reports through
#[derive(Debug, Clone)]
pub struct RendererEvents {
    mailbox: UnboundedSender<ControllerMessage>,
    token: Epoch,
}

impl RendererEvents {
    pub fn new(mailbox: UnboundedSender<ControllerMessage>, token: Epoch) -> Self {
        Self { mailbox, token }
    }

    pub fn token(&self) -> Epoch {
        self.token
    }

    /// Post an event; `false` once the controller is gone
    pub fn send(&self, event: RendererEvent) -> bool {
        self.mailbox
            .send(ControllerMessage::Renderer {
                token: self.token,
                event,
            })
            .is_ok()
    }
}

/// Platform audio render queue
pub trait Renderer: Send {
    /// Initialize for `format`
    fn open(&mut self, format: &FormatDescription, events: RendererEvents) -> Result<(), RendererError>;

    /// Copy a packet into a free buffer
    ///
    /// Returns [`RendererError::Overflow`] when no buffer is free; the packet
    /// was not taken.
    fn enqueue(&mut self, packet: &Packet) -> Result<(), RendererError>;

    /// Begin playback; completion is reported as `StateChanged(Running)`
    fn start(&mut self) -> Result<(), RendererError>;

    fn pause(&mut self);

    fn resume(&mut self);

    /// Discard every queued buffer without reporting them finished
    fn flush(&mut self);

    fn close(&mut self);

    /// Output volume, 0.0-1.0
    fn set_volume(&mut self, volume: f32);

    /// Playback rate multiplier
    fn set_rate(&mut self, rate: f32);
}
