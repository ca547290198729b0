//! Event types for the streaming crates
//!
//! Provides the host-facing event definitions and the EventBus.

mod stream_types;

pub use stream_types::{StreamErrorKind, StreamState};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Host-facing stream events
///
/// Every event carries the `session_id` of the open cycle that produced it,
/// so hosts can discard events from a cycle they already closed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    /// Stream state changed
    StateChanged {
        /// Open cycle identifier
        session_id: Uuid,
        /// State before change
        old_state: StreamState,
        /// State after change
        new_state: StreamState,
        /// When state changed
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Fatal error; the stream is `Failed` until closed
    ErrorOccurred {
        /// Open cycle identifier
        session_id: Uuid,
        /// Error kind from the fixed taxonomy
        error: StreamErrorKind,
        /// Human-readable detail from the collaborator that failed
        message: String,
        /// When the error was detected
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// In-band metadata (e.g. ICY tags) reported by the byte source
    MetaDataAvailable {
        /// Open cycle identifier
        session_id: Uuid,
        /// Tag name to value
        metadata: BTreeMap<String, String>,
        /// When metadata arrived
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Raw packet handed to the renderer while a recorder is attached
    SamplesAvailable {
        /// Open cycle identifier
        session_id: Uuid,
        /// Packet sequence number within the open cycle
        sequence: u64,
        /// Packet payload
        data: Vec<u8>,
        /// Packet duration in seconds
        duration_seconds: f64,
        /// When the packet was dispatched
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Stream fell back to buffering (telemetry only)
    Bounced {
        /// Open cycle identifier
        session_id: Uuid,
        /// Bounces counted in the current window
        bounce_count: usize,
        /// When the bounce was counted
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl StreamEvent {
    /// Open cycle that produced this event
    pub fn session_id(&self) -> Uuid {
        match self {
            StreamEvent::StateChanged { session_id, .. }
            | StreamEvent::ErrorOccurred { session_id, .. }
            | StreamEvent::MetaDataAvailable { session_id, .. }
            | StreamEvent::SamplesAvailable { session_id, .. }
            | StreamEvent::Bounced { session_id, .. } => *session_id,
        }
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus for host-facing events
///
/// The EventBus uses tokio::broadcast internally, providing:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Automatic cleanup when subscribers drop
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use nas_common::events::{EventBus, StreamEvent, StreamState};
/// use std::sync::Arc;
///
/// let event_bus = Arc::new(EventBus::new(100));
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit(StreamEvent::StateChanged {
///     session_id: uuid::Uuid::new_v4(),
///     old_state: StreamState::Stopped,
///     new_state: StreamState::Buffering,
///     timestamp: chrono::Utc::now(),
/// }).ok();
///
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<StreamEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// * `capacity` - Number of events to buffer before lagging subscribers
    ///   lose the oldest events
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<StreamEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: StreamEvent) -> Result<usize, broadcast::error::SendError<StreamEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: StreamEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("capacity", &self.capacity)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_event(old_state: StreamState, new_state: StreamState) -> StreamEvent {
        StreamEvent::StateChanged {
            session_id: Uuid::new_v4(),
            old_state,
            new_state,
            timestamp: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_eventbus_new() {
        let bus = EventBus::new(100);
        assert_eq!(bus.capacity(), 100);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_eventbus_emit_no_subscribers() {
        let bus = EventBus::new(10);
        assert!(bus.emit(state_event(StreamState::Stopped, StreamState::Buffering)).is_err());
        // Lossy emission never fails
        bus.emit_lossy(state_event(StreamState::Stopped, StreamState::Buffering));
    }

    #[tokio::test]
    async fn test_eventbus_emit_with_subscriber() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();

        assert_eq!(bus.emit(state_event(StreamState::Buffering, StreamState::Playing)).unwrap(), 1);

        match rx.recv().await.unwrap() {
            StreamEvent::StateChanged { old_state, new_state, .. } => {
                assert_eq!(old_state, StreamState::Buffering);
                assert_eq!(new_state, StreamState::Playing);
            }
            other => panic!("Wrong event type received: {:?}", other),
        }
    }

    #[test]
    fn test_error_codes_round_trip() {
        for kind in [
            StreamErrorKind::Open,
            StreamErrorKind::StreamParse,
            StreamErrorKind::Network,
            StreamErrorKind::UnsupportedFormat,
            StreamErrorKind::Bouncing,
        ] {
            assert_eq!(StreamErrorKind::from_code(kind.code()), Some(kind));
        }
        assert_eq!(StreamErrorKind::Bouncing.code(), 5);
        assert_eq!(StreamErrorKind::from_code(0), None);
    }

    #[test]
    fn test_state_classification() {
        assert!(StreamState::Buffering.is_active());
        assert!(StreamState::Seeking.is_active());
        assert!(!StreamState::Stopped.is_active());
        assert!(StreamState::Failed.is_terminal());
        assert!(StreamState::EndOfFile.is_terminal());
        assert!(!StreamState::Paused.is_terminal());
    }

    #[test]
    fn test_event_serialization_tag() {
        let event = StreamEvent::ErrorOccurred {
            session_id: Uuid::nil(),
            error: StreamErrorKind::UnsupportedFormat,
            message: "text/html".to_string(),
            timestamp: chrono::Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "ErrorOccurred");
        assert_eq!(json["error"], "UNSUPPORTED_FORMAT");
        assert_eq!(event.session_id(), Uuid::nil());
    }
}
