//! Shared stream status
//!
//! Snapshot of host-visible telemetry, refreshed by the engine after every
//! message it processes. Readers never wait on the controller.

use nas_common::events::StreamState;
use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Host-visible telemetry of the current open cycle
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StreamStatus {
    pub session_id: Uuid,
    pub state: StreamState,
    /// Bytes held in the pending queue
    pub cached_data_size: usize,
    /// Playback time held in the pending queue
    pub buffered_seconds: f64,
    /// Bits per second, when known
    pub bitrate: Option<f64>,
    pub duration_seconds: f64,
    pub time_played_seconds: f64,
    pub bounce_count: usize,
    pub content_type: Option<String>,
    pub format_description: Option<String>,
    pub content_length: Option<u64>,
    pub processed_packets: u64,
    pub volume: f32,
}

/// Status shared between the engine task and its handles
///
/// Uses RwLock for concurrent read access with one writer
#[derive(Debug, Default)]
pub struct SharedStatus {
    status: RwLock<StreamStatus>,
}

impl SharedStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot
    pub async fn get(&self) -> StreamStatus {
        self.status.read().await.clone()
    }

    /// Current stream state
    pub async fn state(&self) -> StreamState {
        self.status.read().await.state
    }

    /// Replace the snapshot
    pub async fn update(&self, status: StreamStatus) {
        *self.status.write().await = status;
    }
}
