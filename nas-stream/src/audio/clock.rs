//! Clock-driven renderer
//!
//! Stands in for a platform render queue: a fixed pool of buffers played
//! back against the wall clock. Each packet occupies a buffer for its
//! duration (scaled by the play rate), then is reported finished.

use super::output::{RenderState, Renderer, RendererEvent, RendererEvents};
use crate::error::RendererError;
use crate::playback::types::{FormatDescription, Packet};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::debug;

/// Default buffer pool size
pub const DEFAULT_BUFFER_COUNT: usize = 16;

#[derive(Debug)]
struct ClockInner {
    /// (sequence, duration in seconds) per occupied buffer
    queued: VecDeque<(u64, f64)>,
    running: bool,
    rate: f32,
    volume: f32,
}

#[derive(Debug)]
struct ClockShared {
    inner: Mutex<ClockInner>,
    wake: Notify,
}

impl ClockShared {
    fn lock(&self) -> MutexGuard<'_, ClockInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Wall-clock [`Renderer`] with a bounded buffer pool
pub struct ClockRenderer {
    capacity: usize,
    shared: Arc<ClockShared>,
    events: Option<RendererEvents>,
    task: Option<JoinHandle<()>>,
}

impl ClockRenderer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            shared: Arc::new(ClockShared {
                inner: Mutex::new(ClockInner {
                    queued: VecDeque::new(),
                    running: false,
                    rate: 1.0,
                    volume: 1.0,
                }),
                wake: Notify::new(),
            }),
            events: None,
            task: None,
        }
    }

    /// Buffers currently holding audio
    pub fn buffers_in_use(&self) -> usize {
        self.shared.lock().queued.len()
    }

    pub fn volume(&self) -> f32 {
        self.shared.lock().volume
    }

    fn notify_state(&self, state: RenderState) {
        if let Some(events) = &self.events {
            events.send(RendererEvent::StateChanged(state));
        }
    }

    fn stop_task(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Default for ClockRenderer {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_COUNT)
    }
}

/// Play queued buffers in order, reporting each finished one
async fn playback_loop(shared: Arc<ClockShared>, events: RendererEvents) {
    loop {
        let next = {
            let inner = shared.lock();
            if inner.running {
                inner
                    .queued
                    .front()
                    .map(|(sequence, seconds)| (*sequence, *seconds / f64::from(inner.rate)))
            } else {
                None
            }
        };

        let Some((sequence, seconds)) = next else {
            shared.wake.notified().await;
            continue;
        };

        tokio::time::sleep(Duration::try_from_secs_f64(seconds).unwrap_or(Duration::ZERO)).await;

        let drained = {
            let mut inner = shared.lock();
            let still_front = inner.queued.front().map(|(s, _)| *s) == Some(sequence);
            if inner.running && still_front {
                inner.queued.pop_front();
                Some(inner.queued.is_empty())
            } else {
                None
            }
        };

        if let Some(empty) = drained {
            if !events.send(RendererEvent::PacketFinished { sequence }) {
                break;
            }
            if empty {
                events.send(RendererEvent::BuffersEmpty);
            }
        }
    }
}

impl Renderer for ClockRenderer {
    fn open(&mut self, format: &FormatDescription, events: RendererEvents) -> Result<(), RendererError> {
        if format.sample_rate == 0 {
            return Err(RendererError::Initialization("sample rate unknown".to_string()));
        }
        self.stop_task();
        {
            let mut inner = self.shared.lock();
            inner.queued.clear();
            inner.running = false;
        }
        debug!("Clock renderer open: {} ({} buffers)", format, self.capacity);
        self.events = Some(events);
        Ok(())
    }

    fn enqueue(&mut self, packet: &Packet) -> Result<(), RendererError> {
        if self.events.is_none() {
            return Err(RendererError::Closed);
        }
        {
            let mut inner = self.shared.lock();
            if inner.queued.len() >= self.capacity {
                return Err(RendererError::Overflow);
            }
            inner.queued.push_back((packet.sequence, packet.duration_seconds()));
        }
        self.shared.wake.notify_one();
        Ok(())
    }

    fn start(&mut self) -> Result<(), RendererError> {
        let Some(events) = self.events.clone() else {
            return Err(RendererError::Closed);
        };
        if self.task.is_none() {
            let runtime = tokio::runtime::Handle::try_current()
                .map_err(|_| RendererError::Initialization("no async runtime".to_string()))?;
            self.task = Some(runtime.spawn(playback_loop(Arc::clone(&self.shared), events)));
        }
        self.shared.lock().running = true;
        self.shared.wake.notify_one();
        self.notify_state(RenderState::Running);
        Ok(())
    }

    fn pause(&mut self) {
        self.shared.lock().running = false;
        self.notify_state(RenderState::Paused);
    }

    fn resume(&mut self) {
        self.shared.lock().running = true;
        self.shared.wake.notify_one();
        self.notify_state(RenderState::Running);
    }

    fn flush(&mut self) {
        self.shared.lock().queued.clear();
    }

    fn close(&mut self) {
        self.stop_task();
        let mut inner = self.shared.lock();
        inner.queued.clear();
        inner.running = false;
        self.events = None;
    }

    fn set_volume(&mut self, volume: f32) {
        self.shared.lock().volume = volume.clamp(0.0, 1.0);
    }

    fn set_rate(&mut self, rate: f32) {
        if rate.is_finite() && rate > 0.0 {
            self.shared.lock().rate = rate;
        }
    }
}

impl Drop for ClockRenderer {
    fn drop(&mut self) {
        self.stop_task();
    }
}
