//! Stall watchdog
//!
//! Counts bounces (falls back into buffering) and detects streams stuck in
//! BUFFERING. The accounting is synchronous; the periodic check is a tokio
//! interval task posting [`ControllerMessage::WatchdogTick`] into the
//! controller mailbox.

use crate::config::StreamSettings;
use crate::events::{ControllerMessage, Epoch};
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, warn};

/// Result of counting one bounce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BounceOutcome {
    /// Bounce counted, still within the limit
    Counted(usize),
    /// Limit exceeded; the stream must fail with BOUNCING
    Exceeded(usize),
}

/// Bounce accounting and stall detection for one open cycle
#[derive(Debug)]
pub struct StallWatchdog {
    stall_timeout: Duration,
    bounce_reset_interval: Duration,
    max_bounce_count: usize,
    armed: bool,
    buffering_since: Option<Instant>,
    bounce_count: usize,
    last_bounce: Option<Instant>,
}

impl StallWatchdog {
    pub fn new(settings: &StreamSettings) -> Self {
        Self {
            stall_timeout: settings.stall_timeout(),
            bounce_reset_interval: settings.bounce_reset_interval(),
            max_bounce_count: settings.max_bounce_count,
            armed: false,
            buffering_since: None,
            bounce_count: 0,
            last_bounce: None,
        }
    }

    /// Start timing a BUFFERING period
    pub fn arm(&mut self, now: Instant) {
        self.armed = true;
        self.buffering_since = Some(now);
    }

    pub fn disarm(&mut self) {
        self.armed = false;
        self.buffering_since = None;
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Clear all accounting for a new open cycle
    pub fn reset(&mut self) {
        self.disarm();
        self.bounce_count = 0;
        self.last_bounce = None;
    }

    pub fn bounce_count(&self) -> usize {
        self.bounce_count
    }

    /// Count one bounce
    ///
    /// A bounce further than the reset interval from the previous one starts
    /// a new window.
    pub fn record_bounce(&mut self, now: Instant) -> BounceOutcome {
        if let Some(last) = self.last_bounce {
            if now.saturating_duration_since(last) > self.bounce_reset_interval {
                debug!("Bounce window expired, resetting count ({})", self.bounce_count);
                self.bounce_count = 0;
            }
        }
        self.count_bounce(now)
    }

    fn count_bounce(&mut self, now: Instant) -> BounceOutcome {
        self.bounce_count += 1;
        self.last_bounce = Some(now);

        if self.bounce_count > self.max_bounce_count {
            BounceOutcome::Exceeded(self.bounce_count)
        } else {
            BounceOutcome::Counted(self.bounce_count)
        }
    }

    /// Periodic check while BUFFERING
    ///
    /// Counts a bounce when the current buffering period reached the stall
    /// timeout, and restarts the period. Stalls within one unbroken
    /// buffering period always accumulate, whatever the reset window.
    pub fn check_stall(&mut self, now: Instant) -> Option<BounceOutcome> {
        if !self.armed {
            return None;
        }
        let since = self.buffering_since?;
        if now.saturating_duration_since(since) < self.stall_timeout {
            return None;
        }
        warn!(
            "Stream stalled in BUFFERING for {:?}",
            now.saturating_duration_since(since)
        );
        let unbroken = self.last_bounce == Some(since);
        self.buffering_since = Some(now);
        if unbroken {
            Some(self.count_bounce(now))
        } else {
            Some(self.record_bounce(now))
        }
    }
}

/// Spawn the periodic tick task
///
/// Returns `None` outside a tokio runtime; callers then drive
/// the watchdog by hand.
pub fn spawn_ticker(
    period: Duration,
    mailbox: UnboundedSender<ControllerMessage>,
    token: Epoch,
) -> Option<JoinHandle<()>> {
    let handle = tokio::runtime::Handle::try_current().ok()?;
    Some(handle.spawn(async move {
        let mut interval = time::interval(period);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        // First tick completes immediately
        interval.tick().await;

        loop {
            interval.tick().await;
            if mailbox.send(ControllerMessage::WatchdogTick { token }).is_err() {
                debug!("Controller mailbox closed, watchdog ticker exiting");
                break;
            }
        }
    }))
}
