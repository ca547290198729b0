//! Packet queue
//!
//! Pending FIFO of parsed packets awaiting the renderer, plus the processed
//! list of packets already dispatched and not yet reported finished.
//!
//! A packet lives in exactly one of the two lists. The cached byte size
//! always equals the summed payload size of the pending list.

use super::types::Packet;
use std::collections::VecDeque;
use tracing::debug;

/// Pending/processed packet bookkeeping for one open cycle
#[derive(Debug, Default)]
pub struct PacketQueue {
    pending: VecDeque<Packet>,
    processed: VecDeque<Packet>,
    cached_size: usize,
    next_sequence: u64,
}

/// Totals released by [`PacketQueue::drain`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrainStats {
    pub pending: usize,
    pub processed: usize,
    pub bytes: usize,
}

impl PacketQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a packet to the pending tail, assigning its sequence number
    pub fn enqueue(&mut self, mut packet: Packet) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        packet.sequence = sequence;
        self.cached_size += packet.byte_size();
        self.pending.push_back(packet);
        sequence
    }

    /// Oldest pending packet, if any
    pub fn front(&self) -> Option<&Packet> {
        self.pending.front()
    }

    /// Pop the oldest pending packet
    pub fn dequeue(&mut self) -> Option<Packet> {
        let packet = self.pending.pop_front()?;
        self.cached_size -= packet.byte_size();
        Some(packet)
    }

    /// Move the oldest pending packet to the processed list
    ///
    /// Called once the renderer accepted the packet.
    pub fn mark_dispatched(&mut self) -> Option<&Packet> {
        let packet = self.dequeue()?;
        self.processed.push_back(packet);
        self.processed.back()
    }

    /// Release a processed packet the renderer finished playing
    ///
    /// Unknown sequences (e.g. from before a drain) return `None`.
    pub fn acknowledge(&mut self, sequence: u64) -> Option<Packet> {
        let index = self.processed.iter().position(|p| p.sequence == sequence)?;
        self.processed.remove(index)
    }

    /// Free every pending and processed packet
    pub fn drain(&mut self) -> DrainStats {
        let stats = DrainStats {
            pending: self.pending.len(),
            processed: self.processed.len(),
            bytes: self.cached_size,
        };
        self.pending.clear();
        self.processed.clear();
        self.cached_size = 0;
        if stats.pending + stats.processed > 0 {
            debug!(
                "Drained packet queue: {} pending, {} processed, {} bytes",
                stats.pending, stats.processed, stats.bytes
            );
        }
        stats
    }

    /// Bytes held in the pending list
    pub fn cached_size(&self) -> usize {
        self.cached_size
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn processed_len(&self) -> usize {
        self.processed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Playback time held in the pending list
    pub fn pending_duration(&self) -> f64 {
        self.pending.iter().map(Packet::duration_seconds).sum()
    }
}
