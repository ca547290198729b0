//! Test helpers for nas-stream integration tests
//!
//! Provides scripted collaborators and a synchronous controller harness:
//! - MockSource: records opens/closes, lets tests push source events
//! - MockParser: cuts the byte stream into fixed-size one-second packets
//! - MockRenderer: bounded buffer pool that reports through its event sender
//! - Harness: drives a `StreamController` by draining its mailbox in-line

#![allow(dead_code)]

use nas_stream::audio::{
    ByteSource, PacketParser, ParserEvent, RenderState, Renderer, RendererEvent, RendererEvents, SourceEvent,
    SourceEvents,
};
use nas_stream::error::{ParseError, RendererError, SourceError};
use nas_stream::events::{ControllerMessage, EventBus, StreamErrorKind, StreamEvent, StreamState};
use nas_stream::playback::{AudioFileType, FormatDescription, Packet, StreamPosition};
use nas_stream::{Collaborators, StreamController, StreamSettings};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{broadcast, mpsc};

/// Bytes per mock packet
pub const PACKET_BYTES: usize = 8000;

/// Duration of one mock packet (64 kbps)
pub const PACKET_SECONDS: f64 = 1.0;

pub const TEST_URL: &str = "http://radio.test/stream.mp3";

fn lock<T>(shared: &Arc<Mutex<T>>) -> MutexGuard<'_, T> {
    shared.lock().unwrap()
}

// ========================================
// Byte source
// ========================================

#[derive(Default)]
pub struct SourceLog {
    pub opens: Vec<(String, Option<StreamPosition>)>,
    pub closes: usize,
    pub events: Option<SourceEvents>,
    pub fail_open: bool,
    pub content_length: Option<u64>,
}

pub struct MockSource {
    log: Arc<Mutex<SourceLog>>,
}

impl ByteSource for MockSource {
    fn open(&mut self, url: &str, position: Option<&StreamPosition>, events: SourceEvents) -> Result<(), SourceError> {
        let mut log = lock(&self.log);
        if log.fail_open {
            return Err(SourceError::Open {
                url: url.to_string(),
                reason: "connection refused".to_string(),
            });
        }
        log.opens.push((url.to_string(), position.copied()));
        log.events = Some(events);
        Ok(())
    }

    fn close(&mut self) {
        let mut log = lock(&self.log);
        log.closes += 1;
        log.events = None;
    }

    fn content_length(&self) -> Option<u64> {
        lock(&self.log).content_length
    }
}

// ========================================
// Packet parser
// ========================================

#[derive(Default)]
pub struct ParserLog {
    pub opened: Vec<AudioFileType>,
    pub resets: usize,
    pub closes: usize,
    pub open_error: Option<ParseError>,
    pub parse_error: Option<ParseError>,
    pub data_offset: u64,
    pub nominal_bitrate: Option<u32>,
    /// Bytes carried over to the next chunk
    pub carry: Vec<u8>,
    pub format_sent: bool,
}

pub struct MockParser {
    log: Arc<Mutex<ParserLog>>,
}

pub fn mock_format(file_type: AudioFileType, nominal_bitrate: Option<u32>) -> FormatDescription {
    FormatDescription {
        file_type,
        sample_rate: 8000,
        channels: 1,
        frames_per_packet: 8000,
        nominal_bitrate,
    }
}

impl PacketParser for MockParser {
    fn open(&mut self, file_type: AudioFileType) -> Result<(), ParseError> {
        let mut log = lock(&self.log);
        if let Some(error) = log.open_error.clone() {
            return Err(error);
        }
        log.opened.push(file_type);
        log.format_sent = false;
        log.carry.clear();
        Ok(())
    }

    fn parse(&mut self, bytes: &[u8]) -> Result<Vec<ParserEvent>, ParseError> {
        let mut log = lock(&self.log);
        if let Some(error) = log.parse_error.take() {
            return Err(error);
        }
        let Some(file_type) = log.opened.last().copied() else {
            return Err(ParseError::NotOpen);
        };

        let mut events = Vec::new();
        if !log.format_sent {
            log.format_sent = true;
            events.push(ParserEvent::DataOffset(log.data_offset));
            events.push(ParserEvent::Format(mock_format(file_type, log.nominal_bitrate)));
        }

        log.carry.extend_from_slice(bytes);
        while log.carry.len() >= PACKET_BYTES {
            let data: Vec<u8> = log.carry.drain(..PACKET_BYTES).collect();
            events.push(ParserEvent::Packet(Packet::new(data, 8000, PACKET_SECONDS)));
        }
        Ok(events)
    }

    fn reset(&mut self) {
        let mut log = lock(&self.log);
        log.resets += 1;
        log.carry.clear();
    }

    fn close(&mut self) {
        let mut log = lock(&self.log);
        log.closes += 1;
        log.carry.clear();
    }
}

// ========================================
// Renderer
// ========================================

pub struct RendererLog {
    pub capacity: usize,
    pub opens: usize,
    pub open_error: Option<RendererError>,
    /// Report `Running` as soon as `start` is called
    pub auto_start: bool,
    pub enqueued: Vec<u64>,
    pub in_flight: VecDeque<u64>,
    pub starts: usize,
    pub pauses: usize,
    pub resumes: usize,
    pub flushes: usize,
    pub closes: usize,
    pub volume: Option<f32>,
    pub rate: Option<f32>,
    pub events: Option<RendererEvents>,
}

impl Default for RendererLog {
    fn default() -> Self {
        Self {
            capacity: 16,
            opens: 0,
            open_error: None,
            auto_start: true,
            enqueued: Vec::new(),
            in_flight: VecDeque::new(),
            starts: 0,
            pauses: 0,
            resumes: 0,
            flushes: 0,
            closes: 0,
            volume: None,
            rate: None,
            events: None,
        }
    }
}

impl RendererLog {
    fn send(&self, event: RendererEvent) {
        if let Some(events) = &self.events {
            events.send(event);
        }
    }
}

pub struct MockRenderer {
    log: Arc<Mutex<RendererLog>>,
}

impl Renderer for MockRenderer {
    fn open(&mut self, _format: &FormatDescription, events: RendererEvents) -> Result<(), RendererError> {
        let mut log = lock(&self.log);
        if let Some(error) = log.open_error.clone() {
            return Err(error);
        }
        log.opens += 1;
        log.in_flight.clear();
        log.events = Some(events);
        Ok(())
    }

    fn enqueue(&mut self, packet: &Packet) -> Result<(), RendererError> {
        let mut log = lock(&self.log);
        if log.events.is_none() {
            return Err(RendererError::Closed);
        }
        if log.in_flight.len() >= log.capacity {
            return Err(RendererError::Overflow);
        }
        log.enqueued.push(packet.sequence);
        log.in_flight.push_back(packet.sequence);
        Ok(())
    }

    fn start(&mut self) -> Result<(), RendererError> {
        let mut log = lock(&self.log);
        log.starts += 1;
        if log.auto_start {
            log.send(RendererEvent::StateChanged(RenderState::Running));
        }
        Ok(())
    }

    fn pause(&mut self) {
        let mut log = lock(&self.log);
        log.pauses += 1;
        log.send(RendererEvent::StateChanged(RenderState::Paused));
    }

    fn resume(&mut self) {
        let mut log = lock(&self.log);
        log.resumes += 1;
        log.send(RendererEvent::StateChanged(RenderState::Running));
    }

    fn flush(&mut self) {
        let mut log = lock(&self.log);
        log.flushes += 1;
        log.in_flight.clear();
    }

    fn close(&mut self) {
        let mut log = lock(&self.log);
        log.closes += 1;
        log.in_flight.clear();
        log.events = None;
    }

    fn set_volume(&mut self, volume: f32) {
        lock(&self.log).volume = Some(volume);
    }

    fn set_rate(&mut self, rate: f32) {
        lock(&self.log).rate = Some(rate);
    }
}

// ========================================
// Shared probes
// ========================================

/// Handles onto the mock collaborators' recorded state
#[derive(Clone, Default)]
pub struct Probes {
    pub source: Arc<Mutex<SourceLog>>,
    pub parser: Arc<Mutex<ParserLog>>,
    pub renderer: Arc<Mutex<RendererLog>>,
}

impl Probes {
    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            source: Box::new(MockSource {
                log: Arc::clone(&self.source),
            }),
            parser: Box::new(MockParser {
                log: Arc::clone(&self.parser),
            }),
            renderer: Box::new(MockRenderer {
                log: Arc::clone(&self.renderer),
            }),
        }
    }

    /// Mock byte source in front of real parser and renderer implementations
    pub fn with_source(&self, parser: Box<dyn PacketParser>, renderer: Box<dyn Renderer>) -> Collaborators {
        Collaborators {
            source: Box::new(MockSource {
                log: Arc::clone(&self.source),
            }),
            parser,
            renderer,
        }
    }

    pub fn source(&self) -> MutexGuard<'_, SourceLog> {
        lock(&self.source)
    }

    pub fn parser(&self) -> MutexGuard<'_, ParserLog> {
        lock(&self.parser)
    }

    pub fn renderer(&self) -> MutexGuard<'_, RendererLog> {
        lock(&self.renderer)
    }

    /// Event sender of the currently open source
    pub fn source_events(&self) -> SourceEvents {
        self.source().events.clone().expect("source not open")
    }

    /// Event sender of the currently open renderer
    pub fn renderer_events(&self) -> RendererEvents {
        self.renderer().events.clone().expect("renderer not open")
    }

    /// Payload of `count` mock packets; every packet is filled with `fill`
    pub fn packet_bytes(count: usize, fill: u8) -> Vec<u8> {
        vec![fill; PACKET_BYTES * count]
    }

    /// Oldest packet the renderer holds, removed as if played out
    pub fn play_out_next(&self) -> Option<u64> {
        self.renderer().in_flight.pop_front()
    }
}

/// Settings used by most tests: threshold 3, 4 bounces, 5 s stall timeout
pub fn test_settings() -> StreamSettings {
    StreamSettings {
        min_buffered_packets: 3,
        max_bounce_count: 4,
        stall_timeout_ms: 5_000,
        ..StreamSettings::default()
    }
}

// ========================================
// Synchronous harness
// ========================================

/// Controller plus mocks, driven without an async runtime
///
/// Every helper that posts a collaborator event drains the mailbox before
/// returning, including messages the controller's own calls produced.
pub struct Harness {
    pub controller: StreamController,
    pub probes: Probes,
    mailbox: mpsc::UnboundedReceiver<ControllerMessage>,
    events: broadcast::Receiver<StreamEvent>,
}

impl Harness {
    pub fn new(settings: StreamSettings) -> Self {
        let probes = Probes::default();
        let bus = EventBus::new(1024);
        let events = bus.subscribe();
        let (tx, mailbox) = mpsc::unbounded_channel();
        let mut controller = StreamController::new(settings, probes.collaborators(), bus, tx);
        controller.set_url(TEST_URL);
        Self {
            controller,
            probes,
            mailbox,
            events,
        }
    }

    /// Controller opened and the source reported ready
    pub fn playing_setup(settings: StreamSettings, content_length: Option<u64>) -> Self {
        let mut harness = Self::new(settings);
        harness.controller.open().unwrap();
        harness.ready(Some("audio/mpeg"), content_length);
        harness
    }

    /// Process every queued collaborator message
    pub fn pump(&mut self) {
        while let Ok(message) = self.mailbox.try_recv() {
            self.controller.handle_message(message);
        }
    }

    pub fn source_send(&mut self, event: SourceEvent) {
        self.probes.source_events().send(event);
        self.pump();
    }

    pub fn ready(&mut self, content_type: Option<&str>, content_length: Option<u64>) {
        self.source_send(SourceEvent::Ready {
            content_type: content_type.map(str::to_string),
            content_length,
        });
    }

    pub fn bytes(&mut self, bytes: Vec<u8>) {
        self.source_send(SourceEvent::BytesAvailable(bytes));
    }

    /// Deliver `count` whole packets
    pub fn deliver(&mut self, count: usize) {
        self.bytes(Probes::packet_bytes(count, 0xAB));
    }

    pub fn end_of_stream(&mut self) {
        self.source_send(SourceEvent::EndOfStream);
    }

    pub fn metadata(&mut self, metadata: BTreeMap<String, String>) {
        self.source_send(SourceEvent::MetaData(metadata));
    }

    pub fn renderer_send(&mut self, event: RendererEvent) {
        self.probes.renderer_events().send(event);
        self.pump();
    }

    /// Play out the oldest buffer; reports BuffersEmpty when none remain
    pub fn finish_next(&mut self) -> Option<u64> {
        let sequence = self.probes.play_out_next()?;
        let events = self.probes.renderer_events();
        events.send(RendererEvent::PacketFinished { sequence });
        if self.probes.renderer().in_flight.is_empty() {
            events.send(RendererEvent::BuffersEmpty);
        }
        self.pump();
        Some(sequence)
    }

    /// Play out every buffer, including ones refilled along the way
    pub fn finish_all(&mut self) -> usize {
        let mut finished = 0;
        loop {
            let open = self.probes.renderer().events.is_some();
            if !open || self.finish_next().is_none() {
                return finished;
            }
            finished += 1;
        }
    }

    /// Host events emitted since the last call
    pub fn take_events(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    /// States entered since the last call to `take_events`/`states`
    pub fn states(&mut self) -> Vec<StreamState> {
        states_of(&self.take_events())
    }
}

pub fn states_of(events: &[StreamEvent]) -> Vec<StreamState> {
    events
        .iter()
        .filter_map(|event| match event {
            StreamEvent::StateChanged { new_state, .. } => Some(*new_state),
            _ => None,
        })
        .collect()
}

pub fn errors_of(events: &[StreamEvent]) -> Vec<StreamErrorKind> {
    events
        .iter()
        .filter_map(|event| match event {
            StreamEvent::ErrorOccurred { error, .. } => Some(*error),
            _ => None,
        })
        .collect()
}

pub fn bounces_of(events: &[StreamEvent]) -> Vec<usize> {
    events
        .iter()
        .filter_map(|event| match event {
            StreamEvent::Bounced { bounce_count, .. } => Some(*bounce_count),
            _ => None,
        })
        .collect()
}
