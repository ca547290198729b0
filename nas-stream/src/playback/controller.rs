//! Stream controller
//!
//! Single owner of the stream state machine, the packet queue, the bitrate
//! estimator and the stall watchdog. Collaborators report through the
//! controller mailbox; [`StreamController::handle_message`] is the only entry
//! point for their callbacks, so every state change happens on one thread.
//!
//! State flow for one open cycle:
//!
//! ```text
//! STOPPED -> BUFFERING -> PLAYING <-> PAUSED
//!               ^  |         |
//!               |  +---------+-- underflow (bounce)
//!            SEEKING <- seek from any active state
//!
//! active -> FAILED | END_OF_FILE;  any -> STOPPED on close
//! ```

use crate::audio::output::{RenderState, Renderer, RendererEvent, RendererEvents};
use crate::audio::parser::{PacketParser, ParserEvent};
use crate::audio::source::{ByteSource, SourceEvent, SourceEvents};
use crate::config::StreamSettings;
use crate::error::{Error, RendererError, Result, SourceError};
use crate::events::{ControllerMessage, Epoch, EventBus, StreamErrorKind, StreamEvent, StreamState};
use crate::playback::bitrate::BitrateEstimator;
use crate::playback::format::{FormatSniffer, ResolvedFormat};
use crate::playback::monitor::{self, BounceOutcome, StallWatchdog};
use crate::playback::position::{self, StreamPosition};
use crate::playback::queue::PacketQueue;
use crate::playback::recorder::FileOutput;
use crate::playback::types::FormatDescription;
use crate::state::StreamStatus;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// External collaborators driven by the controller
pub struct Collaborators {
    pub source: Box<dyn ByteSource>,
    pub parser: Box<dyn PacketParser>,
    pub renderer: Box<dyn Renderer>,
}

/// Stream state machine
pub struct StreamController {
    settings: StreamSettings,
    source: Box<dyn ByteSource>,
    parser: Box<dyn PacketParser>,
    renderer: Box<dyn Renderer>,
    events: EventBus,
    mailbox: UnboundedSender<ControllerMessage>,

    state: StreamState,
    session_id: Uuid,

    // Current collaborator generations; `None` drops every message
    epoch_counter: u64,
    source_token: Option<Epoch>,
    renderer_token: Option<Epoch>,
    watchdog_token: Option<Epoch>,
    ticker: Option<JoinHandle<()>>,

    url: Option<String>,
    output_file: Option<PathBuf>,
    recorder: Option<FileOutput>,

    queue: PacketQueue,
    bitrate: BitrateEstimator,
    watchdog: StallWatchdog,
    sniffer: FormatSniffer,

    declared_content_type: Option<String>,
    resolved: Option<ResolvedFormat>,
    parser_open: bool,
    format: Option<FormatDescription>,
    content_length: Option<u64>,
    content_length_override: Option<u64>,
    data_offset: u64,
    audio_data_byte_count: Option<u64>,

    renderer_open: bool,
    render_state: RenderState,
    start_requested: bool,
    /// Back-pressure gate: renderer has a free buffer
    can_accept: bool,
    /// Renderer reported it holds no audio
    renderer_idle: bool,
    source_ended: bool,

    seek_position: f64,
    played_seconds: f64,
    parsed_duration: f64,
    packets_parsed: u64,
    processed_packets: u64,
    volume: f32,
    play_rate: f32,
}

impl StreamController {
    pub fn new(
        settings: StreamSettings,
        collaborators: Collaborators,
        events: EventBus,
        mailbox: UnboundedSender<ControllerMessage>,
    ) -> Self {
        let bitrate = BitrateEstimator::new(settings.bitrate_buffer_size, settings.bitrate_min_samples);
        let watchdog = StallWatchdog::new(&settings);
        let sniffer = FormatSniffer::new(
            settings.strict_content_type_checking,
            settings.default_content_type.clone(),
        );
        let volume = settings.volume.clamp(0.0, 1.0);

        Self {
            settings,
            source: collaborators.source,
            parser: collaborators.parser,
            renderer: collaborators.renderer,
            events,
            mailbox,
            state: StreamState::Stopped,
            session_id: Uuid::new_v4(),
            epoch_counter: 0,
            source_token: None,
            renderer_token: None,
            watchdog_token: None,
            ticker: None,
            url: None,
            output_file: None,
            recorder: None,
            queue: PacketQueue::new(),
            bitrate,
            watchdog,
            sniffer,
            declared_content_type: None,
            resolved: None,
            parser_open: false,
            format: None,
            content_length: None,
            content_length_override: None,
            data_offset: 0,
            audio_data_byte_count: None,
            renderer_open: false,
            render_state: RenderState::Stopped,
            start_requested: false,
            can_accept: true,
            renderer_idle: true,
            source_ended: false,
            seek_position: 0.0,
            played_seconds: 0.0,
            parsed_duration: 0.0,
            packets_parsed: 0,
            processed_packets: 0,
            volume,
            play_rate: 1.0,
        }
    }

    // ========================================
    // Setup
    // ========================================

    pub fn set_url(&mut self, url: impl Into<String>) {
        self.url = Some(url.into());
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// Applies from the next open
    pub fn set_strict_content_type_checking(&mut self, strict: bool) {
        self.settings.strict_content_type_checking = strict;
    }

    /// Applies from the next open
    pub fn set_default_content_type(&mut self, content_type: impl Into<String>) {
        self.settings.default_content_type = content_type.into();
    }

    /// Start time reported by [`Self::time_played_in_seconds`] for the next open
    pub fn set_seek_position(&mut self, seconds: f64) {
        self.seek_position = seconds.max(0.0);
    }

    /// Override the content length reported by the byte source
    pub fn set_content_length(&mut self, content_length: u64) {
        self.content_length_override = Some(content_length);
        self.content_length = Some(content_length);
    }

    /// Record dispatched packet payloads to `path` (`None` stops recording)
    pub fn set_output_file(&mut self, path: Option<PathBuf>) {
        self.output_file = path;
        if self.state.is_active() {
            self.close_recorder();
            self.open_recorder();
        }
    }

    pub fn output_file(&self) -> Option<&Path> {
        self.output_file.as_deref()
    }

    // ========================================
    // Transport
    // ========================================

    /// Open the configured URL from the beginning
    pub fn open(&mut self) -> Result<()> {
        self.open_at(None)
    }

    /// Open the configured URL, optionally from a byte position
    ///
    /// Returns as soon as the byte source is armed; progress is driven by
    /// mailbox messages.
    pub fn open_at(&mut self, position: Option<StreamPosition>) -> Result<()> {
        if self.state != StreamState::Stopped {
            return Err(Error::InvalidState(format!("cannot open while {}", self.state)));
        }
        let url = self.url.clone().ok_or(SourceError::NoUrl)?;

        self.reset_cycle();
        info!("Opening stream {} (session {})", url, self.session_id);
        self.open_recorder();

        let token = self.next_epoch();
        self.source_token = Some(token);
        let events = SourceEvents::new(self.mailbox.clone(), token);
        if let Err(e) = self.source.open(&url, position.as_ref(), events) {
            self.fail(StreamErrorKind::Open, e.to_string());
            return Err(Error::Stream(StreamErrorKind::Open));
        }

        self.transition(StreamState::Buffering);
        self.start_ticker();
        Ok(())
    }

    /// Tear everything down and return to STOPPED
    ///
    /// Idempotent. No message from the closed cycle is processed afterwards.
    pub fn close(&mut self) {
        if self.state == StreamState::Stopped && self.source_token.is_none() && !self.renderer_open {
            return;
        }
        info!("Closing stream (session {})", self.session_id);
        self.teardown();
        self.seek_position = 0.0;
        self.played_seconds = 0.0;
        self.transition(StreamState::Stopped);
    }

    /// Toggle PLAYING and PAUSED
    pub fn pause(&mut self) -> Result<()> {
        match self.state {
            StreamState::Playing => {
                self.renderer.pause();
                self.transition(StreamState::Paused);
                Ok(())
            }
            StreamState::Paused => self.resume(),
            other => Err(Error::InvalidState(format!("cannot pause while {}", other))),
        }
    }

    pub fn resume(&mut self) -> Result<()> {
        if self.state != StreamState::Paused {
            return Err(Error::InvalidState(format!("cannot resume while {}", self.state)));
        }
        self.renderer.resume();
        self.transition(StreamState::Playing);
        self.pump();
        Ok(())
    }

    /// Seek to `seconds` by reopening the byte source at an estimated offset
    ///
    /// Requires a bitrate estimate and a known content length. Returns the
    /// byte position requested from the source.
    pub fn seek_to_time(&mut self, seconds: f64) -> Result<StreamPosition> {
        if !self.state.is_active() {
            return Err(Error::InvalidState(format!("cannot seek while {}", self.state)));
        }
        let position = self.stream_position_for_time(seconds).ok_or_else(|| {
            Error::InvalidState("seek needs a known bitrate and content length".to_string())
        })?;
        let url = self.url.clone().ok_or(SourceError::NoUrl)?;

        info!("Seeking to {:.2}s (byte {})", seconds, position.start);

        // Nothing from before the seek may reach the renderer
        self.queue.drain();
        if self.renderer_open {
            self.renderer.flush();
        }
        self.can_accept = true;
        self.renderer_idle = true;
        self.start_requested = false;
        if self.parser_open {
            self.parser.reset();
        }

        self.source.close();
        let token = self.next_epoch();
        self.source_token = Some(token);
        self.source_ended = false;
        self.seek_position = seconds.max(0.0);
        self.played_seconds = 0.0;
        self.transition(StreamState::Seeking);

        let events = SourceEvents::new(self.mailbox.clone(), token);
        if let Err(e) = self.source.open(&url, Some(&position), events) {
            self.fail(StreamErrorKind::Open, e.to_string());
            return Err(Error::Stream(StreamErrorKind::Open));
        }
        Ok(position)
    }

    /// Output volume, clamped to 0.0-1.0
    pub fn set_volume(&mut self, volume: f32) {
        self.volume = if volume.is_nan() { 0.0 } else { volume.clamp(0.0, 1.0) };
        if self.renderer_open {
            self.renderer.set_volume(self.volume);
        }
    }

    pub fn set_play_rate(&mut self, rate: f32) {
        if !(rate.is_finite() && rate > 0.0) {
            warn!("Ignoring invalid play rate {}", rate);
            return;
        }
        self.play_rate = rate;
        if self.renderer_open {
            self.renderer.set_rate(rate);
        }
    }

    // ========================================
    // Queries
    // ========================================

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Start position plus the duration of every packet reported finished
    pub fn time_played_in_seconds(&self) -> f64 {
        self.seek_position + self.played_seconds
    }

    /// Stream duration
    ///
    /// From content length and bitrate when both are known, otherwise the
    /// parsed duration once the source ended, otherwise 0.
    pub fn duration_in_seconds(&self) -> f64 {
        if let (Some(length), Some(bitrate)) = (self.content_length, self.bitrate()) {
            if length > self.data_offset && bitrate > 0.0 {
                return (length - self.data_offset) as f64 / (bitrate / 8.0);
            }
        }
        if self.source_ended {
            return self.parsed_duration;
        }
        0.0
    }

    /// Bytes held in the pending queue
    pub fn cached_data_size(&self) -> usize {
        self.queue.cached_size()
    }

    /// Playback time held in the pending queue
    ///
    /// Derived from the cached size and the bitrate estimate; summed packet
    /// durations stand in until a bitrate is known.
    pub fn buffered_seconds(&self) -> f64 {
        match self.bitrate() {
            Some(bitrate) if bitrate > 0.0 => self.cached_data_size() as f64 * 8.0 / bitrate,
            _ => self.queue.pending_duration(),
        }
    }

    pub fn source_format_description(&self) -> Option<&FormatDescription> {
        self.format.as_ref()
    }

    /// Resolved content type, or the declared one before resolution
    pub fn content_type(&self) -> Option<&str> {
        self.resolved
            .as_ref()
            .map(|r| r.content_type.as_str())
            .or(self.declared_content_type.as_deref())
    }

    /// Bitrate estimate in bits per second, falling back to the nominal bitrate
    pub fn bitrate(&self) -> Option<f64> {
        self.bitrate.estimate().or_else(|| {
            self.format
                .as_ref()
                .and_then(|f| f.nominal_bitrate)
                .map(f64::from)
        })
    }

    pub fn bounce_count(&self) -> usize {
        self.watchdog.bounce_count()
    }

    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    pub fn data_offset(&self) -> u64 {
        self.data_offset
    }

    pub fn audio_data_byte_count(&self) -> Option<u64> {
        self.audio_data_byte_count
    }

    /// Packets handed to the renderer in this open cycle
    pub fn processed_packets(&self) -> u64 {
        self.processed_packets
    }

    pub fn pending_packets(&self) -> usize {
        self.queue.pending_len()
    }

    /// Dispatched packets not yet reported finished
    pub fn unacknowledged_packets(&self) -> usize {
        self.queue.processed_len()
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn play_rate(&self) -> f32 {
        self.play_rate
    }

    /// Byte position the source would be reopened at for a time target
    pub fn stream_position_for_time(&self, seconds: f64) -> Option<StreamPosition> {
        position::position_for_time(seconds, self.bitrate()?, self.data_offset, self.content_length?)
    }

    pub fn status(&self) -> StreamStatus {
        StreamStatus {
            session_id: self.session_id,
            state: self.state,
            cached_data_size: self.cached_data_size(),
            buffered_seconds: self.buffered_seconds(),
            bitrate: self.bitrate(),
            duration_seconds: self.duration_in_seconds(),
            time_played_seconds: self.time_played_in_seconds(),
            bounce_count: self.bounce_count(),
            content_type: self.content_type().map(str::to_string),
            format_description: self.format.as_ref().map(ToString::to_string),
            content_length: self.content_length,
            processed_packets: self.processed_packets,
            volume: self.volume,
        }
    }

    // ========================================
    // Mailbox
    // ========================================

    /// Process one collaborator message; stale generations are dropped
    pub fn handle_message(&mut self, message: ControllerMessage) {
        match message {
            ControllerMessage::Source { token, event } => {
                if Some(token) == self.source_token {
                    self.on_source_event(event);
                } else {
                    debug!("Dropping source event from stale epoch {}", token);
                }
            }
            ControllerMessage::Renderer { token, event } => {
                if Some(token) == self.renderer_token {
                    self.on_renderer_event(event);
                } else {
                    debug!("Dropping renderer event {:?} from stale epoch {}", event, token);
                }
            }
            ControllerMessage::WatchdogTick { token } => {
                if Some(token) == self.watchdog_token {
                    self.on_watchdog_tick(Instant::now());
                }
            }
        }
    }

    /// Watchdog check at `now`
    pub fn on_watchdog_tick(&mut self, now: Instant) {
        if self.state != StreamState::Buffering {
            return;
        }
        if let Some(outcome) = self.watchdog.check_stall(now) {
            self.apply_bounce(outcome);
        }
    }

    fn on_source_event(&mut self, event: SourceEvent) {
        match event {
            SourceEvent::Ready {
                content_type,
                content_length,
            } => self.on_source_ready(content_type, content_length),
            SourceEvent::BytesAvailable(bytes) => self.on_bytes(&bytes),
            SourceEvent::EndOfStream => self.on_end_of_stream(),
            SourceEvent::Error(message) => self.fail(StreamErrorKind::Network, message),
            SourceEvent::MetaData(metadata) => self.on_metadata(metadata),
        }
    }

    fn on_source_ready(&mut self, content_type: Option<String>, content_length: Option<u64>) {
        // Reopen after a seek: format is settled
        if self.resolved.is_some() {
            return;
        }
        if self.content_length_override.is_none() {
            self.content_length = content_length.or_else(|| self.source.content_length());
        }
        debug!(
            "Byte source ready: content type {:?}, length {:?}",
            content_type, self.content_length
        );
        self.declared_content_type = content_type;

        match self.sniffer.check_declared(self.declared_content_type.as_deref()) {
            Ok(Some(resolved)) => {
                self.use_format(resolved);
            }
            Ok(None) => debug!("Content type unresolved, waiting for stream bytes"),
            Err(kind) => {
                let message = format!("unsupported content type {:?}", self.declared_content_type);
                self.fail(kind, message);
            }
        }
    }

    fn on_bytes(&mut self, bytes: &[u8]) {
        if !self.state.is_active() {
            return;
        }
        if self.resolved.is_none() {
            match self.sniffer.resolve(self.declared_content_type.as_deref(), bytes) {
                Ok(resolved) => {
                    if !self.use_format(resolved) {
                        return;
                    }
                }
                Err(kind) => {
                    let message = format!(
                        "cannot determine stream format (declared {:?})",
                        self.declared_content_type
                    );
                    self.fail(kind, message);
                    return;
                }
            }
        }

        let parsed = match self.parser.parse(bytes) {
            Ok(parsed) => parsed,
            Err(e) => {
                self.fail(e.kind(), e.to_string());
                return;
            }
        };
        for event in parsed {
            self.on_parser_event(event);
            if !self.state.is_active() {
                return;
            }
        }
        self.pump();
    }

    fn on_end_of_stream(&mut self) {
        info!(
            "Byte source ended after {} packets ({:.1}s parsed)",
            self.packets_parsed, self.parsed_duration
        );
        self.source_ended = true;
        // Short streams may never reach the buffering threshold
        self.pump();
        self.check_end_of_file();
    }

    fn on_metadata(&mut self, metadata: BTreeMap<String, String>) {
        debug!("Stream metadata: {:?}", metadata);
        self.events.emit_lossy(StreamEvent::MetaDataAvailable {
            session_id: self.session_id,
            metadata,
            timestamp: chrono::Utc::now(),
        });
    }

    fn use_format(&mut self, resolved: ResolvedFormat) -> bool {
        info!(
            "Stream format {} from {:?} content type {}",
            resolved.file_type, resolved.source, resolved.content_type
        );
        let file_type = resolved.file_type;
        self.resolved = Some(resolved);
        match self.parser.open(file_type) {
            Ok(()) => {
                self.parser_open = true;
                true
            }
            Err(e) => {
                self.fail(e.kind(), e.to_string());
                false
            }
        }
    }

    fn on_parser_event(&mut self, event: ParserEvent) {
        match event {
            ParserEvent::Format(format) => {
                if self.format.as_ref() != Some(&format) {
                    info!("Source format: {}", format);
                }
                self.format = Some(format);
                if !self.renderer_open {
                    self.open_renderer();
                }
            }
            ParserEvent::DataOffset(offset) => self.data_offset = offset,
            ParserEvent::AudioDataByteCount(count) => self.audio_data_byte_count = Some(count),
            ParserEvent::Packet(packet) => {
                self.bitrate.record(packet.duration_seconds(), packet.byte_size());
                self.parsed_duration += packet.duration_seconds();
                self.packets_parsed += 1;
                self.queue.enqueue(packet);
                if self.state == StreamState::Seeking {
                    self.transition(StreamState::Buffering);
                }
            }
        }
    }

    fn open_renderer(&mut self) {
        let Some(format) = self.format.clone() else {
            return;
        };
        let token = self.next_epoch();
        self.renderer_token = Some(token);
        let events = RendererEvents::new(self.mailbox.clone(), token);

        match self.renderer.open(&format, events) {
            Ok(()) => {
                debug!("Renderer open for {}", format);
                self.renderer_open = true;
                self.render_state = RenderState::Stopped;
                self.renderer.set_volume(self.volume);
                self.renderer.set_rate(self.play_rate);
            }
            Err(e) => self.fail(StreamErrorKind::Open, e.to_string()),
        }
    }

    fn on_renderer_event(&mut self, event: RendererEvent) {
        match event {
            RendererEvent::StateChanged(render_state) => {
                debug!("Renderer state {:?}", render_state);
                self.render_state = render_state;
                if render_state == RenderState::Running
                    && self.state == StreamState::Buffering
                    && self.start_requested
                {
                    self.start_requested = false;
                    self.transition(StreamState::Playing);
                    self.pump();
                }
            }
            RendererEvent::Overflow => {
                // Nothing in flight: the report predates the last flush
                if self.queue.processed_len() == 0 {
                    debug!("Ignoring overflow with no packets in flight");
                    return;
                }
                debug!("Renderer overflow, holding {} packets", self.queue.pending_len());
                self.can_accept = false;
            }
            RendererEvent::BuffersEmpty | RendererEvent::Underflow => {
                self.can_accept = true;
                self.renderer_idle = true;
                self.on_renderer_drained();
            }
            RendererEvent::InitFailed => {
                self.fail(StreamErrorKind::Open, "renderer initialization failed".to_string());
            }
            RendererEvent::PacketFinished { sequence } => {
                let Some(packet) = self.queue.acknowledge(sequence) else {
                    debug!("Ignoring finish of unknown packet {}", sequence);
                    return;
                };
                self.played_seconds += packet.duration_seconds();
                // A finished packet frees a renderer buffer
                self.can_accept = true;
                if !self.check_end_of_file() {
                    self.pump();
                }
            }
        }
    }

    fn on_renderer_drained(&mut self) {
        if !self.queue.is_empty() {
            self.pump();
        } else if self.source_ended {
            self.check_end_of_file();
        } else if self.state == StreamState::Playing {
            warn!("Renderer ran dry, rebuffering");
            self.transition(StreamState::Buffering);
            let outcome = self.watchdog.record_bounce(Instant::now());
            self.apply_bounce(outcome);
        }
    }

    // ========================================
    // Packet flow
    // ========================================

    /// Hand pending packets to the renderer as far as the state allows
    fn pump(&mut self) {
        if !self.renderer_open {
            return;
        }
        match self.state {
            StreamState::Buffering => {
                let pending = self.queue.pending_len();
                let ready = pending >= self.settings.min_buffered_packets || (self.source_ended && pending > 0);
                if !ready || !self.can_accept {
                    return;
                }
                if !self.feed() {
                    return;
                }
                if self.render_state == RenderState::Running {
                    self.transition(StreamState::Playing);
                } else if !self.start_requested {
                    self.start_requested = true;
                    if let Err(e) = self.renderer.start() {
                        self.fail(StreamErrorKind::Open, e.to_string());
                    }
                }
            }
            StreamState::Playing | StreamState::Paused => {
                self.feed();
            }
            _ => {}
        }
    }

    /// Enqueue packets until the queue is empty or the renderer pushes back
    ///
    /// Returns `false` if the stream failed.
    fn feed(&mut self) -> bool {
        while self.can_accept {
            let Some(packet) = self.queue.front() else {
                break;
            };
            match self.renderer.enqueue(packet) {
                Ok(()) => {}
                Err(RendererError::Overflow) => {
                    debug!("Renderer full, {} packets pending", self.queue.pending_len());
                    self.can_accept = false;
                    break;
                }
                Err(e) => {
                    self.fail(StreamErrorKind::Open, e.to_string());
                    return false;
                }
            }

            self.renderer_idle = false;
            self.processed_packets += 1;
            let Some(dispatched) = self.queue.mark_dispatched() else {
                break;
            };

            let mut recorder_failed = false;
            if let Some(recorder) = self.recorder.as_mut() {
                match recorder.write(&dispatched.data) {
                    Ok(()) => self.events.emit_lossy(StreamEvent::SamplesAvailable {
                        session_id: self.session_id,
                        sequence: dispatched.sequence,
                        data: dispatched.data.clone(),
                        duration_seconds: dispatched.duration_seconds(),
                        timestamp: chrono::Utc::now(),
                    }),
                    Err(e) => {
                        warn!("Recording to {} failed, detaching: {}", recorder.path().display(), e);
                        recorder_failed = true;
                    }
                }
            }
            if recorder_failed {
                self.recorder = None;
            }
        }
        true
    }

    /// Enter END_OF_FILE once the source ended and everything was played
    fn check_end_of_file(&mut self) -> bool {
        if !self.source_ended || !self.state.is_active() || !self.queue.is_empty() {
            return false;
        }
        if self.queue.processed_len() > 0 && !self.renderer_idle {
            return false;
        }
        info!(
            "End of file after {:.1}s played ({} packets)",
            self.time_played_in_seconds(),
            self.processed_packets
        );
        self.teardown();
        self.transition(StreamState::EndOfFile);
        true
    }

    // ========================================
    // Lifecycle internals
    // ========================================

    fn next_epoch(&mut self) -> Epoch {
        self.epoch_counter += 1;
        Epoch::new(self.epoch_counter)
    }

    fn transition(&mut self, new_state: StreamState) {
        if self.state == new_state {
            return;
        }
        let old_state = self.state;
        self.state = new_state;

        match new_state {
            StreamState::Buffering => self.watchdog.arm(Instant::now()),
            StreamState::Playing | StreamState::Paused | StreamState::Seeking => self.watchdog.disarm(),
            _ => {}
        }

        info!("Stream state {} -> {}", old_state, new_state);
        self.events.emit_lossy(StreamEvent::StateChanged {
            session_id: self.session_id,
            old_state,
            new_state,
            timestamp: chrono::Utc::now(),
        });
    }

    fn apply_bounce(&mut self, outcome: BounceOutcome) {
        let (BounceOutcome::Counted(count) | BounceOutcome::Exceeded(count)) = outcome;
        self.events.emit_lossy(StreamEvent::Bounced {
            session_id: self.session_id,
            bounce_count: count,
            timestamp: chrono::Utc::now(),
        });
        match outcome {
            BounceOutcome::Counted(_) => {
                warn!("Stream bounce {}/{}", count, self.settings.max_bounce_count);
            }
            BounceOutcome::Exceeded(_) => {
                self.fail(StreamErrorKind::Bouncing, format!("stream bounced {} times", count));
            }
        }
    }

    /// Report a fatal error, release everything, enter FAILED
    fn fail(&mut self, kind: StreamErrorKind, message: String) {
        if self.state == StreamState::Failed {
            return;
        }
        error!("Stream failed ({}): {}", kind, message);
        self.events.emit_lossy(StreamEvent::ErrorOccurred {
            session_id: self.session_id,
            error: kind,
            message,
            timestamp: chrono::Utc::now(),
        });
        self.teardown();
        self.transition(StreamState::Failed);
    }

    /// Fresh per-cycle state for `open`
    fn reset_cycle(&mut self) {
        self.session_id = Uuid::new_v4();
        self.queue.drain();
        self.bitrate.reset();
        self.watchdog.reset();
        self.sniffer = FormatSniffer::new(
            self.settings.strict_content_type_checking,
            self.settings.default_content_type.clone(),
        );
        self.declared_content_type = None;
        self.resolved = None;
        self.format = None;
        self.content_length = self.content_length_override;
        self.data_offset = 0;
        self.audio_data_byte_count = None;
        self.render_state = RenderState::Stopped;
        self.start_requested = false;
        self.can_accept = true;
        self.renderer_idle = true;
        self.source_ended = false;
        self.played_seconds = 0.0;
        self.parsed_duration = 0.0;
        self.packets_parsed = 0;
        self.processed_packets = 0;
    }

    /// Release collaborators, timers and packets; invalidate all epochs
    fn teardown(&mut self) {
        self.stop_ticker();
        if self.source_token.take().is_some() {
            self.source.close();
        }
        self.renderer_token = None;
        if self.renderer_open {
            self.renderer.close();
            self.renderer_open = false;
        }
        if self.parser_open {
            self.parser.close();
            self.parser_open = false;
        }
        self.queue.drain();
        self.render_state = RenderState::Stopped;
        self.start_requested = false;
        self.can_accept = true;
        self.renderer_idle = true;
        self.close_recorder();
    }

    fn start_ticker(&mut self) {
        let token = self.next_epoch();
        self.watchdog_token = Some(token);
        self.ticker = monitor::spawn_ticker(self.settings.watchdog_interval(), self.mailbox.clone(), token);
    }

    fn stop_ticker(&mut self) {
        self.watchdog_token = None;
        self.watchdog.disarm();
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
    }

    fn open_recorder(&mut self) {
        let Some(path) = self.output_file.as_deref() else {
            return;
        };
        match FileOutput::create(path) {
            Ok(recorder) => self.recorder = Some(recorder),
            Err(e) => warn!("Cannot record to {}: {}", path.display(), e),
        }
    }

    fn close_recorder(&mut self) {
        if let Some(mut recorder) = self.recorder.take() {
            match recorder.flush() {
                Ok(()) => debug!(
                    "Recorded {} bytes to {}",
                    recorder.bytes_written(),
                    recorder.path().display()
                ),
                Err(e) => warn!("Flushing recording {} failed: {}", recorder.path().display(), e),
            }
        }
    }
}

impl Drop for StreamController {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl std::fmt::Debug for StreamController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamController")
            .field("state", &self.state)
            .field("session_id", &self.session_id)
            .field("pending", &self.queue.pending_len())
            .field("cached_data_size", &self.queue.cached_size())
            .finish()
    }
}
