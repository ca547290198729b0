//! Stream engine
//!
//! Runs a [`StreamController`] inside one tokio task. Host commands arrive
//! through [`StreamHandle`] (mpsc + oneshot replies); collaborator callbacks
//! arrive through the controller mailbox. The task is the controller's only
//! caller, so the controller needs no locking.

use crate::config::StreamSettings;
use crate::error::{Error, Result};
use crate::events::{ControllerMessage, EventBus, StreamEvent};
use crate::playback::controller::{Collaborators, StreamController};
use crate::playback::position::StreamPosition;
use crate::state::{SharedStatus, StreamStatus};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Command channel depth
const COMMAND_CHANNEL_CAPACITY: usize = 32;

/// Host command
#[derive(Debug)]
enum Command {
    Open {
        position: Option<StreamPosition>,
        reply: oneshot::Sender<Result<()>>,
    },
    Close {
        reply: oneshot::Sender<()>,
    },
    Pause {
        reply: oneshot::Sender<Result<()>>,
    },
    Resume {
        reply: oneshot::Sender<Result<()>>,
    },
    Seek {
        seconds: f64,
        reply: oneshot::Sender<Result<StreamPosition>>,
    },
    PositionForTime {
        seconds: f64,
        reply: oneshot::Sender<Option<StreamPosition>>,
    },
    SetVolume(f32),
    SetPlayRate(f32),
    SetUrl(String),
    SetOutputFile(Option<PathBuf>),
    SetStrictContentTypeChecking(bool),
    SetDefaultContentType(String),
    SetSeekPosition(f64),
    SetContentLength(u64),
}

/// Async owner of one stream controller
pub struct StreamEngine {
    controller: StreamController,
    commands: mpsc::Receiver<Command>,
    mailbox: mpsc::UnboundedReceiver<ControllerMessage>,
    status: Arc<SharedStatus>,
}

impl StreamEngine {
    /// Build an engine and its handle; settings are validated first
    pub fn new(settings: StreamSettings, collaborators: Collaborators) -> Result<(Self, StreamHandle)> {
        settings.validate()?;

        let events = EventBus::new(settings.event_bus_capacity);
        let (mailbox_tx, mailbox_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let status = Arc::new(SharedStatus::new());

        let controller = StreamController::new(settings, collaborators, events.clone(), mailbox_tx);

        let engine = Self {
            controller,
            commands: command_rx,
            mailbox: mailbox_rx,
            status: Arc::clone(&status),
        };
        let handle = StreamHandle {
            commands: command_tx,
            status,
            events,
        };
        Ok((engine, handle))
    }

    /// Build an engine and run it on the current runtime
    pub fn spawn(settings: StreamSettings, collaborators: Collaborators) -> Result<(StreamHandle, JoinHandle<()>)> {
        let (engine, handle) = Self::new(settings, collaborators)?;
        let task = tokio::spawn(engine.run());
        Ok((handle, task))
    }

    /// Process commands and collaborator messages until every handle is dropped
    pub async fn run(mut self) {
        info!("Stream engine started");
        self.publish().await;

        loop {
            tokio::select! {
                biased;

                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => {
                        debug!("All stream handles dropped");
                        break;
                    }
                },

                Some(message) = self.mailbox.recv() => {
                    self.controller.handle_message(message);
                    self.publish().await;
                }
            }
        }

        self.controller.close();
        self.publish().await;
        info!("Stream engine stopped");
    }

    async fn publish(&mut self) {
        self.status.update(self.controller.status()).await;
    }

    /// Apply one command; replies are sent after the status snapshot is refreshed
    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Open { position, reply } => {
                let result = self.controller.open_at(position);
                self.publish().await;
                let _ = reply.send(result);
            }
            Command::Close { reply } => {
                self.controller.close();
                self.publish().await;
                let _ = reply.send(());
            }
            Command::Pause { reply } => {
                let result = self.controller.pause();
                self.publish().await;
                let _ = reply.send(result);
            }
            Command::Resume { reply } => {
                let result = self.controller.resume();
                self.publish().await;
                let _ = reply.send(result);
            }
            Command::Seek { seconds, reply } => {
                let result = self.controller.seek_to_time(seconds);
                self.publish().await;
                let _ = reply.send(result);
            }
            Command::PositionForTime { seconds, reply } => {
                let _ = reply.send(self.controller.stream_position_for_time(seconds));
            }
            Command::SetVolume(volume) => {
                self.controller.set_volume(volume);
                self.publish().await;
            }
            Command::SetPlayRate(rate) => self.controller.set_play_rate(rate),
            Command::SetUrl(url) => self.controller.set_url(url),
            Command::SetOutputFile(path) => self.controller.set_output_file(path),
            Command::SetStrictContentTypeChecking(strict) => {
                self.controller.set_strict_content_type_checking(strict)
            }
            Command::SetDefaultContentType(content_type) => {
                self.controller.set_default_content_type(content_type)
            }
            Command::SetSeekPosition(seconds) => {
                self.controller.set_seek_position(seconds);
                self.publish().await;
            }
            Command::SetContentLength(length) => {
                self.controller.set_content_length(length);
                self.publish().await;
            }
        }
    }
}

/// Cloneable host handle to a running [`StreamEngine`]
///
/// No method blocks on stream progress: `open` returns once the byte source
/// is armed, `close` once everything is torn down.
#[derive(Clone)]
pub struct StreamHandle {
    commands: mpsc::Sender<Command>,
    status: Arc<SharedStatus>,
    events: EventBus,
}

impl StreamHandle {
    async fn send(&self, command: Command) -> Result<()> {
        self.commands.send(command).await.map_err(|_| Error::EngineStopped)
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.send(command(reply)).await?;
        response.await.map_err(|_| Error::EngineStopped)
    }

    pub async fn open(&self) -> Result<()> {
        self.request(|reply| Command::Open { position: None, reply }).await?
    }

    pub async fn open_at(&self, position: StreamPosition) -> Result<()> {
        self.request(|reply| Command::Open {
            position: Some(position),
            reply,
        })
        .await?
    }

    /// Returns after the engine released every resource of the open cycle
    pub async fn close(&self) -> Result<()> {
        self.request(|reply| Command::Close { reply }).await
    }

    /// Toggle PLAYING and PAUSED
    pub async fn pause(&self) -> Result<()> {
        self.request(|reply| Command::Pause { reply }).await?
    }

    pub async fn resume(&self) -> Result<()> {
        self.request(|reply| Command::Resume { reply }).await?
    }

    pub async fn seek_to_time(&self, seconds: f64) -> Result<StreamPosition> {
        self.request(|reply| Command::Seek { seconds, reply }).await?
    }

    pub async fn stream_position_for_time(&self, seconds: f64) -> Result<Option<StreamPosition>> {
        self.request(|reply| Command::PositionForTime { seconds, reply }).await
    }

    pub async fn set_volume(&self, volume: f32) -> Result<()> {
        self.send(Command::SetVolume(volume)).await
    }

    pub async fn set_play_rate(&self, rate: f32) -> Result<()> {
        self.send(Command::SetPlayRate(rate)).await
    }

    pub async fn set_url(&self, url: impl Into<String>) -> Result<()> {
        self.send(Command::SetUrl(url.into())).await
    }

    pub async fn set_output_file(&self, path: Option<PathBuf>) -> Result<()> {
        self.send(Command::SetOutputFile(path)).await
    }

    pub async fn set_strict_content_type_checking(&self, strict: bool) -> Result<()> {
        self.send(Command::SetStrictContentTypeChecking(strict)).await
    }

    pub async fn set_default_content_type(&self, content_type: impl Into<String>) -> Result<()> {
        self.send(Command::SetDefaultContentType(content_type.into())).await
    }

    pub async fn set_seek_position(&self, seconds: f64) -> Result<()> {
        self.send(Command::SetSeekPosition(seconds)).await
    }

    pub async fn set_content_length(&self, length: u64) -> Result<()> {
        self.send(Command::SetContentLength(length)).await
    }

    /// Latest telemetry snapshot
    pub async fn status(&self) -> StreamStatus {
        self.status.get().await
    }

    /// Subscribe to host events
    pub fn subscribe(&self) -> broadcast::Receiver<StreamEvent> {
        self.events.subscribe()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.events
    }
}

impl std::fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandle")
            .field("events", &self.events)
            .finish()
    }
}
