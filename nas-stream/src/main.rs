//! Network Audio Streamer (nas-stream) - Main entry point
//!
//! Streams a URL (or the first entry of an M3U/PLS playlist) through the
//! stream engine using the HTTP byte source, the MPEG/ADTS frame parser and
//! the clock-driven renderer, printing host events as they occur.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use nas_common::config::CONFIG_ENV_VAR;
use nas_common::events::{StreamEvent, StreamState};
use nas_common::playlist::{self, PlaylistFormat};
use nas_stream::audio::{ClockRenderer, FrameParser, HttpByteSource};
use nas_stream::{Collaborators, StreamEngine, TomlConfig};
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for nas-stream
#[derive(Parser, Debug)]
#[command(name = "nas-stream")]
#[command(about = "Network audio stream player")]
#[command(version)]
struct Args {
    /// Stream or playlist URL
    #[arg(env = "NAS_URL")]
    url: String,

    /// Configuration file (overrides NAS_CONFIG and default locations)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Reject streams whose declared content type is not supported
    #[arg(long)]
    strict: bool,

    /// Packets to buffer before playback starts
    #[arg(long, env = "NAS_MIN_PACKETS")]
    min_packets: Option<usize>,

    /// Append the raw stream to this file
    #[arg(long)]
    record: Option<PathBuf>,

    /// Seek to this position (seconds) once playing
    #[arg(long)]
    seek: Option<f64>,

    /// Print host events as JSON lines
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let (config, config_path) = nas_common::config::load_or_default::<TomlConfig>(
        args.config.as_deref(),
        CONFIG_ENV_VAR,
    )
    .context("Failed to load configuration")?;

    // Initialize tracing
    let default_filter = format!("nas_stream={level},nas_common={level}", level = config.logging.level);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting nas-stream v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    match &config_path {
        Some(path) => info!("Configuration loaded from {}", path.display()),
        None => info!("No configuration file found, using defaults"),
    }

    let mut settings = config.stream.clone();
    if args.strict {
        settings.strict_content_type_checking = true;
    }
    if let Some(min_packets) = args.min_packets {
        settings.min_buffered_packets = min_packets;
    }
    settings.validate().context("Invalid stream settings")?;

    let url = resolve_stream_url(&args.url).await?;
    info!("Streaming {}", url);

    let collaborators = Collaborators {
        source: Box::new(HttpByteSource::new()),
        parser: Box::new(FrameParser::new()),
        renderer: Box::new(ClockRenderer::default()),
    };
    let (handle, engine_task) =
        StreamEngine::spawn(settings, collaborators).context("Failed to start stream engine")?;
    let mut events = handle.subscribe();

    handle.set_url(url).await?;
    handle.set_output_file(args.record.or(config.output_file)).await?;
    handle.open().await.context("Failed to open stream")?;

    let mut pending_seek = args.seek;
    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("Received Ctrl+C, closing stream");
                break;
            }
            event = events.recv() => {
                let event = match event {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Event output lagged, {} events skipped", skipped);
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                print_event(&event, args.json)?;

                if let StreamEvent::StateChanged { new_state, .. } = event {
                    if new_state == StreamState::Playing {
                        if let Some(seconds) = pending_seek.take() {
                            match handle.seek_to_time(seconds).await {
                                Ok(position) => info!("Seek to {:.1}s requested byte {}", seconds, position.start),
                                Err(e) => warn!("Seek failed: {}", e),
                            }
                        }
                    }
                    if new_state.is_terminal() {
                        break;
                    }
                }
            }
        }
    }

    let status = handle.status().await;
    info!(
        "Played {:.1}s of {:.1}s, {} packets, {} bounces",
        status.time_played_seconds, status.duration_seconds, status.processed_packets, status.bounce_count
    );

    handle.close().await?;
    drop(handle);
    engine_task.await.context("Stream engine task failed")?;
    Ok(())
}

/// Follow a playlist URL to its first stream entry
async fn resolve_stream_url(url: &str) -> Result<String> {
    if playlist::detect_format(None, url) == PlaylistFormat::None {
        return Ok(url.to_string());
    }

    info!("Fetching playlist {}", url);
    let response = reqwest::get(url)
        .await
        .with_context(|| format!("Failed to fetch playlist {}", url))?
        .error_for_status()?;
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let text = response.text().await?;

    let format = match playlist::detect_format(content_type.as_deref(), url) {
        PlaylistFormat::None => playlist::sniff_format(&text),
        format => format,
    };
    let items = playlist::parse(&text, format)?;
    let Some(first) = items.into_iter().next() else {
        bail!("Playlist {} has no entries", url);
    };
    if let Some(title) = &first.title {
        info!("Playlist entry: {}", title);
    }
    Ok(first.url)
}

fn print_event(event: &StreamEvent, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(event)?);
        return Ok(());
    }
    match event {
        StreamEvent::StateChanged { old_state, new_state, .. } => {
            println!("state: {} -> {}", old_state, new_state)
        }
        StreamEvent::ErrorOccurred { error, message, .. } => {
            println!("error {}: {} ({})", error.code(), error, message)
        }
        StreamEvent::MetaDataAvailable { metadata, .. } => {
            for (key, value) in metadata {
                println!("meta: {} = {}", key, value);
            }
        }
        StreamEvent::Bounced { bounce_count, .. } => println!("bounce #{}", bounce_count),
        StreamEvent::SamplesAvailable { .. } => {}
    }
    Ok(())
}
