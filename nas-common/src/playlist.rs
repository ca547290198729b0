//! Playlist text parsing (M3U and PLS)
//!
//! Turns already-retrieved playlist text into an ordered list of candidate
//! stream URLs. Retrieval is the caller's job.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Playlist format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaylistFormat {
    /// Not a playlist
    None,
    /// M3U (one URL per line, `#EXTINF` titles)
    M3u,
    /// PLS (`[playlist]` INI style)
    Pls,
}

/// One playlist entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistItem {
    /// Stream URL
    pub url: String,
    /// Display title, if the playlist carried one
    pub title: Option<String>,
}

/// Detect the playlist format from the declared content type or the URL path
///
/// Content type wins when it names a playlist type.
pub fn detect_format(content_type: Option<&str>, url: &str) -> PlaylistFormat {
    if let Some(content_type) = content_type {
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match mime.as_str() {
            "audio/x-mpegurl" | "audio/mpegurl" | "application/x-mpegurl" => return PlaylistFormat::M3u,
            "audio/x-scpls" | "application/pls+xml" | "application/pls" => return PlaylistFormat::Pls,
            _ => {}
        }
    }

    let path = url.split(['?', '#']).next().unwrap_or_default().to_ascii_lowercase();
    if path.ends_with(".m3u") {
        PlaylistFormat::M3u
    } else if path.ends_with(".pls") {
        PlaylistFormat::Pls
    } else {
        PlaylistFormat::None
    }
}

/// Guess the format from the playlist text itself
pub fn sniff_format(text: &str) -> PlaylistFormat {
    let first = text
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or_default();
    if first.eq_ignore_ascii_case("[playlist]") {
        PlaylistFormat::Pls
    } else if first.starts_with("#EXTM3U") || first.contains("://") {
        PlaylistFormat::M3u
    } else {
        PlaylistFormat::None
    }
}

/// Parse playlist text in the given format
///
/// Returns an error when the format is `None` or no entry was found.
pub fn parse(text: &str, format: PlaylistFormat) -> Result<Vec<PlaylistItem>> {
    let items = match format {
        PlaylistFormat::M3u => parse_m3u(text),
        PlaylistFormat::Pls => parse_pls(text),
        PlaylistFormat::None => {
            return Err(Error::Playlist("unknown playlist format".to_string()));
        }
    };

    if items.is_empty() {
        return Err(Error::Playlist("playlist contains no stream URLs".to_string()));
    }
    debug!("Parsed {} playlist entries ({:?})", items.len(), format);
    Ok(items)
}

fn is_stream_url(candidate: &str) -> bool {
    candidate.contains("://")
}

fn parse_m3u(text: &str) -> Vec<PlaylistItem> {
    let mut items = Vec::new();
    let mut pending_title: Option<String> = None;

    for line in text.lines().map(str::trim) {
        if line.is_empty() {
            continue;
        }
        if let Some(info) = line.strip_prefix("#EXTINF:") {
            // "#EXTINF:<duration>,<title>"
            pending_title = info
                .split_once(',')
                .map(|(_, title)| title.trim().to_string())
                .filter(|title| !title.is_empty());
            continue;
        }
        if line.starts_with('#') {
            continue;
        }
        if is_stream_url(line) {
            items.push(PlaylistItem {
                url: line.to_string(),
                title: pending_title.take(),
            });
        } else {
            debug!("Skipping non-URL M3U line: {}", line);
            pending_title = None;
        }
    }

    items
}

fn parse_pls(text: &str) -> Vec<PlaylistItem> {
    let mut files: BTreeMap<u32, String> = BTreeMap::new();
    let mut titles: BTreeMap<u32, String> = BTreeMap::new();

    for line in text.lines().map(str::trim) {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        let value = value.trim();

        if let Some(index) = key.strip_prefix("file").and_then(|n| n.parse::<u32>().ok()) {
            if is_stream_url(value) {
                files.insert(index, value.to_string());
            }
        } else if let Some(index) = key.strip_prefix("title").and_then(|n| n.parse::<u32>().ok()) {
            if !value.is_empty() {
                titles.insert(index, value.to_string());
            }
        }
    }

    files
        .into_iter()
        .map(|(index, url)| PlaylistItem {
            url,
            title: titles.remove(&index),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_format_from_content_type() {
        assert_eq!(
            detect_format(Some("audio/x-mpegurl; charset=utf-8"), "http://a/stream"),
            PlaylistFormat::M3u
        );
        assert_eq!(detect_format(Some("audio/x-scpls"), "http://a/stream"), PlaylistFormat::Pls);
    }

    #[test]
    fn test_detect_format_from_url() {
        assert_eq!(detect_format(None, "http://a/radio.PLS?x=1"), PlaylistFormat::Pls);
        assert_eq!(detect_format(Some("audio/mpeg"), "http://a/list.m3u"), PlaylistFormat::M3u);
        assert_eq!(detect_format(Some("audio/mpeg"), "http://a/stream.mp3"), PlaylistFormat::None);
    }

    #[test]
    fn test_sniff_format() {
        assert_eq!(sniff_format("\n[playlist]\nFile1=http://a\n"), PlaylistFormat::Pls);
        assert_eq!(sniff_format("#EXTM3U\n"), PlaylistFormat::M3u);
        assert_eq!(sniff_format("<html>"), PlaylistFormat::None);
    }

    #[test]
    fn test_parse_none_format_fails() {
        assert!(matches!(parse("http://a", PlaylistFormat::None), Err(Error::Playlist(_))));
    }
}
