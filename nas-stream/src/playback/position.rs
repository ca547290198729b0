//! Time to byte-offset translation

use serde::{Deserialize, Serialize};

/// Byte range requested from the byte source
///
/// `end` is the inclusive last byte, as in an HTTP `Range` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamPosition {
    pub start: u64,
    pub end: u64,
}

impl StreamPosition {
    /// `Range` header value for this position
    pub fn range_header(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

/// Byte position for a time target
///
/// `offset = data_offset + seconds * bitrate / 8`, clamped to the last byte of
/// the content. `None` when the content length is unknown or the bitrate is
/// not positive.
pub fn position_for_time(
    seconds: f64,
    bitrate: f64,
    data_offset: u64,
    content_length: u64,
) -> Option<StreamPosition> {
    if content_length == 0 || !(bitrate.is_finite() && bitrate > 0.0) {
        return None;
    }
    let seconds = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
    let last = content_length - 1;
    let audio_bytes = (seconds * bitrate / 8.0).round() as u64;
    let start = data_offset.saturating_add(audio_bytes).min(last);
    Some(StreamPosition { start, end: last })
}
