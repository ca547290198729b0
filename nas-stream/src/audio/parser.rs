//! Packet parser boundary
//!
//! Demultiplexes raw stream bytes into packets. Called synchronously by the
//! controller for every chunk the byte source delivers.

use crate::error::ParseError;
use crate::playback::format::AudioFileType;
use crate::playback::types::{FormatDescription, Packet};

/// Parser output, in stream order
#[derive(Debug, Clone, PartialEq)]
pub enum ParserEvent {
    /// Stream format discovered
    Format(FormatDescription),

    /// Bytes of container header before the first packet
    DataOffset(u64),

    /// Total audio payload bytes, when the container declares it
    AudioDataByteCount(u64),

    /// One parsed packet
    Packet(Packet),
}

/// Container demultiplexer
pub trait PacketParser: Send {
    /// Prepare for a stream of the given type
    fn open(&mut self, file_type: AudioFileType) -> Result<(), ParseError>;

    /// Consume the next chunk of bytes
    fn parse(&mut self, bytes: &[u8]) -> Result<Vec<ParserEvent>, ParseError>;

    /// Drop buffered partial data; the next bytes follow a discontinuity
    fn reset(&mut self);

    fn close(&mut self);
}
