//! Playback types shared across modules

use super::format::AudioFileType;

/// Framing metadata of one parsed packet
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PacketDescription {
    /// Payload size in bytes
    pub data_byte_size: usize,

    /// Audio frames carried by this packet (0 when unknown)
    pub frames: u32,

    /// Playback duration in seconds (0.0 when unknown)
    pub duration_seconds: f64,
}

/// One unit of encoded audio produced by the packet parser
///
/// The payload is owned: the pending queue owns the packet until it is
/// dispatched, after which the processed list owns it until the renderer
/// reports it finished.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    /// Sequence number assigned on enqueue (0 until enqueued)
    pub sequence: u64,

    /// Framing metadata
    pub description: PacketDescription,

    /// Encoded payload
    pub data: Vec<u8>,
}

impl Packet {
    /// Create a packet from parser output
    pub fn new(data: Vec<u8>, frames: u32, duration_seconds: f64) -> Self {
        Self {
            sequence: 0,
            description: PacketDescription {
                data_byte_size: data.len(),
                frames,
                duration_seconds,
            },
            data,
        }
    }

    /// Payload size in bytes
    pub fn byte_size(&self) -> usize {
        self.description.data_byte_size
    }

    /// Packet duration in seconds
    pub fn duration_seconds(&self) -> f64 {
        self.description.duration_seconds
    }
}

/// Stream format discovered by the parser
#[derive(Debug, Clone, PartialEq)]
pub struct FormatDescription {
    /// Container/codec identifier
    pub file_type: AudioFileType,

    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Channel count
    pub channels: u16,

    /// Audio frames per packet (0 when variable)
    pub frames_per_packet: u32,

    /// Nominal bitrate in bits per second, when the container declares it
    pub nominal_bitrate: Option<u32>,
}

impl FormatDescription {
    /// Duration of one packet in seconds, if the format has fixed-size packets
    pub fn packet_duration(&self) -> Option<f64> {
        if self.frames_per_packet > 0 && self.sample_rate > 0 {
            Some(self.frames_per_packet as f64 / self.sample_rate as f64)
        } else {
            None
        }
    }
}

impl std::fmt::Display for FormatDescription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}, {} Hz, {} ch, {} frames/packet",
            self.file_type, self.sample_rate, self.channels, self.frames_per_packet
        )?;
        if let Some(bitrate) = self.nominal_bitrate {
            write!(f, ", {} kbps", bitrate / 1000)?;
        }
        Ok(())
    }
}
