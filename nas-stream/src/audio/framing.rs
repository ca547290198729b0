//! MPEG audio / ADTS frame parser
//!
//! Splits MP3 (MPEG-1/2/2.5 Layer I-III) and AAC ADTS streams into one packet
//! per frame. Frames are located by their sync words; payloads are not
//! decoded. A leading ID3v2 tag is skipped and reported as the data offset.

use super::parser::{PacketParser, ParserEvent};
use crate::error::ParseError;
use crate::playback::format::AudioFileType;
use crate::playback::types::{FormatDescription, Packet};
use tracing::{debug, warn};

/// Bytes scanned for a sync word before the stream is declared malformed
const MAX_RESYNC_BYTES: usize = 64 * 1024;

/// ID3v2 header size
const ID3_HEADER_LEN: usize = 10;

// Bitrates in kbps, indexed by the header bitrate index
const MPEG1_LAYER1_KBPS: [u32; 15] = [0, 32, 64, 96, 128, 160, 192, 224, 256, 288, 320, 352, 384, 416, 448];
const MPEG1_LAYER2_KBPS: [u32; 15] = [0, 32, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384];
const MPEG1_LAYER3_KBPS: [u32; 15] = [0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320];
const MPEG2_LAYER1_KBPS: [u32; 15] = [0, 32, 48, 56, 64, 80, 96, 112, 128, 144, 160, 176, 192, 224, 256];
const MPEG2_LAYER23_KBPS: [u32; 15] = [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160];

const ADTS_SAMPLE_RATES: [u32; 13] = [
    96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
];

/// Decoded frame header
#[derive(Debug, Clone, Copy, PartialEq)]
struct FrameHeader {
    frame_len: usize,
    sample_rate: u32,
    channels: u16,
    samples: u32,
    bitrate: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MpegVersion {
    V1,
    V2,
    V25,
}

/// Parse a 4-byte MPEG audio header
fn mpeg_header(bytes: &[u8]) -> Option<FrameHeader> {
    if bytes.len() < 4 || bytes[0] != 0xFF || bytes[1] & 0xE0 != 0xE0 {
        return None;
    }
    let version = match (bytes[1] >> 3) & 0x03 {
        0b00 => MpegVersion::V25,
        0b10 => MpegVersion::V2,
        0b11 => MpegVersion::V1,
        _ => return None,
    };
    let layer = match (bytes[1] >> 1) & 0x03 {
        0b01 => 3,
        0b10 => 2,
        0b11 => 1,
        _ => return None,
    };
    let bitrate_index = (bytes[2] >> 4) as usize;
    let rate_index = ((bytes[2] >> 2) & 0x03) as usize;
    // Free-format and bad indices are not supported
    if bitrate_index == 0 || bitrate_index == 15 || rate_index == 3 {
        return None;
    }
    let padding = ((bytes[2] >> 1) & 0x01) as usize;
    let channels = if bytes[3] >> 6 == 0b11 { 1 } else { 2 };

    let kbps = match (version, layer) {
        (MpegVersion::V1, 1) => MPEG1_LAYER1_KBPS[bitrate_index],
        (MpegVersion::V1, 2) => MPEG1_LAYER2_KBPS[bitrate_index],
        (MpegVersion::V1, _) => MPEG1_LAYER3_KBPS[bitrate_index],
        (_, 1) => MPEG2_LAYER1_KBPS[bitrate_index],
        _ => MPEG2_LAYER23_KBPS[bitrate_index],
    };
    let sample_rate = match version {
        MpegVersion::V1 => [44100, 48000, 32000][rate_index],
        MpegVersion::V2 => [22050, 24000, 16000][rate_index],
        MpegVersion::V25 => [11025, 12000, 8000][rate_index],
    };
    let bitrate = kbps * 1000;

    let (samples, frame_len) = match layer {
        1 => (384, (12 * bitrate as usize / sample_rate as usize + padding) * 4),
        2 => (1152, 144 * bitrate as usize / sample_rate as usize + padding),
        _ if version == MpegVersion::V1 => (1152, 144 * bitrate as usize / sample_rate as usize + padding),
        _ => (576, 72 * bitrate as usize / sample_rate as usize + padding),
    };

    Some(FrameHeader {
        frame_len,
        sample_rate,
        channels,
        samples,
        bitrate: Some(bitrate),
    })
}

/// Parse a 7-byte ADTS header
fn adts_header(bytes: &[u8]) -> Option<FrameHeader> {
    if bytes.len() < 7 || bytes[0] != 0xFF || bytes[1] & 0xF6 != 0xF0 {
        return None;
    }
    let rate_index = ((bytes[2] >> 2) & 0x0F) as usize;
    let sample_rate = *ADTS_SAMPLE_RATES.get(rate_index)?;
    let channel_config = (((bytes[2] & 0x01) << 2) | (bytes[3] >> 6)) as u16;
    let frame_len =
        (((bytes[3] & 0x03) as usize) << 11) | ((bytes[4] as usize) << 3) | ((bytes[5] as usize) >> 5);
    let header_len = if bytes[1] & 0x01 == 0 { 9 } else { 7 };
    if frame_len < header_len {
        return None;
    }
    let blocks = (bytes[6] & 0x03) as u32 + 1;

    Some(FrameHeader {
        frame_len,
        sample_rate,
        channels: channel_config.max(1),
        samples: 1024 * blocks,
        bitrate: None,
    })
}

/// Total ID3v2 tag length (header, body, optional footer), if `bytes` starts with one
fn id3_tag_len(bytes: &[u8]) -> Option<usize> {
    if bytes.len() < ID3_HEADER_LEN || !bytes.starts_with(b"ID3") {
        return None;
    }
    let size = bytes[6..10]
        .iter()
        .fold(0usize, |acc, b| (acc << 7) | (*b & 0x7F) as usize);
    let footer = if bytes[5] & 0x10 != 0 { ID3_HEADER_LEN } else { 0 };
    Some(ID3_HEADER_LEN + size + footer)
}

/// Frame-level parser for MP3 and ADTS AAC
#[derive(Debug, Default)]
pub struct FrameParser {
    file_type: Option<AudioFileType>,
    /// Unconsumed bytes carried into the next parse call
    pending: Vec<u8>,
    /// Bytes of an ID3 tag still to skip
    skip_remaining: usize,
    /// Stream bytes consumed so far
    consumed: u64,
    /// Bytes skipped while hunting for sync
    junk: usize,
    format: Option<FormatDescription>,
    first_frame_seen: bool,
}

impl FrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    fn header_at(&self, bytes: &[u8]) -> Option<FrameHeader> {
        match self.file_type {
            Some(AudioFileType::AacAdts) => adts_header(bytes),
            _ => mpeg_header(bytes),
        }
    }

    fn header_len(&self) -> usize {
        match self.file_type {
            Some(AudioFileType::AacAdts) => 7,
            _ => 4,
        }
    }

    fn consume(&mut self, count: usize) {
        self.pending.drain(..count);
        self.consumed += count as u64;
    }
}

impl PacketParser for FrameParser {
    fn open(&mut self, file_type: AudioFileType) -> Result<(), ParseError> {
        match file_type {
            AudioFileType::Mp3 | AudioFileType::AacAdts => {
                *self = Self::default();
                self.file_type = Some(file_type);
                debug!("Frame parser open for {}", file_type);
                Ok(())
            }
            other => Err(ParseError::UnsupportedFormat(format!(
                "frame parser handles MP3 and ADTS only, got {}",
                other
            ))),
        }
    }

    fn parse(&mut self, bytes: &[u8]) -> Result<Vec<ParserEvent>, ParseError> {
        let file_type = self.file_type.ok_or(ParseError::NotOpen)?;
        self.pending.extend_from_slice(bytes);
        let mut events = Vec::new();

        loop {
            if self.skip_remaining > 0 {
                let skip = self.skip_remaining.min(self.pending.len());
                self.consume(skip);
                self.skip_remaining -= skip;
                if self.skip_remaining > 0 {
                    break;
                }
            }

            if !self.first_frame_seen && self.pending.starts_with(b"ID3") {
                match id3_tag_len(&self.pending) {
                    Some(len) => {
                        debug!("Skipping {} byte ID3v2 tag", len);
                        self.skip_remaining = len;
                        continue;
                    }
                    None => break,
                }
            }

            if self.pending.len() < self.header_len() {
                break;
            }

            let Some(header) = self.header_at(&self.pending) else {
                // Jump to the next candidate sync byte
                let skip = self.pending[1..]
                    .iter()
                    .position(|b| *b == 0xFF)
                    .map_or(self.pending.len(), |i| i + 1);
                self.consume(skip);
                self.junk += skip;
                if self.junk > MAX_RESYNC_BYTES {
                    return Err(ParseError::Malformed(format!(
                        "no {} frame sync within {} bytes",
                        file_type, MAX_RESYNC_BYTES
                    )));
                }
                continue;
            };

            if self.pending.len() < header.frame_len {
                break;
            }
            if self.junk > 0 {
                warn!("Resynchronized after {} junk bytes", self.junk);
                self.junk = 0;
            }

            if !self.first_frame_seen {
                self.first_frame_seen = true;
                let format = FormatDescription {
                    file_type,
                    sample_rate: header.sample_rate,
                    channels: header.channels,
                    frames_per_packet: header.samples,
                    nominal_bitrate: header.bitrate,
                };
                if self.format.as_ref() != Some(&format) {
                    events.push(ParserEvent::DataOffset(self.consumed));
                    events.push(ParserEvent::Format(format.clone()));
                    self.format = Some(format);
                }
            }

            let data = self.pending[..header.frame_len].to_vec();
            self.consume(header.frame_len);
            let duration = header.samples as f64 / header.sample_rate as f64;
            events.push(ParserEvent::Packet(Packet::new(data, header.samples, duration)));
        }

        Ok(events)
    }

    fn reset(&mut self) {
        self.pending.clear();
        self.skip_remaining = 0;
        self.junk = 0;
    }

    fn close(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// MPEG-1 Layer III, 128 kbps, 44.1 kHz, stereo, no padding: 417 bytes
    fn mp3_frame() -> Vec<u8> {
        let mut frame = vec![0u8; 417];
        frame[..4].copy_from_slice(&[0xFF, 0xFB, 0x90, 0x44]);
        frame
    }

    /// ADTS AAC-LC, 44.1 kHz, stereo, 64-byte frame without CRC
    fn adts_frame() -> Vec<u8> {
        let len: usize = 64;
        let mut frame = vec![0u8; len];
        frame[0] = 0xFF;
        frame[1] = 0xF1;
        frame[2] = (1 << 6) | (4 << 2); // LC, 44.1 kHz, channel bit 2 = 0
        frame[3] = (2 << 6) | ((len >> 11) as u8 & 0x03);
        frame[4] = ((len >> 3) & 0xFF) as u8;
        frame[5] = (((len & 0x07) << 5) as u8) | 0x1F;
        frame[6] = 0xFC;
        frame
    }

    fn packets(events: &[ParserEvent]) -> Vec<&Packet> {
        events
            .iter()
            .filter_map(|e| match e {
                ParserEvent::Packet(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_mp3_header() {
        let header = mpeg_header(&mp3_frame()).unwrap();
        assert_eq!(header.frame_len, 417);
        assert_eq!(header.sample_rate, 44100);
        assert_eq!(header.samples, 1152);
        assert_eq!(header.bitrate, Some(128_000));
    }

    #[test]
    fn test_adts_header() {
        let header = adts_header(&adts_frame()).unwrap();
        assert_eq!(header.frame_len, 64);
        assert_eq!(header.sample_rate, 44100);
        assert_eq!(header.channels, 2);
        assert_eq!(header.samples, 1024);
    }

    #[test]
    fn test_frames_split_across_chunks() {
        let mut parser = FrameParser::new();
        parser.open(AudioFileType::Mp3).unwrap();

        let mut stream = Vec::new();
        for _ in 0..3 {
            stream.extend_from_slice(&mp3_frame());
        }

        let first = parser.parse(&stream[..500]).unwrap();
        assert!(matches!(first[0], ParserEvent::DataOffset(0)));
        assert!(matches!(first[1], ParserEvent::Format(_)));
        assert_eq!(packets(&first).len(), 1);

        let rest = parser.parse(&stream[500..]).unwrap();
        assert_eq!(packets(&rest).len(), 2);
        assert!(packets(&rest).iter().all(|p| p.byte_size() == 417));
    }

    #[test]
    fn test_id3_tag_skipped_and_reported() {
        let mut parser = FrameParser::new();
        parser.open(AudioFileType::Mp3).unwrap();

        // 20-byte tag body
        let mut stream = b"ID3\x03\x00\x00\x00\x00\x00\x14".to_vec();
        stream.extend_from_slice(&[0u8; 20]);
        stream.extend_from_slice(&mp3_frame());

        let events = parser.parse(&stream).unwrap();
        assert_eq!(events[0], ParserEvent::DataOffset(30));
        assert_eq!(packets(&events).len(), 1);
    }

    #[test]
    fn test_adts_stream() {
        let mut parser = FrameParser::new();
        parser.open(AudioFileType::AacAdts).unwrap();
        let mut stream = adts_frame();
        stream.extend_from_slice(&adts_frame());

        let events = parser.parse(&stream).unwrap();
        let found = packets(&events);
        assert_eq!(found.len(), 2);
        assert!((found[0].duration_seconds() - 1024.0 / 44100.0).abs() < 1e-9);
    }

    #[test]
    fn test_resync_after_reset() {
        let mut parser = FrameParser::new();
        parser.open(AudioFileType::Mp3).unwrap();
        parser.parse(&mp3_frame()).unwrap();
        parser.reset();

        // Mid-frame garbage, then a frame
        let mut stream = vec![0x12u8; 100];
        stream.extend_from_slice(&mp3_frame());
        let events = parser.parse(&stream).unwrap();
        // Format already reported
        assert!(events.iter().all(|e| matches!(e, ParserEvent::Packet(_))));
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_garbage_is_malformed() {
        let mut parser = FrameParser::new();
        parser.open(AudioFileType::Mp3).unwrap();
        let result = parser.parse(&vec![0u8; MAX_RESYNC_BYTES + 16]);
        assert!(matches!(result, Err(ParseError::Malformed(_))));
    }

    #[test]
    fn test_unsupported_and_unopened() {
        let mut parser = FrameParser::new();
        assert_eq!(parser.parse(b"abc"), Err(ParseError::NotOpen));
        assert!(matches!(
            parser.open(AudioFileType::Wave),
            Err(ParseError::UnsupportedFormat(_))
        ));
    }
}
