//! Format sniffer
//!
//! Resolves the stream's container format from, in order: the content type
//! declared by the byte source, the leading bytes of the stream, and the
//! configured default content type. Strict checking refuses the fallbacks.

use nas_common::events::StreamErrorKind;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Container/codec identifier handed to the packet parser
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AudioFileType {
    Mp3,
    AacAdts,
    Mpeg4,
    M4a,
    Wave,
    Aiff,
    Aifc,
    Caf,
}

impl AudioFileType {
    /// Map a MIME content type (parameters ignored) to a file type
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match mime.as_str() {
            "audio/mpeg" | "audio/mp3" | "audio/mpeg3" | "audio/x-mpeg" | "audio/x-mp3" => {
                Some(AudioFileType::Mp3)
            }
            "audio/aac" | "audio/aacp" | "audio/x-aac" => Some(AudioFileType::AacAdts),
            "audio/mp4" | "video/mp4" => Some(AudioFileType::Mpeg4),
            "audio/x-m4a" | "audio/m4a" => Some(AudioFileType::M4a),
            "audio/wav" | "audio/x-wav" | "audio/wave" => Some(AudioFileType::Wave),
            "audio/aiff" | "audio/x-aiff" => Some(AudioFileType::Aiff),
            "audio/x-aifc" => Some(AudioFileType::Aifc),
            "audio/x-caf" => Some(AudioFileType::Caf),
            _ => None,
        }
    }

    /// Canonical content type for this file type
    pub fn content_type(self) -> &'static str {
        match self {
            AudioFileType::Mp3 => "audio/mpeg",
            AudioFileType::AacAdts => "audio/aac",
            AudioFileType::Mpeg4 => "audio/mp4",
            AudioFileType::M4a => "audio/x-m4a",
            AudioFileType::Wave => "audio/x-wav",
            AudioFileType::Aiff => "audio/x-aiff",
            AudioFileType::Aifc => "audio/x-aifc",
            AudioFileType::Caf => "audio/x-caf",
        }
    }

    /// Recognize a file type from the first bytes of a stream
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.len() >= 12 {
            let tag = &bytes[8..12];
            if bytes.starts_with(b"RIFF") && tag == b"WAVE" {
                return Some(AudioFileType::Wave);
            }
            if bytes.starts_with(b"FORM") {
                if tag == b"AIFF" {
                    return Some(AudioFileType::Aiff);
                }
                if tag == b"AIFC" {
                    return Some(AudioFileType::Aifc);
                }
            }
            if &bytes[4..8] == b"ftyp" {
                return if tag == b"M4A " {
                    Some(AudioFileType::M4a)
                } else {
                    Some(AudioFileType::Mpeg4)
                };
            }
        }
        if bytes.starts_with(b"caff") {
            return Some(AudioFileType::Caf);
        }
        if bytes.starts_with(b"ID3") {
            return Some(AudioFileType::Mp3);
        }
        if bytes.len() >= 2 && bytes[0] == 0xFF {
            // ADTS: 12-bit sync, layer bits 00
            if bytes[1] & 0xF6 == 0xF0 {
                return Some(AudioFileType::AacAdts);
            }
            // MPEG audio: 11-bit sync, layer bits non-zero
            if bytes[1] & 0xE0 == 0xE0 && bytes[1] & 0x06 != 0 {
                return Some(AudioFileType::Mp3);
            }
        }
        None
    }
}

impl std::fmt::Display for AudioFileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AudioFileType::Mp3 => "MP3",
            AudioFileType::AacAdts => "AAC (ADTS)",
            AudioFileType::Mpeg4 => "MPEG-4",
            AudioFileType::M4a => "M4A",
            AudioFileType::Wave => "WAVE",
            AudioFileType::Aiff => "AIFF",
            AudioFileType::Aifc => "AIFC",
            AudioFileType::Caf => "CAF",
        };
        write!(f, "{}", name)
    }
}

/// Where a resolved format came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatSource {
    Declared,
    Sniffed,
    Default,
}

/// Outcome of format resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFormat {
    pub file_type: AudioFileType,
    pub source: FormatSource,
    /// Content type reported to the host
    pub content_type: String,
}

/// Content-type policy for one open cycle
#[derive(Debug, Clone)]
pub struct FormatSniffer {
    strict: bool,
    default_content_type: String,
}

impl FormatSniffer {
    pub fn new(strict: bool, default_content_type: impl Into<String>) -> Self {
        Self {
            strict,
            default_content_type: default_content_type.into(),
        }
    }

    /// Check the declared type as soon as the source is ready
    ///
    /// Returns the declared format when recognized, `Ok(None)` when resolution
    /// must wait for the first bytes, and `UnsupportedFormat` under strict checking.
    pub fn check_declared(&self, declared: Option<&str>) -> Result<Option<ResolvedFormat>, StreamErrorKind> {
        match declared.and_then(AudioFileType::from_content_type) {
            Some(file_type) => Ok(Some(ResolvedFormat {
                file_type,
                source: FormatSource::Declared,
                content_type: declared.unwrap_or_default().to_string(),
            })),
            None if self.strict => {
                warn!(
                    "Strict content type checking active, {:?} is not a supported audio content type",
                    declared
                );
                Err(StreamErrorKind::UnsupportedFormat)
            }
            None => Ok(None),
        }
    }

    /// Resolve the format: declared, then sniffed from `first_bytes`, then default
    pub fn resolve(&self, declared: Option<&str>, first_bytes: &[u8]) -> Result<ResolvedFormat, StreamErrorKind> {
        if let Some(resolved) = self.check_declared(declared)? {
            return Ok(resolved);
        }

        if let Some(file_type) = AudioFileType::sniff(first_bytes) {
            debug!("Sniffed {} from stream bytes (declared {:?})", file_type, declared);
            return Ok(ResolvedFormat {
                file_type,
                source: FormatSource::Sniffed,
                content_type: file_type.content_type().to_string(),
            });
        }

        match AudioFileType::from_content_type(&self.default_content_type) {
            Some(file_type) => {
                debug!(
                    "Falling back to default content type {} (declared {:?})",
                    self.default_content_type, declared
                );
                Ok(ResolvedFormat {
                    file_type,
                    source: FormatSource::Default,
                    content_type: self.default_content_type.clone(),
                })
            }
            None => Err(StreamErrorKind::UnsupportedFormat),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_mapping_ignores_parameters() {
        assert_eq!(
            AudioFileType::from_content_type("Audio/MPEG; charset=binary"),
            Some(AudioFileType::Mp3)
        );
        assert_eq!(AudioFileType::from_content_type("audio/aacp"), Some(AudioFileType::AacAdts));
        assert_eq!(AudioFileType::from_content_type("text/html"), None);
    }

    #[test]
    fn test_sniff_signatures() {
        assert_eq!(AudioFileType::sniff(b"ID3\x04\x00"), Some(AudioFileType::Mp3));
        assert_eq!(AudioFileType::sniff(&[0xFF, 0xFB, 0x90, 0x64]), Some(AudioFileType::Mp3));
        assert_eq!(AudioFileType::sniff(&[0xFF, 0xF1, 0x50, 0x80]), Some(AudioFileType::AacAdts));
        assert_eq!(AudioFileType::sniff(b"RIFF\x24\x08\x00\x00WAVEfmt "), Some(AudioFileType::Wave));
        assert_eq!(AudioFileType::sniff(b"FORM\x00\x00\x00\x00AIFC"), Some(AudioFileType::Aifc));
        assert_eq!(AudioFileType::sniff(b"\x00\x00\x00\x20ftypM4A "), Some(AudioFileType::M4a));
        assert_eq!(AudioFileType::sniff(b"caff\x00\x01"), Some(AudioFileType::Caf));
        assert_eq!(AudioFileType::sniff(b"<html><body>"), None);
        assert_eq!(AudioFileType::sniff(&[]), None);
    }

    #[test]
    fn test_declared_type_wins() {
        let sniffer = FormatSniffer::new(false, "audio/mpeg");
        let resolved = sniffer.resolve(Some("audio/aac"), b"ID3").unwrap();
        assert_eq!(resolved.file_type, AudioFileType::AacAdts);
        assert_eq!(resolved.source, FormatSource::Declared);
    }

    #[test]
    fn test_strict_rejects_unknown_declared_type() {
        let sniffer = FormatSniffer::new(true, "audio/mpeg");
        assert_eq!(
            sniffer.check_declared(Some("text/html")),
            Err(StreamErrorKind::UnsupportedFormat)
        );
        assert_eq!(sniffer.check_declared(None), Err(StreamErrorKind::UnsupportedFormat));
        assert_eq!(sniffer.resolve(None, b"ID3"), Err(StreamErrorKind::UnsupportedFormat));
    }

    #[test]
    fn test_lenient_sniffs_then_defaults() {
        let sniffer = FormatSniffer::new(false, "audio/aac");
        assert_eq!(sniffer.check_declared(Some("application/octet-stream")), Ok(None));

        let sniffed = sniffer.resolve(Some("application/octet-stream"), b"ID3\x03").unwrap();
        assert_eq!(sniffed.file_type, AudioFileType::Mp3);
        assert_eq!(sniffed.source, FormatSource::Sniffed);

        let defaulted = sniffer.resolve(None, b"garbage!").unwrap();
        assert_eq!(defaulted.file_type, AudioFileType::AacAdts);
        assert_eq!(defaulted.source, FormatSource::Default);
        assert_eq!(defaulted.content_type, "audio/aac");
    }

    #[test]
    fn test_unusable_default_is_unsupported() {
        let sniffer = FormatSniffer::new(false, "text/plain");
        assert_eq!(sniffer.resolve(None, b"????"), Err(StreamErrorKind::UnsupportedFormat));
    }
}
