//! Configuration for the streaming engine
//!
//! Two layers:
//! 1. **StreamSettings**: tuning parameters of the stream controller
//!    (buffering threshold, bounce limits, watchdog timing, content-type policy)
//! 2. **TomlConfig**: bootstrap file for the binary (`[stream]`, `[logging]`)
//!
//! Every field has a built-in default so an absent file or table is valid.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Stream controller tuning parameters
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct StreamSettings {
    /// Packets that must be pending before the renderer is (re)started
    pub min_buffered_packets: usize,

    /// Bounces tolerated inside one window; one more fails with BOUNCING
    pub max_bounce_count: usize,

    /// Bounces further apart than this do not accumulate
    pub bounce_reset_interval_ms: u64,

    /// Time in BUFFERING after which the watchdog counts a stall
    pub stall_timeout_ms: u64,

    /// Watchdog tick period
    pub watchdog_interval_ms: u64,

    /// Capacity of the bitrate sample ring
    pub bitrate_buffer_size: usize,

    /// Samples required before a bitrate estimate is reported
    pub bitrate_min_samples: usize,

    /// Reject streams whose declared content type is absent or unknown
    pub strict_content_type_checking: bool,

    /// Content type assumed when the declared one cannot be used
    pub default_content_type: String,

    /// Host event bus capacity
    pub event_bus_capacity: usize,

    /// Initial output volume (0.0-1.0)
    pub volume: f32,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            min_buffered_packets: 3,
            max_bounce_count: 4,
            bounce_reset_interval_ms: 10_000,
            stall_timeout_ms: 5_000,
            watchdog_interval_ms: 1_000,
            bitrate_buffer_size: 50,
            bitrate_min_samples: 1,
            strict_content_type_checking: false,
            default_content_type: "audio/mpeg".to_string(),
            event_bus_capacity: 256,
            volume: 1.0,
        }
    }
}

impl StreamSettings {
    /// Validate invariants the controller relies on
    pub fn validate(&self) -> Result<()> {
        if self.min_buffered_packets == 0 {
            return Err(Error::Config("min_buffered_packets must be greater than zero".to_string()));
        }
        if self.max_bounce_count == 0 {
            return Err(Error::Config("max_bounce_count must be greater than zero".to_string()));
        }
        if self.stall_timeout_ms == 0 || self.watchdog_interval_ms == 0 {
            return Err(Error::Config("watchdog timing must be greater than zero".to_string()));
        }
        if self.bounce_reset_interval_ms < self.stall_timeout_ms {
            return Err(Error::Config(format!(
                "bounce_reset_interval_ms must be at least stall_timeout_ms ({})",
                self.stall_timeout_ms
            )));
        }
        if self.bitrate_buffer_size == 0 {
            return Err(Error::Config("bitrate_buffer_size must be greater than zero".to_string()));
        }
        if self.bitrate_min_samples == 0 || self.bitrate_min_samples > self.bitrate_buffer_size {
            return Err(Error::Config(format!(
                "bitrate_min_samples must be within 1..={}",
                self.bitrate_buffer_size
            )));
        }
        if self.default_content_type.trim().is_empty() {
            return Err(Error::Config("default_content_type must not be empty".to_string()));
        }
        if !(0.0..=1.0).contains(&self.volume) {
            return Err(Error::Config("volume must be within 0.0-1.0".to_string()));
        }
        Ok(())
    }

    pub fn stall_timeout(&self) -> Duration {
        Duration::from_millis(self.stall_timeout_ms)
    }

    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_millis(self.watchdog_interval_ms)
    }

    pub fn bounce_reset_interval(&self) -> Duration {
        Duration::from_millis(self.bounce_reset_interval_ms)
    }
}

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    /// Stream controller tuning
    #[serde(default)]
    pub stream: StreamSettings,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Raw stream recording target (optional)
    #[serde(default)]
    pub output_file: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TomlConfig {
    /// Parse and validate TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig = nas_common::config::parse_toml(content)?;
        config.stream.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = StreamSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.min_buffered_packets, 3);
        assert_eq!(settings.bitrate_buffer_size, 50);
        assert_eq!(settings.default_content_type, "audio/mpeg");
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = TomlConfig::from_toml_str(
            r#"
            [stream]
            min_buffered_packets = 8
            strict_content_type_checking = true

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(config.stream.min_buffered_packets, 8);
        assert!(config.stream.strict_content_type_checking);
        assert_eq!(config.stream.max_bounce_count, 4);
        assert_eq!(config.logging.level, "debug");
        assert!(config.output_file.is_none());
    }

    #[test]
    fn test_empty_toml_is_default() {
        let config = TomlConfig::from_toml_str("").unwrap();
        assert_eq!(config.stream, StreamSettings::default());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let result = TomlConfig::from_toml_str("[stream]\nmin_buffered_packets = 0\n");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_reset_window_shorter_than_stall_timeout_rejected() {
        let settings = StreamSettings {
            stall_timeout_ms: 5_000,
            bounce_reset_interval_ms: 1_000,
            ..StreamSettings::default()
        };
        assert!(matches!(settings.validate(), Err(Error::Config(_))));

        let zero_window = StreamSettings {
            bounce_reset_interval_ms: 0,
            ..StreamSettings::default()
        };
        assert!(zero_window.validate().is_err());

        let equal = StreamSettings {
            stall_timeout_ms: 5_000,
            bounce_reset_interval_ms: 5_000,
            ..StreamSettings::default()
        };
        assert!(equal.validate().is_ok());
    }

    #[test]
    fn test_min_samples_above_capacity_rejected() {
        let settings = StreamSettings {
            bitrate_buffer_size: 4,
            bitrate_min_samples: 5,
            ..StreamSettings::default()
        };
        assert!(settings.validate().is_err());
    }
}
