//! Service configuration
//!
//! Settings are stored as JSON. Every field has a default, so a partial file
//! (or an empty object) loads into a working configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::protocol::{DEFAULT_ASSEMBLER_CAPACITY, DEFAULT_BAUD_RATE};

/// Bits per character
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataBits {
    /// 5 data bits
    Five,
    /// 6 data bits
    Six,
    /// 7 data bits
    Seven,
    /// 8 data bits
    Eight,
}

/// Parity checking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    /// No parity bit
    None,
    /// Odd parity
    Odd,
    /// Even parity
    Even,
}

/// Stop bits per character
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopBits {
    /// One stop bit
    One,
    /// Two stop bits
    Two,
}

/// Physical port parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialSettings {
    /// Port name (e.g., "/dev/ttyS1" or "COM3")
    pub port_name: String,
    /// Line speed
    pub baud_rate: u32,
    /// Bits per character
    pub data_bits: DataBits,
    /// Parity mode
    pub parity: Parity,
    /// Stop bits
    pub stop_bits: StopBits,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
        }
    }
}

/// SDLC service and executor settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SdlcConfig {
    /// Physical port
    pub serial: SerialSettings,
    /// When false the service refuses to start
    pub enabled: bool,
    /// Reconnect on every Nth attempt
    pub retry_every: u32,
    /// Read timeout before a read yields nothing
    pub read_timeout_ms: u64,
    /// Wait between reconnect checks while disconnected
    pub reconnect_interval_ms: u64,
    /// Messages the writer may hold before dropping new ones
    pub write_queue_capacity: usize,
    /// Bytes the frame assembler may hold
    pub assembler_capacity: usize,
    /// Static status request period
    pub static_request_every_ms: u64,
    /// Executor tick period
    pub executor_cycle_ms: u64,
}

impl Default for SdlcConfig {
    fn default() -> Self {
        Self {
            serial: SerialSettings::default(),
            enabled: true,
            retry_every: 3,
            read_timeout_ms: 1000,
            reconnect_interval_ms: 1000,
            write_queue_capacity: 5,
            assembler_capacity: DEFAULT_ASSEMBLER_CAPACITY,
            static_request_every_ms: 10_000,
            executor_cycle_ms: 100,
        }
    }
}

impl SdlcConfig {
    /// Load settings from a JSON file
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Save settings as pretty-printed JSON
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)
            .map_err(std::io::Error::other)?;
        std::fs::write(path, content)
    }

    /// `read_timeout_ms` as a duration
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// `reconnect_interval_ms` as a duration
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    /// `static_request_every_ms` as a duration
    pub fn static_request_every(&self) -> Duration {
        Duration::from_millis(self.static_request_every_ms)
    }

    /// `executor_cycle_ms` as a duration
    pub fn executor_cycle(&self) -> Duration {
        Duration::from_millis(self.executor_cycle_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = SdlcConfig::default();
        assert!(config.enabled);
        assert_eq!(config.retry_every, 3);
        assert_eq!(config.write_queue_capacity, 5);
        assert_eq!(config.assembler_capacity, 2048);
        assert_eq!(config.static_request_every(), Duration::from_secs(10));
        assert_eq!(config.serial.baud_rate, 115200);
        assert_eq!(config.serial.data_bits, DataBits::Eight);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{ "serial": { "port_name": "/dev/ttyS1", "parity": "even" }, "retry_every": 5 }"#;
        let config: SdlcConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.serial.port_name, "/dev/ttyS1");
        assert_eq!(config.serial.parity, Parity::Even);
        assert_eq!(config.serial.stop_bits, StopBits::One);
        assert_eq!(config.retry_every, 5);
        assert_eq!(config.read_timeout_ms, 1000);
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("sdlc.json");

        let mut config = SdlcConfig::default();
        config.serial.port_name = "COM3".to_string();
        config.serial.stop_bits = StopBits::Two;
        config.enabled = false;
        config.save(&path).unwrap();

        assert_eq!(SdlcConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_invalid_json_is_invalid_data() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = SdlcConfig::load(&path).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }
}
