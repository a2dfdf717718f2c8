//! Configuration loading.
//!
//! `stream_config.json` is written by the embedding UI's settings panel.
//! Every field is optional; a missing or malformed file falls back to the
//! defaults below.

pub mod paths;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Default streaming endpoint.
pub const DEFAULT_ENDPOINT: &str = "ws://localhost:8000/ws/audio";
/// One outbound chunk per window of this many milliseconds.
pub const DEFAULT_CHUNK_INTERVAL_MS: u64 = 2000;
/// Fixed delay between automatic reconnection attempts.
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 3000;
/// Reconnection attempts before giving up on an outage.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Top-level stream_config.json shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StreamConfig {
    pub server_url: String,
    pub capture: CaptureConstraints,
    pub chunk_interval_ms: u64,
    pub reconnect_delay_ms: u64,
    pub max_reconnect_attempts: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_ENDPOINT.to_string(),
            capture: CaptureConstraints::default(),
            chunk_interval_ms: DEFAULT_CHUNK_INTERVAL_MS,
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
        }
    }
}

/// Requested capture-device constraints.
///
/// The processing toggles are requests in the capture API of the embedding
/// platform; backends without the matching DSP record them with the
/// session instead of applying them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CaptureConstraints {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
    /// Input device name; `None` selects the system default.
    pub device: Option<String>,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
            device: None,
        }
    }
}

/// Read stream_config.json from the data directory.
pub fn load() -> StreamConfig {
    read_json_file(&config_path()).unwrap_or_default()
}

/// Path to stream_config.json.
pub fn config_path() -> PathBuf {
    paths::data_dir().join("stream_config.json")
}

/// Read a JSON file and deserialize it, warning on anything but a clean
/// not-found.
fn read_json_file<T: serde::de::DeserializeOwned>(path: &Path) -> Option<T> {
    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(val) => Some(val),
            Err(e) => {
                warn!("Failed to parse {}: {}", path.display(), e);
                None
            }
        },
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to read {}: {}", path.display(), e);
            }
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let cfg = StreamConfig::default();
        assert_eq!(cfg.server_url, "ws://localhost:8000/ws/audio");
        assert_eq!(cfg.chunk_interval_ms, 2000);
        assert_eq!(cfg.reconnect_delay_ms, 3000);
        assert_eq!(cfg.max_reconnect_attempts, 5);
        assert!(cfg.capture.echo_cancellation);
        assert!(cfg.capture.noise_suppression);
        assert!(cfg.capture.auto_gain_control);
        assert!(cfg.capture.device.is_none());
    }

    #[test]
    fn partial_config_keeps_defaults_for_missing_fields() {
        let cfg: StreamConfig =
            serde_json::from_str(r#"{"serverUrl": "wss://example.net/audio"}"#).unwrap();
        assert_eq!(cfg.server_url, "wss://example.net/audio");
        assert_eq!(cfg.chunk_interval_ms, 2000);
        assert_eq!(cfg.max_reconnect_attempts, 5);
    }

    #[test]
    fn camel_case_capture_fields_parse() {
        let cfg: StreamConfig = serde_json::from_str(
            r#"{"capture": {"echoCancellation": false, "device": "USB Mic"}}"#,
        )
        .unwrap();
        assert!(!cfg.capture.echo_cancellation);
        assert!(cfg.capture.noise_suppression);
        assert_eq!(cfg.capture.device.as_deref(), Some("USB Mic"));
    }
}
