//! Platform data directory for configuration files.

use std::path::PathBuf;

/// Directory holding stream_config.json.
///
/// Resolves under the platform config base: `$XDG_CONFIG_HOME` (default
/// `~/.config`) on Linux, `~/Library/Application Support` on macOS,
/// `%APPDATA%` on Windows.
pub fn data_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("audio-streamer")
}
