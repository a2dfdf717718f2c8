//! IPC protocol types for communication with the embedding UI process.
//!
//! Events use `{"event": "<name>", "data": {...}}` format (core -> UI).
//! Commands use `{"command": "<name>", ...}` format (UI -> core).

pub mod bridge;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Events: core -> UI (stdout)
// ---------------------------------------------------------------------------

/// All events emitted to the UI via stdout as JSON lines.
///
/// Serialized as `{"event": "<variant>", "data": {...}}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data")]
#[serde(rename_all = "snake_case")]
pub enum StreamEvent {
    Starting {},
    Ready {},
    Connected {},
    Disconnected {},
    Reconnecting { attempt: u32 },
    ConnectionError { message: String },
    RecordingStart {},
    RecordingStop {},
    Level { value: u8 },
    /// A `caption_update` control frame from the server.
    Caption { text: String },
    /// An `{"error": ...}` control frame from the server.
    ServerError { message: String },
    /// Any other structured control frame, passed through unclassified.
    Control { payload: serde_json::Value },
    PlaybackStart {},
    PlaybackEnd {},
    Status {
        connection: String,
        recording: bool,
        playing: bool,
        level: u8,
    },
    Error { message: String },
    Pong {},
    Stopping {},
}

// ---------------------------------------------------------------------------
// Commands: UI -> core (stdin)
// ---------------------------------------------------------------------------

/// All commands received from the UI via stdin as JSON lines.
///
/// Deserialized from `{"command": "<variant>", ...}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "command")]
#[serde(rename_all = "snake_case")]
pub enum StreamCommand {
    Connect {
        #[serde(default)]
        url: Option<String>,
    },
    Disconnect {},
    StartRecording {},
    StopRecording {},
    Status {},
    Ping {},
    Stop {},
}
