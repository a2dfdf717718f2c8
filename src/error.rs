//! Error taxonomy for the streaming core.
//!
//! Only `DeviceAcquisition` and `Handshake` are surfaced to callers as
//! failures. The remaining variants describe self-healing conditions that
//! are logged at the point of recovery: a dropped connection triggers the
//! reconnect path, a bad chunk is skipped, a failed encode drops one
//! capture window.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StreamError>;

#[derive(Debug, Error)]
pub enum StreamError {
    /// Microphone could not be acquired: permission denied, missing
    /// device, or unusable configuration.
    #[error("audio device unavailable: {0}")]
    DeviceAcquisition(String),

    /// The WebSocket handshake failed before the connection opened.
    #[error("connection handshake failed: {0}")]
    Handshake(String),

    /// An established connection errored mid-stream.
    #[error("connection dropped: {0}")]
    ConnectionDropped(String),

    /// A queued chunk could not be decoded or played.
    #[error("playback failed: {0}")]
    Playback(String),

    /// A capture window could not be serialized into a chunk.
    #[error("chunk encoding failed: {0}")]
    EncodeChunk(String),
}
