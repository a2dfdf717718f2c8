//! Inbound frame classification.
//!
//! Text frames are tried as structured control objects first; anything
//! that fails that bar is routed to the audio path. Binary frames are
//! always audio. Classification never fails the connection.

use serde_json::Value;
use tracing::debug;

/// A structured (non-audio) message received on the connection.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlFrame {
    /// `{"type": "caption_update", "text": ...}`
    Caption { text: String },
    /// `{"error": ...}`
    Error { message: String },
    /// Any other structured shape, passed through untouched.
    Other(Value),
}

/// An inbound frame after classification.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Control(ControlFrame),
    Audio(Vec<u8>),
}

/// Classify a text frame.
///
/// Only JSON objects count as control frames; scalar JSON or a parse
/// failure is logged and the raw bytes go to the audio path.
pub fn classify_text(text: &str) -> Inbound {
    match serde_json::from_str::<Value>(text) {
        Ok(value) if value.is_object() => Inbound::Control(classify_control(value)),
        Ok(_) => {
            debug!(len = text.len(), "Text frame is not a control object; routing to audio");
            Inbound::Audio(text.as_bytes().to_vec())
        }
        Err(e) => {
            debug!(error = %e, len = text.len(), "Unparseable text frame; routing to audio");
            Inbound::Audio(text.as_bytes().to_vec())
        }
    }
}

fn classify_control(value: Value) -> ControlFrame {
    if value.get("type").and_then(Value::as_str) == Some("caption_update") {
        if let Some(text) = value.get("text").and_then(Value::as_str) {
            return ControlFrame::Caption {
                text: text.to_string(),
            };
        }
    }
    if let Some(message) = value.get("error").and_then(Value::as_str) {
        return ControlFrame::Error {
            message: message.to_string(),
        };
    }
    ControlFrame::Other(value)
}
