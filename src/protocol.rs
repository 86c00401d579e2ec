//! The channel message envelope and termination contract.
//!
//! Contract:
//! - Producers publish fragments in the exact order tokens arrive from the
//!   upstream source.
//! - Per attempt, the sequence is zero-or-more `Fragment`s followed by
//!   exactly one `Terminal` **or** exactly one `Error` — never both, never
//!   neither (a producer crash is the acknowledged gap; listeners cover it
//!   with an idle timeout).
//! - Nothing may be published after the terminal marker.
//!
//! Every message is tagged with the request id and the engine attempt
//! number, so a listener can tell a retried execution's sequence apart
//! from the original instead of merging them blindly.
//!
//! Wire format (JSON object, one of):
//!
//! ```text
//! {"chunk":"<text>","is_final":false,"request_id":"<id>","attempt":1}
//! {"chunk":"","is_final":true,"request_id":"<id>","attempt":1}
//! {"error":"<description>","request_id":"<id>","attempt":1}
//! ```
//!
//! Parsing is pure: the same payload always yields the same classification.
//! Untagged payloads from legacy producers are accepted and mapped to an
//! empty request id and attempt 1.

use serde_json::{Value, json};

use crate::error::ProtocolViolation;

/// Attempt number assumed for payloads that carry no `attempt` tag.
pub const UNTAGGED_ATTEMPT: u32 = 1;

/// One of the three message shapes the channel carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelMessage {
    /// One incremental piece of generated text.
    Fragment { chunk: String },
    /// Successful end-of-stream marker.
    Terminal,
    /// The producing side failed; no terminal marker will follow.
    Error { error: String },
}

/// A [`ChannelMessage`] plus the tags identifying which execution attempt
/// produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// The logical request this message belongs to (the workflow id).
    pub request_id: String,
    /// Engine attempt number, starting at 1.
    pub attempt: u32,
    pub message: ChannelMessage,
}

impl Envelope {
    pub fn fragment(request_id: &str, attempt: u32, chunk: impl Into<String>) -> Self {
        Self {
            request_id: request_id.to_string(),
            attempt,
            message: ChannelMessage::Fragment { chunk: chunk.into() },
        }
    }

    pub fn terminal(request_id: &str, attempt: u32) -> Self {
        Self {
            request_id: request_id.to_string(),
            attempt,
            message: ChannelMessage::Terminal,
        }
    }

    pub fn error(request_id: &str, attempt: u32, description: impl Into<String>) -> Self {
        Self {
            request_id: request_id.to_string(),
            attempt,
            message: ChannelMessage::Error { error: description.into() },
        }
    }

    /// True for `Terminal` and `Error` — the markers after which an attempt
    /// publishes nothing further.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.message,
            ChannelMessage::Terminal | ChannelMessage::Error { .. }
        )
    }

    /// Key identifying the attempt this message belongs to.
    pub fn attempt_key(&self) -> (String, u32) {
        (self.request_id.clone(), self.attempt)
    }

    /// Serialize to the JSON wire format.
    pub fn to_wire(&self) -> String {
        let value = match &self.message {
            ChannelMessage::Fragment { chunk } => json!({
                "chunk": chunk,
                "is_final": false,
                "request_id": self.request_id,
                "attempt": self.attempt,
            }),
            ChannelMessage::Terminal => json!({
                "chunk": "",
                "is_final": true,
                "request_id": self.request_id,
                "attempt": self.attempt,
            }),
            ChannelMessage::Error { error } => json!({
                "error": error,
                "request_id": self.request_id,
                "attempt": self.attempt,
            }),
        };
        value.to_string()
    }

    /// Parse a raw payload, validating it against the closed set of
    /// message shapes. Anything else is a [`ProtocolViolation`] for the
    /// caller to log and skip.
    pub fn parse(payload: &str) -> Result<Self, ProtocolViolation> {
        let value: Value = serde_json::from_str(payload)
            .map_err(|e| ProtocolViolation::Malformed(e.to_string()))?;
        let obj = value.as_object().ok_or(ProtocolViolation::NotAnObject)?;

        let request_id = obj
            .get("request_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let attempt = obj
            .get("attempt")
            .and_then(Value::as_u64)
            .map(|a| a as u32)
            .unwrap_or(UNTAGGED_ATTEMPT);

        if let Some(error) = obj.get("error").and_then(Value::as_str) {
            return Ok(Self {
                request_id,
                attempt,
                message: ChannelMessage::Error { error: error.to_string() },
            });
        }

        match (
            obj.get("chunk").and_then(Value::as_str),
            obj.get("is_final").and_then(Value::as_bool),
        ) {
            // The legacy protocol sketched an "accumulated" field on the
            // terminal message; fragment concatenation is the sole source
            // of truth here, so any such field is ignored.
            (Some(_), Some(true)) => Ok(Self {
                request_id,
                attempt,
                message: ChannelMessage::Terminal,
            }),
            (Some(chunk), Some(false)) => Ok(Self {
                request_id,
                attempt,
                message: ChannelMessage::Fragment { chunk: chunk.to_string() },
            }),
            _ => Err(ProtocolViolation::UnknownShape),
        }
    }
}
