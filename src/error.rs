//! Error taxonomy for the streaming bridge.
//!
//! Upstream and transport failures are always surfaced — the only errors
//! recovered locally are per-message protocol violations on the listener
//! side. Activity timeouts are engine-enforced and never appear here.

use thiserror::Error;

/// The external model call failed, either before the stream opened or
/// while reading fragments from it.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("upstream request failed: {0}")]
    Request(String),
    #[error("upstream stream dropped mid-response: {0}")]
    Stream(String),
    #[error("upstream reported an error: {0}")]
    Api(String),
}

/// Publish/subscribe against the pub/sub transport failed.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport connect failed: {0}")]
    Connect(String),
    #[error("publish to channel {channel} failed: {detail}")]
    Publish { channel: String, detail: String },
    #[error("subscribe to channel {channel} failed: {detail}")]
    Subscribe { channel: String, detail: String },
}

/// A listener received a payload that does not match the channel protocol.
///
/// Always recovered locally: the message is logged and skipped, the
/// surrounding stream keeps reconstructing.
#[derive(Debug, Error)]
pub enum ProtocolViolation {
    #[error("payload is not valid JSON: {0}")]
    Malformed(String),
    #[error("payload is not a JSON object")]
    NotAnObject,
    #[error("payload matches neither the fragment/terminal nor the error shape")]
    UnknownShape,
}

/// Failure of one publishing run: either the upstream call or the
/// transport gave out. The caller (the activity wrapper) owns retry
/// decisions.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}
