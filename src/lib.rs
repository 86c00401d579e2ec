//! Temporal durable execution harness for streaming LLM calls.
//!
//! A single streaming model call runs as a durable, retryable Temporal
//! activity; every text fragment it receives is republished to a Redis
//! pub/sub channel so external listeners can observe the response as it
//! is generated.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                        Temporal Workflow                          │
//! │                                                                   │
//! │  StreamWorkflow::run(StreamRequest)                               │
//! │    └─ stream_llm activity (5 min timeout, engine retries)         │
//! │        ├─ open Anthropic SSE stream                               │
//! │        ├─ per fragment: publish {chunk, request_id, attempt}      │
//! │        ├─ on success: publish terminal marker, return full text   │
//! │        └─ on failure: publish error marker, re-raise to engine    │
//! └───────────────────────────────────────────────────────────────────┘
//!                               │ Redis pub/sub
//!                               ▼
//!                 listener: subscribe → accumulate per
//!                 attempt → finalize on terminal/error
//! ```
//!
//! The starter runs the listener and the workflow concurrently against
//! the same channel name and reconciles the two results. The listener is
//! deliberately decoupled: it never learns whether the activity ran once
//! or was retried — it only observes tagged messages.

pub mod activities;
pub mod config;
pub mod error;
pub mod listener;
pub mod protocol;
pub mod publisher;
pub mod sink;
pub mod transport;
pub mod types;
pub mod upstream;
pub mod workflow;

// Re-export key types for convenient access
pub use activities::StreamActivities;
pub use config::Config;
pub use error::{ProtocolViolation, StreamError, TransportError, UpstreamError};
pub use listener::{ListenOutcome, ListenerOptions, listen};
pub use protocol::{ChannelMessage, Envelope};
pub use publisher::publish_stream;
pub use sink::{BufferSink, ConsoleSink, FragmentSink, NullSink};
pub use transport::{InProcessTransport, PubSubTransport, RedisTransport, Subscription};
pub use types::{
    DEFAULT_MODEL, StreamRequest, StreamWorkflowOutput, TASK_QUEUE, channel_for_workflow,
};
pub use upstream::{AnthropicClient, FragmentSource, FragmentStream, MAX_COMPLETION_TOKENS};
pub use workflow::StreamWorkflow;
