//! Serializable I/O types for the streaming workflow.
//!
//! These types cross the Temporal durability boundary (workflow input,
//! activity input, workflow output), so they must implement
//! `Serialize` + `Deserialize` and stay stable across replays.

use serde::{Deserialize, Serialize};

/// Task queue shared by the worker and the starter.
pub const TASK_QUEUE: &str = "claude-streaming-queue";

/// Model used when the caller does not specify one.
pub const DEFAULT_MODEL: &str = "claude-3-7-sonnet-20250219";

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

/// Input to the `stream_llm` activity and the streaming workflow.
///
/// Constructed once by the caller and passed by value across the activity
/// boundary; the engine may hand the same request to several attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamRequest {
    /// The prompt to send to the model.
    pub prompt: String,
    /// Pub/sub channel the response fragments are published to.
    pub channel: String,
    /// Model slug, defaults to [`DEFAULT_MODEL`] when absent.
    #[serde(default = "default_model")]
    pub model: String,
}

impl StreamRequest {
    pub fn new(prompt: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            channel: channel.into(),
            model: default_model(),
        }
    }

    /// Reject requests that would publish into the void or collide with
    /// other logical requests. Channel names must be caller-supplied and
    /// unique; an empty name is always a caller bug.
    pub fn validate(&self) -> Result<(), String> {
        if self.channel.trim().is_empty() {
            return Err("channel must be a non-empty, unique identifier".to_string());
        }
        if self.prompt.is_empty() {
            return Err("prompt must not be empty".to_string());
        }
        Ok(())
    }
}

/// Output from the streaming workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamWorkflowOutput {
    /// The complete response text, as accumulated by the activity.
    pub response: String,
}

/// Derive the pub/sub channel name for a workflow execution.
///
/// Each logical request gets its own channel keyed by the workflow id, so
/// concurrent requests can never interleave on a shared channel name.
pub fn channel_for_workflow(workflow_id: &str) -> String {
    format!("stream:{workflow_id}")
}
