//! Temporal activity implementations for the streaming bridge.
//!
//! Activities run outside the deterministic workflow sandbox — they can
//! perform real I/O (the model call, Redis publishes). The engine may run
//! an activity more than once for one logical request; every message this
//! activity publishes is tagged with the attempt number so listeners can
//! tell re-executions apart.

use temporalio_macros::activities;
use temporalio_sdk::activities::{ActivityContext, ActivityError};

use crate::config::Config;
use crate::publisher::publish_stream;
use crate::transport::RedisTransport;
use crate::types::StreamRequest;
use crate::upstream::AnthropicClient;

/// Activity implementations for the streaming workflow.
pub struct StreamActivities;

#[activities]
impl StreamActivities {
    /// Call the model with the request's prompt and republish every text
    /// fragment to `request.channel`, returning the accumulated response.
    ///
    /// Requires `ANTHROPIC_API_KEY` on the activity worker; reads the
    /// Redis location from `REDIS_HOST` / `REDIS_PORT`.
    ///
    /// No idempotency key is used: a retried attempt replays the full
    /// prompt and produces a second, independent fragment sequence on the
    /// same channel, distinguished only by its attempt tag.
    #[activity]
    pub async fn stream_llm(
        ctx: ActivityContext,
        input: StreamRequest,
    ) -> Result<String, ActivityError> {
        input
            .validate()
            .map_err(|e| anyhow::anyhow!("invalid stream request: {e}"))?;

        let info = ctx.info();
        let attempt = info.attempt.max(1);
        let request_id = info
            .workflow_execution
            .as_ref()
            .map(|e| e.workflow_id().to_owned())
            .unwrap_or_default();

        tracing::info!(
            channel = %input.channel,
            model = %input.model,
            attempt,
            "stream_llm activity invoked"
        );

        ctx.record_heartbeat(vec![]);

        let config = Config::from_env();
        // Connection is scoped to this call; dropped on every exit path.
        let transport = RedisTransport::connect(&config)
            .await
            .map_err(|e| anyhow::anyhow!("transport connect failed: {e}"))?;
        let source = AnthropicClient::new(&config);

        let response = publish_stream(&transport, &source, &input, &request_id, attempt)
            .await
            .map_err(|e| anyhow::anyhow!("stream_llm failed: {e}"))?;

        Ok(response)
    }
}
