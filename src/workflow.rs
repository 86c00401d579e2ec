//! The single-step durable workflow wrapping the streaming activity.
//!
//! The workflow's only responsibilities are supplying the request payload
//! and the timeout bound, and surfacing the activity's result or failure
//! unchanged. Scheduling, retry policy, and replay belong to the engine.

use std::time::Duration;

use temporalio_macros::{workflow, workflow_methods};
use temporalio_sdk::{ActivityOptions, WorkflowContext, WorkflowContextView, WorkflowResult};

use crate::activities::StreamActivities;
use crate::types::{StreamRequest, StreamWorkflowOutput};

/// Ceiling on one activity attempt, start to close.
const ACTIVITY_TIMEOUT: Duration = Duration::from_secs(300);

#[workflow]
pub struct StreamWorkflow {
    input: StreamRequest,
}

#[workflow_methods]
impl StreamWorkflow {
    #[init]
    pub fn new(_ctx: &WorkflowContextView, input: StreamRequest) -> Self {
        Self { input }
    }

    #[run]
    pub async fn run(ctx: &mut WorkflowContext<Self>) -> WorkflowResult<StreamWorkflowOutput> {
        let input = ctx.state(|s| s.input.clone());

        tracing::info!(channel = %input.channel, model = %input.model, "dispatching stream_llm");

        let opts = ActivityOptions::start_to_close_timeout(ACTIVITY_TIMEOUT);

        let response = ctx
            .start_activity(StreamActivities::stream_llm, input, opts)
            .await
            .map_err(|e| anyhow::anyhow!("stream_llm activity failed: {e}"))?;

        Ok(StreamWorkflowOutput { response })
    }
}
