//! Temporal worker binary for the streaming harness.
//!
//! Runs both workflow and activity workers on the same task queue. The
//! workflow worker executes the single-step orchestration
//! deterministically, while the activity worker performs the real I/O
//! (model call, Redis publishes).

use std::str::FromStr;

use temporalio_client::{Client, ClientOptions, Connection, ConnectionOptions};
use temporalio_common::telemetry::TelemetryOptions;
use temporalio_common::worker::WorkerTaskTypes;
use temporalio_sdk::{Worker, WorkerOptions};
use temporalio_sdk_core::{CoreRuntime, RuntimeOptions, Url};

use claude_stream_temporal::activities::StreamActivities;
use claude_stream_temporal::config::Config;
use claude_stream_temporal::types::TASK_QUEUE;
use claude_stream_temporal::workflow::StreamWorkflow;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".parse().unwrap()),
        )
        .init();

    let config = Config::from_env();

    tracing::info!(
        server_url = %config.temporal_address,
        task_queue = TASK_QUEUE,
        "starting claude-stream worker"
    );

    // Connect to the Temporal server.
    let connection_options = ConnectionOptions::new(
        Url::from_str(&config.temporal_address)?,
    )
    .identity("claude-stream-worker")
    .build();
    let telemetry_options = TelemetryOptions::builder().build();
    let runtime_options = RuntimeOptions::builder()
        .telemetry_options(telemetry_options)
        .build()?;
    let runtime = CoreRuntime::new_assume_tokio(runtime_options)?;

    let connection = Connection::connect(connection_options).await?;
    let client = Client::new(
        connection,
        ClientOptions::new("default").build(),
    )?;

    // Build the worker with both workflow and activity registrations.
    let worker_options = WorkerOptions::new(TASK_QUEUE)
        .task_types(WorkerTaskTypes::all())
        .register_workflow::<StreamWorkflow>()
        .register_activities(StreamActivities)
        .build();

    let mut worker = Worker::new(&runtime, client, worker_options)?;

    tracing::info!("worker ready, polling for tasks…");
    worker.run().await?;

    Ok(())
}
