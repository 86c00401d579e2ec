//! CLI starter: prompts for text, runs the streaming workflow, and prints
//! the response as it is generated.
//!
//! The channel listener subscribes *before* the workflow is started, so no
//! fragment can be published ahead of the subscription. Listener and
//! workflow then run concurrently, coordinated only by the channel name
//! derived from the workflow id.
//!
//! Environment variables:
//!   TEMPORAL_ADDRESS  — Temporal server URL (default: http://localhost:7233)
//!   REDIS_HOST/PORT   — Redis location (default: localhost:6379)
//!   CLAUDE_MODEL      — model slug (default: claude-3-7-sonnet-20250219)

use std::str::FromStr;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};

use temporalio_client::{Client, ClientOptions, Connection, ConnectionOptions, WorkflowStartOptions};
use temporalio_common::telemetry::TelemetryOptions;
use temporalio_sdk_core::{CoreRuntime, RuntimeOptions, Url};

use claude_stream_temporal::config::Config;
use claude_stream_temporal::listener::{ListenOutcome, ListenerOptions, listen};
use claude_stream_temporal::sink::ConsoleSink;
use claude_stream_temporal::transport::{PubSubTransport, RedisTransport};
use claude_stream_temporal::types::{StreamRequest, TASK_QUEUE, channel_for_workflow};
use claude_stream_temporal::workflow::StreamWorkflow;

const DEFAULT_PROMPT: &str = "Explain quantum computing in simple terms.";

const DIVIDER: &str = "----------------------------------------";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".parse().unwrap()),
        )
        .init();

    let config = Config::from_env();

    println!("\n===== Claude Streaming Demo =====");
    println!("Enter your prompt:");
    let mut prompt = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut prompt).await?;
    let mut prompt = prompt.trim().to_string();
    if prompt.is_empty() {
        prompt = DEFAULT_PROMPT.to_string();
        println!("Using default prompt: \"{prompt}\"");
    }

    // Unique workflow id; the channel name is derived from it so
    // concurrent requests can never share a channel.
    let workflow_id = format!("claude-streaming-{}", uuid::Uuid::new_v4());
    let channel = channel_for_workflow(&workflow_id);

    // Subscribe before the workflow is started.
    let transport = RedisTransport::connect(&config).await?;
    let subscription = transport.subscribe(&channel).await?;
    println!("Subscribed to channel: {channel}");
    println!("Streaming response from {}:", config.model);
    println!("{DIVIDER}");

    let listener_task = tokio::spawn(listen(
        subscription,
        ListenerOptions {
            sink: Arc::new(ConsoleSink),
            ..Default::default()
        },
    ));

    // Connect to the Temporal server.
    let connection_options = ConnectionOptions::new(
        Url::from_str(&config.temporal_address)?,
    )
    .identity("claude-stream-starter")
    .build();
    let telemetry_options = TelemetryOptions::builder().build();
    let runtime_options = RuntimeOptions::builder()
        .telemetry_options(telemetry_options)
        .build()?;
    let _runtime = CoreRuntime::new_assume_tokio(runtime_options)?;

    let connection = Connection::connect(connection_options).await?;
    let client = Client::new(
        connection,
        ClientOptions::new("default").build(),
    )?;

    let mut request = StreamRequest::new(prompt, channel);
    request.model = config.model.clone();

    tracing::info!(%workflow_id, task_queue = TASK_QUEUE, "starting workflow");
    let options = WorkflowStartOptions::new(TASK_QUEUE, &workflow_id).build();
    let handle = client
        .start_workflow(StreamWorkflow::run, request, options)
        .await?;

    // Reconcile both vantage points: the listener's reconstruction and
    // the workflow's own result. A failed run reports failure from each.
    let outcome = listener_task.await?;
    let listener_text = match outcome {
        ListenOutcome::Completed(text) => {
            println!("\n{DIVIDER}");
            text
        }
        ListenOutcome::Failed(error) => {
            println!("\nError: {error}");
            String::new()
        }
        ListenOutcome::TimedOut => {
            println!("\nError: no message within the idle timeout");
            String::new()
        }
        ListenOutcome::Cancelled | ListenOutcome::Disconnected => {
            println!("\nError: stream ended before completion");
            String::new()
        }
    };
    println!("Listener reconstructed {} characters", listener_text.len());

    let result = handle.result().await?;
    println!(
        "Workflow execution complete. Result length: {} characters",
        result.response.len()
    );

    Ok(())
}
