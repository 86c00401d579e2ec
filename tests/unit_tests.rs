//! Unit and integration tests for the streaming bridge.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use claude_stream_temporal::error::UpstreamError;
use claude_stream_temporal::listener::{ListenOutcome, ListenerOptions, listen};
use claude_stream_temporal::protocol::{ChannelMessage, Envelope};
use claude_stream_temporal::publisher::publish_stream;
use claude_stream_temporal::sink::{BufferSink, FragmentSink};
use claude_stream_temporal::transport::{InProcessTransport, PubSubTransport, Subscription};
use claude_stream_temporal::types::{
    DEFAULT_MODEL, StreamRequest, StreamWorkflowOutput, channel_for_workflow,
};
use claude_stream_temporal::upstream::{FragmentSource, FragmentStream};

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------

/// A [`FragmentSource`] that replays a fixed script of fragments and
/// failures instead of calling the model API.
struct ScriptedSource {
    script: Vec<Result<String, String>>,
}

impl ScriptedSource {
    fn fragments(chunks: &[&str]) -> Self {
        Self {
            script: chunks.iter().map(|c| Ok(c.to_string())).collect(),
        }
    }

    fn failing_after(chunks: &[&str], error: &str) -> Self {
        let mut script: Vec<Result<String, String>> =
            chunks.iter().map(|c| Ok(c.to_string())).collect();
        script.push(Err(error.to_string()));
        Self { script }
    }
}

#[async_trait]
impl FragmentSource for ScriptedSource {
    async fn open_stream(
        &self,
        _model: &str,
        _prompt: &str,
        _max_tokens: u32,
    ) -> Result<FragmentStream, UpstreamError> {
        let items: Vec<Result<String, UpstreamError>> = self
            .script
            .iter()
            .map(|entry| match entry {
                Ok(chunk) => Ok(chunk.clone()),
                Err(detail) => Err(UpstreamError::Stream(detail.clone())),
            })
            .collect();
        Ok(futures::stream::iter(items).boxed())
    }
}

/// A [`FragmentSource`] that fails before the stream opens.
struct UnreachableSource;

#[async_trait]
impl FragmentSource for UnreachableSource {
    async fn open_stream(
        &self,
        _model: &str,
        _prompt: &str,
        _max_tokens: u32,
    ) -> Result<FragmentStream, UpstreamError> {
        Err(UpstreamError::Request("connection refused".to_string()))
    }
}

/// Drain every message currently buffered on a subscription.
async fn drain_messages(subscription: &mut Subscription) -> Vec<String> {
    let mut messages = Vec::new();
    while let Ok(Some(payload)) =
        tokio::time::timeout(Duration::from_millis(50), subscription.next()).await
    {
        messages.push(payload);
    }
    messages
}

fn request_on(channel: &str) -> StreamRequest {
    StreamRequest::new("test prompt", channel)
}

// ---------------------------------------------------------------------------
// Protocol tests
// ---------------------------------------------------------------------------

#[test]
fn envelope_fragment_roundtrips_through_wire() {
    let envelope = Envelope::fragment("wf-1", 2, "Hello");
    let back = Envelope::parse(&envelope.to_wire()).expect("parse failed");

    assert_eq!(back, envelope);
    assert_eq!(back.request_id, "wf-1");
    assert_eq!(back.attempt, 2);
    assert!(!back.is_terminal());
}

#[test]
fn envelope_terminal_and_error_are_terminal() {
    let terminal = Envelope::terminal("wf-1", 1);
    let error = Envelope::error("wf-1", 1, "boom");

    assert!(terminal.is_terminal());
    assert!(error.is_terminal());

    let back = Envelope::parse(&terminal.to_wire()).expect("parse failed");
    assert_eq!(back.message, ChannelMessage::Terminal);

    let back = Envelope::parse(&error.to_wire()).expect("parse failed");
    assert_eq!(back.message, ChannelMessage::Error { error: "boom".to_string() });
}

#[test]
fn untagged_payloads_map_to_attempt_one() {
    let envelope = Envelope::parse(r#"{"chunk":"hi","is_final":false}"#).expect("parse failed");

    assert_eq!(envelope.request_id, "");
    assert_eq!(envelope.attempt, 1);
    assert_eq!(envelope.message, ChannelMessage::Fragment { chunk: "hi".to_string() });
}

#[test]
fn legacy_accumulated_field_is_ignored() {
    // The original protocol sketched an "accumulated" field on the
    // terminal message; concatenation of fragments is the sole source of
    // truth, so the field must not change the classification.
    let envelope =
        Envelope::parse(r#"{"chunk":"","is_final":true,"accumulated":"full text"}"#)
            .expect("parse failed");

    assert_eq!(envelope.message, ChannelMessage::Terminal);
}

#[test]
fn parsing_is_pure() {
    let payload = r#"{"chunk":"abc","is_final":false,"request_id":"wf","attempt":3}"#;

    let first = Envelope::parse(payload).expect("parse failed");
    let second = Envelope::parse(payload).expect("parse failed");

    assert_eq!(first, second, "re-parsing must yield the same classification");
}

#[test]
fn malformed_payloads_are_violations() {
    assert!(Envelope::parse("not json at all").is_err());
    assert!(Envelope::parse("[1,2,3]").is_err());
    assert!(Envelope::parse(r#"{"something":"else"}"#).is_err());
    assert!(Envelope::parse(r#"{"chunk":"x"}"#).is_err(), "missing is_final flag");
}

// ---------------------------------------------------------------------------
// Request type tests
// ---------------------------------------------------------------------------

#[test]
fn stream_request_model_defaults_when_absent() {
    let json = r#"{"prompt":"hi","channel":"stream:wf-1"}"#;
    let request: StreamRequest = serde_json::from_str(json).unwrap();

    assert_eq!(request.model, DEFAULT_MODEL);
}

#[test]
fn stream_request_roundtrips_through_json() {
    let request = StreamRequest::new("Explain quantum computing", "stream:wf-9");

    let json = serde_json::to_string(&request).unwrap();
    let back: StreamRequest = serde_json::from_str(&json).unwrap();

    assert_eq!(back.prompt, request.prompt);
    assert_eq!(back.channel, request.channel);
    assert_eq!(back.model, request.model);
}

#[test]
fn stream_request_rejects_empty_channel() {
    let request = StreamRequest::new("hi", "  ");
    assert!(request.validate().is_err());

    let request = StreamRequest::new("hi", "stream:wf-1");
    assert!(request.validate().is_ok());
}

#[test]
fn workflow_output_roundtrips_through_json() {
    let output = StreamWorkflowOutput {
        response: "Hello, world!".to_string(),
    };

    let json = serde_json::to_string(&output).unwrap();
    let back: StreamWorkflowOutput = serde_json::from_str(&json).unwrap();

    assert_eq!(back.response, output.response);
}

#[test]
fn channel_name_is_derived_from_workflow_id() {
    assert_eq!(channel_for_workflow("wf-123"), "stream:wf-123");
}

// ---------------------------------------------------------------------------
// In-process transport tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn transport_preserves_publish_order() {
    let transport = InProcessTransport::new();
    let mut subscription = transport.subscribe("t1").await.unwrap();

    for i in 0..10 {
        transport.publish("t1", &format!("msg-{i}")).await.unwrap();
    }

    let messages = drain_messages(&mut subscription).await;
    let expected: Vec<String> = (0..10).map(|i| format!("msg-{i}")).collect();
    assert_eq!(messages, expected);
}

#[tokio::test]
async fn transport_does_not_replay_messages_published_before_subscribe() {
    let transport = InProcessTransport::new();

    transport.publish("t2", "early").await.unwrap();

    let mut subscription = transport.subscribe("t2").await.unwrap();
    transport.publish("t2", "late").await.unwrap();

    let messages = drain_messages(&mut subscription).await;
    assert_eq!(messages, vec!["late".to_string()]);
}

#[tokio::test]
async fn transport_isolates_channels() {
    let transport = InProcessTransport::new();
    let mut sub_a = transport.subscribe("a").await.unwrap();
    let mut sub_b = transport.subscribe("b").await.unwrap();

    transport.publish("a", "for-a").await.unwrap();
    transport.publish("b", "for-b").await.unwrap();

    assert_eq!(drain_messages(&mut sub_a).await, vec!["for-a".to_string()]);
    assert_eq!(drain_messages(&mut sub_b).await, vec!["for-b".to_string()]);
}

// ---------------------------------------------------------------------------
// Publisher tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn publisher_emits_fragments_then_one_terminal() {
    let transport = InProcessTransport::new();
    let source = ScriptedSource::fragments(&["Hel", "lo, ", "world!"]);
    let mut observer = transport.subscribe("c1").await.unwrap();

    let accumulated = publish_stream(&transport, &source, &request_on("c1"), "wf-1", 1)
        .await
        .expect("publish_stream failed");

    assert_eq!(accumulated, "Hello, world!");

    let messages = drain_messages(&mut observer).await;
    assert_eq!(messages.len(), 4, "3 fragments + 1 terminal");

    let envelopes: Vec<Envelope> = messages
        .iter()
        .map(|m| Envelope::parse(m).expect("publisher emitted malformed payload"))
        .collect();

    let chunks: Vec<&str> = envelopes[..3]
        .iter()
        .map(|e| match &e.message {
            ChannelMessage::Fragment { chunk } => chunk.as_str(),
            other => panic!("expected Fragment, got {other:?}"),
        })
        .collect();
    assert_eq!(chunks, vec!["Hel", "lo, ", "world!"]);
    assert_eq!(envelopes[3].message, ChannelMessage::Terminal);
    assert!(envelopes.iter().all(|e| e.request_id == "wf-1" && e.attempt == 1));
}

#[tokio::test]
async fn publisher_empty_stream_emits_only_terminal() {
    let transport = InProcessTransport::new();
    let source = ScriptedSource::fragments(&[]);
    let mut observer = transport.subscribe("c2").await.unwrap();

    let accumulated = publish_stream(&transport, &source, &request_on("c2"), "wf-1", 1)
        .await
        .expect("publish_stream failed");

    assert_eq!(accumulated, "");

    let messages = drain_messages(&mut observer).await;
    assert_eq!(messages.len(), 1);
    assert_eq!(
        Envelope::parse(&messages[0]).unwrap().message,
        ChannelMessage::Terminal
    );
}

#[tokio::test]
async fn publisher_mid_stream_failure_emits_one_error_marker() {
    let transport = InProcessTransport::new();
    let source = ScriptedSource::failing_after(&["Par"], "connection reset");
    let mut observer = transport.subscribe("c3").await.unwrap();

    let result = publish_stream(&transport, &source, &request_on("c3"), "wf-1", 1).await;
    assert!(result.is_err(), "mid-stream failure must propagate");

    let messages = drain_messages(&mut observer).await;
    assert_eq!(messages.len(), 2, "1 fragment + 1 error marker");

    let first = Envelope::parse(&messages[0]).unwrap();
    assert_eq!(first.message, ChannelMessage::Fragment { chunk: "Par".to_string() });

    let second = Envelope::parse(&messages[1]).unwrap();
    match second.message {
        ChannelMessage::Error { error } => {
            assert!(error.contains("connection reset"), "got: {error}");
        }
        other => panic!("expected Error marker, got {other:?}"),
    }
}

#[tokio::test]
async fn publisher_open_failure_emits_error_marker_and_propagates() {
    let transport = InProcessTransport::new();
    let mut observer = transport.subscribe("c4").await.unwrap();

    let result = publish_stream(&transport, &UnreachableSource, &request_on("c4"), "wf-1", 1).await;
    assert!(result.is_err());

    let messages = drain_messages(&mut observer).await;
    assert_eq!(messages.len(), 1, "exactly one error marker, no terminal");
    assert!(matches!(
        Envelope::parse(&messages[0]).unwrap().message,
        ChannelMessage::Error { .. }
    ));
}

// ---------------------------------------------------------------------------
// Publisher ↔ listener round trips
// ---------------------------------------------------------------------------

/// Run the publisher and the listener concurrently on one channel and
/// return (publisher result, listener outcome).
async fn round_trip(
    source: &dyn FragmentSource,
    channel: &str,
    sink: Arc<dyn FragmentSink>,
) -> (Result<String, claude_stream_temporal::error::StreamError>, ListenOutcome) {
    let transport = InProcessTransport::new();
    let subscription = transport.subscribe(channel).await.unwrap();

    let listener = listen(
        subscription,
        ListenerOptions {
            idle_timeout: Duration::from_secs(5),
            sink,
            ..Default::default()
        },
    );
    let publisher = publish_stream(&transport, source, &request_on(channel), "wf-1", 1);

    tokio::join!(publisher, listener)
}

#[tokio::test]
async fn listener_reconstruction_matches_publisher_accumulation() {
    let source = ScriptedSource::fragments(&["Hel", "lo, ", "world!"]);
    let sink = Arc::new(BufferSink::new());

    let (published, outcome) = round_trip(&source, "rt1", sink.clone()).await;

    let accumulated = published.expect("publisher failed");
    assert_eq!(accumulated, "Hello, world!");
    assert_eq!(outcome, ListenOutcome::Completed("Hello, world!".to_string()));
    assert_eq!(sink.drain(), vec!["Hel", "lo, ", "world!"]);
}

#[tokio::test]
async fn round_trip_of_empty_stream() {
    let source = ScriptedSource::fragments(&[]);

    let (published, outcome) =
        round_trip(&source, "rt2", Arc::new(claude_stream_temporal::sink::NullSink)).await;

    assert_eq!(published.expect("publisher failed"), "");
    assert_eq!(outcome, ListenOutcome::Completed(String::new()));
}

#[tokio::test]
async fn round_trip_of_thousand_fragments_preserves_order() {
    let chunks: Vec<String> = (0..1000).map(|i| format!("frag-{i};")).collect();
    let refs: Vec<&str> = chunks.iter().map(String::as_str).collect();
    let source = ScriptedSource::fragments(&refs);

    let (published, outcome) =
        round_trip(&source, "rt3", Arc::new(claude_stream_temporal::sink::NullSink)).await;

    let expected: String = chunks.concat();
    assert_eq!(published.expect("publisher failed"), expected);
    assert_eq!(outcome, ListenOutcome::Completed(expected));
}

#[tokio::test]
async fn failed_stream_reports_error_to_listener() {
    let source = ScriptedSource::failing_after(&["Par"], "provider overloaded");
    let sink = Arc::new(BufferSink::new());

    let (published, outcome) = round_trip(&source, "rt4", sink.clone()).await;

    assert!(published.is_err(), "activity-side call must raise");
    match outcome {
        ListenOutcome::Failed(error) => {
            assert!(error.contains("provider overloaded"), "got: {error}");
        }
        other => panic!("expected Failed outcome, got {other:?}"),
    }
    assert_eq!(sink.drain(), vec!["Par"], "fragments before the failure still stream");
}

// ---------------------------------------------------------------------------
// Listener tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn listener_skips_malformed_messages_between_fragments() {
    let transport = InProcessTransport::new();
    let subscription = transport.subscribe("l1").await.unwrap();

    transport
        .publish("l1", &Envelope::fragment("wf", 1, "Hello, ").to_wire())
        .await
        .unwrap();
    transport.publish("l1", "this is not json {{").await.unwrap();
    transport
        .publish("l1", &Envelope::fragment("wf", 1, "world!").to_wire())
        .await
        .unwrap();
    transport.publish("l1", &Envelope::terminal("wf", 1).to_wire()).await.unwrap();

    let outcome = listen(
        subscription,
        ListenerOptions {
            idle_timeout: Duration::from_secs(5),
            ..Default::default()
        },
    )
    .await;

    assert_eq!(outcome, ListenOutcome::Completed("Hello, world!".to_string()));
}

#[tokio::test]
async fn listener_separates_interleaved_attempts() {
    // A retried activity replays a second, independent sequence onto the
    // same channel. The listener must finalize a single attempt's text,
    // not the interleaving of both.
    let transport = InProcessTransport::new();
    let subscription = transport.subscribe("l2").await.unwrap();

    transport.publish("l2", &Envelope::fragment("wf", 1, "A1").to_wire()).await.unwrap();
    transport.publish("l2", &Envelope::fragment("wf", 2, "B1").to_wire()).await.unwrap();
    transport.publish("l2", &Envelope::fragment("wf", 1, "A2").to_wire()).await.unwrap();
    transport.publish("l2", &Envelope::fragment("wf", 2, "B2").to_wire()).await.unwrap();
    transport.publish("l2", &Envelope::terminal("wf", 2).to_wire()).await.unwrap();

    let outcome = listen(
        subscription,
        ListenerOptions {
            idle_timeout: Duration::from_secs(5),
            ..Default::default()
        },
    )
    .await;

    assert_eq!(
        outcome,
        ListenOutcome::Completed("B1B2".to_string()),
        "only the terminated attempt's fragments may appear in the result"
    );
}

#[tokio::test]
async fn untagged_producers_sharing_a_channel_interleave() {
    // Two legacy (untagged) executions erroneously sharing one channel
    // collapse onto the same accumulation key: the reconstruction is the
    // interleaving of both. Documented defect of untagged producers, not
    // a crash — channel-per-workflow naming is what prevents it.
    let transport = InProcessTransport::new();
    let subscription = transport.subscribe("l3").await.unwrap();

    transport.publish("l3", r#"{"chunk":"X1","is_final":false}"#).await.unwrap();
    transport.publish("l3", r#"{"chunk":"Y1","is_final":false}"#).await.unwrap();
    transport.publish("l3", r#"{"chunk":"X2","is_final":false}"#).await.unwrap();
    transport.publish("l3", r#"{"chunk":"","is_final":true}"#).await.unwrap();

    let outcome = listen(
        subscription,
        ListenerOptions {
            idle_timeout: Duration::from_secs(5),
            ..Default::default()
        },
    )
    .await;

    assert_eq!(outcome, ListenOutcome::Completed("X1Y1X2".to_string()));
}

#[tokio::test]
async fn listener_times_out_when_producer_goes_silent() {
    let transport = InProcessTransport::new();
    let subscription = transport.subscribe("l4").await.unwrap();

    transport.publish("l4", &Envelope::fragment("wf", 1, "partial").to_wire()).await.unwrap();
    // No terminal marker: the producer crashed.

    let outcome = listen(
        subscription,
        ListenerOptions {
            idle_timeout: Duration::from_millis(100),
            ..Default::default()
        },
    )
    .await;

    assert_eq!(outcome, ListenOutcome::TimedOut);
}

#[tokio::test]
async fn listener_stops_on_cancellation() {
    let transport = InProcessTransport::new();
    let subscription = transport.subscribe("l5").await.unwrap();

    let cancel = CancellationToken::new();
    let listener = listen(
        subscription,
        ListenerOptions {
            idle_timeout: Duration::from_secs(30),
            cancel: cancel.clone(),
            ..Default::default()
        },
    );

    cancel.cancel();
    assert_eq!(listener.await, ListenOutcome::Cancelled);
}

#[tokio::test]
async fn listener_reports_disconnect_when_transport_goes_away() {
    let transport = InProcessTransport::new();
    let subscription = transport.subscribe("l6").await.unwrap();
    drop(transport);

    let outcome = listen(
        subscription,
        ListenerOptions {
            idle_timeout: Duration::from_secs(5),
            ..Default::default()
        },
    )
    .await;

    assert_eq!(outcome, ListenOutcome::Disconnected);
}

// ---------------------------------------------------------------------------
// Sink tests
// ---------------------------------------------------------------------------

#[test]
fn buffer_sink_collects_and_drains_in_order() {
    let sink = BufferSink::new();
    assert!(sink.is_empty());

    sink.on_fragment("a");
    sink.on_fragment("b");
    sink.on_fragment("c");

    assert_eq!(sink.len(), 3);
    assert_eq!(sink.drain(), vec!["a", "b", "c"]);
    assert!(sink.is_empty(), "drain should clear the buffer");
}
