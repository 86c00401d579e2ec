//! Anthropic Messages API streaming client.
//!
//! The upstream boundary is one operation: open a streaming completion and
//! consume text fragments as they arrive. The [`FragmentSource`] trait is
//! the seam the publisher is written against; tests substitute scripted
//! sources for the real API.

use async_trait::async_trait;
use eventsource_stream::Event as SseMessage;
use futures::StreamExt;
use futures::stream::BoxStream;
use reqwest_eventsource::{Event as SseEvent, EventSource};
use serde_json::json;

use crate::config::Config;
use crate::error::UpstreamError;

/// Hard cap on generated tokens per request. Responses are bounded so one
/// activity attempt stays well inside its start-to-close timeout.
pub const MAX_COMPLETION_TOKENS: u32 = 1000;

/// API version header required by the Messages API.
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// A lazy sequence of text fragments from one streaming completion.
pub type FragmentStream = BoxStream<'static, Result<String, UpstreamError>>;

/// Something that can open a streaming completion for a prompt.
#[async_trait]
pub trait FragmentSource: Send + Sync {
    /// Open a stream of text fragments. Failing to open is an
    /// [`UpstreamError`]; failures mid-stream surface as `Err` items.
    async fn open_stream(
        &self,
        model: &str,
        prompt: &str,
        max_tokens: u32,
    ) -> Result<FragmentStream, UpstreamError>;
}

/// [`FragmentSource`] backed by the Anthropic Messages API over SSE.
pub struct AnthropicClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl AnthropicClient {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.anthropic_base_url.trim_end_matches('/').to_string(),
            api_key: config.anthropic_api_key.clone(),
        }
    }
}

#[async_trait]
impl FragmentSource for AnthropicClient {
    async fn open_stream(
        &self,
        model: &str,
        prompt: &str,
        max_tokens: u32,
    ) -> Result<FragmentStream, UpstreamError> {
        // Checked at stream-open time so the failure reaches the channel
        // as an error marker.
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| UpstreamError::Request("ANTHROPIC_API_KEY not set".to_string()))?;

        let url = format!("{}/v1/messages", self.base_url);
        let body = json!({
            "model": model,
            "max_tokens": max_tokens,
            "stream": true,
            "messages": [
                { "role": "user", "content": prompt }
            ],
        });

        tracing::info!(%model, %url, "opening upstream stream");

        let request = self
            .http
            .post(&url)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&body);

        let source = EventSource::new(request)
            .map_err(|e| UpstreamError::Request(e.to_string()))?;

        // State is Some(source) while the stream is live; yielding an error
        // or seeing the stop event drops the source and ends the stream.
        let fragments = futures::stream::unfold(Some(source), |state| async move {
            let mut source = state?;
            loop {
                match source.next().await {
                    Some(Ok(SseEvent::Open)) => continue,
                    Some(Ok(SseEvent::Message(SseMessage { event, data, .. }))) => match event
                        .as_str()
                    {
                        "content_block_delta" => {
                            if let Some(text) = text_delta(&data) {
                                return Some((Ok(text), Some(source)));
                            }
                        }
                        "message_stop" => {
                            source.close();
                            return None;
                        }
                        "error" => {
                            let detail = error_detail(&data);
                            source.close();
                            return Some((Err(UpstreamError::Api(detail)), None));
                        }
                        // message_start, content_block_start/stop,
                        // message_delta, ping
                        _ => continue,
                    },
                    Some(Err(reqwest_eventsource::Error::StreamEnded)) => return None,
                    Some(Err(e)) => {
                        source.close();
                        return Some((Err(UpstreamError::Stream(e.to_string())), None));
                    }
                    None => return None,
                }
            }
        })
        .boxed();

        Ok(fragments)
    }
}

/// Extract the text of a `content_block_delta` event, if it carries one.
fn text_delta(data: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(data).ok()?;
    let delta = value.get("delta")?;
    if delta.get("type").and_then(|t| t.as_str()) != Some("text_delta") {
        return None;
    }
    delta
        .get("text")
        .and_then(|t| t.as_str())
        .map(str::to_string)
}

/// Best-effort description from an `error` event payload.
fn error_detail(data: &str) -> String {
    serde_json::from_str::<serde_json::Value>(data)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| data.to_string())
}
