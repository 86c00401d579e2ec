//! The streaming publisher: one upstream call, republished fragment by
//! fragment.
//!
//! Each fragment is published **before** the next one is read: publishing
//! sits on the hot path, and a slow transport slows consumption of the
//! generation stream rather than letting fragments pile up unpublished.

use futures::StreamExt;

use crate::error::StreamError;
use crate::protocol::Envelope;
use crate::transport::PubSubTransport;
use crate::types::StreamRequest;
use crate::upstream::{FragmentSource, MAX_COMPLETION_TOKENS};

/// Run one streaming completion and republish it to `request.channel`.
///
/// On success the channel carries N fragments then exactly one terminal
/// marker, and the accumulated text is returned. On failure the channel
/// carries exactly one error marker in place of the terminal, and the
/// failure propagates — retrying is the caller's decision, not this
/// function's.
pub async fn publish_stream(
    transport: &dyn PubSubTransport,
    source: &dyn FragmentSource,
    request: &StreamRequest,
    request_id: &str,
    attempt: u32,
) -> Result<String, StreamError> {
    let channel = request.channel.as_str();
    let mut accumulated = String::new();
    let mut fragments = 0u32;

    let result = async {
        let mut stream = source
            .open_stream(&request.model, &request.prompt, MAX_COMPLETION_TOKENS)
            .await?;

        while let Some(item) = stream.next().await {
            let chunk = item?;
            transport
                .publish(channel, &Envelope::fragment(request_id, attempt, chunk.as_str()).to_wire())
                .await?;
            accumulated.push_str(&chunk);
            fragments += 1;
        }
        Ok::<(), StreamError>(())
    }
    .await;

    match result {
        Ok(()) => {
            transport
                .publish(channel, &Envelope::terminal(request_id, attempt).to_wire())
                .await?;
            tracing::info!(
                %channel,
                attempt,
                fragments,
                chars = accumulated.len(),
                "stream complete"
            );
            Ok(accumulated)
        }
        Err(e) => {
            tracing::error!(%channel, attempt, error = %e, "stream failed");
            // Best effort: the upstream failure is what the caller must
            // see, even if the error marker itself cannot be delivered.
            if let Err(publish_err) = transport
                .publish(
                    channel,
                    &Envelope::error(request_id, attempt, e.to_string()).to_wire(),
                )
                .await
            {
                tracing::warn!(%channel, error = %publish_err, "could not publish error marker");
            }
            Err(e)
        }
    }
}
