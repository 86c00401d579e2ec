//! The stream listener: reconstructs a response from channel messages.
//!
//! The listener and the producing activity are coordinated only by the
//! channel name — the listener never learns whether the activity ran once,
//! twice, or crashed; it only observes messages. Accumulation is therefore
//! kept **per attempt**: a retried activity replays a second, independent
//! sequence onto the same channel, and the two must not be merged. The
//! first attempt to reach its terminal marker (success or error) decides
//! the outcome.
//!
//! A producer that crashes before publishing any terminal marker leaves
//! the channel silent; the idle timeout covers that gap, mirroring the
//! engine-side activity timeout.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::protocol::{ChannelMessage, Envelope};
use crate::sink::{FragmentSink, NullSink};
use crate::transport::Subscription;

/// Idle bound used when the caller does not pick one. Matches the
/// activity's start-to-close timeout.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// How a listening session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenOutcome {
    /// A terminal marker arrived; the attempt's full text is attached.
    Completed(String),
    /// An error marker arrived in place of the terminal.
    Failed(String),
    /// No message arrived within the idle timeout.
    TimedOut,
    /// The caller's cancellation token fired.
    Cancelled,
    /// The transport closed the subscription before any terminal marker.
    Disconnected,
}

/// Listener configuration.
pub struct ListenerOptions {
    /// Maximum silence between messages before giving up.
    pub idle_timeout: Duration,
    /// External cancellation, mirroring the engine-side activity timeout.
    pub cancel: CancellationToken,
    /// Receives fragments of the displayed attempt as they arrive.
    pub sink: Arc<dyn FragmentSink>,
}

impl Default for ListenerOptions {
    fn default() -> Self {
        Self {
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            cancel: CancellationToken::new(),
            sink: Arc::new(NullSink),
        }
    }
}

/// Consume a subscription until one attempt reaches its terminal marker.
///
/// Fragments accumulate in a map keyed by `(request_id, attempt)`.
/// Display (the sink) follows the first attempt observed; the returned
/// text belongs to whichever attempt terminates first. For a single,
/// non-retried execution the two are the same sequence.
///
/// Malformed payloads are logged and skipped, never fatal.
pub async fn listen(mut subscription: Subscription, options: ListenerOptions) -> ListenOutcome {
    let channel = subscription.channel().to_string();
    let mut accumulated: HashMap<(String, u32), String> = HashMap::new();
    let mut display_key: Option<(String, u32)> = None;

    loop {
        let payload = tokio::select! {
            payload = subscription.next() => payload,
            _ = tokio::time::sleep(options.idle_timeout) => {
                tracing::warn!(%channel, "no message within idle timeout");
                return ListenOutcome::TimedOut;
            }
            _ = options.cancel.cancelled() => {
                tracing::debug!(%channel, "listener cancelled");
                return ListenOutcome::Cancelled;
            }
        };

        let Some(payload) = payload else {
            tracing::warn!(%channel, "subscription closed before terminal marker");
            return ListenOutcome::Disconnected;
        };

        let envelope = match Envelope::parse(&payload) {
            Ok(envelope) => envelope,
            Err(violation) => {
                tracing::warn!(%channel, %violation, "skipping malformed message");
                continue;
            }
        };

        let key = envelope.attempt_key();
        match envelope.message {
            ChannelMessage::Fragment { chunk } => {
                if display_key.is_none() {
                    display_key = Some(key.clone());
                }
                if display_key.as_ref() == Some(&key) {
                    options.sink.on_fragment(&chunk);
                }
                accumulated.entry(key).or_default().push_str(&chunk);
            }
            ChannelMessage::Terminal => {
                let text = accumulated.remove(&key).unwrap_or_default();
                subscription.unsubscribe();
                return ListenOutcome::Completed(text);
            }
            ChannelMessage::Error { error } => {
                tracing::error!(%channel, attempt = key.1, %error, "stream reported failure");
                subscription.unsubscribe();
                return ListenOutcome::Failed(error);
            }
        }
    }
}
