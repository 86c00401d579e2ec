//! Pub/sub transport boundary.
//!
//! The bridge only ever needs `publish` and `subscribe`; everything else —
//! fan-out, buffering, delivery — belongs to the transport. Two
//! implementations are provided: [`RedisTransport`] for production and
//! [`InProcessTransport`] for tests and single-process runs.
//!
//! Delivery semantics are the usual pub/sub ones: a message reaches only
//! the subscribers that were already subscribed when it was published, and
//! arrives in publish order per channel for any single subscriber.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use redis::AsyncCommands;
use tokio::sync::broadcast;

use crate::config::Config;
use crate::error::TransportError;

/// A live subscription: a lazy sequence of raw payloads from one channel.
///
/// Dropping the subscription unsubscribes.
pub struct Subscription {
    channel: String,
    messages: BoxStream<'static, String>,
}

impl Subscription {
    pub fn new(channel: impl Into<String>, messages: BoxStream<'static, String>) -> Self {
        Self {
            channel: channel.into(),
            messages,
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Wait for the next payload. `None` means the channel is gone
    /// (transport closed or all producers dropped).
    pub async fn next(&mut self) -> Option<String> {
        self.messages.next().await
    }

    /// Explicitly end the subscription.
    pub fn unsubscribe(self) {
        tracing::debug!(channel = %self.channel, "unsubscribed");
    }
}

/// The transport contract the publisher and listener are written against.
#[async_trait]
pub trait PubSubTransport: Send + Sync {
    /// Publish one payload to a channel, awaiting the transport's ack.
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), TransportError>;

    /// Subscribe to a channel. Messages published after this call resolves
    /// are delivered in order.
    async fn subscribe(&self, channel: &str) -> Result<Subscription, TransportError>;
}

// ---------------------------------------------------------------------------
// Redis
// ---------------------------------------------------------------------------

/// Redis pub/sub transport.
///
/// The connection is scoped to this value: acquired in `connect`, released
/// when the transport is dropped.
pub struct RedisTransport {
    client: redis::Client,
    conn: redis::aio::MultiplexedConnection,
}

impl RedisTransport {
    /// Connect to the Redis server named by the configuration.
    pub async fn connect(config: &Config) -> Result<Self, TransportError> {
        let url = config.redis_url();
        let client = redis::Client::open(url.as_str())
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        tracing::debug!(%url, "connected to redis");
        Ok(Self { client, conn })
    }
}

#[async_trait]
impl PubSubTransport for RedisTransport {
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), TransportError> {
        let mut conn = self.conn.clone();
        let _receivers: i64 =
            conn.publish(channel, payload)
                .await
                .map_err(|e| TransportError::Publish {
                    channel: channel.to_string(),
                    detail: e.to_string(),
                })?;
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription, TransportError> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| TransportError::Subscribe {
                channel: channel.to_string(),
                detail: e.to_string(),
            })?;
        pubsub
            .subscribe(channel)
            .await
            .map_err(|e| TransportError::Subscribe {
                channel: channel.to_string(),
                detail: e.to_string(),
            })?;

        let messages = pubsub
            .into_on_message()
            .filter_map(|msg| async move {
                match msg.get_payload::<String>() {
                    Ok(payload) => Some(payload),
                    Err(e) => {
                        tracing::warn!(error = %e, "dropping non-utf8 redis payload");
                        None
                    }
                }
            })
            .boxed();

        Ok(Subscription::new(channel, messages))
    }
}

// ---------------------------------------------------------------------------
// In-process
// ---------------------------------------------------------------------------

/// Per-channel broadcast buffer; generous enough for a full capped
/// response (1000 fragments) plus markers.
const IN_PROCESS_CAPACITY: usize = 4096;

/// Broadcast-channel transport for tests and single-process runs.
///
/// Preserves per-channel FIFO order and, like any pub/sub transport,
/// delivers only to subscribers that exist at publish time.
#[derive(Default)]
pub struct InProcessTransport {
    channels: Mutex<HashMap<String, broadcast::Sender<String>>>,
}

impl InProcessTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn sender(&self, channel: &str) -> broadcast::Sender<String> {
        let mut channels = self.channels.lock().expect("lock poisoned");
        channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(IN_PROCESS_CAPACITY).0)
            .clone()
    }
}

#[async_trait]
impl PubSubTransport for InProcessTransport {
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), TransportError> {
        // A send with no live subscribers is not an error: pub/sub delivery
        // is best-effort to whoever is listening right now.
        let _ = self.sender(channel).send(payload.to_string());
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription, TransportError> {
        let rx = self.sender(channel).subscribe();
        let messages = futures::stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(payload) => return Some((payload, rx)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "in-process subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
        .boxed();

        Ok(Subscription::new(channel, messages))
    }
}
