//! Redis broker backend.
//!
//! Publishes go through a shared `ConnectionManager`, which multiplexes and
//! reconnects on its own. Each subscription opens a dedicated pub/sub
//! connection, since a connection in subscribe mode cannot issue other
//! commands. A semaphore bounds how many of those subscriptions are open at
//! once; publishing never waits on it.

use std::borrow::Cow;
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

use super::{BrokerConnection, BrokerError, BrokerPool, MessageSink, Result};
use crate::config::RedisConfig;

/// Redis connection pool.
pub struct RedisPool {
    client: Client,
    manager: ConnectionManager,
    permits: Arc<Semaphore>,
    max_connections: usize,
}

impl RedisPool {
    /// Connect to Redis.
    ///
    /// # Arguments
    /// * `url` - Redis connection URL (e.g., redis://localhost:6379)
    /// * `max_connections` - Upper bound on open subscription connections
    pub async fn new(url: &str, max_connections: usize) -> Result<Self> {
        let client = Client::open(url)?;
        let manager = ConnectionManager::new(client.clone()).await?;
        let max_connections = max_connections.max(1);

        info!(url = %url, max_connections, "Connected to Redis");

        Ok(Self {
            client,
            manager,
            permits: Arc::new(Semaphore::new(max_connections)),
            max_connections,
        })
    }

    pub async fn from_config(config: &RedisConfig) -> Result<Self> {
        Self::new(&config.url, config.max_connections).await
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Subscriptions that can be opened without waiting.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

#[async_trait]
impl BrokerPool for RedisPool {
    type Connection = RedisConnection;

    async fn acquire(&self) -> Result<RedisConnection> {
        Ok(RedisConnection {
            client: self.client.clone(),
            manager: self.manager.clone(),
            permits: self.permits.clone(),
            max_connections: self.max_connections,
        })
    }
}

/// Connection checked out of a [`RedisPool`].
///
/// Holds a pool permit only while [`subscribe`](BrokerConnection::subscribe)
/// runs.
pub struct RedisConnection {
    client: Client,
    manager: ConnectionManager,
    permits: Arc<Semaphore>,
    max_connections: usize,
}

impl RedisConnection {
    async fn subscription_permit(&self, channel: &str) -> Result<OwnedSemaphorePermit> {
        if let Ok(permit) = self.permits.clone().try_acquire_owned() {
            return Ok(permit);
        }

        warn!(
            channel = %channel,
            max_connections = self.max_connections,
            "Redis subscription limit reached, waiting for a free connection"
        );
        self.permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| BrokerError::Connection(format!("Redis pool closed: {}", e)))
    }
}

/// Pub/sub payloads are binary-safe; invalid UTF-8 is replaced so the codec
/// reports it rather than the message vanishing.
fn payload_text(payload: &[u8]) -> Cow<'_, str> {
    String::from_utf8_lossy(payload)
}

#[async_trait]
impl BrokerConnection for RedisConnection {
    async fn publish(&mut self, channel: &str, payload: &str) -> Result<usize> {
        let receivers: usize = self.manager.publish(channel, payload).await?;
        debug!(channel = %channel, receivers, "Published to Redis");
        Ok(receivers)
    }

    async fn subscribe(&mut self, channel: &str, sink: &dyn MessageSink) -> Result<()> {
        let _permit = self.subscription_permit(channel).await?;
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(channel).await?;

        info!(channel = %channel, "Subscribed to Redis channel");

        let mut messages = pubsub.on_message();
        while let Some(message) = messages.next().await {
            let payload = payload_text(message.get_payload_bytes());
            if matches!(payload, Cow::Owned(_)) {
                debug!(channel = %channel, "Redis message was not valid UTF-8");
            }
            sink.on_message(message.get_channel_name(), &payload);
        }

        info!(channel = %channel, "Redis subscription stream ended");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{CodecError, EnvelopeCodec};

    #[test]
    fn test_payload_text_passes_utf8_through() {
        let payload = payload_text("5:a.b.c{}".as_bytes());
        assert!(matches!(payload, Cow::Borrowed("5:a.b.c{}")));
    }

    #[test]
    fn test_invalid_utf8_reaches_codec_as_malformed() {
        let payload = payload_text(&[0xff, 0xfe, b'{', b'}']);
        assert!(matches!(payload, Cow::Owned(_)));

        let result = EnvelopeCodec::global().decode(&payload);
        assert!(matches!(result, Err(CodecError::Malformed(_))));
    }
}
