//! Broker connection capability.
//!
//! This module contains:
//! - `BrokerPool` trait: hands out scoped connections
//! - `BrokerConnection` trait: publish and blocking subscribe on one connection
//! - `MessageSink` trait: receives payloads from a running subscription
//! - Implementations: Redis, in-memory

use async_trait::async_trait;

// Implementation modules
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;

// Re-exports
pub use memory::MemoryBroker;
#[cfg(feature = "redis")]
pub use self::redis::{RedisConnection, RedisPool};

/// Result type for broker operations.
pub type Result<T> = std::result::Result<T, BrokerError>;

/// Errors that can occur talking to a broker.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Subscribe failed: {0}")]
    Subscribe(String),

    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
}

/// Receives messages delivered to a subscription.
///
/// Called inline from the subscribe loop, so implementations must not block.
pub trait MessageSink: Send + Sync {
    fn on_message(&self, channel: &str, payload: &str);
}

/// One connection checked out of a [`BrokerPool`].
///
/// Dropping the connection returns it to the pool.
#[async_trait]
pub trait BrokerConnection: Send {
    /// Publish `payload` on `channel`.
    ///
    /// Returns the number of subscribers the broker delivered to.
    async fn publish(&mut self, channel: &str, payload: &str) -> Result<usize>;

    /// Subscribe to `channel` and feed every message to `sink`.
    ///
    /// Does not return until the subscription ends: the broker disconnects,
    /// the stream closes, or the surrounding task is aborted.
    async fn subscribe(&mut self, channel: &str, sink: &dyn MessageSink) -> Result<()>;
}

/// Source of broker connections.
#[async_trait]
pub trait BrokerPool: Send + Sync + 'static {
    type Connection: BrokerConnection + 'static;

    /// Check a connection out of the pool.
    async fn acquire(&self) -> Result<Self::Connection>;
}
