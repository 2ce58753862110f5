//! LWJEB Redis bridge.
//!
//! Forwards messages published on an in-process event bus to Redis pub/sub
//! channels, and re-publishes messages arriving on those channels onto the
//! local bus of every subscribed process.
//!
//! Messages travel as self-describing envelopes (`<len>:<type name><json>`),
//! so a receiver can rebuild the exact concrete type from its
//! [`TypeRegistry`](registry::TypeRegistry) without a shared schema.
//!
//! ```ignore
//! use std::sync::Arc;
//! use lwjeb_redis::{broker::RedisPool, bus::QueueBus, BusBridge};
//!
//! let (bus, mut inbound) = QueueBus::new("game");
//! let bridge = BusBridge::new(Arc::new(bus));
//! let pool = Arc::new(RedisPool::new("redis://localhost:6379", 16).await?);
//!
//! bridge.subscribe_to_default_channel(pool.clone()).await?;
//! bridge.publish(pool.as_ref(), &PlayerJoined { name: "hippo".into() }).await?;
//! ```

pub mod bridge;
pub mod broker;
pub mod bus;
pub mod codec;
pub mod config;
pub mod message;
pub mod registry;
pub mod utils;

#[cfg(test)]
mod test_utils;

// Used by `register_message!`
#[doc(hidden)]
pub use inventory;

pub use bridge::{BridgeError, BusBridge, DEFAULT_CHANNEL};
pub use codec::{CodecError, Envelope, EnvelopeCodec};
pub use message::{BridgeMessage, DecodedTopic};
pub use registry::TypeRegistry;
