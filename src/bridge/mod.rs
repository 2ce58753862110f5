//! Bridge between a local bus and broker channels.
//!
//! ```text
//! producer --publish--> [codec] --> pool connection --> broker channel
//!                                                            |
//! local bus <--enqueue-- [codec] <-- listener task <---------+
//! ```
//!
//! A [`BusBridge`] owns one listener task per subscribe call and a running
//! flag shared by all of them. [`BusBridge::shutdown`] drops the flag, aborts
//! the listeners and then shuts down the local bus.
//!
//! There is a narrow window during shutdown where a listener that has just
//! received a message can still enqueue it while the bus is stopping. Buses
//! must tolerate an enqueue racing their own shutdown.

mod listener;
mod publisher;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, Instrument};

use crate::broker::{BrokerError, BrokerPool};
use crate::bus::LocalBus;
use crate::codec::{CodecError, EnvelopeCodec};
use crate::config::BridgeConfig;
use crate::message::BridgeMessage;
use crate::registry::TypeRegistry;

use listener::{InboundSink, Listener};

/// Channel used when the caller does not name one.
pub const DEFAULT_CHANNEL: &str = "LWJEB";

/// Pause after a failed connect or subscribe before a listener retries.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(250);

/// Result type for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Errors that can occur during bridge operations.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error("Bridge has been shut down")]
    ShutDown,
}

/// Forwards messages between a [`LocalBus`] and broker channels.
pub struct BusBridge<B: LocalBus> {
    bus: Arc<B>,
    codec: EnvelopeCodec,
    /// Shared with every listener. Only ever goes from true to false.
    running: Arc<AtomicBool>,
    listeners: Mutex<Vec<JoinHandle<()>>>,
    reconnect_delay: Duration,
}

impl<B: LocalBus> BusBridge<B> {
    /// Create a bridge that decodes against the process-wide registry.
    pub fn new(bus: Arc<B>) -> Self {
        Self::with_registry(bus, TypeRegistry::global())
    }

    /// Create a bridge that decodes against `registry`.
    pub fn with_registry(bus: Arc<B>, registry: Arc<TypeRegistry>) -> Self {
        Self {
            bus,
            codec: EnvelopeCodec::new(registry),
            running: Arc::new(AtomicBool::new(true)),
            listeners: Mutex::new(Vec::new()),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }

    /// Create a bridge from configuration, using the process-wide registry.
    pub fn from_config(bus: Arc<B>, config: &BridgeConfig) -> Self {
        Self::new(bus).with_reconnect_delay(config.reconnect_delay())
    }

    /// Set the pause listeners take after a failed connect or subscribe.
    ///
    /// Zero retries immediately.
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn bus(&self) -> &Arc<B> {
        &self.bus
    }

    pub fn codec(&self) -> &EnvelopeCodec {
        &self.codec
    }

    /// False once [`shutdown`](Self::shutdown) has been called.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Listener tasks that have not finished.
    pub async fn listener_count(&self) -> usize {
        self.listeners
            .lock()
            .await
            .iter()
            .filter(|handle| !handle.is_finished())
            .count()
    }

    /// Publish `topic` on the default channel.
    ///
    /// Returns the number of subscribers the broker delivered to.
    pub async fn publish<P, T>(&self, pool: &P, topic: &T) -> Result<usize>
    where
        P: BrokerPool,
        T: BridgeMessage,
    {
        self.publish_to(pool, DEFAULT_CHANNEL, topic).await
    }

    /// Publish `topic` on `channel`.
    ///
    /// Acquires one connection for the duration of the call. Encoding and
    /// broker failures are returned to the caller.
    #[tracing::instrument(name = "bridge.publish", skip_all, fields(channel = %channel, type_name = T::TYPE_NAME))]
    pub async fn publish_to<P, T>(&self, pool: &P, channel: &str, topic: &T) -> Result<usize>
    where
        P: BrokerPool,
        T: BridgeMessage,
    {
        let envelope = self.codec.encode(topic)?;
        let receivers = publisher::publish_envelope(pool, channel, &envelope).await?;
        Ok(receivers)
    }

    /// Start a listener on the default channel.
    pub async fn subscribe_to_default_channel<P: BrokerPool>(&self, pool: Arc<P>) -> Result<()> {
        self.subscribe_to_channel(pool, DEFAULT_CHANNEL).await
    }

    /// Start a listener on `channel`.
    ///
    /// Returns as soon as the listener task is spawned. Subscribing to the
    /// same channel twice starts two independent listeners.
    pub async fn subscribe_to_channel<P: BrokerPool>(
        &self,
        pool: Arc<P>,
        channel: &str,
    ) -> Result<()> {
        // Hold the lock across the flag check so shutdown cannot miss this task
        let mut listeners = self.listeners.lock().await;
        if !self.is_running() {
            return Err(BridgeError::ShutDown);
        }

        let sink = InboundSink::new(self.bus.clone(), self.codec.clone());
        let listener = Listener::new(
            pool,
            channel.to_string(),
            self.running.clone(),
            sink,
            self.reconnect_delay,
        );
        let span = info_span!(
            "bridge.listener",
            bus = %self.bus.identifier(),
            channel = %channel
        );

        listeners.push(tokio::spawn(listener.run().instrument(span)));

        info!(
            bus = %self.bus.identifier(),
            channel = %channel,
            listeners = listeners.len(),
            "Subscribed to channel"
        );

        Ok(())
    }

    /// Stop every listener, then shut down the local bus.
    ///
    /// Only the first call has any effect.
    pub async fn shutdown(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            debug!(bus = %self.bus.identifier(), "Bridge already shut down");
            return;
        }

        let listeners = std::mem::take(&mut *self.listeners.lock().await);
        for handle in &listeners {
            handle.abort();
        }

        info!(
            bus = %self.bus.identifier(),
            listeners = listeners.len(),
            "Bridge listeners stopped"
        );

        self.bus.shutdown();
    }
}
