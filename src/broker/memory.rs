//! In-memory broker for tests and single-process use.
//!
//! Channels are tokio broadcast channels, so every subscription on a channel
//! receives every message published after it attached. A channel exists only
//! while something is subscribed to it. Supports forced
//! disconnects and failure injection to exercise reconnect paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, watch, RwLock};
use tracing::{debug, warn};

use super::{BrokerConnection, BrokerError, BrokerPool, MessageSink, Result};

/// Channel capacity for broadcast.
const CHANNEL_CAPACITY: usize = 1024;

/// In-memory broker. Clones share the same channels.
#[derive(Clone)]
pub struct MemoryBroker {
    inner: Arc<Inner>,
}

struct Inner {
    channels: RwLock<HashMap<String, broadcast::Sender<String>>>,
    /// Bumped to end every live subscription.
    disconnects: watch::Sender<u64>,
    acquired: AtomicUsize,
    released: AtomicUsize,
    refuse_connections: AtomicBool,
    fail_on_publish: AtomicBool,
}

impl MemoryBroker {
    pub fn new() -> Self {
        let (disconnects, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                channels: RwLock::new(HashMap::new()),
                disconnects,
                acquired: AtomicUsize::new(0),
                released: AtomicUsize::new(0),
                refuse_connections: AtomicBool::new(false),
                fail_on_publish: AtomicBool::new(false),
            }),
        }
    }

    /// Make `acquire` fail until reset.
    pub fn set_refuse_connections(&self, refuse: bool) {
        self.inner.refuse_connections.store(refuse, Ordering::SeqCst);
    }

    /// Make `publish` fail until reset.
    pub fn set_fail_on_publish(&self, fail: bool) {
        self.inner.fail_on_publish.store(fail, Ordering::SeqCst);
    }

    /// End every active subscription, as if the broker dropped its clients.
    pub fn disconnect_all(&self) {
        self.inner.disconnects.send_modify(|generation| *generation += 1);
        debug!("Disconnected all memory broker subscriptions");
    }

    /// Number of live subscriptions on `channel`.
    pub async fn subscriber_count(&self, channel: &str) -> usize {
        self.inner
            .channels
            .read()
            .await
            .get(channel)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }

    /// Total connections handed out.
    pub fn acquired_count(&self) -> usize {
        self.inner.acquired.load(Ordering::SeqCst)
    }

    /// Total connections returned.
    pub fn released_count(&self) -> usize {
        self.inner.released.load(Ordering::SeqCst)
    }

    /// Connections currently checked out.
    pub fn active_connections(&self) -> usize {
        // Load releases first so a concurrent checkout cannot push them past acquires
        let released = self.released_count();
        self.acquired_count().saturating_sub(released)
    }

    /// Channels with at least one live subscription.
    pub async fn channel_count(&self) -> usize {
        self.inner.channels.read().await.len()
    }

    async fn send(&self, channel: &str, payload: &str) -> usize {
        match self.inner.channels.read().await.get(channel) {
            // No receivers is not an error, same as Redis PUBLISH returning 0
            Some(sender) => sender.send(payload.to_string()).unwrap_or(0),
            None => 0,
        }
    }

    async fn attach(&self, channel: &str) -> broadcast::Receiver<String> {
        if let Some(sender) = self.inner.channels.read().await.get(channel) {
            return sender.subscribe();
        }
        self.inner
            .channels
            .write()
            .await
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Drop the channel once its last subscription has gone.
    async fn detach(&self, channel: &str) {
        let mut channels = self.inner.channels.write().await;
        if channels
            .get(channel)
            .is_some_and(|sender| sender.receiver_count() == 0)
        {
            channels.remove(channel);
            debug!(channel = %channel, "Removed idle memory channel");
        }
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrokerPool for MemoryBroker {
    type Connection = MemoryConnection;

    async fn acquire(&self) -> Result<MemoryConnection> {
        if self.inner.refuse_connections.load(Ordering::SeqCst) {
            return Err(BrokerError::Connection(
                "memory broker refusing connections".to_string(),
            ));
        }
        self.inner.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryConnection {
            broker: self.clone(),
        })
    }
}

/// Connection checked out of a [`MemoryBroker`].
pub struct MemoryConnection {
    broker: MemoryBroker,
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.broker.inner.released.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl BrokerConnection for MemoryConnection {
    async fn publish(&mut self, channel: &str, payload: &str) -> Result<usize> {
        if self.broker.inner.fail_on_publish.load(Ordering::SeqCst) {
            return Err(BrokerError::Publish("mock publish failure".to_string()));
        }

        let receivers = self.broker.send(channel, payload).await;
        debug!(channel = %channel, receivers, "Published to memory broker");
        Ok(receivers)
    }

    async fn subscribe(&mut self, channel: &str, sink: &dyn MessageSink) -> Result<()> {
        let mut disconnects = self.broker.inner.disconnects.subscribe();
        let mut receiver = self.broker.attach(channel).await;

        loop {
            tokio::select! {
                message = receiver.recv() => match message {
                    Ok(payload) => sink.on_message(channel, &payload),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(channel = %channel, skipped, "Memory subscription lagged, skipped messages");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = disconnects.changed() => {
                    debug!(channel = %channel, "Memory subscription disconnected");
                    break;
                }
            }
        }

        drop(receiver);
        self.broker.detach(channel).await;
        Ok(())
    }
}
