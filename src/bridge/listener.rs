//! Channel listener task.
//!
//! One listener consumes one channel subscription. It keeps re-acquiring a
//! connection and re-subscribing until the bridge's running flag drops, or
//! until its task is aborted while waiting on the broker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::broker::{BrokerConnection, BrokerPool, MessageSink};
use crate::bus::LocalBus;
use crate::codec::EnvelopeCodec;

/// Decodes inbound payloads and hands them to the local bus.
pub(crate) struct InboundSink<B: LocalBus> {
    bus: Arc<B>,
    codec: EnvelopeCodec,
}

impl<B: LocalBus> InboundSink<B> {
    pub(crate) fn new(bus: Arc<B>, codec: EnvelopeCodec) -> Self {
        Self { bus, codec }
    }
}

impl<B: LocalBus> MessageSink for InboundSink<B> {
    fn on_message(&self, channel: &str, payload: &str) {
        match self.codec.decode(payload) {
            Ok(topic) => {
                debug!(
                    channel = %channel,
                    type_name = topic.type_name(),
                    "Received bridged message"
                );
                let message = self.bus.resolve_publisher(topic);
                self.bus.enqueue(message);
            }
            // Never propagate: one bad message must not end the listener
            Err(e) => self.bus.exception_handler().handle_exception(&e),
        }
    }
}

pub(crate) struct Listener<P: BrokerPool, B: LocalBus> {
    pool: Arc<P>,
    channel: String,
    running: Arc<AtomicBool>,
    sink: InboundSink<B>,
    reconnect_delay: Duration,
}

impl<P: BrokerPool, B: LocalBus> Listener<P, B> {
    pub(crate) fn new(
        pool: Arc<P>,
        channel: String,
        running: Arc<AtomicBool>,
        sink: InboundSink<B>,
        reconnect_delay: Duration,
    ) -> Self {
        Self {
            pool,
            channel,
            running,
            sink,
            reconnect_delay,
        }
    }

    pub(crate) async fn run(self) {
        info!(channel = %self.channel, "Listener started");

        while self.running.load(Ordering::Acquire) {
            let failed = match self.pool.acquire().await {
                Ok(mut connection) => {
                    match connection.subscribe(&self.channel, &self.sink).await {
                        Ok(()) => {
                            debug!(channel = %self.channel, "Subscription ended");
                            false
                        }
                        Err(e) => {
                            warn!(channel = %self.channel, error = %e, "Subscription failed");
                            true
                        }
                    }
                }
                Err(e) => {
                    warn!(channel = %self.channel, error = %e, "Failed to acquire connection");
                    true
                }
            };

            if failed && !self.reconnect_delay.is_zero() && self.running.load(Ordering::Acquire) {
                tokio::time::sleep(self.reconnect_delay).await;
            } else {
                tokio::task::yield_now().await;
            }
        }

        info!(channel = %self.channel, "Listener stopped");
    }
}
