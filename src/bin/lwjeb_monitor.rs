//! lwjeb-monitor: Channel tap
//!
//! Subscribes to the configured Redis channels and logs the type name and
//! payload size of every envelope that passes through. Envelopes are only
//! parsed, never decoded, so no message types need to be registered.
//!
//! ## Configuration
//! - First argument: optional path to a YAML config file
//! - LWJEB__REDIS__URL: Redis URL (default: redis://localhost:6379)
//! - LWJEB__BRIDGE__CHANNELS: comma-separated channels (default: LWJEB)
//! - LWJEB_LOG: log filter (default: info)

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use lwjeb_redis::broker::{BrokerConnection, BrokerPool, MessageSink, RedisPool};
use lwjeb_redis::config::Config;
use lwjeb_redis::utils::bootstrap::init_tracing;
use lwjeb_redis::Envelope;

/// Logs envelope headers.
struct EnvelopeLogger;

impl MessageSink for EnvelopeLogger {
    fn on_message(&self, channel: &str, payload: &str) {
        match Envelope::parse(payload) {
            Ok(envelope) => info!(
                channel = %channel,
                type_name = envelope.type_name,
                payload_bytes = envelope.payload.len(),
                "Envelope"
            ),
            Err(e) => warn!(channel = %channel, error = %e, "Malformed envelope"),
        }
    }
}

async fn tap(pool: Arc<RedisPool>, channel: String, reconnect_delay: Duration) {
    loop {
        match pool.acquire().await {
            Ok(mut connection) => {
                if let Err(e) = connection.subscribe(&channel, &EnvelopeLogger).await {
                    warn!(channel = %channel, error = %e, "Subscription failed");
                }
            }
            Err(e) => warn!(channel = %channel, error = %e, "Failed to acquire connection"),
        }
        tokio::time::sleep(reconnect_delay).await;
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let path = std::env::args().nth(1);
    let config = Config::load(path.as_deref())?;

    let pool = Arc::new(RedisPool::from_config(&config.redis).await?);

    let taps: Vec<_> = config
        .bridge
        .channels
        .iter()
        .map(|channel| {
            tokio::spawn(tap(
                pool.clone(),
                channel.clone(),
                config.bridge.reconnect_delay(),
            ))
        })
        .collect();

    info!(channels = ?config.bridge.channels, "lwjeb-monitor started");

    tokio::signal::ctrl_c().await?;

    for handle in &taps {
        handle.abort();
    }
    info!("lwjeb-monitor stopped");

    Ok(())
}
