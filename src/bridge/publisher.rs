//! Connection-scoped publishing.

use tracing::debug;

use crate::broker::{BrokerConnection, BrokerPool, Result};

/// Publish an already-encoded envelope on one freshly acquired connection.
///
/// The connection is dropped, and so returned to the pool, on every exit
/// path including a failed broker call.
pub(crate) async fn publish_envelope<P: BrokerPool>(
    pool: &P,
    channel: &str,
    envelope: &str,
) -> Result<usize> {
    let mut connection = pool.acquire().await?;
    let receivers = connection.publish(channel, envelope).await?;

    debug!(
        channel = %channel,
        receivers,
        bytes = envelope.len(),
        "Published envelope"
    );

    Ok(receivers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{BrokerError, MemoryBroker};

    #[tokio::test]
    async fn test_publish_releases_connection() {
        let broker = MemoryBroker::new();

        publish_envelope(&broker, "LWJEB", "3:abc{}").await.unwrap();
        publish_envelope(&broker, "LWJEB", "3:abc{}").await.unwrap();

        assert_eq!(broker.acquired_count(), 2);
        assert_eq!(broker.active_connections(), 0);
    }

    #[tokio::test]
    async fn test_publish_releases_connection_on_failure() {
        let broker = MemoryBroker::new();
        broker.set_fail_on_publish(true);

        let result = publish_envelope(&broker, "LWJEB", "3:abc{}").await;

        assert!(matches!(result, Err(BrokerError::Publish(_))));
        assert_eq!(broker.acquired_count(), 1);
        assert_eq!(broker.active_connections(), 0);
    }

    #[tokio::test]
    async fn test_publish_acquire_failure() {
        let broker = MemoryBroker::new();
        broker.set_refuse_connections(true);

        let result = publish_envelope(&broker, "LWJEB", "3:abc{}").await;
        assert!(matches!(result, Err(BrokerError::Connection(_))));
    }
}
