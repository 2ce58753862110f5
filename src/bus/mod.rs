//! Local bus adapter.
//!
//! This module contains:
//! - `LocalBus` trait: the in-process bus decoded messages are handed to
//! - `ExceptionHandler` trait: where decode failures are reported
//! - Implementations: `QueueBus` (tokio mpsc inbound queue)

use std::sync::Arc;

use tracing::error;

use crate::codec::CodecError;
use crate::message::DecodedTopic;

// Implementation modules
pub mod queue;

// Re-exports
pub use queue::{InboundMessage, InboundQueue, QueueBus};

/// Receives decode failures raised while consuming a channel.
///
/// Called from listener tasks; must not block.
pub trait ExceptionHandler: Send + Sync {
    fn handle_exception(&self, error: &CodecError);
}

/// Reports decode failures through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingExceptionHandler;

impl ExceptionHandler for LoggingExceptionHandler {
    fn handle_exception(&self, error: &CodecError) {
        error!(error = %error, "Failed to decode bridged message");
    }
}

/// The in-process bus a bridge feeds.
///
/// After a successful decode the bridge calls
/// [`resolve_publisher`](Self::resolve_publisher) and then
/// [`enqueue`](Self::enqueue), in that order.
pub trait LocalBus: Send + Sync + 'static {
    /// What the bus queues for dispatch.
    type Message: Send;

    /// Name used to label listener tasks.
    fn identifier(&self) -> &str;

    /// Wrap a decoded message for delivery on this bus.
    fn resolve_publisher(&self, topic: DecodedTopic) -> Self::Message;

    /// Push a message onto the bus's inbound queue.
    fn enqueue(&self, message: Self::Message);

    /// Handler for messages that could not be decoded.
    fn exception_handler(&self) -> Arc<dyn ExceptionHandler>;

    /// Stop the bus. Called once, after every listener has been stopped.
    fn shutdown(&self);
}
