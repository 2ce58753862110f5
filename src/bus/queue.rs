//! In-process inbound queue.
//!
//! A minimal [`LocalBus`] backed by an unbounded tokio mpsc channel. The
//! consuming side owns an [`InboundQueue`] and drains it at its own pace;
//! shutting the bus down closes the queue once it is drained.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{ExceptionHandler, LocalBus, LoggingExceptionHandler};
use crate::message::DecodedTopic;

/// A decoded message waiting on the inbound queue.
#[derive(Debug)]
pub struct InboundMessage {
    /// Assigned on arrival, for log correlation.
    pub id: Uuid,
    pub topic: DecodedTopic,
    pub received_at: DateTime<Utc>,
}

/// Bus whose inbound queue is a tokio mpsc channel.
pub struct QueueBus {
    identifier: String,
    /// `None` once shut down.
    sender: Mutex<Option<mpsc::UnboundedSender<InboundMessage>>>,
    exception_handler: Arc<dyn ExceptionHandler>,
}

impl QueueBus {
    /// Create a bus and the queue it feeds.
    pub fn new(identifier: impl Into<String>) -> (Self, InboundQueue) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let identifier = identifier.into();

        info!(bus = %identifier, "Queue bus initialized");

        let bus = Self {
            identifier,
            sender: Mutex::new(Some(sender)),
            exception_handler: Arc::new(LoggingExceptionHandler),
        };
        (bus, InboundQueue { receiver })
    }

    /// Replace the default logging exception handler.
    pub fn with_exception_handler(mut self, handler: Arc<dyn ExceptionHandler>) -> Self {
        self.exception_handler = handler;
        self
    }

    pub fn is_shut_down(&self) -> bool {
        match self.sender.lock() {
            Ok(sender) => sender.is_none(),
            Err(poisoned) => poisoned.into_inner().is_none(),
        }
    }
}

impl LocalBus for QueueBus {
    type Message = InboundMessage;

    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn resolve_publisher(&self, topic: DecodedTopic) -> InboundMessage {
        InboundMessage {
            id: Uuid::new_v4(),
            topic,
            received_at: Utc::now(),
        }
    }

    fn enqueue(&self, message: InboundMessage) {
        let Ok(sender) = self.sender.lock() else {
            return;
        };
        let Some(sender) = sender.as_ref() else {
            warn!(
                bus = %self.identifier,
                type_name = message.topic.type_name(),
                "Bus shut down, dropping inbound message"
            );
            return;
        };

        let id = message.id;
        if sender.send(message).is_err() {
            debug!(bus = %self.identifier, %id, "Inbound queue closed, message dropped");
        }
    }

    fn exception_handler(&self) -> Arc<dyn ExceptionHandler> {
        self.exception_handler.clone()
    }

    fn shutdown(&self) {
        let closed = match self.sender.lock() {
            Ok(mut sender) => sender.take().is_some(),
            Err(poisoned) => poisoned.into_inner().take().is_some(),
        };
        if closed {
            info!(bus = %self.identifier, "Queue bus shut down");
        }
    }
}

/// Receiving end of a [`QueueBus`].
pub struct InboundQueue {
    receiver: mpsc::UnboundedReceiver<InboundMessage>,
}

impl InboundQueue {
    /// Wait for the next message.
    ///
    /// Returns `None` once the bus is shut down and the queue is drained.
    pub async fn recv(&mut self) -> Option<InboundMessage> {
        self.receiver.recv().await
    }

    /// Take the next message if one is ready.
    pub fn try_recv(&mut self) -> Option<InboundMessage> {
        self.receiver.try_recv().ok()
    }
}
