//! Test utilities and mock implementations.
//!
//! Message types, a recording local bus and helpers for waiting on
//! asynchronous listeners without a real broker.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::broker::memory::MemoryBroker;
use crate::bus::{ExceptionHandler, LocalBus};
use crate::codec::CodecError;
use crate::message::DecodedTopic;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerJoined {
    pub name: String,
    pub level: u32,
}

impl PlayerJoined {
    pub fn new(name: &str, level: u32) -> Self {
        Self {
            name: name.to_string(),
            level,
        }
    }
}

crate::register_message!(PlayerJoined, "test.PlayerJoined");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub room: String,
    pub text: String,
}

impl ChatMessage {
    pub fn new(room: &str, text: &str) -> Self {
        Self {
            room: room.to_string(),
            text: text.to_string(),
        }
    }
}

crate::register_message!(ChatMessage, "test.ChatMessage");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreUpdate(pub i64);

crate::register_message!(ScoreUpdate);

/// Exception handler that counts failures by kind.
#[derive(Default)]
pub struct CountingExceptionHandler {
    malformed: AtomicUsize,
    unknown_type: AtomicUsize,
    serialization: AtomicUsize,
}

impl CountingExceptionHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn malformed(&self) -> usize {
        self.malformed.load(Ordering::SeqCst)
    }

    pub fn unknown_type(&self) -> usize {
        self.unknown_type.load(Ordering::SeqCst)
    }

    pub fn serialization(&self) -> usize {
        self.serialization.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> usize {
        self.malformed() + self.unknown_type() + self.serialization()
    }
}

impl ExceptionHandler for CountingExceptionHandler {
    fn handle_exception(&self, error: &CodecError) {
        let counter = match error {
            CodecError::Malformed(_) => &self.malformed,
            CodecError::UnknownType(_) => &self.unknown_type,
            CodecError::Serialization(_) => &self.serialization,
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

/// Local bus that records everything handed to it.
pub struct RecordingBus {
    received: Mutex<Vec<DecodedTopic>>,
    exception_handler: Arc<CountingExceptionHandler>,
    shutdowns: AtomicUsize,
}

impl RecordingBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            received: Mutex::new(Vec::new()),
            exception_handler: CountingExceptionHandler::new(),
            shutdowns: AtomicUsize::new(0),
        })
    }

    pub fn received_count(&self) -> usize {
        self.received.lock().unwrap().len()
    }

    pub fn take_received(&self) -> Vec<DecodedTopic> {
        std::mem::take(&mut *self.received.lock().unwrap())
    }

    pub fn errors(&self) -> &CountingExceptionHandler {
        &self.exception_handler
    }

    pub fn shutdown_count(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

impl LocalBus for RecordingBus {
    type Message = DecodedTopic;

    fn identifier(&self) -> &str {
        "recording"
    }

    fn resolve_publisher(&self, topic: DecodedTopic) -> DecodedTopic {
        topic
    }

    fn enqueue(&self, message: DecodedTopic) {
        self.received.lock().unwrap().push(message);
    }

    fn exception_handler(&self) -> Arc<dyn ExceptionHandler> {
        self.exception_handler.clone()
    }

    fn shutdown(&self) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}

/// Poll `condition` until it holds or `timeout` elapses.
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

/// Wait until `count` listeners are attached to `channel`.
pub async fn wait_for_subscribers(broker: &MemoryBroker, channel: &str, count: usize) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if broker.subscriber_count(channel).await >= count {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}
