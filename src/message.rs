//! Message types that can cross the bridge.
//!
//! A bridged message is any serde type with a stable, process-independent
//! type name. Use [`register_message!`](crate::register_message) to implement
//! [`BridgeMessage`] and add the type to the process-wide registry in one step.

use std::any::Any;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// A message type that can be published on and reconstructed from a channel.
pub trait BridgeMessage: Serialize + DeserializeOwned + fmt::Debug + Send + Sync + 'static {
    /// Fully-qualified name carried inline in every envelope.
    ///
    /// Must resolve to the same type in every process sharing a channel.
    const TYPE_NAME: &'static str;
}

/// Object-safe view of a decoded message.
pub trait Topic: Any + fmt::Debug + Send + Sync {
    /// Type name the message was registered under.
    fn type_name(&self) -> &'static str;

    fn as_any(&self) -> &dyn Any;

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send + Sync>;
}

impl<T: BridgeMessage> Topic for T {
    fn type_name(&self) -> &'static str {
        T::TYPE_NAME
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send + Sync> {
        self
    }
}

/// A message reconstructed from an envelope, concrete type erased.
///
/// The original type is recovered with [`downcast_ref`](Self::downcast_ref)
/// or [`downcast`](Self::downcast).
#[derive(Debug)]
pub struct DecodedTopic {
    inner: Box<dyn Topic>,
}

impl DecodedTopic {
    pub fn new(inner: Box<dyn Topic>) -> Self {
        Self { inner }
    }

    /// Type name from the envelope this message was decoded from.
    pub fn type_name(&self) -> &'static str {
        self.inner.type_name()
    }

    /// Check whether the decoded message is a `T`.
    pub fn is<T: BridgeMessage>(&self) -> bool {
        self.inner.as_any().is::<T>()
    }

    pub fn downcast_ref<T: BridgeMessage>(&self) -> Option<&T> {
        self.inner.as_any().downcast_ref::<T>()
    }

    /// Take ownership of the decoded message as a `T`.
    ///
    /// Returns `None` if the message is of another type.
    pub fn downcast<T: BridgeMessage>(self) -> Option<T> {
        self.inner.into_any().downcast::<T>().ok().map(|boxed| *boxed)
    }
}

impl<T: BridgeMessage> From<T> for DecodedTopic {
    fn from(message: T) -> Self {
        Self::new(Box::new(message))
    }
}
