//! Type registry for envelope decoding.
//!
//! Maps the type name carried in an envelope to the routine that rebuilds
//! the concrete message. Types register at link time with
//! [`register_message!`](crate::register_message); the process-wide registry
//! is assembled from those registrations on first use and is read-only
//! afterwards.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use tracing::{debug, warn};

use crate::message::{BridgeMessage, Topic};

/// Rebuilds a message from its serialized payload.
pub type DecodeFn = fn(&str) -> Result<Box<dyn Topic>, serde_json::Error>;

/// Process-wide registry, built from link-time registrations.
static GLOBAL_REGISTRY: OnceLock<Arc<TypeRegistry>> = OnceLock::new();

/// A single registered message type.
#[derive(Clone, Copy)]
pub struct MessageType {
    name: &'static str,
    decode: DecodeFn,
}

impl MessageType {
    /// Describe `T` for registration.
    pub const fn of<T: BridgeMessage>() -> Self {
        Self {
            name: T::TYPE_NAME,
            decode: decode_as::<T>,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn decode(&self, payload: &str) -> Result<Box<dyn Topic>, serde_json::Error> {
        (self.decode)(payload)
    }
}

impl std::fmt::Debug for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageType").field("name", &self.name).finish()
    }
}

inventory::collect!(MessageType);

fn decode_as<T: BridgeMessage>(payload: &str) -> Result<Box<dyn Topic>, serde_json::Error> {
    let message: T = serde_json::from_str(payload)?;
    Ok(Box::new(message))
}

/// Implement [`BridgeMessage`] for a type and register it process-wide.
///
/// Without an explicit name the type is registered under
/// `module_path!()::TypeName`. Pass a name when processes built from
/// different crates must agree on it.
///
/// ```ignore
/// #[derive(Debug, Serialize, Deserialize)]
/// struct PlayerJoined { name: String }
///
/// lwjeb_redis::register_message!(PlayerJoined, "game.PlayerJoined");
/// ```
#[macro_export]
macro_rules! register_message {
    ($ty:ident) => {
        $crate::register_message!($ty, concat!(module_path!(), "::", stringify!($ty)));
    };
    ($ty:ty, $name:expr) => {
        impl $crate::message::BridgeMessage for $ty {
            const TYPE_NAME: &'static str = $name;
        }

        $crate::inventory::submit! {
            $crate::registry::MessageType::of::<$ty>()
        }
    };
}

/// Lookup table from type name to decode routine.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: HashMap<&'static str, MessageType>,
}

impl TypeRegistry {
    /// The process-wide registry.
    ///
    /// Built from every [`register_message!`](crate::register_message)
    /// registration the first time it is requested.
    pub fn global() -> Arc<TypeRegistry> {
        GLOBAL_REGISTRY
            .get_or_init(|| Arc::new(Self::builder().with_registered().build()))
            .clone()
    }

    pub fn builder() -> TypeRegistryBuilder {
        TypeRegistryBuilder::default()
    }

    /// Find the type registered under `name`.
    pub fn resolve(&self, name: &str) -> Option<&MessageType> {
        self.types.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Registered type names, in no particular order.
    pub fn type_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.types.keys().copied()
    }
}

/// Builder for an isolated [`TypeRegistry`].
#[derive(Debug, Default)]
pub struct TypeRegistryBuilder {
    types: HashMap<&'static str, MessageType>,
}

impl TypeRegistryBuilder {
    /// Add `T` to the registry.
    pub fn register<T: BridgeMessage>(self) -> Self {
        self.add(MessageType::of::<T>())
    }

    /// Add every type registered with `register_message!`.
    pub fn with_registered(self) -> Self {
        inventory::iter::<MessageType>
            .into_iter()
            .fold(self, |builder, message_type| builder.add(*message_type))
    }

    /// Add a type description. The first registration of a name wins.
    pub fn add(mut self, message_type: MessageType) -> Self {
        if self.types.contains_key(message_type.name) {
            warn!(
                type_name = message_type.name,
                "Duplicate message type registration ignored"
            );
            return self;
        }
        debug!(type_name = message_type.name, "Registered message type");
        self.types.insert(message_type.name, message_type);
        self
    }

    pub fn build(self) -> TypeRegistry {
        TypeRegistry { types: self.types }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{ChatMessage, PlayerJoined, ScoreUpdate};

    #[test]
    fn test_builder_registers_types() {
        let registry = TypeRegistry::builder()
            .register::<PlayerJoined>()
            .register::<ChatMessage>()
            .build();

        assert_eq!(registry.len(), 2);
        assert!(registry.contains(PlayerJoined::TYPE_NAME));
        assert!(registry.contains(ChatMessage::TYPE_NAME));
        assert!(!registry.contains(ScoreUpdate::TYPE_NAME));
    }

    #[test]
    fn test_empty_registry() {
        let registry = TypeRegistry::builder().build();
        assert!(registry.is_empty());
        assert!(registry.resolve(PlayerJoined::TYPE_NAME).is_none());
    }

    #[test]
    fn test_duplicate_registration_keeps_first() {
        let registry = TypeRegistry::builder()
            .register::<PlayerJoined>()
            .register::<PlayerJoined>()
            .build();

        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_global_registry_contains_registered_types() {
        let registry = TypeRegistry::global();

        assert!(registry.contains("test.PlayerJoined"));
        assert!(registry.contains("test.ChatMessage"));
        assert!(registry.contains(ScoreUpdate::TYPE_NAME));
    }

    #[test]
    fn test_default_type_name_uses_module_path() {
        assert_eq!(ScoreUpdate::TYPE_NAME, "lwjeb_redis::test_utils::ScoreUpdate");
    }

    #[test]
    fn test_resolve_decodes_payload() {
        let registry = TypeRegistry::global();
        let message_type = registry.resolve("test.PlayerJoined").unwrap();

        let topic = message_type
            .decode(r#"{"name":"hippo","level":7}"#)
            .unwrap();

        assert_eq!(topic.type_name(), "test.PlayerJoined");
    }
}
