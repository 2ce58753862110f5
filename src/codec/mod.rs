//! Self-describing message envelope.
//!
//! Wire layout:
//!
//! ```text
//! <len>:<type name><json payload>
//!   |   |    |           |
//!   |   |    |           +-- serde_json encoding of the message
//!   |   |    +-- registered type name, exactly <len> UTF-8 bytes
//!   |   +-- delimiter
//!   +-- decimal ASCII byte length of the type name
//! ```
//!
//! There is no separator between the type name and the payload; the length
//! prefix is the only thing that tells them apart.

use std::sync::Arc;

use serde::Serialize;

use crate::message::{BridgeMessage, DecodedTopic};
use crate::registry::TypeRegistry;

/// Separates the length prefix from the type name.
pub const DELIMITER: char = ':';

/// Result type for codec operations.
pub type Result<T> = std::result::Result<T, CodecError>;

/// Errors that can occur while encoding or decoding envelopes.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Malformed envelope: {0}")]
    Malformed(String),

    #[error("Unknown message type: {0}")]
    UnknownType(String),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A parsed but unresolved envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Envelope<'a> {
    /// Type name the sender registered the payload under.
    pub type_name: &'a str,
    /// Serialized message, opaque until the type is resolved.
    pub payload: &'a str,
}

impl<'a> Envelope<'a> {
    /// Split a raw envelope into type name and payload.
    ///
    /// Does not consult the registry.
    pub fn parse(raw: &'a str) -> Result<Self> {
        let (prefix, rest) = raw
            .split_once(DELIMITER)
            .ok_or_else(|| CodecError::Malformed(format!("missing '{}' delimiter", DELIMITER)))?;

        if prefix.is_empty() || !prefix.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CodecError::Malformed(format!(
                "invalid length prefix '{}'",
                truncate(prefix)
            )));
        }

        let length: usize = prefix
            .parse()
            .map_err(|_| CodecError::Malformed(format!("length prefix {} out of range", prefix)))?;

        // `get` rejects both overruns and splits inside a multi-byte character.
        let type_name = rest.get(..length).ok_or_else(|| {
            CodecError::Malformed(format!(
                "length prefix {} does not fit {} remaining bytes",
                length,
                rest.len()
            ))
        })?;
        let payload = rest.get(length..).unwrap_or_default();

        Ok(Self { type_name, payload })
    }
}

fn truncate(value: &str) -> &str {
    const MAX: usize = 32;
    match value.char_indices().nth(MAX) {
        Some((idx, _)) => &value[..idx],
        None => value,
    }
}

/// Encode `message` under an explicit type name.
pub fn encode_as<T: Serialize + ?Sized>(message: &T, type_name: &str) -> Result<String> {
    let payload = serde_json::to_string(message)?;
    Ok(format!(
        "{}{}{}{}",
        type_name.len(),
        DELIMITER,
        type_name,
        payload
    ))
}

/// Encodes and decodes envelopes against a [`TypeRegistry`].
#[derive(Debug, Clone)]
pub struct EnvelopeCodec {
    registry: Arc<TypeRegistry>,
}

impl EnvelopeCodec {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self { registry }
    }

    /// Codec backed by the process-wide registry.
    pub fn global() -> Self {
        Self::new(TypeRegistry::global())
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// Encode a message under its registered type name.
    pub fn encode<T: BridgeMessage>(&self, message: &T) -> Result<String> {
        encode_as(message, T::TYPE_NAME)
    }

    /// Rebuild the message carried by `raw` with its original type.
    pub fn decode(&self, raw: &str) -> Result<DecodedTopic> {
        let envelope = Envelope::parse(raw)?;
        let message_type = self
            .registry
            .resolve(envelope.type_name)
            .ok_or_else(|| CodecError::UnknownType(envelope.type_name.to_string()))?;

        let topic = message_type.decode(envelope.payload)?;
        Ok(DecodedTopic::new(topic))
    }
}

impl Default for EnvelopeCodec {
    fn default() -> Self {
        Self::global()
    }
}
