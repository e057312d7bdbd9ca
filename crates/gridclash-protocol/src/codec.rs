//! Codec trait and implementations for serializing/deserializing messages.
//!
//! A codec (coder/decoder) converts between Rust types and raw bytes. The
//! server never cares *how* a frame is serialized; it only needs something
//! implementing [`Codec`]. The handler, the room registry and the tests
//! are all written against the trait, so a second wire format is one more
//! impl and nothing else.
//!
//! [`JsonCodec`] is the one shipped today. Browser clients and DevTools
//! read it directly, which matters more than frame size for a turn-based
//! game that sends a handful of messages per second.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Encodes values to bytes and decodes them back.
///
/// ## Trait bounds
///
/// - `Send + Sync`: one codec instance lives in the shared server state
///   and is used from every connection task, on whatever worker thread
///   Tokio schedules them.
/// - `'static`: the codec borrows nothing, so it can sit inside an `Arc`
///   for the lifetime of the server.
///
/// ## Generic methods
///
/// `encode` and `decode` work with any `T` that implements the matching
/// serde trait. The same codec therefore handles the outer [`Envelope`]
/// and the game payload nested inside it.
///
/// `decode` asks for `DeserializeOwned` rather than `Deserialize<'de>`:
/// the decoded value owns its data and outlives the frame buffer it came
/// from, which the handler drops as soon as decoding returns.
///
/// [`Envelope`]: crate::Envelope
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if the value cannot be represented
    /// in this format.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes into an owned value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed,
    /// truncated, or describe a different type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

/// A [`Codec`] backed by `serde_json`.
///
/// ```rust
/// use gridclash_protocol::{Channel, Codec, Envelope, JsonCodec, Payload, SystemMessage};
///
/// let codec = JsonCodec;
/// let envelope = Envelope {
///     seq: 1,
///     timestamp: 5000,
///     channel: Channel::ReliableOrdered,
///     payload: Payload::System(SystemMessage::ListRooms),
/// };
///
/// let bytes = codec.encode(&envelope).unwrap();
/// let decoded: Envelope = codec.decode(&bytes).unwrap();
/// assert_eq!(envelope, decoded);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

#[cfg(all(test, feature = "json"))]
mod tests {
    use super::*;
    use crate::{Envelope, Payload, SystemMessage};

    #[test]
    fn test_decode_garbage_is_decode_error() {
        let result: Result<Envelope, _> = JsonCodec.decode(b"not json at all");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_decode_wrong_shape_is_decode_error() {
        let result: Result<Envelope, _> = JsonCodec.decode(br#"{"name": "hello"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_encoded_envelope_is_json_object() {
        let envelope = Envelope {
            seq: 4,
            timestamp: 0,
            channel: Default::default(),
            payload: Payload::System(SystemMessage::Heartbeat { client_time: 9 }),
        };
        let bytes = JsonCodec.encode(&envelope).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["seq"], 4);
        assert_eq!(value["payload"]["data"]["type"], "Heartbeat");
    }
}
