//! Codec trait and implementations for serializing/deserializing messages.
//!
//! The lobby encodes a state update once per tick and fans the same bytes
//! out to every connection, so the codec only ever sees whole messages.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Encodes Rust values to frames and decodes frames back.
///
/// `Send + Sync + 'static` because a single codec instance is shared by the
/// accept loop, every connection handler and every lobby actor.
pub trait Codec: Send + Sync + Clone + 'static {
    /// Serializes a value into a frame.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if the value can't be represented.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes a frame into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed or don't
    /// match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

/// A [`Codec`] that speaks JSON (via `serde_json`).
///
/// Browser clients read these frames directly, so this is the default.
///
/// ```rust
/// use browsercraft_protocol::{ClientMessage, Codec, JsonCodec};
///
/// let codec = JsonCodec;
/// let msg: ClientMessage = codec
///     .decode(br#"{"event":"chat-client-to-server","data":"hi"}"#)
///     .unwrap();
/// assert_eq!(msg, ClientMessage::Chat("hi".into()));
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
