//! Codec trait and implementations for turning envelopes into text frames.
//!
//! The client doesn't care HOW envelopes are serialized, it only needs
//! something that implements [`Codec`]. The service speaks JSON, so
//! [`JsonCodec`] is the one implementation today.

use serde::{Serialize, de::DeserializeOwned};

use crate::{Command, Envelope, ProtocolError, RequestIds};

/// A codec that encodes Rust types to text frames and decodes them back.
///
/// `Send + Sync + 'static` because the codec is shared between the
/// reader task and every caller of the client API.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into a text frame.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<String, ProtocolError>;

    /// Deserializes a text frame back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the text is malformed or doesn't
    /// match the expected type.
    fn decode<T: DeserializeOwned>(&self, text: &str) -> Result<T, ProtocolError>;

    /// Assigns `command` an id from `ids` and encodes the envelope.
    fn encode_command(
        &self,
        ids: &RequestIds,
        command: Command,
    ) -> Result<String, ProtocolError> {
        self.encode(&ids.assign(command))
    }

    /// Decodes an inbound frame into an [`Envelope`].
    fn decode_envelope(&self, text: &str) -> Result<Envelope, ProtocolError> {
        self.decode(text)
    }
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// ## Example
///
/// ```rust
/// use hookman_protocol::{Codec, Command, Inbound, JsonCodec, RequestIds};
///
/// let codec = JsonCodec;
/// let ids = RequestIds::new();
///
/// let text = codec
///     .encode_command(&ids, Command::Listen { channel: "news".into() })
///     .unwrap();
/// assert_eq!(text, r#"{"id":1,"type":"listen","channel":"news"}"#);
///
/// let envelope = codec
///     .decode_envelope(r#"{"type":"event","channel":"news","payload":42}"#)
///     .unwrap();
/// assert!(matches!(envelope.into_inbound(), Inbound::Event { .. }));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<String, ProtocolError> {
        serde_json::to_string(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, text: &str) -> Result<T, ProtocolError> {
        serde_json::from_str(text).map_err(ProtocolError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_command_assigns_sequential_ids() {
        let codec = JsonCodec;
        let ids = RequestIds::new();
        let first = codec
            .encode_command(&ids, Command::Broadcast { broadcast: true })
            .unwrap();
        let second = codec
            .encode_command(&ids, Command::Broadcast { broadcast: false })
            .unwrap();
        assert_eq!(first, r#"{"id":1,"type":"broadcast","broadcast":true}"#);
        assert_eq!(second, r#"{"id":2,"type":"broadcast","broadcast":false}"#);
    }

    #[test]
    fn test_decode_garbage_returns_decode_error() {
        let result = JsonCodec.decode_envelope("not json at all");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_decode_non_object_returns_decode_error() {
        let result = JsonCodec.decode_envelope("[1, 2, 3]");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_decode_error_message_mentions_decode() {
        let err = JsonCodec.decode_envelope("{").unwrap_err();
        assert!(err.to_string().starts_with("decode failed"));
    }
}
