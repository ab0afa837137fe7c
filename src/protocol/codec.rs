//! Wire codec seam
//!
//! The proxy front end knows which wire format a connection negotiated; the
//! faults only see [`Message`] mappings through this trait.

use super::message::Message;
use bytes::Bytes;

/// Error returned when a frame payload cannot be encoded or decoded
#[derive(Debug)]
pub enum CodecError {
    /// Payload is not a valid encoding of a message
    Malformed(String),
    /// Payload decoded, but not to a mapping
    NotAMapping,
}

impl std::fmt::Display for CodecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodecError::Malformed(reason) => write!(f, "Malformed protocol message: {}", reason),
            CodecError::NotAMapping => write!(f, "Protocol message is not a mapping"),
        }
    }
}

impl std::error::Error for CodecError {}

/// Encode/decode protocol messages carried in binary frames
pub trait ProtocolCodec: Send + Sync + 'static {
    fn encode(&self, message: &Message) -> Result<Bytes, CodecError>;

    fn decode(&self, payload: &[u8]) -> Result<Message, CodecError>;
}

/// JSON encoding of protocol messages
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl ProtocolCodec for JsonCodec {
    fn encode(&self, message: &Message) -> Result<Bytes, CodecError> {
        serde_json::to_vec(message)
            .map(Bytes::from)
            .map_err(|e| CodecError::Malformed(e.to_string()))
    }

    fn decode(&self, payload: &[u8]) -> Result<Message, CodecError> {
        let value: serde_json::Value =
            serde_json::from_slice(payload).map_err(|e| CodecError::Malformed(e.to_string()))?;
        match value {
            serde_json::Value::Object(fields) => Ok(Message::from_fields(fields)),
            _ => Err(CodecError::NotAMapping),
        }
    }
}
