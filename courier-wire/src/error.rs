//! Wire protocol error types

use courier_core::SocketType;
use thiserror::Error;

/// Errors raised while framing, parsing, encoding or decoding messages.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    /// No decode operation is registered for this type tag
    #[error("unknown message type '{0}'")]
    UnknownType(String),

    /// Payload bytes are not valid for the resolved type
    #[error("malformed payload for '{type_tag}': {reason}")]
    MalformedPayload { type_tag: String, reason: String },

    /// Serialization of an outbound message failed
    #[error("failed to encode '{type_tag}': {reason}")]
    Encode {
        type_tag: &'static str,
        reason: String,
    },

    /// Frame count does not match the envelope of the receiving socket role
    #[error("malformed {socket_type} envelope: expected {expected} frames, got {actual}")]
    MalformedEnvelope {
        socket_type: SocketType,
        expected: usize,
        actual: usize,
    },

    /// Request id frame is not exactly 4 bytes
    #[error("request id frame must be 4 bytes, got {0}")]
    BadRequestId(usize),
}

/// Result type alias for wire operations
pub type Result<T> = std::result::Result<T, WireError>;

impl WireError {
    /// Create a malformed-payload error from any displayable cause
    pub fn malformed(type_tag: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::MalformedPayload {
            type_tag: type_tag.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether the error comes from the decode seam rather than framing
    #[must_use]
    pub const fn is_decode_error(&self) -> bool {
        matches!(self, Self::UnknownType(_) | Self::MalformedPayload { .. })
    }
}
