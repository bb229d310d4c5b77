//! Courier transport error types
//!
//! Errors raised by socket and poller operations of a transport.

use crate::socket_type::SocketType;
use thiserror::Error;

/// Main error type for transport operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Another live socket is already bound to this endpoint
    #[error("endpoint '{0}' is already bound")]
    AddrInUse(String),

    /// Socket closed
    #[error("Socket closed")]
    SocketClosed,

    /// Operation not available for this socket role
    #[error("{op} is not supported on a {socket_type} socket")]
    Unsupported {
        socket_type: SocketType,
        op: &'static str,
    },

    /// Attempt to send a message with no frames
    #[error("cannot send an empty multipart message")]
    EmptyMessage,

    /// The two ends of a connection cannot talk to each other
    #[error("{local} socket cannot connect to a {remote} socket")]
    IncompatiblePeer {
        local: SocketType,
        remote: SocketType,
    },
}

/// Result type alias for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;

impl TransportError {
    /// Create an unsupported-operation error
    pub const fn unsupported(socket_type: SocketType, op: &'static str) -> Self {
        Self::Unsupported { socket_type, op }
    }

    /// Check if this is a connection error
    #[must_use]
    pub const fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::SocketClosed | Self::AddrInUse(_) | Self::IncompatiblePeer { .. }
        )
    }
}
