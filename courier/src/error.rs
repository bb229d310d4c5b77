//! Courier error types
//!
//! [`Error`] is returned synchronously by [`Manager`](crate::Manager)
//! operations. [`DispatchError`] describes why the dispatch loop discarded an
//! inbound message; it is logged and sent to the monitor, never returned.

use courier_core::TransportError;
use courier_wire::{RequestId, WireError};
use thiserror::Error;

/// Errors returned by manager operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Transport failure (bind, connect, send)
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Encoding or framing failure
    #[error(transparent)]
    Wire(#[from] WireError),

    /// `reply` was called without the peer identity of a router delivery
    #[error("reply requires the peer identity of the inbound request")]
    MissingPeerIdentity,

    /// `reply_to` was called with a delivery that carries no request id
    #[error("reply requires the request id of the inbound request")]
    MissingRequestId,

    /// `reply` was called before `listen`
    #[error("no inbound-routed socket; call listen first")]
    NotListening,

    /// No pending request with this id on the given destination
    #[error("no pending request {0}")]
    NoSuchRequest(RequestId),

    /// The request-id counter has wrapped
    #[error("request id space exhausted")]
    RequestIdsExhausted,

    /// `spawn` was called while the dispatch loop is running
    #[error("dispatch loop already running")]
    AlreadyRunning,

    /// `close` was called while the dispatch loop is running
    #[error("dispatch loop is still running; shut it down before closing")]
    DispatchRunning,

    /// The manager has been closed
    #[error("manager is closed")]
    Closed,

    /// The OS refused to start the dispatch thread
    #[error("failed to spawn dispatch thread: {0}")]
    Spawn(String),
}

/// Result type alias for manager operations
pub type Result<T> = std::result::Result<T, Error>;

/// Reasons the dispatch loop dropped an inbound message
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// Envelope or decode failure
    #[error(transparent)]
    Wire(#[from] WireError),

    /// Receive failure on a ready socket
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Inbound request or publication with no handler bound for its type
    #[error("no handler registered for '{type_tag}' on the {registry} registry")]
    NoHandlerRegistered {
        registry: &'static str,
        type_tag: String,
    },

    /// Reply for an unknown, answered or expired request
    #[error("reply for unknown request {0}")]
    NoSuchRequest(RequestId),

    /// Reply type not among the types the request expected
    #[error("request {request_id} has no handler for reply type '{type_tag}'")]
    NoHandlerForType {
        request_id: RequestId,
        type_tag: String,
    },

    /// A handler panicked while processing a message
    #[error("handler for '{type_tag}' panicked: {reason}")]
    HandlerPanicked { type_tag: String, reason: String },
}

impl DispatchError {
    /// Whether this is routine under timeouts (late or duplicate replies).
    #[must_use]
    pub const fn is_stale_reply(&self) -> bool {
        matches!(self, Self::NoSuchRequest(_))
    }
}
