//! Dispatch event monitoring.
//!
//! The dispatch loop never returns per-message failures. Instead they are
//! logged and, if a monitor is attached, sent on a channel so tests and
//! applications can observe them.

use courier_wire::RequestId;
use std::fmt;

use crate::error::DispatchError;

/// Events emitted by the dispatch loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchEvent {
    /// An inbound message was discarded.
    Dropped(DispatchError),

    /// A pending request passed its deadline without a reply
    /// (only under [`ExpiryPolicy::Notify`](crate::config::ExpiryPolicy)).
    Expired {
        destination: String,
        request_id: RequestId,
    },
}

impl fmt::Display for DispatchEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dropped(err) => write!(f, "Dropped message: {err}"),
            Self::Expired {
                destination,
                request_id,
            } => write!(f, "Request {request_id} to {destination} expired"),
        }
    }
}

/// Handle for receiving dispatch events.
pub type DispatchMonitor = flume::Receiver<DispatchEvent>;

/// Sending half held by the manager.
pub type DispatchEventSender = flume::Sender<DispatchEvent>;

/// Creates a new monitoring channel pair.
#[must_use]
pub fn create_monitor() -> (DispatchEventSender, DispatchMonitor) {
    flume::unbounded()
}
