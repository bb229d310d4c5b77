//! Request correlation: id allocation and the pending-request table.
//!
//! Every request issued by a manager gets an id from [`RequestIdAllocator`]
//! and an entry in [`CorrelationTable`] recording the outbound socket it
//! was sent on and the reply handlers the caller expects. The dispatch loop
//! consumes the entry when the reply arrives; the timeout sweep removes it
//! when the deadline passes first.

use courier_core::SocketId;
use courier_wire::RequestId;
use hashbrown::HashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

use crate::error::{DispatchError, Error, Result};
use crate::handlers::{HandlerMap, HandlerRef};

/// Monotonic, thread-safe request id source.
///
/// Ids start at 1 and are never handed out twice. Running out of the 32-bit
/// id space is reported as [`Error::RequestIdsExhausted`].
#[derive(Debug)]
pub struct RequestIdAllocator {
    next: AtomicU32,
}

impl RequestIdAllocator {
    #[must_use]
    pub const fn new() -> Self {
        Self::starting_at(1)
    }

    pub(crate) const fn starting_at(first: u32) -> Self {
        Self {
            next: AtomicU32::new(first),
        }
    }

    /// Allocate the next id.
    ///
    /// # Errors
    ///
    /// [`Error::RequestIdsExhausted`] once the counter would wrap.
    pub fn allocate(&self) -> Result<RequestId> {
        self.next
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_add(1))
            .map(RequestId::new)
            .map_err(|_| Error::RequestIdsExhausted)
    }
}

impl Default for RequestIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Lifecycle of a pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    Pending,
    Answered,
    Expired,
}

/// Bookkeeping for one in-flight request.
#[derive(Debug)]
pub struct PendingRequest {
    pub destination: String,
    pub socket: SocketId,
    pub handlers: HandlerMap,
    pub deadline: Option<Instant>,
    pub status: RequestStatus,
}

impl PendingRequest {
    #[must_use]
    pub fn new(
        destination: impl Into<String>,
        socket: SocketId,
        handlers: HandlerMap,
        deadline: Option<Instant>,
    ) -> Self {
        Self {
            destination: destination.into(),
            socket,
            handlers,
            deadline,
            status: RequestStatus::Pending,
        }
    }
}

/// Table of pending requests keyed by (outbound socket, request id).
///
/// Ids are unique per manager, so entries are stored by id and the socket
/// is checked on lookup.
#[derive(Debug, Default)]
pub struct CorrelationTable {
    entries: Mutex<HashMap<RequestId, PendingRequest>>,
}

impl CorrelationTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a request before it is sent.
    pub fn register(&self, request_id: RequestId, pending: PendingRequest) {
        self.entries.lock().insert(request_id, pending);
    }

    /// Take the handler for a reply and retire the request.
    ///
    /// The entry is removed on every outcome except an unknown id, so a
    /// duplicate reply always reports [`DispatchError::NoSuchRequest`].
    ///
    /// # Errors
    ///
    /// - [`DispatchError::NoSuchRequest`] if `request_id` is not pending on
    ///   `socket`
    /// - [`DispatchError::NoHandlerForType`] if the request did not expect a
    ///   reply of `type_tag`
    pub fn resolve_and_consume(
        &self,
        socket: SocketId,
        request_id: RequestId,
        type_tag: &str,
    ) -> std::result::Result<HandlerRef, DispatchError> {
        let mut pending = {
            let mut entries = self.entries.lock();
            match entries.remove(&request_id) {
                Some(pending) if pending.socket == socket => pending,
                Some(foreign) => {
                    entries.insert(request_id, foreign);
                    return Err(DispatchError::NoSuchRequest(request_id));
                }
                None => return Err(DispatchError::NoSuchRequest(request_id)),
            }
        };
        pending.status = RequestStatus::Answered;

        pending
            .handlers
            .get(type_tag)
            .cloned()
            .ok_or_else(|| DispatchError::NoHandlerForType {
                request_id,
                type_tag: type_tag.to_string(),
            })
    }

    /// Replace the expected-reply handlers of a pending request.
    ///
    /// # Errors
    ///
    /// [`Error::NoSuchRequest`] unless `request_id` is pending on
    /// `destination`.
    pub fn update_handlers(
        &self,
        destination: &str,
        request_id: RequestId,
        handlers: HandlerMap,
    ) -> Result<()> {
        match self.entries.lock().get_mut(&request_id) {
            Some(pending) if pending.destination == destination => {
                pending.handlers = handlers;
                Ok(())
            }
            _ => Err(Error::NoSuchRequest(request_id)),
        }
    }

    /// Expire a request whose deadline has passed.
    ///
    /// Returns the retired entry, or `None` if it was already answered.
    pub fn expire(&self, request_id: RequestId, now: Instant) -> Option<PendingRequest> {
        let mut entries = self.entries.lock();
        let due = entries
            .get(&request_id)
            .is_some_and(|p| p.deadline.is_some_and(|d| d <= now));
        if !due {
            return None;
        }
        let mut pending = entries.remove(&request_id)?;
        pending.status = RequestStatus::Expired;
        Some(pending)
    }

    /// Drop an entry whose request never made it onto the wire.
    pub fn remove(&self, request_id: RequestId) -> Option<PendingRequest> {
        self.entries.lock().remove(&request_id)
    }

    #[must_use]
    pub fn contains(&self, request_id: RequestId) -> bool {
        self.entries.lock().contains_key(&request_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}
