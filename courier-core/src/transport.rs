//! Trait-based transport API.
//!
//! The Courier core never talks to a concrete transport. It creates sockets,
//! moves multipart messages through them and waits for readiness through the
//! three traits in this module:
//!
//! - [`Transport`] - socket and poller factory (a "context")
//! - [`Socket`] - one socket role, internally synchronized
//! - [`Poller`] - readiness multiplexer over a dynamic set of sockets
//!
//! All methods take `&self` so that application threads can send on a socket
//! while the dispatch thread receives from it.

use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::socket_type::SocketType;

/// A multipart message as an ordered list of frames.
pub type Multipart = Vec<Bytes>;

/// Transport-local socket identity. Unique within one transport context.
pub type SocketId = u64;

/// A transport socket.
pub trait Socket: Send + Sync + 'static {
    /// Identity of this socket within its transport.
    fn id(&self) -> SocketId;

    /// Role of this socket.
    fn socket_type(&self) -> SocketType;

    /// Bind to an endpoint so that peers can connect to it.
    fn bind(&self, endpoint: &str) -> Result<()>;

    /// Connect to an endpoint. Connecting before the remote side binds is
    /// allowed; the connection completes once it does.
    fn connect(&self, endpoint: &str) -> Result<()>;

    /// Add a prefix filter (SUB sockets only).
    fn subscribe(&self, prefix: &[u8]) -> Result<()>;

    /// Send a multipart message. Never blocks beyond the transport's own
    /// buffering.
    fn send(&self, msg: Multipart) -> Result<()>;

    /// Receive one multipart message if one is available.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(msg))` - Message received
    /// - `Ok(None)` - Nothing queued
    /// - `Err(_)` - Socket closed
    fn try_recv(&self) -> Result<Option<Multipart>>;

    /// Close the socket, releasing its endpoints and peers.
    fn close(&self);
}

/// Readiness poller over a dynamic socket set.
pub trait Poller: Send + Sync + 'static {
    /// Socket type this poller watches.
    type Socket: Socket;

    /// Add a socket to the watched set. Safe to call while another thread is
    /// blocked in [`Poller::poll`].
    fn register(&self, socket: Arc<Self::Socket>);

    /// Remove a socket from the watched set.
    fn deregister(&self, id: SocketId);

    /// Block until at least one watched socket is readable or `timeout`
    /// elapses. Returns the readable sockets (possibly none).
    fn poll(&self, timeout: Duration) -> Result<Vec<Arc<Self::Socket>>>;

    /// Interrupt a blocked [`Poller::poll`] early.
    fn wake(&self);
}

/// Socket and poller factory.
pub trait Transport: Clone + Send + Sync + 'static {
    /// Socket implementation of this transport.
    type Socket: Socket;

    /// Poller implementation of this transport.
    type Poller: Poller<Socket = Self::Socket>;

    /// Create a new socket of the given role.
    fn socket(&self, socket_type: SocketType) -> Result<Arc<Self::Socket>>;

    /// Create a new, empty poller.
    fn poller(&self) -> Self::Poller;
}
