//! In-process transport with ZeroMQ-like socket semantics.
//!
//! Sockets created from the same [`Context`] share an endpoint namespace and
//! exchange multipart messages through channels, without TCP/IP overhead.
//!
//! # Features
//!
//! - **Zero-copy**: frames are `Bytes`, fan-out clones refcounts only
//! - **Thread-safe**: endpoint namespace protected by `DashMap`, socket state
//!   by a short-lived mutex
//! - **Opaque addresses**: endpoints are namespace keys, never parsed
//! - **ZeroMQ compatible patterns**: PUB/SUB prefix filtering, ROUTER
//!   identity envelopes, DEALER round-robin with queueing until connected
//!
//! # Usage
//!
//! ```rust
//! use courier_core::inproc::Context;
//! use courier_core::transport::{Socket, Transport};
//! use courier_core::SocketType;
//! use bytes::Bytes;
//!
//! # fn example() -> courier_core::error::Result<()> {
//! let ctx = Context::new();
//!
//! let router = ctx.socket(SocketType::Router)?;
//! router.bind("tcp://*:5556")?;
//!
//! let dealer = ctx.socket(SocketType::Dealer)?;
//! dealer.connect("tcp://*:5556")?;
//! dealer.send(vec![Bytes::from("Hello")])?;
//!
//! // ROUTER sees [identity, "Hello"]
//! let msg = router.try_recv()?.unwrap();
//! assert_eq!(msg.len(), 2);
//! # Ok(())
//! # }
//! ```

use bytes::Bytes;
use dashmap::DashMap;
use flume::{Receiver, Sender, TryRecvError};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, trace, warn};

use crate::error::{Result, TransportError};
use crate::poller::InprocPoller;
use crate::socket_type::SocketType;
use crate::subscription::SubscriptionSet;
use crate::transport::{Multipart, Socket, SocketId, Transport};

/// Process-wide default namespace
static GLOBAL_CONTEXT: Lazy<Context> = Lazy::new(Context::new);

/// Namespace slot for one endpoint.
enum Slot {
    /// A socket is bound here
    Bound(Weak<InprocSocket>),
    /// Sockets that connected before anyone bound
    Waiting(Vec<Weak<InprocSocket>>),
}

impl Slot {
    fn is_bound_to(&self, socket: &Weak<InprocSocket>) -> bool {
        matches!(self, Self::Bound(w) if w.ptr_eq(socket))
    }

    fn live_binding(&self) -> Option<Arc<InprocSocket>> {
        match self {
            Self::Bound(w) => w.upgrade().filter(|s| !s.is_closed()),
            Self::Waiting(_) => None,
        }
    }
}

#[derive(Default)]
struct ContextInner {
    endpoints: DashMap<String, Slot>,
    next_id: AtomicU64,
}

/// Handle to an in-process endpoint namespace.
///
/// Cheap to clone; clones share the namespace. Managers that should reach
/// each other must be built from clones of the same context.
#[derive(Clone, Default)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl Context {
    /// Create a fresh, empty namespace.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide default namespace.
    #[must_use]
    pub fn global() -> Self {
        GLOBAL_CONTEXT.clone()
    }

    /// List all endpoints that currently have a live bound socket.
    ///
    /// This is primarily useful for debugging and testing.
    #[must_use]
    pub fn endpoints(&self) -> Vec<String> {
        let mut out: Vec<String> = self
            .inner
            .endpoints
            .iter()
            .filter(|entry| entry.value().live_binding().is_some())
            .map(|entry| entry.key().clone())
            .collect();
        out.sort();
        out
    }

    /// Check whether a live socket is bound to `endpoint`.
    #[must_use]
    pub fn is_bound(&self, endpoint: &str) -> bool {
        self.inner
            .endpoints
            .get(endpoint)
            .is_some_and(|slot| slot.live_binding().is_some())
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("endpoints", &self.inner.endpoints.len())
            .finish()
    }
}

impl Transport for Context {
    type Socket = InprocSocket;
    type Poller = InprocPoller;

    fn socket(&self, socket_type: SocketType) -> Result<Arc<InprocSocket>> {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (inbox_tx, inbox_rx) = flume::unbounded();
        let context = Arc::clone(&self.inner);

        Ok(Arc::new_cyclic(|me| InprocSocket {
            id,
            socket_type,
            routing_id: routing_id_for(id),
            context,
            me: me.clone(),
            inbox_tx,
            inbox_rx,
            state: Mutex::new(SocketState::default()),
            notifier: Mutex::new(None),
            closed: AtomicBool::new(false),
        }))
    }

    fn poller(&self) -> InprocPoller {
        InprocPoller::new()
    }
}

/// Auto-generated routing identity: a zero byte followed by a 32-bit
/// big-endian counter (libzmq's format for generated identities).
fn routing_id_for(id: SocketId) -> Bytes {
    let mut buf = Vec::with_capacity(5);
    buf.push(0u8);
    buf.extend_from_slice(&(id as u32).to_be_bytes());
    Bytes::from(buf)
}

/// One attached peer.
struct Pipe {
    peer_id: SocketId,
    routing_id: Bytes,
    peer: Weak<InprocSocket>,
}

#[derive(Default)]
struct SocketState {
    peers: Vec<Pipe>,
    subscriptions: SubscriptionSet,
    bound: Vec<String>,
    // DEALER messages sent before any peer attached
    queued: Vec<Multipart>,
    cursor: usize,
}

/// An in-process socket.
pub struct InprocSocket {
    id: SocketId,
    socket_type: SocketType,
    routing_id: Bytes,
    context: Arc<ContextInner>,
    me: Weak<InprocSocket>,
    inbox_tx: Sender<Multipart>,
    inbox_rx: Receiver<Multipart>,
    state: Mutex<SocketState>,
    notifier: Mutex<Option<Sender<()>>>,
    closed: AtomicBool,
}

impl InprocSocket {
    /// Identity a ROUTER peer sees for this socket.
    #[must_use]
    pub fn routing_id(&self) -> &Bytes {
        &self.routing_id
    }

    /// Whether a message is queued for [`Socket::try_recv`].
    #[must_use]
    pub fn is_readable(&self) -> bool {
        !self.is_closed() && !self.inbox_rx.is_empty()
    }

    /// Whether [`Socket::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of currently attached peers.
    #[must_use]
    pub fn peer_count(&self) -> usize {
        self.state.lock().peers.len()
    }

    /// Install (or clear) the poller doorbell rung on every delivery.
    pub(crate) fn set_notifier(&self, notifier: Option<Sender<()>>) {
        *self.notifier.lock() = notifier;
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(TransportError::SocketClosed);
        }
        Ok(())
    }

    fn notify(&self) {
        if let Some(tx) = self.notifier.lock().as_ref() {
            // A full doorbell already guarantees a wake-up.
            let _ = tx.try_send(());
        }
    }

    /// Enqueue a message arriving from `sender`.
    fn deliver_from(&self, sender: &InprocSocket, mut msg: Multipart) {
        if self.is_closed() {
            return;
        }

        match self.socket_type {
            SocketType::Sub => {
                let keep = msg
                    .first()
                    .is_some_and(|topic| self.state.lock().subscriptions.matches(topic));
                if !keep {
                    trace!(socket = self.id, "SUB filter dropped message");
                    return;
                }
            }
            SocketType::Router => {
                msg.insert(0, sender.routing_id.clone());
            }
            SocketType::Pub | SocketType::Dealer => {}
        }

        if self.inbox_tx.send(msg).is_ok() {
            self.notify();
        }
    }

    fn add_pipe(&self, remote: &InprocSocket) {
        let mut state = self.state.lock();
        if state.peers.iter().any(|p| p.peer_id == remote.id) {
            return;
        }
        state.peers.push(Pipe {
            peer_id: remote.id,
            routing_id: remote.routing_id.clone(),
            peer: remote.me.clone(),
        });
    }

    fn remove_pipe(&self, peer_id: SocketId) {
        self.state.lock().peers.retain(|p| p.peer_id != peer_id);
    }

    /// Wire both ends of a connection together.
    fn attach(&self, remote: &InprocSocket) -> Result<()> {
        if !self.socket_type.is_compatible(remote.socket_type) {
            return Err(TransportError::IncompatiblePeer {
                local: self.socket_type,
                remote: remote.socket_type,
            });
        }
        if self.is_closed() || remote.is_closed() {
            return Ok(());
        }

        self.add_pipe(remote);
        remote.add_pipe(self);
        debug!(
            local = self.id,
            remote = remote.id,
            "{} attached to {}",
            self.socket_type,
            remote.socket_type
        );

        self.flush_queued();
        remote.flush_queued();
        Ok(())
    }

    fn flush_queued(&self) {
        let queued = std::mem::take(&mut self.state.lock().queued);
        for msg in queued {
            if let Err(err) = self.send(msg) {
                warn!(socket = self.id, error = %err, "failed to flush queued message");
            }
        }
    }

    fn live_peers(&self) -> SmallVec<[Arc<InprocSocket>; 4]> {
        self.state
            .lock()
            .peers
            .iter()
            .filter_map(|p| p.peer.upgrade())
            .collect()
    }

    /// Round-robin peer selection, pruning peers that went away.
    fn next_peer(state: &mut SocketState) -> Option<Arc<InprocSocket>> {
        state.peers.retain(|p| p.peer.strong_count() > 0);
        if state.peers.is_empty() {
            return None;
        }
        let idx = state.cursor % state.peers.len();
        state.cursor = state.cursor.wrapping_add(1);
        state.peers[idx].peer.upgrade()
    }

    fn route_by_identity(&self, mut msg: Multipart) -> Result<()> {
        let identity = msg.remove(0);
        if msg.is_empty() {
            return Err(TransportError::EmptyMessage);
        }

        let target = self
            .state
            .lock()
            .peers
            .iter()
            .find(|p| p.routing_id == identity)
            .and_then(|p| p.peer.upgrade());

        match target {
            Some(peer) => peer.deliver_from(self, msg),
            // ZMQ behavior: silently drop if unknown id
            None => trace!(socket = self.id, "ROUTER dropped message for unknown peer"),
        }
        Ok(())
    }
}

impl Socket for InprocSocket {
    fn id(&self) -> SocketId {
        self.id
    }

    fn socket_type(&self) -> SocketType {
        self.socket_type
    }

    fn bind(&self, endpoint: &str) -> Result<()> {
        self.ensure_open()?;

        let waiting = {
            let mut slot = self
                .context
                .endpoints
                .entry(endpoint.to_string())
                .or_insert_with(|| Slot::Waiting(Vec::new()));
            if slot.live_binding().is_some() {
                return Err(TransportError::AddrInUse(endpoint.to_string()));
            }
            match std::mem::replace(&mut *slot, Slot::Bound(self.me.clone())) {
                Slot::Waiting(waiting) => waiting,
                Slot::Bound(_) => Vec::new(),
            }
        };

        self.state.lock().bound.push(endpoint.to_string());
        debug!(socket = self.id, endpoint, "{} bound", self.socket_type);

        for connector in waiting.iter().filter_map(Weak::upgrade) {
            if let Err(err) = self.attach(&connector) {
                warn!(endpoint, error = %err, "pending connection rejected");
            }
        }
        Ok(())
    }

    fn connect(&self, endpoint: &str) -> Result<()> {
        self.ensure_open()?;

        let remote = {
            let mut slot = self
                .context
                .endpoints
                .entry(endpoint.to_string())
                .or_insert_with(|| Slot::Waiting(Vec::new()));
            let live = slot.live_binding();
            if live.is_none() {
                match &mut *slot {
                    Slot::Waiting(waiting) => waiting.push(self.me.clone()),
                    Slot::Bound(_) => *slot = Slot::Waiting(vec![self.me.clone()]),
                }
            }
            live
        };

        match remote {
            Some(remote) => self.attach(&remote),
            None => {
                debug!(socket = self.id, endpoint, "connect pending until bind");
                Ok(())
            }
        }
    }

    fn subscribe(&self, prefix: &[u8]) -> Result<()> {
        self.ensure_open()?;
        if self.socket_type != SocketType::Sub {
            return Err(TransportError::unsupported(self.socket_type, "subscribe"));
        }
        self.state
            .lock()
            .subscriptions
            .subscribe(Bytes::copy_from_slice(prefix));
        Ok(())
    }

    fn send(&self, msg: Multipart) -> Result<()> {
        self.ensure_open()?;
        if msg.is_empty() {
            return Err(TransportError::EmptyMessage);
        }

        match self.socket_type {
            SocketType::Sub => Err(TransportError::unsupported(self.socket_type, "send")),
            SocketType::Pub => {
                // No subscribers attached means the message is dropped.
                for peer in self.live_peers() {
                    peer.deliver_from(self, msg.clone());
                }
                Ok(())
            }
            SocketType::Dealer => {
                let target = {
                    let mut state = self.state.lock();
                    match Self::next_peer(&mut state) {
                        Some(peer) => peer,
                        None => {
                            state.queued.push(msg);
                            return Ok(());
                        }
                    }
                };
                target.deliver_from(self, msg);
                Ok(())
            }
            SocketType::Router => self.route_by_identity(msg),
        }
    }

    fn try_recv(&self) -> Result<Option<Multipart>> {
        self.ensure_open()?;
        match self.inbox_rx.try_recv() {
            Ok(msg) => Ok(Some(msg)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(TransportError::SocketClosed),
        }
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let (bound, peers) = {
            let mut state = self.state.lock();
            state.queued.clear();
            state.subscriptions.clear();
            (
                std::mem::take(&mut state.bound),
                std::mem::take(&mut state.peers),
            )
        };

        for endpoint in &bound {
            self.context
                .endpoints
                .remove_if(endpoint, |_, slot| slot.is_bound_to(&self.me));
        }
        for pipe in peers {
            if let Some(peer) = pipe.peer.upgrade() {
                peer.remove_pipe(self.id);
            }
        }
        while self.inbox_rx.try_recv().is_ok() {}
        self.set_notifier(None);

        debug!(socket = self.id, "{} closed", self.socket_type);
    }
}

impl Drop for InprocSocket {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for InprocSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InprocSocket")
            .field("id", &self.id)
            .field("socket_type", &self.socket_type)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(parts: &[&'static str]) -> Multipart {
        parts.iter().map(|p| Bytes::from_static(p.as_bytes())).collect()
    }

    #[test]
    fn test_bind_duplicate() {
        let ctx = Context::new();
        let first = ctx.socket(SocketType::Router).unwrap();
        let second = ctx.socket(SocketType::Router).unwrap();

        first.bind("inproc://dup").unwrap();
        let err = second.bind("inproc://dup").unwrap_err();
        assert_eq!(err, TransportError::AddrInUse("inproc://dup".into()));

        // Address is free again once the holder closes
        first.close();
        assert!(!ctx.is_bound("inproc://dup"));
        second.bind("inproc://dup").unwrap();
        assert_eq!(ctx.endpoints(), vec!["inproc://dup".to_string()]);
    }

    #[test]
    fn test_dealer_router_round_trip() {
        let ctx = Context::new();
        let router = ctx.socket(SocketType::Router).unwrap();
        let dealer = ctx.socket(SocketType::Dealer).unwrap();

        router.bind("tcp://*:5556").unwrap();
        dealer.connect("tcp://*:5556").unwrap();

        dealer.send(frames(&["id", "Ping", "{}"])).unwrap();
        let msg = router.try_recv().unwrap().unwrap();
        assert_eq!(msg[0], *dealer.routing_id());
        assert_eq!(&msg[1..], &frames(&["id", "Ping", "{}"])[..]);

        // Reply addressed by identity; ROUTER strips it
        let mut reply = vec![msg[0].clone()];
        reply.extend(frames(&["id", "Pong", "{}"]));
        router.send(reply).unwrap();
        assert_eq!(
            dealer.try_recv().unwrap().unwrap(),
            frames(&["id", "Pong", "{}"])
        );
        assert!(dealer.try_recv().unwrap().is_none());
    }

    #[test]
    fn test_router_drops_unknown_identity() {
        let ctx = Context::new();
        let router = ctx.socket(SocketType::Router).unwrap();
        router.bind("inproc://drop").unwrap();

        router
            .send(vec![Bytes::from_static(b"\0ghost"), Bytes::from_static(b"x")])
            .unwrap();
        assert!(router.try_recv().unwrap().is_none());
    }

    #[test]
    fn test_connect_before_bind_queues() {
        let ctx = Context::new();
        let dealer = ctx.socket(SocketType::Dealer).unwrap();
        dealer.connect("inproc://late").unwrap();
        dealer.send(frames(&["queued"])).unwrap();
        assert_eq!(dealer.peer_count(), 0);

        let router = ctx.socket(SocketType::Router).unwrap();
        router.bind("inproc://late").unwrap();
        assert_eq!(dealer.peer_count(), 1);

        let msg = router.try_recv().unwrap().unwrap();
        assert_eq!(&msg[1..], &frames(&["queued"])[..]);
    }

    #[test]
    fn test_pub_sub_prefix_filter() {
        let ctx = Context::new();
        let publisher = ctx.socket(SocketType::Pub).unwrap();
        let subscriber = ctx.socket(SocketType::Sub).unwrap();

        publisher.bind("inproc://bus").unwrap();
        subscriber.connect("inproc://bus").unwrap();
        subscriber.subscribe(b"Entity").unwrap();

        publisher.send(frames(&["Device", "{}"])).unwrap();
        publisher.send(frames(&["Entity", "{\"id\":1}"])).unwrap();

        assert_eq!(
            subscriber.try_recv().unwrap().unwrap(),
            frames(&["Entity", "{\"id\":1}"])
        );
        assert!(subscriber.try_recv().unwrap().is_none());
    }

    #[test]
    fn test_pub_without_subscribers_drops() {
        let ctx = Context::new();
        let publisher = ctx.socket(SocketType::Pub).unwrap();
        publisher.bind("inproc://nobody").unwrap();
        publisher.send(frames(&["Entity", "{}"])).unwrap();

        // A late subscriber does not see earlier messages
        let subscriber = ctx.socket(SocketType::Sub).unwrap();
        subscriber.subscribe(b"").unwrap();
        subscriber.connect("inproc://nobody").unwrap();
        assert!(subscriber.try_recv().unwrap().is_none());
    }

    #[test]
    fn test_role_restrictions() {
        let ctx = Context::new();
        let subscriber = ctx.socket(SocketType::Sub).unwrap();
        let dealer = ctx.socket(SocketType::Dealer).unwrap();

        assert!(matches!(
            subscriber.send(frames(&["x"])),
            Err(TransportError::Unsupported { .. })
        ));
        assert!(matches!(
            dealer.subscribe(b"x"),
            Err(TransportError::Unsupported { .. })
        ));
        assert_eq!(dealer.send(Vec::new()), Err(TransportError::EmptyMessage));

        let publisher = ctx.socket(SocketType::Pub).unwrap();
        publisher.bind("inproc://mismatch").unwrap();
        assert!(matches!(
            dealer.connect("inproc://mismatch"),
            Err(TransportError::IncompatiblePeer { .. })
        ));
    }

    #[test]
    fn test_close_detaches_peers() {
        let ctx = Context::new();
        let router = ctx.socket(SocketType::Router).unwrap();
        let dealer = ctx.socket(SocketType::Dealer).unwrap();
        router.bind("inproc://closing").unwrap();
        dealer.connect("inproc://closing").unwrap();
        assert_eq!(router.peer_count(), 1);

        dealer.close();
        assert_eq!(router.peer_count(), 0);
        assert_eq!(dealer.try_recv(), Err(TransportError::SocketClosed));
        assert_eq!(dealer.send(frames(&["x"])), Err(TransportError::SocketClosed));
    }

    #[test]
    fn test_contexts_are_isolated() {
        let a = Context::new();
        let b = Context::new();
        let router = a.socket(SocketType::Router).unwrap();
        router.bind("inproc://shared-name").unwrap();

        assert!(a.is_bound("inproc://shared-name"));
        assert!(!b.is_bound("inproc://shared-name"));
    }
}
