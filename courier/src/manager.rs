//! The messaging manager.
//!
//! A [`Manager`] owns every socket of one logical peer: at most one
//! publisher, one subscriber and one inbound-routed (ROUTER) socket, plus one
//! outbound DEALER per destination address. Sockets are created on first use.
//! All operations take `&self` and may be called from any thread while the
//! dispatch loop runs.
//!
//! # Example
//!
//! ```rust
//! use courier::{Context, Manager};
//! use courier_wire::{TypeManifest, WireMessage};
//! use serde::{Deserialize, Serialize};
//! use std::time::Duration;
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! struct Ping(u32);
//! impl WireMessage for Ping {
//!     const TYPE_TAG: &'static str = "Ping";
//! }
//!
//! # fn main() -> courier::Result<()> {
//! let ctx = Context::new();
//! let manifest = TypeManifest::new().with::<Ping>();
//!
//! let server = Manager::new(ctx.clone(), manifest.clone());
//! let replier = server.clone();
//! server.on_request::<Ping, _>(move |ping, delivery| {
//!     let _ = replier.reply_to(delivery, &Ping(ping.0 + 1));
//! });
//! server.listen("inproc://ping")?;
//! let server_loop = server.spawn()?;
//!
//! let client = Manager::new(ctx, manifest);
//! let (tx, rx) = flume::bounded(1);
//! let replies = courier::HandlerMap::new().on::<Ping, _>(move |pong, _| {
//!     let _ = tx.send(pong.0);
//! });
//! client.request("inproc://ping", &Ping(1), Some(replies), None)?;
//! let client_loop = client.spawn()?;
//!
//! assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 2);
//!
//! client_loop.shutdown();
//! server_loop.shutdown();
//! client.close()?;
//! server.close()?;
//! # Ok(())
//! # }
//! ```

use courier_core::{Context, Poller, Socket, SocketId, SocketType, Transport};
use courier_wire::{Body, Envelope, Message, PeerIdentity, RequestId, TypeManifest, TypeRegistry, WireMessage};
use hashbrown::HashMap;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::ManagerConfig;
use crate::correlation::{CorrelationTable, PendingRequest, RequestIdAllocator};
use crate::dispatch::{self, DispatchHandle, Dispatcher};
use crate::error::{DispatchError, Error, Result};
use crate::handlers::{typed, Delivery, Handler, HandlerMap, HandlerRegistry};
use crate::monitor::{create_monitor, DispatchEvent, DispatchEventSender, DispatchMonitor};
use crate::timeout::TimeoutTracker;

/// Dispatch lifecycle of a manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// No dispatch thread is running
    Idle,
    /// A dispatch loop, spawned or manual, owns the sockets
    Running,
    /// [`Manager::close`] has run; every operation fails with
    /// [`Error::Closed`]
    Closed,
}

pub(crate) struct Sockets<S> {
    closed: bool,
    publisher: Option<Arc<S>>,
    subscriber: Option<Arc<S>>,
    router: Option<Arc<S>>,
    router_endpoints: Vec<String>,
    dealers: HashMap<String, Arc<S>>,
}

impl<S: Socket> Sockets<S> {
    fn new() -> Self {
        Self {
            closed: false,
            publisher: None,
            subscriber: None,
            router: None,
            router_endpoints: Vec::new(),
            dealers: HashMap::new(),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::Closed);
        }
        Ok(())
    }

    /// Mark closed and hand back every socket.
    fn drain(&mut self) -> Vec<Arc<S>> {
        self.closed = true;
        self.router_endpoints.clear();
        let mut all: Vec<Arc<S>> = [
            self.publisher.take(),
            self.subscriber.take(),
            self.router.take(),
        ]
        .into_iter()
        .flatten()
        .collect();
        all.extend(self.dealers.drain().map(|(_, dealer)| dealer));
        all
    }
}

/// State shared between the manager handles and the dispatch loop.
pub(crate) struct Shared<T: Transport> {
    pub(crate) transport: T,
    pub(crate) config: ManagerConfig,
    pub(crate) poller: T::Poller,
    pub(crate) sockets: Mutex<Sockets<T::Socket>>,
    pub(crate) router_handlers: HandlerRegistry,
    pub(crate) subscriber_handlers: HandlerRegistry,
    pub(crate) correlation: CorrelationTable,
    pub(crate) timeouts: TimeoutTracker,
    pub(crate) ids: RequestIdAllocator,
    pub(crate) types: TypeRegistry,
    monitor: Mutex<Option<DispatchEventSender>>,
    lifecycle: Mutex<Lifecycle>,
}

impl<T: Transport> Shared<T> {
    pub(crate) fn lifecycle(&self) -> Lifecycle {
        *self.lifecycle.lock()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.lifecycle() == Lifecycle::Closed {
            return Err(Error::Closed);
        }
        Ok(())
    }

    /// Called when a dispatcher, spawned or manual, is dropped.
    pub(crate) fn finish_running(&self) {
        let mut lifecycle = self.lifecycle.lock();
        if *lifecycle == Lifecycle::Running {
            *lifecycle = Lifecycle::Idle;
        }
    }

    /// Log a dropped inbound message and forward it to the monitor.
    pub(crate) fn report(&self, err: DispatchError) {
        if err.is_stale_reply() {
            debug!(error = %err, "dropped stale reply");
        } else {
            warn!(error = %err, "dropped inbound message");
        }
        self.emit(DispatchEvent::Dropped(err));
    }

    pub(crate) fn emit(&self, event: DispatchEvent) {
        if let Some(monitor) = self.monitor.lock().as_ref() {
            let _ = monitor.send(event);
        }
    }

    /// Get or create a singleton socket, registering receivers with the
    /// poller.
    fn lazily(&self, slot: &mut Option<Arc<T::Socket>>, role: SocketType) -> Result<Arc<T::Socket>> {
        if let Some(socket) = slot {
            return Ok(Arc::clone(socket));
        }
        let socket = self.transport.socket(role)?;
        if role.can_receive() {
            self.poller.register(Arc::clone(&socket));
        }
        *slot = Some(Arc::clone(&socket));
        debug!(socket = socket.id(), "created {role} socket");
        Ok(socket)
    }
}

/// Messaging manager for one logical peer.
///
/// Cloning is cheap; clones share all state. Handlers that need to reply or
/// issue requests capture a clone. Those clones form a reference cycle with
/// the manager that [`Manager::close`] breaks by clearing the registries.
pub struct Manager<T: Transport = Context> {
    shared: Arc<Shared<T>>,
}

impl<T: Transport> Clone for Manager<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Transport> Manager<T> {
    /// Create an idle manager with the default configuration.
    pub fn new(transport: T, manifest: TypeManifest) -> Self {
        Self::with_config(transport, manifest, ManagerConfig::default())
    }

    /// Create an idle manager.
    pub fn with_config(transport: T, manifest: TypeManifest, config: ManagerConfig) -> Self {
        let poller = transport.poller();
        Self {
            shared: Arc::new(Shared {
                transport,
                config,
                poller,
                sockets: Mutex::new(Sockets::new()),
                router_handlers: HandlerRegistry::new("router"),
                subscriber_handlers: HandlerRegistry::new("subscriber"),
                correlation: CorrelationTable::new(),
                timeouts: TimeoutTracker::new(),
                ids: RequestIdAllocator::new(),
                types: TypeRegistry::new(manifest),
                monitor: Mutex::new(None),
                lifecycle: Mutex::new(Lifecycle::Idle),
            }),
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.shared.config
    }

    pub fn transport(&self) -> &T {
        &self.shared.transport
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.shared.lifecycle()
    }

    // -- inbound requests --------------------------------------------------

    /// Create the inbound-routed socket if needed and bind it to `address`.
    ///
    /// Listening on an address the manager already listens on is a no-op.
    ///
    /// # Errors
    ///
    /// [`Error::Closed`] after close, or the transport's bind failure.
    pub fn listen(&self, address: &str) -> Result<()> {
        self.shared.ensure_open()?;
        let mut sockets = self.shared.sockets.lock();
        sockets.ensure_open()?;
        if sockets.router_endpoints.iter().any(|a| a == address) {
            return Ok(());
        }

        let router = self.shared.lazily(&mut sockets.router, SocketType::Router)?;
        router.bind(address)?;
        sockets.router_endpoints.push(address.to_string());
        info!(address, "listening for requests");
        Ok(())
    }

    /// Replace the request handlers, then [`listen`](Self::listen).
    ///
    /// # Errors
    ///
    /// Same as [`listen`](Self::listen).
    pub fn listen_with(&self, address: &str, handlers: HandlerMap) -> Result<()> {
        self.set_request_handlers(handlers);
        self.listen(address)
    }

    /// Bind a handler for inbound requests of `type_tag`.
    pub fn set_request_handler(&self, type_tag: &'static str, handler: impl Handler) {
        self.shared.router_handlers.set(type_tag, Arc::new(handler));
    }

    /// Replace every inbound request handler at once.
    pub fn set_request_handlers(&self, handlers: HandlerMap) {
        self.shared.router_handlers.set_all(handlers);
    }

    /// Bind a typed handler for inbound requests of `M`.
    pub fn on_request<M, F>(&self, f: F)
    where
        M: WireMessage,
        F: Fn(&M, &Delivery) + Send + Sync + 'static,
    {
        self.set_request_handler(M::TYPE_TAG, typed::<M, F>(f));
    }

    /// Send a reply to an inbound request.
    ///
    /// # Errors
    ///
    /// - [`Error::MissingPeerIdentity`] if `peer` is `None`; nothing is sent
    /// - [`Error::NotListening`] if there is no inbound-routed socket
    /// - encode or transport failures
    pub fn reply(
        &self,
        msg: &dyn Message,
        peer: Option<&PeerIdentity>,
        request_id: RequestId,
    ) -> Result<()> {
        let peer = peer.ok_or(Error::MissingPeerIdentity)?;
        self.shared.ensure_open()?;
        let router = self
            .shared
            .sockets
            .lock()
            .router
            .clone()
            .ok_or(Error::NotListening)?;

        let envelope = Envelope::Routed {
            peer: peer.clone(),
            request_id,
            body: Body::encode(msg)?,
        };
        router.send(envelope.into_frames())?;
        debug!(%request_id, %peer, type_tag = msg.type_tag(), "reply sent");
        Ok(())
    }

    /// Reply using the routing metadata a request handler was invoked with.
    ///
    /// # Errors
    ///
    /// [`Error::MissingPeerIdentity`] / [`Error::MissingRequestId`] when the
    /// delivery did not come from the inbound-routed socket, otherwise as
    /// [`reply`](Self::reply).
    pub fn reply_to(&self, delivery: &Delivery, msg: &dyn Message) -> Result<()> {
        let peer = delivery.peer.as_ref().ok_or(Error::MissingPeerIdentity)?;
        let request_id = delivery.request_id.ok_or(Error::MissingRequestId)?;
        self.reply(msg, Some(peer), request_id)
    }

    // -- publish / subscribe -----------------------------------------------

    /// Create the publish socket if needed and bind it to `address`.
    ///
    /// # Errors
    ///
    /// [`Error::Closed`] after close, or the transport's bind failure.
    pub fn bind_publisher(&self, address: &str) -> Result<()> {
        self.shared.ensure_open()?;
        let mut sockets = self.shared.sockets.lock();
        sockets.ensure_open()?;
        let publisher = self.shared.lazily(&mut sockets.publisher, SocketType::Pub)?;
        publisher.bind(address)?;
        info!(address, "publisher bound");
        Ok(())
    }

    /// Publish a message to every connected subscriber.
    ///
    /// With no subscriber connected (or no bound publisher) the message is
    /// dropped by the transport and this still succeeds.
    ///
    /// # Errors
    ///
    /// [`Error::Closed`] after close, encode or transport failures.
    pub fn publish(&self, msg: &dyn Message) -> Result<()> {
        self.shared.ensure_open()?;
        let publisher = {
            let mut sockets = self.shared.sockets.lock();
            sockets.ensure_open()?;
            self.shared.lazily(&mut sockets.publisher, SocketType::Pub)?
        };

        let envelope = Envelope::Publish {
            body: Body::encode(msg)?,
        };
        publisher.send(envelope.into_frames())?;
        debug!(type_tag = msg.type_tag(), "published");
        Ok(())
    }

    /// Connect the subscribe socket (created if needed) to `address`.
    ///
    /// # Errors
    ///
    /// [`Error::Closed`] after close, or the transport's connect failure.
    pub fn connect_subscriber(&self, address: &str) -> Result<()> {
        self.shared.ensure_open()?;
        let mut sockets = self.shared.sockets.lock();
        sockets.ensure_open()?;
        let subscriber = self.shared.lazily(&mut sockets.subscriber, SocketType::Sub)?;
        subscriber.connect(address)?;
        info!(address, "subscriber connected");
        Ok(())
    }

    /// Bind `handler` for publications of `type_tag` and arm the transport
    /// filter for it, without connecting anywhere.
    ///
    /// # Errors
    ///
    /// [`Error::Closed`] after close, or the transport's subscribe failure.
    pub fn subscribe_to(&self, type_tag: &'static str, handler: impl Handler) -> Result<()> {
        self.shared.ensure_open()?;
        self.shared
            .subscriber_handlers
            .set(type_tag, Arc::new(handler));

        let mut sockets = self.shared.sockets.lock();
        sockets.ensure_open()?;
        let subscriber = self.shared.lazily(&mut sockets.subscriber, SocketType::Sub)?;
        subscriber.subscribe(type_tag.as_bytes())?;
        debug!(type_tag, "subscribed");
        Ok(())
    }

    /// Subscribe to `type_tag` on the publisher at `address`.
    ///
    /// # Errors
    ///
    /// As [`subscribe_to`](Self::subscribe_to) and
    /// [`connect_subscriber`](Self::connect_subscriber).
    pub fn subscribe(&self, address: &str, type_tag: &'static str, handler: impl Handler) -> Result<()> {
        self.subscribe_to(type_tag, handler)?;
        self.connect_subscriber(address)
    }

    /// Typed form of [`subscribe`](Self::subscribe).
    ///
    /// # Errors
    ///
    /// As [`subscribe`](Self::subscribe).
    pub fn on_published<M, F>(&self, address: &str, f: F) -> Result<()>
    where
        M: WireMessage,
        F: Fn(&M, &Delivery) + Send + Sync + 'static,
    {
        self.subscribe(address, M::TYPE_TAG, typed::<M, F>(f))
    }

    // -- outbound requests -------------------------------------------------

    /// Send a correlated request to the manager listening on `address`.
    ///
    /// `replies` maps each expected reply type to its handler; `None` expects
    /// no reply. `timeout` overrides the configured default; a zero duration
    /// means no timeout. The request is recorded before it is sent, so a
    /// reply can never outrun its registration.
    ///
    /// # Errors
    ///
    /// [`Error::Closed`], [`Error::RequestIdsExhausted`], encode or transport
    /// failures. A failed send leaves no pending entry behind.
    pub fn request(
        &self,
        address: &str,
        msg: &dyn Message,
        replies: Option<HandlerMap>,
        timeout: Option<Duration>,
    ) -> Result<RequestId> {
        self.shared.ensure_open()?;
        let body = Body::encode(msg)?;
        let request_id = self.shared.ids.allocate()?;
        let dealer = self.dealer(address)?;

        let deadline = timeout
            .or(self.shared.config.default_request_timeout)
            .filter(|t| !t.is_zero())
            .and_then(|t| Instant::now().checked_add(t));

        self.shared.correlation.register(
            request_id,
            PendingRequest::new(address, dealer.id(), replies.unwrap_or_default(), deadline),
        );
        if let Some(deadline) = deadline {
            self.shared.timeouts.arm(deadline, request_id);
        }

        let envelope = Envelope::Dealer { request_id, body };
        if let Err(err) = dealer.send(envelope.into_frames()) {
            self.shared.correlation.remove(request_id);
            return Err(err.into());
        }
        debug!(%request_id, address, type_tag = msg.type_tag(), "request sent");
        Ok(request_id)
    }

    /// Request expecting a single reply type.
    ///
    /// # Errors
    ///
    /// As [`request`](Self::request).
    pub fn request_one(
        &self,
        address: &str,
        msg: &dyn Message,
        reply_tag: &'static str,
        handler: impl Handler,
        timeout: Option<Duration>,
    ) -> Result<RequestId> {
        self.request(
            address,
            msg,
            Some(HandlerMap::new().with(reply_tag, handler)),
            timeout,
        )
    }

    /// Push a message that expects no reply.
    ///
    /// The push is still recorded as a pending request with no reply
    /// handlers. Without a timeout that entry lives until [`close`](Self::close),
    /// so a long-running pusher should set
    /// [`ManagerConfig::with_default_request_timeout`] to bound the table.
    ///
    /// # Errors
    ///
    /// As [`request`](Self::request).
    pub fn send(&self, address: &str, msg: &dyn Message) -> Result<RequestId> {
        self.request(address, msg, None, None)
    }

    /// Replace the expected-reply handlers of a request still pending on
    /// `address`.
    ///
    /// # Errors
    ///
    /// [`Error::NoSuchRequest`] if the request was answered, expired or sent
    /// elsewhere.
    pub fn update_reply_handlers(
        &self,
        address: &str,
        request_id: RequestId,
        handlers: HandlerMap,
    ) -> Result<()> {
        self.shared.ensure_open()?;
        self.shared
            .correlation
            .update_handlers(address, request_id, handlers)
    }

    /// Number of requests awaiting a reply.
    pub fn pending_requests(&self) -> usize {
        self.shared.correlation.len()
    }

    fn dealer(&self, address: &str) -> Result<Arc<T::Socket>> {
        let mut sockets = self.shared.sockets.lock();
        sockets.ensure_open()?;
        if let Some(dealer) = sockets.dealers.get(address) {
            return Ok(Arc::clone(dealer));
        }

        let dealer = self.shared.transport.socket(SocketType::Dealer)?;
        dealer.connect(address)?;
        self.shared.poller.register(Arc::clone(&dealer));
        sockets
            .dealers
            .insert(address.to_string(), Arc::clone(&dealer));
        info!(address, socket = dealer.id(), "opened outbound socket");
        Ok(dealer)
    }

    /// Ids of the outbound sockets, by destination. Diagnostics only.
    pub fn outbound_sockets(&self) -> Vec<(String, SocketId)> {
        let mut out: Vec<_> = self
            .shared
            .sockets
            .lock()
            .dealers
            .iter()
            .map(|(address, dealer)| (address.clone(), dealer.id()))
            .collect();
        out.sort();
        out
    }

    // -- lifecycle ---------------------------------------------------------

    /// Attach a monitor receiving every dispatch event from now on.
    ///
    /// Only the most recent monitor receives events.
    pub fn monitor(&self) -> DispatchMonitor {
        let (sender, receiver) = create_monitor();
        *self.shared.monitor.lock() = Some(sender);
        receiver
    }

    /// Start the dispatch loop on a dedicated thread.
    ///
    /// # Errors
    ///
    /// [`Error::AlreadyRunning`], [`Error::Closed`], or [`Error::Spawn`] if
    /// the thread could not be started.
    pub fn spawn(&self) -> Result<DispatchHandle<T>> {
        self.claim_loop()?;

        match dispatch::spawn(Arc::clone(&self.shared)) {
            Ok(handle) => {
                info!(thread = %self.shared.config.thread_name, "dispatch thread spawned");
                Ok(handle)
            }
            Err(err) => {
                self.shared.finish_running();
                Err(Error::Spawn(err.to_string()))
            }
        }
    }

    /// A dispatcher for driving the loop by hand (see
    /// [`Dispatcher::run_once`]).
    ///
    /// The dispatcher claims the loop until it is dropped: meanwhile
    /// [`spawn`](Self::spawn) and `dispatcher` fail with
    /// [`Error::AlreadyRunning`] and [`close`](Self::close) with
    /// [`Error::DispatchRunning`].
    ///
    /// # Errors
    ///
    /// [`Error::AlreadyRunning`] while another loop owns the manager,
    /// [`Error::Closed`] after close.
    pub fn dispatcher(&self) -> Result<Dispatcher<T>> {
        self.claim_loop()?;
        Ok(Dispatcher::new(Arc::clone(&self.shared), None))
    }

    fn claim_loop(&self) -> Result<()> {
        let mut lifecycle = self.shared.lifecycle.lock();
        match *lifecycle {
            Lifecycle::Closed => Err(Error::Closed),
            Lifecycle::Running => Err(Error::AlreadyRunning),
            Lifecycle::Idle => {
                *lifecycle = Lifecycle::Running;
                Ok(())
            }
        }
    }

    /// Release every socket and clear all registries.
    ///
    /// Must follow [`DispatchHandle::shutdown`], or the drop of a manual
    /// [`Dispatcher`]; closing is idempotent.
    ///
    /// # Errors
    ///
    /// [`Error::DispatchRunning`] while a dispatch loop owns the manager.
    pub fn close(&self) -> Result<()> {
        {
            let mut lifecycle = self.shared.lifecycle.lock();
            match *lifecycle {
                Lifecycle::Running => return Err(Error::DispatchRunning),
                Lifecycle::Closed => return Ok(()),
                Lifecycle::Idle => *lifecycle = Lifecycle::Closed,
            }
        }

        let sockets = self.shared.sockets.lock().drain();
        for socket in &sockets {
            self.shared.poller.deregister(socket.id());
            socket.close();
        }

        self.shared.router_handlers.clear();
        self.shared.subscriber_handlers.clear();
        self.shared.correlation.clear();
        self.shared.timeouts.clear();
        *self.shared.monitor.lock() = None;

        info!(sockets = sockets.len(), "manager closed");
        Ok(())
    }
}

impl<T: Transport> fmt::Debug for Manager<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Manager")
            .field("lifecycle", &self.lifecycle())
            .field("pending_requests", &self.pending_requests())
            .field("router_handlers", &self.shared.router_handlers)
            .field("subscriber_handlers", &self.shared.subscriber_handlers)
            .finish_non_exhaustive()
    }
}
