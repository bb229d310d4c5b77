//! Handler registries.
//!
//! A handler is a callback invoked on the dispatch thread with a decoded
//! message and its routing metadata. Two independent [`HandlerRegistry`]
//! instances bind inbound requests and subscribed messages by type tag;
//! [`HandlerMap`] is the per-request set of expected reply types.

use courier_wire::{Message, PeerIdentity, RequestId, WireMessage};
use hashbrown::HashMap;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Routing metadata handed to a handler alongside the message.
///
/// | Origin | `peer` | `request_id` |
/// |---|---|---|
/// | inbound request (router) | `Some` | `Some` |
/// | subscription | `None` | `None` |
/// | reply to our request (dealer) | `None` | `Some` |
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delivery {
    pub peer: Option<PeerIdentity>,
    pub request_id: Option<RequestId>,
}

impl Delivery {
    /// Inbound request from `peer`.
    #[must_use]
    pub const fn routed(peer: PeerIdentity, request_id: RequestId) -> Self {
        Self {
            peer: Some(peer),
            request_id: Some(request_id),
        }
    }

    /// Subscribed message.
    #[must_use]
    pub const fn published() -> Self {
        Self {
            peer: None,
            request_id: None,
        }
    }

    /// Reply to one of our requests.
    #[must_use]
    pub const fn reply(request_id: RequestId) -> Self {
        Self {
            peer: None,
            request_id: Some(request_id),
        }
    }
}

/// Callback invoked with a decoded message.
pub trait Handler: Send + Sync + 'static {
    fn handle(&self, msg: &dyn Message, delivery: &Delivery);
}

impl<F> Handler for F
where
    F: Fn(&dyn Message, &Delivery) + Send + Sync + 'static,
{
    fn handle(&self, msg: &dyn Message, delivery: &Delivery) {
        self(msg, delivery);
    }
}

/// Shared handler reference.
pub type HandlerRef = Arc<dyn Handler>;

/// Adapt a closure over a concrete message type into a [`Handler`].
///
/// A message of any other type is logged and ignored; this can only happen
/// when a tag is bound to a handler for a different type.
pub fn typed<M, F>(f: F) -> impl Handler
where
    M: Message,
    F: Fn(&M, &Delivery) + Send + Sync + 'static,
{
    move |msg: &dyn Message, delivery: &Delivery| match msg.downcast_ref::<M>() {
        Some(concrete) => f(concrete, delivery),
        None => warn!(
            expected = std::any::type_name::<M>(),
            actual = msg.type_tag(),
            "handler bound to a different message type"
        ),
    }
}

/// Type tag -> handler mapping. Cheap to clone.
#[derive(Clone, Default)]
pub struct HandlerMap {
    handlers: HashMap<&'static str, HandlerRef>,
}

impl HandlerMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: bind a typed closure for `M`.
    ///
    /// ```
    /// use courier::HandlerMap;
    /// use courier_wire::WireMessage;
    /// # use serde::{Deserialize, Serialize};
    /// # #[derive(Debug, Serialize, Deserialize)]
    /// # struct Entity { id: u32 }
    /// # impl WireMessage for Entity { const TYPE_TAG: &'static str = "Entity"; }
    ///
    /// let replies = HandlerMap::new().on::<Entity, _>(|entity, _| {
    ///     println!("got entity {}", entity.id);
    /// });
    /// assert!(replies.contains("Entity"));
    /// ```
    #[must_use]
    pub fn on<M, F>(mut self, f: F) -> Self
    where
        M: WireMessage,
        F: Fn(&M, &Delivery) + Send + Sync + 'static,
    {
        self.insert(M::TYPE_TAG, typed::<M, F>(f));
        self
    }

    /// Builder: bind an untyped handler.
    #[must_use]
    pub fn with(mut self, type_tag: &'static str, handler: impl Handler) -> Self {
        self.insert(type_tag, handler);
        self
    }

    /// Bind `handler` to `type_tag`, replacing any previous binding.
    pub fn insert(&mut self, type_tag: &'static str, handler: impl Handler) {
        self.insert_ref(type_tag, Arc::new(handler));
    }

    pub fn insert_ref(&mut self, type_tag: &'static str, handler: HandlerRef) {
        self.handlers.insert(type_tag, handler);
    }

    #[must_use]
    pub fn get(&self, type_tag: &str) -> Option<&HandlerRef> {
        self.handlers.get(type_tag)
    }

    #[must_use]
    pub fn contains(&self, type_tag: &str) -> bool {
        self.handlers.contains_key(type_tag)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Bound tags, sorted.
    #[must_use]
    pub fn tags(&self) -> Vec<&'static str> {
        let mut tags: Vec<_> = self.handlers.keys().copied().collect();
        tags.sort_unstable();
        tags
    }
}

impl fmt::Debug for HandlerMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.tags()).finish()
    }
}

/// Thread-safe, replace-atomically registry of handler bindings.
///
/// Readers take a snapshot `Arc` and never hold the lock while a handler
/// runs, so handlers may register other handlers.
pub struct HandlerRegistry {
    name: &'static str,
    bindings: RwLock<Arc<HandlerMap>>,
}

impl HandlerRegistry {
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            bindings: RwLock::new(Arc::new(HandlerMap::new())),
        }
    }

    /// Registry name used in errors and logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Bind one type, overwriting any previous binding for it.
    pub fn set(&self, type_tag: &'static str, handler: HandlerRef) {
        let mut bindings = self.bindings.write();
        Arc::make_mut(&mut bindings).insert_ref(type_tag, handler);
    }

    /// Replace every binding at once.
    pub fn set_all(&self, handlers: HandlerMap) {
        *self.bindings.write() = Arc::new(handlers);
    }

    #[must_use]
    pub fn resolve(&self, type_tag: &str) -> Option<HandlerRef> {
        self.bindings.read().get(type_tag).cloned()
    }

    /// Current bindings.
    #[must_use]
    pub fn snapshot(&self) -> Arc<HandlerMap> {
        Arc::clone(&self.bindings.read())
    }

    pub fn clear(&self) {
        self.set_all(HandlerMap::new());
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.read().is_empty()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("name", &self.name)
            .field("bindings", &*self.bindings.read())
            .finish()
    }
}
