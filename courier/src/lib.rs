//! # Courier
//!
//! Typed messaging between independent peers over three patterns:
//! publish/subscribe, fire-and-forget push, and correlated request/reply.
//!
//! ## Architecture
//!
//! - **`courier-core`**: socket roles, transport/poller traits, in-process
//!   transport
//! - **`courier-wire`**: envelopes, request ids, message traits, type registry
//! - **`courier`**: the [`Manager`] and its dispatch loop (this crate)
//!
//! A [`Manager`] owns its sockets, a request-id allocator, a correlation
//! table of pending requests, a timeout tracker and two handler registries.
//! Any thread may call its operations; one dispatch thread
//! ([`Manager::spawn`]) polls the sockets and invokes handlers.
//!
//! ## Shutdown
//!
//! ```rust,no_run
//! # use courier::{Context, Manager};
//! # use courier_wire::TypeManifest;
//! # fn main() -> courier::Result<()> {
//! let manager = Manager::new(Context::new(), TypeManifest::new());
//! let dispatch = manager.spawn()?;
//! // ...
//! dispatch.shutdown(); // cancel, wake, join
//! manager.close()?;    // then release sockets
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod config;
pub mod correlation;
pub mod dev_tracing;
pub mod dispatch;
pub mod error;
pub mod handlers;
pub mod manager;
pub mod monitor;
pub mod timeout;

pub use config::{ExpiryPolicy, ManagerConfig};
pub use dispatch::{DispatchHandle, Dispatcher};
pub use error::{DispatchError, Error, Result};
pub use handlers::{typed, Delivery, Handler, HandlerMap, HandlerRegistry};
pub use manager::{Lifecycle, Manager};
pub use monitor::{DispatchEvent, DispatchMonitor};

pub use courier_core::Context;
pub use courier_wire::{Message, PeerIdentity, RequestId, TypeManifest, WireMessage};

pub mod prelude {
    pub use crate::config::{ExpiryPolicy, ManagerConfig};
    pub use crate::handlers::{Delivery, HandlerMap};
    pub use crate::manager::Manager;
    pub use crate::monitor::DispatchEvent;
    pub use courier_core::Context;
    pub use courier_wire::{Message, RequestId, TypeManifest, WireMessage};
}
