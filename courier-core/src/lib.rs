//! Courier Core
//!
//! Transport building blocks for the Courier messaging manager:
//! - Socket roles (`socket_type`)
//! - Transport, socket and poller traits (`transport`)
//! - In-process transport with ZeroMQ-like semantics (`inproc`, `poller`)
//! - SUB prefix filtering (`subscription`)
//! - Error types (`error`)

#![deny(unsafe_code)]
// Allow some pedantic lints that are intentional in this crate
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::match_same_arms)]

pub mod error;
pub mod inproc;
pub mod poller;
pub mod socket_type;
pub mod subscription;
pub mod transport;

pub use error::{Result, TransportError};
pub use inproc::{Context, InprocSocket};
pub use poller::InprocPoller;
pub use socket_type::SocketType;
pub use transport::{Multipart, Poller, Socket, SocketId, Transport};

// Keep it minimal to avoid API lock-in.
pub mod prelude {
    pub use crate::error::{Result, TransportError};
    pub use crate::inproc::Context;
    pub use crate::socket_type::SocketType;
    pub use crate::transport::{Multipart, Poller, Socket, SocketId, Transport};
}
