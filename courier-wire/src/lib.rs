//! Courier Wire
//!
//! The wire protocol spoken between Courier managers:
//! - Request ids and peer identities (`ids`)
//! - Multipart envelopes per socket role (`envelope`)
//! - The `Message` / `WireMessage` traits with JSON payloads (`message`)
//! - Static type manifest and cached decode registry (`registry`)
//! - Error types (`error`)

#![deny(unsafe_code)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod envelope;
pub mod error;
pub mod ids;
pub mod message;
pub mod registry;

pub use envelope::{Body, Envelope};
pub use error::{Result, WireError};
pub use ids::{PeerIdentity, RequestId};
pub use message::{Message, WireMessage};
pub use registry::{DecodeFn, TypeManifest, TypeRegistry};
