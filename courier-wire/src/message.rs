//! Message traits.
//!
//! Everything that crosses the wire implements [`Message`]: it carries a
//! static type tag and knows how to encode its payload. Application types
//! normally implement [`WireMessage`] instead and get [`Message`] for free,
//! with JSON payloads.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::Any;
use std::fmt;

use crate::error::{Result, WireError};

/// A type-tagged message with an encodable payload.
pub trait Message: Any + Send + Sync + fmt::Debug + 'static {
    /// Wire type tag (frame used for decode resolution and SUB filtering).
    fn type_tag(&self) -> &'static str;

    /// Encode the payload frame.
    fn encode(&self) -> Result<Bytes>;

    /// Upcast for downcasting through `dyn Message`.
    fn as_any(&self) -> &dyn Any;
}

impl dyn Message {
    /// Borrow the concrete message if it is a `T`.
    #[must_use]
    pub fn downcast_ref<T: Message>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    /// Check whether the concrete message is a `T`.
    #[must_use]
    pub fn is<T: Message>(&self) -> bool {
        self.as_any().is::<T>()
    }
}

/// A serde-backed message type with a fixed wire tag.
///
/// ```rust
/// use courier_wire::WireMessage;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Serialize, Deserialize)]
/// struct Entity {
///     id: u32,
///     name: String,
/// }
///
/// impl WireMessage for Entity {
///     const TYPE_TAG: &'static str = "Entity";
/// }
/// ```
pub trait WireMessage: Serialize + DeserializeOwned + fmt::Debug + Send + Sync + 'static {
    /// Tag written in the type frame.
    const TYPE_TAG: &'static str;

    /// Decode a payload frame into `Self`.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::MalformedPayload`] when the bytes do not
    /// deserialize into `Self`.
    fn decode(payload: &[u8]) -> Result<Self> {
        serde_json::from_slice(payload).map_err(|e| WireError::malformed(Self::TYPE_TAG, e))
    }
}

impl<T: WireMessage> Message for T {
    fn type_tag(&self) -> &'static str {
        T::TYPE_TAG
    }

    fn encode(&self) -> Result<Bytes> {
        serde_json::to_vec(self)
            .map(Bytes::from)
            .map_err(|e| WireError::Encode {
                type_tag: T::TYPE_TAG,
                reason: e.to_string(),
            })
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
