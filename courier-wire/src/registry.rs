//! Type registry: wire tag -> decode operation.
//!
//! The application supplies a static [`TypeManifest`] once at startup. The
//! [`TypeRegistry`] resolves a raw tag frame against the manifest the first
//! time it is seen and caches the resolution, so subsequent messages of the
//! same type skip the UTF-8 check and the manifest lookup.

use bytes::Bytes;
use hashbrown::HashMap;
use parking_lot::RwLock;
use std::fmt;
use tracing::trace;

use crate::error::{Result, WireError};
use crate::message::{Message, WireMessage};

/// Decode operation for one message type.
pub type DecodeFn = fn(&[u8]) -> Result<Box<dyn Message>>;

fn decode_as<T: WireMessage>(payload: &[u8]) -> Result<Box<dyn Message>> {
    let msg = T::decode(payload)?;
    Ok(Box::new(msg))
}

/// Static list of the message types an application understands.
#[derive(Clone, Default)]
pub struct TypeManifest {
    entries: HashMap<&'static str, DecodeFn>,
}

impl TypeManifest {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`TypeManifest::register`].
    #[must_use]
    pub fn with<T: WireMessage>(mut self) -> Self {
        self.register::<T>();
        self
    }

    /// Add a serde-backed message type under its `TYPE_TAG`.
    pub fn register<T: WireMessage>(&mut self) -> &mut Self {
        self.register_raw(T::TYPE_TAG, decode_as::<T>)
    }

    /// Add a hand-written decode operation. A later registration for the
    /// same tag replaces the earlier one.
    pub fn register_raw(&mut self, type_tag: &'static str, decode: DecodeFn) -> &mut Self {
        self.entries.insert(type_tag, decode);
        self
    }

    #[must_use]
    pub fn contains(&self, type_tag: &str) -> bool {
        self.entries.contains_key(type_tag)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered tags, sorted.
    #[must_use]
    pub fn tags(&self) -> Vec<&'static str> {
        let mut tags: Vec<_> = self.entries.keys().copied().collect();
        tags.sort_unstable();
        tags
    }
}

impl fmt::Debug for TypeManifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeManifest")
            .field("tags", &self.tags())
            .finish()
    }
}

/// Resolve-once, cached decoder over a [`TypeManifest`].
pub struct TypeRegistry {
    manifest: TypeManifest,
    resolved: RwLock<HashMap<Bytes, DecodeFn>>,
}

impl TypeRegistry {
    #[must_use]
    pub fn new(manifest: TypeManifest) -> Self {
        Self {
            manifest,
            resolved: RwLock::new(HashMap::new()),
        }
    }

    /// Decode a payload of the given type.
    ///
    /// # Errors
    ///
    /// - [`WireError::UnknownType`] when the manifest has no entry for the tag
    /// - [`WireError::MalformedPayload`] when the bytes are invalid for it
    pub fn decode(&self, type_tag: &[u8], payload: &[u8]) -> Result<Box<dyn Message>> {
        let decode = self.resolve(type_tag)?;
        decode(payload)
    }

    /// Resolve a raw tag frame to its decode operation, caching the result.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::UnknownType`] for tags missing from the manifest,
    /// including tags that are not valid UTF-8.
    pub fn resolve(&self, type_tag: &[u8]) -> Result<DecodeFn> {
        if let Some(decode) = self.resolved.read().get(type_tag) {
            return Ok(*decode);
        }

        let name = std::str::from_utf8(type_tag)
            .map_err(|_| WireError::UnknownType(String::from_utf8_lossy(type_tag).into_owned()))?;
        let decode = *self
            .manifest
            .entries
            .get(name)
            .ok_or_else(|| WireError::UnknownType(name.to_string()))?;

        self.resolved
            .write()
            .insert(Bytes::copy_from_slice(type_tag), decode);
        trace!(type_tag = name, "resolved message type");
        Ok(decode)
    }

    /// Whether the manifest knows this tag.
    #[must_use]
    pub fn knows(&self, type_tag: &str) -> bool {
        self.manifest.contains(type_tag)
    }

    #[must_use]
    pub const fn manifest(&self) -> &TypeManifest {
        &self.manifest
    }

    /// Number of tags resolved so far.
    #[must_use]
    pub fn cached(&self) -> usize {
        self.resolved.read().len()
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("manifest", &self.manifest)
            .field("cached", &self.cached())
            .finish()
    }
}
