//! Request ids and peer identities.

use bytes::Bytes;
use std::fmt;

use crate::error::{Result, WireError};

/// Manager-local request correlation id.
///
/// On the wire it is always exactly 4 big-endian bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u32);

impl RequestId {
    /// Encoded length in bytes
    pub const LEN: usize = 4;

    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Encode as a wire frame.
    #[must_use]
    pub fn to_frame(self) -> Bytes {
        Bytes::copy_from_slice(&self.0.to_be_bytes())
    }

    /// Decode a wire frame.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::BadRequestId`] unless the frame is exactly
    /// [`RequestId::LEN`] bytes long.
    pub fn from_frame(frame: &[u8]) -> Result<Self> {
        let raw: [u8; Self::LEN] = frame
            .try_into()
            .map_err(|_| WireError::BadRequestId(frame.len()))?;
        Ok(Self(u32::from_be_bytes(raw)))
    }
}

impl From<u32> for RequestId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Transport-assigned identity of the peer behind an inbound request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerIdentity(Bytes);

impl PeerIdentity {
    #[must_use]
    pub const fn new(raw: Bytes) -> Self {
        Self(raw)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

impl fmt::Display for PeerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0.iter() {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}
