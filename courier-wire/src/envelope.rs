//! Multipart envelopes.
//!
//! Frame layout per socket role:
//!
//! | Role | Frames |
//! |---|---|
//! | PUB / SUB | type tag, payload |
//! | ROUTER (request in, reply out) | peer identity, request id, type tag, payload |
//! | DEALER (request out, reply in) | request id, type tag, payload |

use bytes::Bytes;
use courier_core::{Multipart, SocketType};

use crate::error::{Result, WireError};
use crate::ids::{PeerIdentity, RequestId};
use crate::message::Message;

/// Type tag and payload frames of one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Body {
    pub type_tag: Bytes,
    pub payload: Bytes,
}

impl Body {
    /// Encode a message into its two body frames.
    ///
    /// # Errors
    ///
    /// Propagates the message's encode failure.
    pub fn encode(msg: &dyn Message) -> Result<Self> {
        Ok(Self {
            type_tag: Bytes::from_static(msg.type_tag().as_bytes()),
            payload: msg.encode()?,
        })
    }

    /// Type tag for logging; non-UTF-8 tags render lossily.
    #[must_use]
    pub fn tag_lossy(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.type_tag)
    }
}

/// A framed message as seen by one socket role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    /// Published / subscribed message
    Publish { body: Body },
    /// Message on the inbound-routed socket, addressed by peer identity
    Routed {
        peer: PeerIdentity,
        request_id: RequestId,
        body: Body,
    },
    /// Message on an outbound dealer socket
    Dealer { request_id: RequestId, body: Body },
}

impl Envelope {
    /// Number of frames a socket of this role receives per message, if it
    /// receives at all.
    #[must_use]
    pub const fn frame_count(socket_type: SocketType) -> Option<usize> {
        match socket_type {
            SocketType::Sub => Some(2),
            SocketType::Router => Some(4),
            SocketType::Dealer => Some(3),
            SocketType::Pub => None,
        }
    }

    /// Parse the frames received on a socket of the given role.
    ///
    /// # Errors
    ///
    /// - [`WireError::MalformedEnvelope`] if the frame count is wrong for
    ///   the role (or the role never receives)
    /// - [`WireError::BadRequestId`] if the request id frame is not 4 bytes
    pub fn parse(socket_type: SocketType, frames: Multipart) -> Result<Self> {
        let actual = frames.len();
        let malformed = |expected| WireError::MalformedEnvelope {
            socket_type,
            expected,
            actual,
        };

        match socket_type {
            SocketType::Sub => {
                let [type_tag, payload] = <[Bytes; 2]>::try_from(frames).map_err(|_| malformed(2))?;
                Ok(Self::Publish {
                    body: Body { type_tag, payload },
                })
            }
            SocketType::Router => {
                let [peer, id, type_tag, payload] =
                    <[Bytes; 4]>::try_from(frames).map_err(|_| malformed(4))?;
                Ok(Self::Routed {
                    peer: PeerIdentity::new(peer),
                    request_id: RequestId::from_frame(&id)?,
                    body: Body { type_tag, payload },
                })
            }
            SocketType::Dealer => {
                let [id, type_tag, payload] =
                    <[Bytes; 3]>::try_from(frames).map_err(|_| malformed(3))?;
                Ok(Self::Dealer {
                    request_id: RequestId::from_frame(&id)?,
                    body: Body { type_tag, payload },
                })
            }
            SocketType::Pub => Err(malformed(0)),
        }
    }

    /// Flatten into transport frames.
    #[must_use]
    pub fn into_frames(self) -> Multipart {
        match self {
            Self::Publish { body } => vec![body.type_tag, body.payload],
            Self::Routed {
                peer,
                request_id,
                body,
            } => vec![
                peer.into_bytes(),
                request_id.to_frame(),
                body.type_tag,
                body.payload,
            ],
            Self::Dealer { request_id, body } => {
                vec![request_id.to_frame(), body.type_tag, body.payload]
            }
        }
    }

    #[must_use]
    pub const fn body(&self) -> &Body {
        match self {
            Self::Publish { body } | Self::Routed { body, .. } | Self::Dealer { body, .. } => body,
        }
    }

    #[must_use]
    pub const fn request_id(&self) -> Option<RequestId> {
        match self {
            Self::Publish { .. } => None,
            Self::Routed { request_id, .. } | Self::Dealer { request_id, .. } => Some(*request_id),
        }
    }
}
