//! Socket role enumeration.
//!
//! Courier only uses the four ZeroMQ roles its messaging patterns need:
//! publish, subscribe, routed-inbound (ROUTER) and dealer-outbound (DEALER).

use std::fmt;

/// Socket roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SocketType {
    /// PUB socket for publishing messages to subscribers
    Pub = 1,

    /// SUB socket for subscribing to published messages
    Sub = 2,

    /// DEALER socket for asynchronous outbound requests
    Dealer = 5,

    /// ROUTER socket for receiving requests and routing replies by identity
    Router = 6,
}

impl SocketType {
    /// Get the socket type as a string name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pub => "PUB",
            Self::Sub => "SUB",
            Self::Dealer => "DEALER",
            Self::Router => "ROUTER",
        }
    }

    /// Check if this socket type is compatible with the given peer type.
    pub fn is_compatible(&self, peer: SocketType) -> bool {
        matches!(
            (self, peer),
            (Self::Pub, Self::Sub)
                | (Self::Sub, Self::Pub)
                | (Self::Dealer, Self::Router)
                | (Self::Router, Self::Dealer)
                | (Self::Dealer, Self::Dealer)
                | (Self::Router, Self::Router)
        )
    }

    /// Whether sockets of this role ever deliver inbound messages.
    pub const fn can_receive(&self) -> bool {
        !matches!(self, Self::Pub)
    }
}

impl fmt::Display for SocketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
