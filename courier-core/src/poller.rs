//! Readiness poller for in-process sockets.
//!
//! Every registered socket rings a shared single-slot doorbell when a message
//! lands in its inbox. [`InprocPoller::poll`] scans the watched set, and if
//! nothing is readable, parks on the doorbell until it rings or the timeout
//! elapses.

use flume::{Receiver, Sender};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

use crate::error::Result;
use crate::inproc::InprocSocket;
use crate::transport::{Poller, Socket, SocketId};

/// Poller over a dynamic set of [`InprocSocket`]s.
pub struct InprocPoller {
    sockets: RwLock<Vec<Arc<InprocSocket>>>,
    doorbell_tx: Sender<()>,
    doorbell_rx: Receiver<()>,
}

impl InprocPoller {
    /// Create an empty poller.
    #[must_use]
    pub fn new() -> Self {
        let (doorbell_tx, doorbell_rx) = flume::bounded(1);
        Self {
            sockets: RwLock::new(Vec::new()),
            doorbell_tx,
            doorbell_rx,
        }
    }

    /// Number of watched sockets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sockets.read().len()
    }

    /// Check if no sockets are watched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sockets.read().is_empty()
    }

    fn readable(&self) -> Vec<Arc<InprocSocket>> {
        self.sockets
            .read()
            .iter()
            .filter(|s| s.is_readable())
            .cloned()
            .collect()
    }
}

impl Default for InprocPoller {
    fn default() -> Self {
        Self::new()
    }
}

impl Poller for InprocPoller {
    type Socket = InprocSocket;

    fn register(&self, socket: Arc<InprocSocket>) {
        socket.set_notifier(Some(self.doorbell_tx.clone()));
        {
            let mut sockets = self.sockets.write();
            if !sockets.iter().any(|s| s.id() == socket.id()) {
                trace!(socket = socket.id(), "poller watching socket");
                sockets.push(socket);
            }
        }
        // A blocked poll must rescan to pick up messages queued before
        // registration.
        self.wake();
    }

    fn deregister(&self, id: SocketId) {
        let mut sockets = self.sockets.write();
        if let Some(pos) = sockets.iter().position(|s| s.id() == id) {
            let socket = sockets.swap_remove(pos);
            socket.set_notifier(None);
        }
    }

    fn poll(&self, timeout: Duration) -> Result<Vec<Arc<InprocSocket>>> {
        let ready = self.readable();
        if !ready.is_empty() {
            return Ok(ready);
        }

        // Any ring (delivery or wake) ends the wait; callers tolerate an
        // empty result.
        match self.doorbell_rx.recv_timeout(timeout) {
            Ok(()) => Ok(self.readable()),
            Err(_) => Ok(Vec::new()),
        }
    }

    fn wake(&self) {
        let _ = self.doorbell_tx.try_send(());
    }
}

impl std::fmt::Debug for InprocPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InprocPoller")
            .field("sockets", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inproc::Context;
    use crate::socket_type::SocketType;
    use crate::transport::Transport;
    use bytes::Bytes;
    use std::time::Instant;

    #[test]
    fn test_poll_times_out_empty() {
        let ctx = Context::new();
        let poller = ctx.poller();
        let router = ctx.socket(SocketType::Router).unwrap();
        router.bind("inproc://poll-idle").unwrap();
        poller.register(Arc::clone(&router));

        // First poll consumes the registration ring
        let _ = poller.poll(Duration::from_millis(10)).unwrap();

        let start = Instant::now();
        let ready = poller.poll(Duration::from_millis(30)).unwrap();
        assert!(ready.is_empty());
        assert!(start.elapsed() >= Duration::from_millis(25));
    }

    #[test]
    fn test_poll_reports_readable_socket() {
        let ctx = Context::new();
        let poller = ctx.poller();
        let router = ctx.socket(SocketType::Router).unwrap();
        let dealer = ctx.socket(SocketType::Dealer).unwrap();
        router.bind("inproc://poll-ready").unwrap();
        dealer.connect("inproc://poll-ready").unwrap();
        poller.register(Arc::clone(&router));
        poller.register(Arc::clone(&dealer));

        dealer.send(vec![Bytes::from_static(b"hi")]).unwrap();
        let ready = poller.poll(Duration::from_secs(1)).unwrap();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].id(), router.id());
    }

    #[test]
    fn test_delivery_from_other_thread_wakes_poll() {
        let ctx = Context::new();
        let poller = ctx.poller();
        let router = ctx.socket(SocketType::Router).unwrap();
        router.bind("inproc://poll-wake").unwrap();
        poller.register(Arc::clone(&router));
        let _ = poller.poll(Duration::from_millis(1)).unwrap();

        let ctx2 = ctx.clone();
        let sender = std::thread::spawn(move || {
            let dealer = ctx2.socket(SocketType::Dealer).unwrap();
            dealer.connect("inproc://poll-wake").unwrap();
            std::thread::sleep(Duration::from_millis(20));
            dealer.send(vec![Bytes::from_static(b"late")]).unwrap();
            // Keep the dealer alive until the message has been read
            std::thread::sleep(Duration::from_millis(200));
        });

        let start = Instant::now();
        let mut ready = Vec::new();
        while ready.is_empty() && start.elapsed() < Duration::from_secs(2) {
            ready = poller.poll(Duration::from_secs(2)).unwrap();
        }
        assert_eq!(ready.len(), 1);
        assert!(start.elapsed() < Duration::from_secs(1));
        sender.join().unwrap();
    }

    #[test]
    fn test_wake_interrupts_poll() {
        let ctx = Context::new();
        let poller = Arc::new(ctx.poller());

        let waker = Arc::clone(&poller);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            waker.wake();
        });

        let start = Instant::now();
        let ready = poller.poll(Duration::from_secs(5)).unwrap();
        assert!(ready.is_empty());
        assert!(start.elapsed() < Duration::from_secs(2));
        handle.join().unwrap();
    }

    #[test]
    fn test_deregister() {
        let ctx = Context::new();
        let poller = ctx.poller();
        let router = ctx.socket(SocketType::Router).unwrap();
        poller.register(Arc::clone(&router));
        poller.register(Arc::clone(&router));
        assert_eq!(poller.len(), 1);

        poller.deregister(router.id());
        assert!(poller.is_empty());
    }
}
