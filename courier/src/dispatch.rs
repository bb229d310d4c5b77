//! Dispatch loop.
//!
//! One thread per manager polls every socket the manager owns, decodes what
//! arrives and invokes the matching handler synchronously:
//!
//! - ROUTER (inbound request): router registry, handler gets peer + id
//! - SUB (subscription): subscriber registry, handler gets neither
//! - DEALER (reply): correlation table, entry consumed, handler gets the id
//!
//! After each poll the timeout tracker is swept. Per-message failures are
//! logged and sent to the monitor; they never end the loop. Cancellation is
//! checked once per iteration, so it is observed within one poll interval.

use courier_core::{Context, Multipart, Poller, Socket, Transport};
use courier_wire::{Envelope, Message};
use flume::{Receiver, Sender, TryRecvError};
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::config::ExpiryPolicy;
use crate::error::DispatchError;
use crate::handlers::{Delivery, Handler, HandlerRegistry};
use crate::manager::{Lifecycle, Shared};
use crate::monitor::DispatchEvent;

/// Drives the dispatch loop of one manager.
///
/// Obtained from [`Manager::dispatcher`](crate::Manager::dispatcher) for
/// manual driving, or run on a dedicated thread by
/// [`Manager::spawn`](crate::Manager::spawn). A live `Dispatcher` holds the
/// manager in [`Lifecycle::Running`]; dropping it returns the manager to
/// idle, so at most one loop ever invokes handlers.
pub struct Dispatcher<T: Transport = Context> {
    shared: Arc<Shared<T>>,
    cancel: Option<Receiver<()>>,
}

impl<T: Transport> Dispatcher<T> {
    pub(crate) fn new(shared: Arc<Shared<T>>, cancel: Option<Receiver<()>>) -> Self {
        Self { shared, cancel }
    }

    /// Run until cancelled, or until the manager closes.
    pub fn run(self) {
        info!("dispatch loop started");
        while !self.cancelled() {
            self.run_once();
        }
        info!("dispatch loop stopped");
    }

    /// One iteration: poll, handle one message per ready socket, sweep
    /// timeouts. Returns the number of messages read.
    pub fn run_once(&self) -> usize {
        let interval = self.shared.config.effective_poll_interval();
        let ready = match self.shared.poller.poll(interval) {
            Ok(ready) => ready,
            Err(err) => {
                warn!(error = %err, "poll failed");
                Vec::new()
            }
        };
        trace!(ready = ready.len(), "poll cycle");

        let mut read = 0;
        for socket in ready {
            match socket.try_recv() {
                Ok(Some(frames)) => {
                    read += 1;
                    if let Err(err) = self.dispatch(socket.as_ref(), frames) {
                        self.shared.report(err);
                    }
                }
                Ok(None) => {}
                Err(err) => self.shared.report(DispatchError::Transport(err)),
            }
        }

        self.sweep(Instant::now());
        read
    }

    fn cancelled(&self) -> bool {
        if self.shared.lifecycle() == Lifecycle::Closed {
            return true;
        }
        match &self.cancel {
            Some(cancel) => !matches!(cancel.try_recv(), Err(TryRecvError::Empty)),
            None => false,
        }
    }

    fn dispatch(&self, socket: &T::Socket, frames: Multipart) -> Result<(), DispatchError> {
        let shared = &self.shared;
        match Envelope::parse(socket.socket_type(), frames)? {
            Envelope::Routed {
                peer,
                request_id,
                body,
            } => {
                let msg = shared.types.decode(&body.type_tag, &body.payload)?;
                let tag = body.tag_lossy();
                let handler = lookup(&shared.router_handlers, &tag)?;
                trace!(%request_id, %peer, type_tag = %tag, "inbound request");
                invoke(handler.as_ref(), msg.as_ref(), &Delivery::routed(peer, request_id), &tag)
            }
            Envelope::Publish { body } => {
                let msg = shared.types.decode(&body.type_tag, &body.payload)?;
                let tag = body.tag_lossy();
                let handler = lookup(&shared.subscriber_handlers, &tag)?;
                trace!(type_tag = %tag, "inbound publication");
                invoke(handler.as_ref(), msg.as_ref(), &Delivery::published(), &tag)
            }
            Envelope::Dealer { request_id, body } => {
                // Decode first: an undecodable reply leaves the request pending.
                let msg = shared.types.decode(&body.type_tag, &body.payload)?;
                let tag = body.tag_lossy();
                let handler = shared
                    .correlation
                    .resolve_and_consume(socket.id(), request_id, &tag)?;
                trace!(%request_id, type_tag = %tag, "reply");
                invoke(handler.as_ref(), msg.as_ref(), &Delivery::reply(request_id), &tag)
            }
        }
    }

    fn sweep(&self, now: Instant) {
        for request_id in self.shared.timeouts.sweep(now) {
            let Some(expired) = self.shared.correlation.expire(request_id, now) else {
                continue;
            };
            debug!(%request_id, destination = %expired.destination, "request expired");
            if self.shared.config.expiry_policy == ExpiryPolicy::Notify {
                self.shared.emit(DispatchEvent::Expired {
                    destination: expired.destination,
                    request_id,
                });
            }
        }
    }
}

impl<T: Transport> fmt::Debug for Dispatcher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("cancellable", &self.cancel.is_some())
            .finish()
    }
}

fn lookup(
    registry: &HandlerRegistry,
    type_tag: &str,
) -> Result<Arc<dyn Handler>, DispatchError> {
    registry
        .resolve(type_tag)
        .ok_or_else(|| DispatchError::NoHandlerRegistered {
            registry: registry.name(),
            type_tag: type_tag.to_string(),
        })
}

fn invoke(
    handler: &dyn Handler,
    msg: &dyn Message,
    delivery: &Delivery,
    type_tag: &str,
) -> Result<(), DispatchError> {
    panic::catch_unwind(AssertUnwindSafe(|| handler.handle(msg, delivery))).map_err(|payload| {
        DispatchError::HandlerPanicked {
            type_tag: type_tag.to_string(),
            reason: panic_message(payload.as_ref()),
        }
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// Runs when the loop exits, even by panic.
impl<T: Transport> Drop for Dispatcher<T> {
    fn drop(&mut self) {
        self.shared.finish_running();
    }
}

pub(crate) fn spawn<T: Transport>(shared: Arc<Shared<T>>) -> std::io::Result<DispatchHandle<T>> {
    let (cancel_tx, cancel_rx) = flume::bounded(1);
    let dispatcher = Dispatcher::new(Arc::clone(&shared), Some(cancel_rx));

    let join = std::thread::Builder::new()
        .name(shared.config.thread_name.clone())
        .spawn(move || dispatcher.run())?;

    Ok(DispatchHandle {
        cancel: cancel_tx,
        join: Some(join),
        shared,
    })
}

/// Handle to a running dispatch thread.
///
/// [`DispatchHandle::shutdown`] stops the loop and joins the thread; only
/// then may the manager be closed. Dropping the handle asks the loop to stop
/// without waiting for it.
pub struct DispatchHandle<T: Transport = Context> {
    cancel: Sender<()>,
    join: Option<JoinHandle<()>>,
    shared: Arc<Shared<T>>,
}

impl<T: Transport> DispatchHandle<T> {
    /// Signal cancellation, wake the poller and join the dispatch thread.
    ///
    /// The in-flight iteration completes first; no new poll is started.
    pub fn shutdown(mut self) {
        self.signal();
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                warn!("dispatch thread panicked");
            }
        }
        debug!("dispatch thread joined");
    }

    /// Whether the dispatch thread has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.join.as_ref().map_or(true, JoinHandle::is_finished)
    }

    fn signal(&self) {
        let _ = self.cancel.try_send(());
        self.shared.poller.wake();
    }
}

impl<T: Transport> Drop for DispatchHandle<T> {
    fn drop(&mut self) {
        if self.join.is_some() {
            self.signal();
        }
    }
}

impl<T: Transport> fmt::Debug for DispatchHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchHandle")
            .field("finished", &self.is_finished())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message() {
        let payload = panic::catch_unwind(|| panic!("boom")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "boom");

        let payload = panic::catch_unwind(|| panic!("code {}", 7)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "code 7");

        let payload = panic::catch_unwind(|| std::panic::panic_any(42u8)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }
}
