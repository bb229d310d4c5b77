//! Request timeout integration tests.

mod common;

use common::*;
use courier::{Context, DispatchError, DispatchEvent, ExpiryPolicy, HandlerMap, ManagerConfig};
use courier_core::{Socket, SocketType, Transport};
use courier_wire::{Body, Envelope};
use std::time::{Duration, Instant};

fn notify_config() -> ManagerConfig {
    fast_config().with_expiry_policy(ExpiryPolicy::Notify)
}

/// An expired request is retired; its late reply is dropped as stale and
/// never reaches the handler.
#[test]
fn test_expired_request_drops_late_reply() {
    courier::dev_tracing::init_tracing();
    let ctx = Context::new();
    let raw = ctx.socket(SocketType::Router).unwrap();
    raw.bind("inproc://sluggish").unwrap();

    let client = manager(&ctx);
    let monitor = client.monitor();
    let (tx, rx) = flume::unbounded();
    let replies = HandlerMap::new().on::<Entity, _>(move |entity, _| {
        tx.send(entity.id).unwrap();
    });
    let id = client
        .request(
            "inproc://sluggish",
            &ReqEntity { id: 1 },
            Some(replies),
            Some(Duration::from_millis(50)),
        )
        .unwrap();
    let client_loop = client.spawn().unwrap();

    let Envelope::Routed { peer, .. } =
        Envelope::parse(SocketType::Router, recv_raw(raw.as_ref())).unwrap()
    else {
        panic!("expected a routed envelope");
    };
    assert!(eventually(|| client.pending_requests() == 0));

    raw.send(
        Envelope::Routed {
            peer,
            request_id: id,
            body: Body::encode(&Entity::new(1, "too late")).unwrap(),
        }
        .into_frames(),
    )
    .unwrap();

    assert_eq!(
        expect_event(&monitor, |_| true),
        DispatchEvent::Dropped(DispatchError::NoSuchRequest(id))
    );
    assert!(rx.recv_timeout(QUIET).is_err());

    client_loop.shutdown();
    client.close().unwrap();
}

/// Under the notify policy each expiry is reported with its destination.
#[test]
fn test_expiry_notification() {
    let ctx = Context::new();
    let client = manager_with(&ctx, notify_config());
    let monitor = client.monitor();

    let id = client
        .request(
            "inproc://void",
            &ReqEntity { id: 2 },
            Some(HandlerMap::new()),
            Some(Duration::from_millis(30)),
        )
        .unwrap();
    let started = Instant::now();
    let client_loop = client.spawn().unwrap();

    assert_eq!(
        expect_event(&monitor, |_| true),
        DispatchEvent::Expired {
            destination: "inproc://void".into(),
            request_id: id,
        }
    );
    assert!(started.elapsed() >= Duration::from_millis(25));
    assert_eq!(client.pending_requests(), 0);

    client_loop.shutdown();
    client.close().unwrap();
}

/// The default policy retires expired requests without telling anyone.
#[test]
fn test_silent_expiry() {
    let ctx = Context::new();
    let client = manager(&ctx);
    let monitor = client.monitor();

    client
        .request(
            "inproc://void-silent",
            &ReqEntity { id: 3 },
            None,
            Some(Duration::from_millis(20)),
        )
        .unwrap();
    let client_loop = client.spawn().unwrap();

    assert!(eventually(|| client.pending_requests() == 0));
    assert!(monitor.recv_timeout(QUIET).is_err());

    client_loop.shutdown();
    client.close().unwrap();
}

/// The configured default applies when a request names no timeout, and a
/// zero timeout opts out of it.
#[test]
fn test_default_request_timeout() {
    let ctx = Context::new();
    let config = notify_config().with_default_request_timeout(Duration::from_millis(30));
    let client = manager_with(&ctx, config);
    let monitor = client.monitor();

    let defaulted = client.send("inproc://void-default", &ReqEntity { id: 4 }).unwrap();
    let opted_out = client
        .request(
            "inproc://void-default",
            &ReqEntity { id: 5 },
            None,
            Some(Duration::ZERO),
        )
        .unwrap();
    let client_loop = client.spawn().unwrap();

    assert_eq!(
        expect_event(&monitor, |_| true),
        DispatchEvent::Expired {
            destination: "inproc://void-default".into(),
            request_id: defaulted,
        }
    );
    assert!(monitor.recv_timeout(QUIET).is_err());
    assert_eq!(client.pending_requests(), 1);
    assert!(client
        .update_reply_handlers("inproc://void-default", opted_out, HandlerMap::new())
        .is_ok());

    client_loop.shutdown();
    client.close().unwrap();
}

/// A reply inside the deadline consumes the request; the later sweep finds
/// nothing to expire.
#[test]
fn test_answered_request_does_not_expire() {
    let ctx = Context::new();

    let service = manager(&ctx);
    let replier = service.clone();
    service.on_request::<ReqEntity, _>(move |req, delivery| {
        replier
            .reply_to(delivery, &Entity::new(req.id, "prompt"))
            .unwrap();
    });
    service.listen("inproc://prompt").unwrap();
    let service_loop = service.spawn().unwrap();

    let client = manager_with(&ctx, notify_config());
    let monitor = client.monitor();
    let (tx, rx) = flume::unbounded();
    let replies = HandlerMap::new().on::<Entity, _>(move |entity, _| {
        tx.send(entity.id).unwrap();
    });
    client
        .request(
            "inproc://prompt",
            &ReqEntity { id: 6 },
            Some(replies),
            Some(Duration::from_millis(100)),
        )
        .unwrap();
    let client_loop = client.spawn().unwrap();

    assert_eq!(rx.recv_timeout(WAIT).unwrap(), 6);
    assert!(monitor.recv_timeout(Duration::from_millis(250)).is_err());

    client_loop.shutdown();
    service_loop.shutdown();
    client.close().unwrap();
    service.close().unwrap();
}
