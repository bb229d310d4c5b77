//! Publish/subscribe integration tests.

mod common;

use common::*;
use courier::{typed, Context, Delivery, DispatchError, DispatchEvent};
use courier_core::{Socket, SocketType, Transport};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A publication reaches the subscriber's handler exactly once, without
/// routing metadata.
#[test]
fn test_publish_subscribe_round_trip() {
    courier::dev_tracing::init_tracing();
    let ctx = Context::new();

    let publisher = manager(&ctx);
    publisher.bind_publisher("inproc://entity-feed").unwrap();

    let subscriber = manager(&ctx);
    let (tx, rx) = flume::unbounded();
    subscriber
        .on_published::<Entity, _>("inproc://entity-feed", move |entity, delivery| {
            tx.send((entity.clone(), delivery.clone())).unwrap();
        })
        .unwrap();
    let subscriber_loop = subscriber.spawn().unwrap();

    publisher.publish(&Entity::new(1, "boiler")).unwrap();

    let (entity, delivery) = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(entity, Entity::new(1, "boiler"));
    assert_eq!(delivery, Delivery::published());
    assert!(rx.recv_timeout(QUIET).is_err());

    subscriber_loop.shutdown();
    subscriber.close().unwrap();
    publisher.close().unwrap();
}

/// Publications of types nobody subscribed to are filtered by the
/// transport and never reach dispatch.
#[test]
fn test_unsubscribed_type_is_filtered() {
    let ctx = Context::new();

    let publisher = manager(&ctx);
    publisher.bind_publisher("inproc://mixed-feed").unwrap();

    let subscriber = manager(&ctx);
    let monitor = subscriber.monitor();
    let (tx, rx) = flume::unbounded();
    subscriber
        .on_published::<Entity, _>("inproc://mixed-feed", move |entity, _| {
            tx.send(entity.id).unwrap();
        })
        .unwrap();
    let subscriber_loop = subscriber.spawn().unwrap();

    publisher
        .publish(&Device {
            serial: "D-1".into(),
            entity_id: 1,
        })
        .unwrap();
    publisher.publish(&Entity::new(2, "after")).unwrap();

    assert_eq!(rx.recv_timeout(WAIT).unwrap(), 2);
    assert!(monitor.recv_timeout(QUIET).is_err());

    subscriber_loop.shutdown();
    subscriber.close().unwrap();
    publisher.close().unwrap();
}

/// A publication made before any subscriber connected is lost.
#[test]
fn test_publish_before_subscribe_is_dropped() {
    let ctx = Context::new();

    let publisher = manager(&ctx);
    publisher.bind_publisher("inproc://early-feed").unwrap();
    publisher.publish(&Entity::new(1, "early")).unwrap();

    let subscriber = manager(&ctx);
    let (tx, rx) = flume::unbounded();
    subscriber
        .on_published::<Entity, _>("inproc://early-feed", move |entity, _| {
            tx.send(entity.id).unwrap();
        })
        .unwrap();
    let subscriber_loop = subscriber.spawn().unwrap();
    assert!(rx.recv_timeout(QUIET).is_err());

    publisher.publish(&Entity::new(2, "late")).unwrap();
    assert_eq!(rx.recv_timeout(WAIT).unwrap(), 2);

    subscriber_loop.shutdown();
    subscriber.close().unwrap();
    publisher.close().unwrap();
}

/// Publishing without a bound publisher or any subscriber succeeds.
#[test]
fn test_publish_without_subscribers() {
    let ctx = Context::new();
    let lonely = manager(&ctx);
    lonely.publish(&Entity::new(1, "nobody")).unwrap();

    lonely.bind_publisher("inproc://empty-feed").unwrap();
    lonely.publish(&Entity::new(2, "still nobody")).unwrap();
    lonely.close().unwrap();
}

/// Every connected subscriber gets its own copy.
#[test]
fn test_fan_out_to_all_subscribers() {
    let ctx = Context::new();

    let publisher = manager(&ctx);
    publisher.bind_publisher("inproc://fan-out").unwrap();

    let hits = Arc::new(AtomicUsize::new(0));
    let subscribers: Vec<_> = (0..3)
        .map(|_| {
            let subscriber = manager(&ctx);
            let counter = Arc::clone(&hits);
            subscriber
                .on_published::<Entity, _>("inproc://fan-out", move |_, _| {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
            let handle = subscriber.spawn().unwrap();
            (subscriber, handle)
        })
        .collect();

    publisher.publish(&Entity::new(9, "shared")).unwrap();
    assert!(eventually(|| hits.load(Ordering::SeqCst) == 3));
    std::thread::sleep(QUIET);
    assert_eq!(hits.load(Ordering::SeqCst), 3);

    for (subscriber, handle) in subscribers {
        handle.shutdown();
        subscriber.close().unwrap();
    }
    publisher.close().unwrap();
}

/// Subscribing to several types on one connection dispatches each to its
/// own handler.
#[test]
fn test_subscribe_to_several_types() {
    let ctx = Context::new();

    let publisher = manager(&ctx);
    publisher.bind_publisher("inproc://plant-feed").unwrap();

    let subscriber = manager(&ctx);
    let (tx, rx) = flume::unbounded();
    let entities = tx.clone();
    subscriber
        .subscribe_to(
            "Entity",
            typed::<Entity, _>(move |entity, _| {
                entities.send(format!("entity {}", entity.id)).unwrap();
            }),
        )
        .unwrap();
    subscriber
        .subscribe_to(
            "Device",
            typed::<Device, _>(move |device, _| {
                tx.send(format!("device {}", device.serial)).unwrap();
            }),
        )
        .unwrap();
    subscriber.connect_subscriber("inproc://plant-feed").unwrap();
    let subscriber_loop = subscriber.spawn().unwrap();

    publisher.publish(&Entity::new(3, "tank")).unwrap();
    publisher
        .publish(&Device {
            serial: "D-7".into(),
            entity_id: 3,
        })
        .unwrap();

    let mut seen = vec![
        rx.recv_timeout(WAIT).unwrap(),
        rx.recv_timeout(WAIT).unwrap(),
    ];
    seen.sort();
    assert_eq!(seen, ["device D-7", "entity 3"]);

    subscriber_loop.shutdown();
    subscriber.close().unwrap();
    publisher.close().unwrap();
}

/// A subscribed type with a corrupt payload is reported, not dispatched.
#[test]
fn test_corrupt_publication_is_reported() {
    let ctx = Context::new();
    let raw = ctx.socket(SocketType::Pub).unwrap();
    raw.bind("inproc://raw-feed").unwrap();

    let subscriber = manager(&ctx);
    let monitor = subscriber.monitor();
    subscriber
        .on_published::<Entity, _>("inproc://raw-feed", |_, _| panic!("corrupt entity"))
        .unwrap();
    let dispatcher = subscriber.dispatcher().unwrap();

    raw.send(vec![
        bytes::Bytes::from_static(b"Entity"),
        bytes::Bytes::from_static(b"[1, 2]"),
    ])
    .unwrap();

    assert!(eventually(|| dispatcher.run_once() > 0));
    assert!(matches!(
        monitor.try_recv().unwrap(),
        DispatchEvent::Dropped(DispatchError::Wire(_))
    ));
    drop(dispatcher);
    subscriber.close().unwrap();
}
