//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use courier::{
    Context, DispatchEvent, DispatchMonitor, Manager, ManagerConfig, TypeManifest, WireMessage,
};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Upper bound for any cross-thread wait in these tests.
pub const WAIT: Duration = Duration::from_secs(5);

/// How long to wait before concluding something did not happen.
pub const QUIET: Duration = Duration::from_millis(150);

/// Id the entity service answers with when it has no such entity.
pub const NOT_FOUND: u32 = 0xFFFF_FFFF;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: u32,
    pub name: String,
}

impl WireMessage for Entity {
    const TYPE_TAG: &'static str = "Entity";
}

impl Entity {
    pub fn new(id: u32, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
        }
    }

    pub fn not_found() -> Self {
        Self::new(NOT_FOUND, "")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReqEntity {
    pub id: u32,
}

impl WireMessage for ReqEntity {
    const TYPE_TAG: &'static str = "ReqEntity";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddEntity {
    pub entity: Entity,
}

impl WireMessage for AddEntity {
    const TYPE_TAG: &'static str = "AddEntity";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub serial: String,
    pub entity_id: u32,
}

impl WireMessage for Device {
    const TYPE_TAG: &'static str = "Device";
}

pub fn manifest() -> TypeManifest {
    TypeManifest::new()
        .with::<Entity>()
        .with::<ReqEntity>()
        .with::<AddEntity>()
        .with::<Device>()
}

/// Short poll interval so tests observe sweeps and shutdowns quickly.
pub fn fast_config() -> ManagerConfig {
    ManagerConfig::default().with_poll_interval(Duration::from_millis(10))
}

pub fn manager(ctx: &Context) -> Manager {
    Manager::with_config(ctx.clone(), manifest(), fast_config())
}

pub fn manager_with(ctx: &Context, config: ManagerConfig) -> Manager {
    Manager::with_config(ctx.clone(), manifest(), config)
}

/// Wait for the first monitor event matching `pred`, skipping others.
pub fn expect_event(
    monitor: &DispatchMonitor,
    pred: impl Fn(&DispatchEvent) -> bool,
) -> DispatchEvent {
    let deadline = Instant::now() + WAIT;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let event = monitor
            .recv_timeout(remaining)
            .expect("timed out waiting for dispatch event");
        if pred(&event) {
            return event;
        }
    }
}

/// Poll `cond` until it holds or [`WAIT`] elapses.
pub fn eventually(cond: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    cond()
}

/// Receive one message on a raw transport socket, panicking after [`WAIT`].
pub fn recv_raw<S: courier_core::Socket>(socket: &S) -> courier_core::Multipart {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if let Some(msg) = socket.try_recv().expect("raw socket closed") {
            return msg;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    panic!("timed out waiting on raw socket");
}
