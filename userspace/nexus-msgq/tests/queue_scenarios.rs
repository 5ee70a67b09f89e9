//! CONTEXT: Queue handle integration tests over the host facility
//! INTENT: Round trip, per-type FIFO, purge/reset drains, blocking and non-blocking receive
//! DEPS: nexus-msgq (HostFacility backend)
//! TESTS: key 4242 walkthrough; purge by type; reset; non-blocking empty pop; blocking pop
//!        woken by a producer thread; multi-handle sharing
// Copyright 2024 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

use std::thread;
use std::time::{Duration, Instant};

use nexus_msgq::{Error, HostFacility, Payload, QueueConfig, QueueHandle};
use proptest::prelude::*;
use serde_json::{json, Value};

fn attach(facility: &HostFacility, key: i32, blocking: bool) -> QueueHandle<HostFacility> {
    let config = QueueConfig { blocking, ..QueueConfig::default() };
    QueueHandle::attach_with(facility.clone(), key, config).expect("attach")
}

#[test]
fn key_4242_walkthrough() {
    let facility = HostFacility::new();
    let queue = attach(&facility, 4242, false);
    queue.push("hello", Some(1)).unwrap();
    queue.push("world", Some(1)).unwrap();
    assert_eq!(queue.stat_by_name("msg_qnum").unwrap(), 2);
    assert_eq!(queue.pop(Some(1)).unwrap(), Payload::from("hello"));
    assert_eq!(queue.pop(Some(1)).unwrap(), Payload::from("world"));
    assert_eq!(queue.pop(Some(1)), Err(Error::WouldBlock));
}

#[test]
fn purge_leaves_other_types() {
    let facility = HostFacility::new();
    let queue = attach(&facility, 4243, false);
    queue.push("one", Some(1)).unwrap();
    queue.push("two", Some(2)).unwrap();
    queue.purge(Some(1));
    assert_eq!(queue.stat_by_name("msg_qnum").unwrap(), 1);
    assert_eq!(queue.pop(Some(2)).unwrap(), Payload::from("two"));
}

#[test]
fn reset_empties_every_type() {
    let facility = HostFacility::new();
    let queue = attach(&facility, 4244, true);
    for ty in 1..=5 {
        queue.push(json!({"ty": ty}), Some(ty)).unwrap();
    }
    assert_eq!(queue.reset(), 5);
    assert_eq!(queue.size().unwrap(), 0);
    assert_eq!(queue.reset(), 0);
}

#[test]
fn nonblocking_pop_on_empty_queue_returns_immediately() {
    let facility = HostFacility::new();
    let mut queue = attach(&facility, 4245, true);
    queue.set_blocking(false);
    let started = Instant::now();
    assert_eq!(queue.pop(None), Err(Error::WouldBlock));
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[test]
fn blocking_pop_waits_for_producer() {
    let facility = HostFacility::new();
    let consumer = attach(&facility, 4246, true);
    let producer = attach(&facility, 4246, true);
    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(30));
        producer.push(json!(["late", 1]), Some(3)).unwrap();
    });
    assert_eq!(consumer.pop(Some(3)).unwrap(), Payload::from(json!(["late", 1])));
    handle.join().unwrap();
}

#[test]
fn handles_on_the_same_key_share_the_queue() {
    let facility = HostFacility::new();
    let sender = attach(&facility, 4247, false);
    let receiver = attach(&facility, 4247, false);
    sender.push("shared", None).unwrap();
    assert_eq!(receiver.size().unwrap(), 1);
    assert_eq!(receiver.pop(None).unwrap(), Payload::from("shared"));
    let stats = sender.stats().unwrap();
    assert_eq!(stats.lspid, stats.lrpid);
    assert!(stats.rtime >= stats.stime);
}

#[test]
fn raw_payloads_roundtrip_unchanged() {
    let facility = HostFacility::new();
    let mut queue = attach(&facility, 4248, false);
    queue.set_serialize(false);
    let bytes: Vec<u8> = (0..=255).collect();
    queue.push(bytes.clone(), Some(8)).unwrap();
    assert_eq!(queue.pop(Some(8)).unwrap().as_bytes(), Some(bytes.as_slice()));
}

#[test]
fn floats_survive_serialization_exactly() {
    let facility = HostFacility::new();
    let queue = attach(&facility, 4249, false);
    for value in [1.0715660391465826e-75, 0.1 + 0.2, -2.5e300, f64::MIN_POSITIVE, 1.0] {
        queue.push(json!(value), None).unwrap();
        assert_eq!(queue.pop(None).unwrap(), Payload::Value(json!(value)));
    }
}

#[test]
fn nonblocking_push_on_full_queue_fails_with_eagain() {
    let facility = HostFacility::with_capacity(8);
    let mut queue = attach(&facility, 4250, false);
    queue.set_serialize(false);
    queue.push(b"12345678", None).unwrap();
    match queue.push(b"9", None) {
        Err(Error::Send { errno, .. }) => assert_eq!(errno.raw(), libc::EAGAIN),
        other => panic!("unexpected push result: {other:?}"),
    }
    assert_eq!(queue.size().unwrap(), 1);
}

#[test]
fn blocking_push_resumes_after_pop() {
    let facility = HostFacility::with_capacity(8);
    let mut consumer = attach(&facility, 4251, true);
    let mut producer = attach(&facility, 4251, true);
    consumer.set_serialize(false);
    producer.set_serialize(false);
    producer.push(b"first!!!", None).unwrap();
    let handle = thread::spawn(move || producer.push(b"second", None));
    thread::sleep(Duration::from_millis(30));
    assert_eq!(consumer.size().unwrap(), 1);
    assert_eq!(consumer.pop(None).unwrap(), Payload::from(b"first!!!"));
    handle.join().unwrap().unwrap();
    assert_eq!(consumer.pop(None).unwrap(), Payload::from(b"second"));
}

#[test]
fn drains_through_a_removed_queue_return_zero() {
    let facility = HostFacility::new();
    let mut owner = attach(&facility, 4252, false);
    let peer = attach(&facility, 4252, false);
    owner.push("pending", None).unwrap();
    owner.detach().unwrap();
    assert!(peer.is_attached());
    assert_eq!(peer.reset(), 0);
    assert_eq!(peer.purge(None), 0);
    assert_eq!(peer.purge(Some(2)), 0);
}

fn json_value() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        any::<f64>().prop_filter("finite", |f| f.is_finite()).prop_map(Value::from),
        "[a-z0-9 ]{0,12}".prop_map(Value::String),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,6}", inner, 0..4)
                .prop_map(|map| Value::Object(map.into_iter().collect())),
        ]
    })
}

proptest! {
    #[test]
    fn push_then_pop_returns_the_value(value in json_value(), ty in 1i64..100) {
        let facility = HostFacility::new();
        let queue = attach(&facility, 1, false);
        queue.push(value.clone(), Some(ty)).unwrap();
        prop_assert_eq!(queue.pop(Some(ty)).unwrap(), Payload::Value(value));
    }

    #[test]
    fn pops_follow_push_order_per_type(
        pushes in prop::collection::vec((1i64..4, "[a-z]{1,8}"), 1..24)
    ) {
        let facility = HostFacility::new();
        let queue = attach(&facility, 2, false);
        for (ty, text) in &pushes {
            queue.push(text.as_str(), Some(*ty)).unwrap();
        }
        for ty in 1i64..4 {
            let expected: Vec<Payload> = pushes
                .iter()
                .filter(|(t, _)| *t == ty)
                .map(|(_, text)| Payload::from(text.as_str()))
                .collect();
            let mut popped = Vec::new();
            while let Ok(payload) = queue.pop(Some(ty)) {
                popped.push(payload);
            }
            prop_assert_eq!(popped, expected);
        }
    }

    #[test]
    fn purge_removes_exactly_one_type(
        types in prop::collection::vec(1i64..4, 0..24),
        target in 1i64..4,
    ) {
        let facility = HostFacility::new();
        let queue = attach(&facility, 3, false);
        for ty in &types {
            queue.push(json!(ty), Some(*ty)).unwrap();
        }
        let matching = types.iter().filter(|ty| **ty == target).count();
        prop_assert_eq!(queue.purge(Some(target)), matching);
        prop_assert_eq!(queue.size().unwrap() as usize, types.len() - matching);
        prop_assert_eq!(queue.pop(Some(target)), Err(Error::WouldBlock));
    }
}
