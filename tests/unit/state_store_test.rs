//! Tests for the keyed state store

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use prometheus_event_scheduler::infra::StateStore;
use prometheus_event_scheduler::runtime::{Clock, ManualClock};

#[derive(Debug, PartialEq)]
struct Inventory {
    slots: Vec<u32>,
}

#[test]
fn test_set_get_remove() {
    let store = StateStore::new(Arc::new(ManualClock::new()));
    assert!(store.is_empty());

    store.set(
        "player:1",
        Inventory {
            slots: vec![1, 2, 3],
        },
    );
    let inventory = store.get::<Inventory>("player:1").unwrap().unwrap();
    assert_eq!(inventory.slots, vec![1, 2, 3]);
    assert_eq!(store.len(), 1);

    assert!(store.remove("player:1"));
    assert!(!store.remove("player:1"));
    assert!(!store.contains("player:1"));
}

#[test]
fn test_set_replaces_value_and_type() {
    let store = StateStore::new(Arc::new(ManualClock::new()));
    store.set("slot", 1_u64);
    store.set("slot", "text");
    assert_eq!(*store.get::<&str>("slot").unwrap().unwrap(), "text");
    assert!(store.get::<u64>("slot").is_err());
}

#[test]
fn test_evict_idle_uses_last_access() {
    let clock = Arc::new(ManualClock::new());
    let store = StateStore::new(clock.clone());
    store.set("a", 1_u8);
    store.set("b", 2_u8);
    clock.advance(Duration::from_secs(30));
    store.set("c", 3_u8);

    let mut evicted = store.evict_idle(clock.now(), Duration::from_secs(10));
    evicted.sort();
    assert_eq!(evicted, vec!["a".to_string(), "b".to_string()]);
    assert_eq!(store.len(), 1);

    store.clear();
    assert!(store.is_empty());
}

#[test]
fn test_concurrent_writers() {
    let store = Arc::new(StateStore::new(Arc::new(ManualClock::new())));
    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for i in 0..100 {
                    store.set(format!("{worker}:{i}"), i);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(store.len(), 400);
}
