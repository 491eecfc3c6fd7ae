//! Per-type listeners notified after an event of that type executes.
//!
//! Subscriptions are owned by the subscriber. Dropping a [`Subscription`]
//! removes its listener; nothing is cleaned up implicitly.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct ListenerEntry {
    id: u64,
    listener: Box<dyn Any + Send + Sync>,
}

#[derive(Default)]
struct ListenerTable {
    listeners: RwLock<HashMap<TypeId, Vec<ListenerEntry>>>,
    next_id: AtomicU64,
}

impl ListenerTable {
    fn remove(&self, type_id: TypeId, id: u64) -> bool {
        let mut listeners = self.listeners.write();
        let Some(entries) = listeners.get_mut(&type_id) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        let removed = entries.len() != before;
        if entries.is_empty() {
            listeners.remove(&type_id);
        }
        removed
    }
}

/// Table of listeners keyed by event type.
#[derive(Clone, Default)]
pub struct ListenerRegistry {
    table: Arc<ListenerTable>,
}

impl ListenerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` for events of type `T`.
    ///
    /// The listener stays registered until the returned guard is dropped.
    pub fn subscribe<T, F>(&self, listener: F) -> Subscription
    where
        T: 'static,
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.table.next_id.fetch_add(1, Ordering::Relaxed);
        let listener: Listener<T> = Arc::new(listener);
        let type_id = TypeId::of::<T>();
        self.table
            .listeners
            .write()
            .entry(type_id)
            .or_default()
            .push(ListenerEntry {
                id,
                listener: Box::new(listener),
            });

        Subscription {
            table: Arc::downgrade(&self.table),
            type_id,
            id,
        }
    }

    /// Number of live listeners for `T`.
    pub fn listener_count<T: 'static>(&self) -> usize {
        self.table
            .listeners
            .read()
            .get(&TypeId::of::<T>())
            .map_or(0, Vec::len)
    }

    /// Call every listener for `T`. Returns how many were called.
    ///
    /// Listeners run after the table lock is released, so they may subscribe
    /// or drop subscriptions themselves.
    pub fn notify<T: 'static>(&self, event: &T) -> usize {
        let listeners: Vec<Listener<T>> = {
            let table = self.table.listeners.read();
            let Some(entries) = table.get(&TypeId::of::<T>()) else {
                return 0;
            };
            entries
                .iter()
                .filter_map(|entry| entry.listener.downcast_ref::<Listener<T>>().cloned())
                .collect()
        };

        for listener in &listeners {
            listener(event);
        }
        listeners.len()
    }

    /// Drop every listener. Outstanding guards become inert.
    pub fn clear(&self) {
        self.table.listeners.write().clear();
    }
}

/// Guard that keeps a listener registered.
#[must_use = "dropping a Subscription unsubscribes its listener"]
#[derive(Debug)]
pub struct Subscription {
    table: Weak<ListenerTable>,
    type_id: TypeId,
    id: u64,
}

impl Subscription {
    /// Whether the listener is still registered.
    pub fn is_active(&self) -> bool {
        self.table.upgrade().is_some_and(|table| {
            table
                .listeners
                .read()
                .get(&self.type_id)
                .is_some_and(|entries| entries.iter().any(|entry| entry.id == self.id))
        })
    }

    /// Remove the listener now.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(table) = self.table.upgrade() {
            table.remove(self.type_id, self.id);
        }
    }
}
