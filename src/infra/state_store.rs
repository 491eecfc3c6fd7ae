//! Keyed store for arbitrary typed state blobs.
//!
//! Each entry remembers when it was last touched on the host clock's
//! timeline, so hosts can evict state nobody has read or written for a while.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use crate::core::SchedulerError;
use crate::runtime::Clock;

struct StateEntry {
    value: Arc<dyn Any + Send + Sync>,
    type_id: TypeId,
    type_name: &'static str,
    last_access: Duration,
}

/// Concurrent typed key/value map with idle eviction.
pub struct StateStore {
    entries: RwLock<HashMap<String, StateEntry>>,
    clock: Arc<dyn Clock>,
}

impl StateStore {
    /// Create an empty store stamping accesses with `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Store `value` under `key`, replacing any previous value of any type.
    pub fn set<T>(&self, key: impl Into<String>, value: T)
    where
        T: Send + Sync + 'static,
    {
        let entry = StateEntry {
            value: Arc::new(value),
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            last_access: self.clock.now(),
        };
        self.entries.write().insert(key.into(), entry);
    }

    /// Fetch the value under `key` and refresh its access time.
    ///
    /// Returns `Ok(None)` when the key is absent.
    ///
    /// # Errors
    ///
    /// `InvalidState` when the stored value is not a `T`.
    pub fn get<T>(&self, key: &str) -> Result<Option<Arc<T>>, SchedulerError>
    where
        T: Send + Sync + 'static,
    {
        let now = self.clock.now();
        let mut entries = self.entries.write();
        let Some(entry) = entries.get_mut(key) else {
            return Ok(None);
        };
        if entry.type_id != TypeId::of::<T>() {
            return Err(SchedulerError::InvalidState(format!(
                "state `{key}` holds {}, not {}",
                entry.type_name,
                std::any::type_name::<T>()
            )));
        }
        entry.last_access = now;
        Ok(Arc::clone(&entry.value).downcast::<T>().ok())
    }

    /// Remove `key`. Returns whether it existed.
    pub fn remove(&self, key: &str) -> bool {
        self.entries.write().remove(key).is_some()
    }

    /// Whether `key` is present. Does not refresh its access time.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Drop entries untouched for longer than `max_idle` as of `now`.
    /// Returns the evicted keys.
    pub fn evict_idle(&self, now: Duration, max_idle: Duration) -> Vec<String> {
        let mut evicted = Vec::new();
        self.entries.write().retain(|key, entry| {
            let keep = now.saturating_sub(entry.last_access) <= max_idle;
            if !keep {
                evicted.push(key.clone());
            }
            keep
        });
        if !evicted.is_empty() {
            tracing::debug!(count = evicted.len(), "evicted idle state");
        }
        evicted
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::ManualClock;

    #[test]
    fn test_get_refreshes_access_time() {
        let clock = Arc::new(ManualClock::new());
        let store = StateStore::new(clock.clone());
        store.set("score", 10_u32);
        store.set("name", String::from("ada"));

        clock.advance(Duration::from_secs(5));
        assert_eq!(*store.get::<u32>("score").unwrap().unwrap(), 10);

        clock.advance(Duration::from_secs(5));
        let evicted = store.evict_idle(clock.now(), Duration::from_secs(7));
        assert_eq!(evicted, vec![String::from("name")]);
        assert!(store.contains("score"));
    }

    #[test]
    fn test_type_mismatch_is_an_error() {
        let store = StateStore::new(Arc::new(ManualClock::new()));
        store.set("score", 10_u32);
        assert!(matches!(
            store.get::<String>("score"),
            Err(SchedulerError::InvalidState(_))
        ));
        assert!(store.get::<u32>("missing").unwrap().is_none());
    }
}
