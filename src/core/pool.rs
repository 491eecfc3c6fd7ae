//! Per-type object pools with capped, contention-bounded release.
//!
//! Each concrete type gets its own slot in a [`PoolRegistry`], keyed by its
//! `TypeId`. A slot is a LIFO free-list plus an atomic size counter. Slots are
//! reserved with compare-and-increment before an instance is pushed, so the
//! counter never exceeds the cap even while many threads release at once.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::core::error::SchedulerError;

/// Cap applied to every pool that has no explicit override.
pub const DEFAULT_MAX_POOL_SIZE: usize = 100;

/// Reservation attempts made by `release` before giving up on a contended slot.
pub const MAX_RELEASE_ATTEMPTS: u32 = 10;

/// A value that can be recycled through a [`PoolRegistry`].
pub trait Poolable: Sized + Send + 'static {
    /// Construct a fresh instance in its default state.
    fn create() -> Self;

    /// Restore default state before the instance is stored for reuse.
    fn reset(&mut self);

    /// Retire the instance permanently. Called instead of `reset` when the
    /// pool cannot take it back.
    fn dispose(self) {
        drop(self);
    }

    /// Name reported in stats, logs, and diagnostics.
    fn type_name() -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Snapshot of one pool's occupancy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    /// Instances currently held for reuse.
    pub current: usize,
    /// Cap in force for the pool.
    pub max: usize,
}

/// Why a released instance was disposed instead of pooled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisposeReason {
    /// The pool was already at its cap.
    CapacityExceeded,
    /// Slot reservation lost every race within [`MAX_RELEASE_ATTEMPTS`].
    Contention,
}

impl DisposeReason {
    /// The error describing this disposal for `type_name` under cap `max`.
    #[must_use]
    pub const fn into_error(self, type_name: &'static str, max: usize) -> SchedulerError {
        match self {
            Self::CapacityExceeded => SchedulerError::CapacityExceeded { type_name, max },
            Self::Contention => SchedulerError::Contention {
                type_name,
                attempts: MAX_RELEASE_ATTEMPTS,
            },
        }
    }
}

/// Result of returning an instance to its pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// The instance was reset and stored for reuse.
    Pooled,
    /// The instance was retired.
    Disposed(DisposeReason),
}

impl ReleaseOutcome {
    /// Whether the instance is available for reuse.
    #[must_use]
    pub const fn is_pooled(&self) -> bool {
        matches!(self, Self::Pooled)
    }
}

struct TypePool<T> {
    type_name: &'static str,
    free: Mutex<Vec<T>>,
    current: AtomicUsize,
    max: AtomicUsize,
    overridden: AtomicBool,
}

impl<T: Poolable> TypePool<T> {
    fn new(max: usize, overridden: bool) -> Self {
        Self {
            type_name: T::type_name(),
            free: Mutex::new(Vec::new()),
            current: AtomicUsize::new(0),
            max: AtomicUsize::new(max),
            overridden: AtomicBool::new(overridden),
        }
    }

    fn acquire(&self) -> T {
        let pooled = self.free.lock().pop();
        match pooled {
            Some(item) => {
                self.current.fetch_sub(1, Ordering::AcqRel);
                item
            }
            None => T::create(),
        }
    }

    fn release(&self, item: T) -> ReleaseOutcome {
        self.release_with(item, || {})
    }

    /// `before_reserve` runs ahead of every compare-and-increment.
    fn release_with(&self, mut item: T, mut before_reserve: impl FnMut()) -> ReleaseOutcome {
        let mut current = self.current.load(Ordering::Acquire);
        for _ in 0..MAX_RELEASE_ATTEMPTS {
            if current >= self.max.load(Ordering::Acquire) {
                item.dispose();
                return ReleaseOutcome::Disposed(DisposeReason::CapacityExceeded);
            }
            before_reserve();
            match self.current.compare_exchange(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    item.reset();
                    self.free.lock().push(item);
                    return ReleaseOutcome::Pooled;
                }
                Err(actual) => current = actual,
            }
        }
        item.dispose();
        ReleaseOutcome::Disposed(DisposeReason::Contention)
    }

    /// Pop and dispose instances until at most `max` remain.
    fn trim_to(&self, max: usize) -> usize {
        let mut excess = Vec::new();
        {
            let mut free = self.free.lock();
            while self.current.load(Ordering::Acquire) > max {
                let Some(item) = free.pop() else {
                    break;
                };
                self.current.fetch_sub(1, Ordering::AcqRel);
                excess.push(item);
            }
        }
        let disposed = excess.len();
        for item in excess {
            item.dispose();
        }
        disposed
    }

    fn set_max(&self, max: usize, overridden: bool) -> usize {
        self.max.store(max, Ordering::Release);
        self.overridden.store(overridden, Ordering::Release);
        self.trim_to(max)
    }
}

trait ErasedPool: Send + Sync {
    fn type_name(&self) -> &'static str;
    fn stats(&self) -> PoolStats;
    fn is_overridden(&self) -> bool;
    fn set_max(&self, max: usize, overridden: bool) -> usize;
    fn trim(&self) -> usize;
    fn clear(&self, default_max: usize) -> usize;
    fn shrink(&self);
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Poolable> ErasedPool for TypePool<T> {
    fn type_name(&self) -> &'static str {
        self.type_name
    }

    fn stats(&self) -> PoolStats {
        PoolStats {
            current: self.current.load(Ordering::Acquire),
            max: self.max.load(Ordering::Acquire),
        }
    }

    fn is_overridden(&self) -> bool {
        self.overridden.load(Ordering::Acquire)
    }

    fn set_max(&self, max: usize, overridden: bool) -> usize {
        Self::set_max(self, max, overridden)
    }

    fn trim(&self) -> usize {
        self.trim_to(self.max.load(Ordering::Acquire))
    }

    fn clear(&self, default_max: usize) -> usize {
        let disposed = self.trim_to(0);
        self.max.store(default_max, Ordering::Release);
        self.overridden.store(false, Ordering::Release);
        disposed
    }

    fn shrink(&self) {
        self.free.lock().shrink_to_fit();
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

fn name_matches(type_name: &str, configured: &str) -> bool {
    type_name == configured || type_name.rsplit("::").next() == Some(configured)
}

/// Thread-safe table of per-type pools.
///
/// ```
/// use prometheus_event_scheduler::core::{Poolable, PoolRegistry};
///
/// #[derive(Default)]
/// struct Particle {
///     ttl: u32,
/// }
///
/// impl Poolable for Particle {
///     fn create() -> Self {
///         Self::default()
///     }
///     fn reset(&mut self) {
///         self.ttl = 0;
///     }
/// }
///
/// let pools = PoolRegistry::new();
/// let mut particle: Particle = pools.acquire();
/// particle.ttl = 30;
/// assert!(pools.release(particle).is_pooled());
/// assert_eq!(pools.acquire::<Particle>().ttl, 0);
/// ```
pub struct PoolRegistry {
    pools: RwLock<HashMap<TypeId, Arc<dyn ErasedPool>>>,
    default_max: AtomicUsize,
    named_caps: RwLock<HashMap<String, usize>>,
}

impl Default for PoolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PoolRegistry {
    /// Create a registry using [`DEFAULT_MAX_POOL_SIZE`] as the default cap.
    #[must_use]
    pub fn new() -> Self {
        Self::with_default_max_size(DEFAULT_MAX_POOL_SIZE)
    }

    /// Create a registry with a custom default cap.
    #[must_use]
    pub fn with_default_max_size(default_max: usize) -> Self {
        Self {
            pools: RwLock::new(HashMap::new()),
            default_max: AtomicUsize::new(default_max),
            named_caps: RwLock::new(HashMap::new()),
        }
    }

    /// Cap used by pools without an override.
    pub fn default_max_size(&self) -> usize {
        self.default_max.load(Ordering::Acquire)
    }

    /// Change the default cap and trim every pool that follows it.
    pub fn set_default_max_size(&self, max: usize) -> usize {
        self.default_max.store(max, Ordering::Release);
        let pools: Vec<_> = self.pools.read().values().cloned().collect();
        pools
            .iter()
            .filter(|pool| !pool.is_overridden())
            .map(|pool| pool.set_max(max, false))
            .sum()
    }

    /// Set a cap by type name, for types that may not be registered yet.
    ///
    /// `name` matches either the full type path or its last segment. A cap of
    /// zero removes the named entry.
    pub fn set_named_max_size(&self, name: impl Into<String>, max: usize) -> usize {
        let name = name.into();
        let pools: Vec<_> = self
            .pools
            .read()
            .values()
            .filter(|pool| name_matches(pool.type_name(), &name))
            .cloned()
            .collect();

        let default_max = self.default_max_size();
        if max == 0 {
            self.named_caps.write().remove(&name);
        } else {
            self.named_caps.write().insert(name, max);
        }

        pools
            .iter()
            .map(|pool| {
                if max == 0 {
                    pool.set_max(default_max, false)
                } else {
                    pool.set_max(max, true)
                }
            })
            .sum()
    }

    fn named_cap(&self, type_name: &str) -> Option<usize> {
        self.named_caps
            .read()
            .iter()
            .find(|(name, _)| name_matches(type_name, name))
            .map(|(_, max)| *max)
    }

    fn new_pool<T: Poolable>(&self) -> Arc<TypePool<T>> {
        let pool = match self.named_cap(T::type_name()) {
            Some(max) => TypePool::new(max, true),
            None => TypePool::new(self.default_max_size(), false),
        };
        Arc::new(pool)
    }

    fn pool<T: Poolable>(&self) -> Arc<TypePool<T>> {
        let key = TypeId::of::<T>();
        let existing = self.pools.read().get(&key).cloned();
        if let Some(pool) = existing.and_then(|pool| pool.into_any().downcast::<TypePool<T>>().ok()) {
            return pool;
        }

        let mut pools = self.pools.write();
        if let Some(pool) = pools
            .get(&key)
            .cloned()
            .and_then(|pool| pool.into_any().downcast::<TypePool<T>>().ok())
        {
            return pool;
        }
        let pool = self.new_pool::<T>();
        pools.insert(key, Arc::clone(&pool) as Arc<dyn ErasedPool>);
        tracing::debug!(type_name = T::type_name(), "registered pool slot");
        pool
    }

    /// Ensure a pool slot exists for `T`.
    pub fn register<T: Poolable>(&self) {
        let _ = self.pool::<T>();
    }

    /// Take a pooled instance, or construct one if the pool is empty.
    pub fn acquire<T: Poolable>(&self) -> T {
        self.pool::<T>().acquire()
    }

    /// Return an instance. Full or contended pools dispose it instead.
    pub fn release<T: Poolable>(&self, item: T) -> ReleaseOutcome {
        let outcome = self.pool::<T>().release(item);
        if let ReleaseOutcome::Disposed(reason) = outcome {
            tracing::debug!(type_name = T::type_name(), ?reason, "pooled instance disposed");
        }
        outcome
    }

    /// Return `item` to its pool, reporting a disposal as an error.
    ///
    /// # Errors
    ///
    /// `CapacityExceeded` when the pool was full and `Contention` when slot
    /// reservation kept losing races. The instance was disposed in both cases.
    pub fn try_release<T: Poolable>(&self, item: T) -> Result<(), SchedulerError> {
        match self.release(item) {
            ReleaseOutcome::Pooled => Ok(()),
            ReleaseOutcome::Disposed(reason) => {
                Err(reason.into_error(T::type_name(), self.max_size::<T>()))
            }
        }
    }

    /// Fill the pool with up to `count` fresh instances. Returns how many were stored.
    pub fn prewarm<T: Poolable>(&self, count: usize) -> usize {
        let pool = self.pool::<T>();
        (0..count)
            .take_while(|_| pool.release(T::create()).is_pooled())
            .count()
    }

    /// Override the cap for `T`; zero reverts to the default. Excess
    /// instances are disposed immediately and their count returned.
    pub fn set_max_size<T: Poolable>(&self, max: usize) -> usize {
        let pool = self.pool::<T>();
        if max == 0 {
            pool.set_max(self.default_max_size(), false)
        } else {
            pool.set_max(max, true)
        }
    }

    /// Cap in force for `T`.
    pub fn max_size<T: Poolable>(&self) -> usize {
        self.pool::<T>().max.load(Ordering::Acquire)
    }

    /// Occupancy of the pool for `T`.
    pub fn stats<T: Poolable>(&self) -> PoolStats {
        ErasedPool::stats(self.pool::<T>().as_ref())
    }

    /// Occupancy of every registered pool, by type name.
    pub fn snapshot(&self) -> Vec<(&'static str, PoolStats)> {
        let mut stats: Vec<_> = self
            .pools
            .read()
            .values()
            .map(|pool| (pool.type_name(), pool.stats()))
            .collect();
        stats.sort_by_key(|(name, _)| *name);
        stats
    }

    /// Instances held across all pools.
    pub fn total_pooled(&self) -> usize {
        self.pools.read().values().map(|pool| pool.stats().current).sum()
    }

    /// Dispose every pooled instance and drop all per-type overrides.
    pub fn clear_all(&self) -> usize {
        let default_max = self.default_max_size();
        let pools: Vec<_> = self.pools.read().values().cloned().collect();
        self.named_caps.write().clear();
        let disposed = pools.iter().map(|pool| pool.clear(default_max)).sum();
        tracing::info!(disposed, "cleared all pools");
        disposed
    }

    /// Dispose instances beyond each pool's cap.
    pub fn trim_all(&self) -> usize {
        let pools: Vec<_> = self.pools.read().values().cloned().collect();
        pools.iter().map(|pool| pool.trim()).sum()
    }

    /// Release spare free-list capacity in every pool.
    pub fn shrink_all(&self) {
        let pools: Vec<_> = self.pools.read().values().cloned().collect();
        for pool in pools {
            pool.shrink();
        }
    }
}
