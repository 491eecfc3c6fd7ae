//! The schedulable unit: event payloads, their pooled cells, and handles.
//!
//! A payload type implements [`TimedEvent`]. The scheduler wraps each payload
//! in a reference-counted cell that carries the scheduling header (due time,
//! status, generation). Cells are recycled through the pool registry; every
//! recycle bumps the generation so handles from an earlier use go stale.

use std::any::TypeId;
use std::cmp::Ordering;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::core::listeners::ListenerRegistry;
use crate::core::pool::{Poolable, PoolRegistry};
use crate::core::SchedulerError;

/// Process-unique identifier of an event cell.
pub type EventId = u64;

static NEXT_EVENT_ID: AtomicU64 = AtomicU64::new(1);

/// Work that can be scheduled for a future time.
///
/// ```
/// use std::time::Duration;
/// use prometheus_event_scheduler::core::TimedEvent;
///
/// #[derive(Default)]
/// struct Respawn {
///     player: u32,
/// }
///
/// impl TimedEvent for Respawn {
///     fn execute(&mut self, _now: Duration) {
///         println!("respawning player {}", self.player);
///     }
/// }
/// ```
pub trait TimedEvent: Default + Send + 'static {
    /// Perform the work. `now` is the tick time that found the event due.
    ///
    /// Runs on the driving thread. It must not use a handle to this same
    /// event.
    fn execute(&mut self, now: Duration);

    /// Restore default state before the instance returns to its pool.
    fn reset(&mut self) {
        *self = Self::default();
    }

    /// Type tag used in pool stats and diagnostics.
    fn type_name() -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Lifecycle state of an event as seen through a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventStatus {
    /// Acquired but not yet stamped into the queue.
    Idle,
    /// Waiting in the queue.
    Pending,
    /// Executing, or executed and awaiting recycle.
    Running,
    /// Cancelled and awaiting reclamation.
    Cancelled,
    /// Returned to its pool; the handle refers to a previous use.
    Recycled,
    /// Permanently retired.
    Disposed,
}

struct Header {
    due_at: Duration,
    status: EventStatus,
    generation: u64,
    seq: u64,
}

/// Outcome of a cancel request made against a cell header.
pub(crate) enum CancelRequest {
    /// The handle's generation is gone or the cell was disposed.
    Stale,
    AlreadyCancelled,
    Running,
    /// Marked cancelled before it reached the queue.
    Unqueued,
    /// Marked cancelled; the caller should remove this queue entry.
    Queued { due_at: Duration, seq: u64 },
}

pub(crate) struct EventCell<T> {
    id: EventId,
    header: Mutex<Header>,
    disposed: AtomicBool,
    payload: Mutex<T>,
}

impl<T: TimedEvent> EventCell<T> {
    fn new() -> Self {
        Self {
            id: NEXT_EVENT_ID.fetch_add(1, AtomicOrdering::Relaxed),
            header: Mutex::new(Header {
                due_at: Duration::ZERO,
                status: EventStatus::Idle,
                generation: 0,
                seq: 0,
            }),
            disposed: AtomicBool::new(false),
            payload: Mutex::new(T::default()),
        }
    }

    pub(crate) fn generation(&self) -> u64 {
        self.header.lock().generation
    }

    pub(crate) fn configure<F: FnOnce(&mut T)>(&self, configure: F) {
        configure(&mut self.payload.lock());
    }

    /// Record the queue position about to be taken. Fails if the event was
    /// cancelled before it got here.
    pub(crate) fn stamp(&self, due_at: Duration, seq: u64) -> bool {
        let mut header = self.header.lock();
        match header.status {
            EventStatus::Idle | EventStatus::Pending => {
                header.due_at = due_at;
                header.seq = seq;
                header.status = EventStatus::Pending;
                true
            }
            _ => false,
        }
    }

    /// Queue key of a pending event, if `generation` is still current.
    pub(crate) fn pending_key(&self, generation: u64) -> Option<(Duration, u64)> {
        if self.disposed.load(AtomicOrdering::Acquire) {
            return None;
        }
        let header = self.header.lock();
        (header.generation == generation && header.status == EventStatus::Pending)
            .then_some((header.due_at, header.seq))
    }

    pub(crate) fn request_cancel(&self, generation: u64) -> CancelRequest {
        if self.disposed.load(AtomicOrdering::Acquire) {
            return CancelRequest::Stale;
        }
        let mut header = self.header.lock();
        if header.generation != generation {
            return CancelRequest::Stale;
        }
        match header.status {
            EventStatus::Cancelled => CancelRequest::AlreadyCancelled,
            EventStatus::Running => CancelRequest::Running,
            EventStatus::Idle => {
                header.status = EventStatus::Cancelled;
                CancelRequest::Unqueued
            }
            EventStatus::Pending => {
                header.status = EventStatus::Cancelled;
                CancelRequest::Queued {
                    due_at: header.due_at,
                    seq: header.seq,
                }
            }
            EventStatus::Recycled | EventStatus::Disposed => CancelRequest::Stale,
        }
    }

    fn status_for(&self, generation: u64) -> EventStatus {
        self.status_with(&self.header.lock(), generation)
    }

    fn status_with(&self, header: &Header, generation: u64) -> EventStatus {
        if self.disposed.load(AtomicOrdering::Acquire) {
            EventStatus::Disposed
        } else if header.generation == generation {
            header.status
        } else {
            EventStatus::Recycled
        }
    }

    /// Callers touching the payload hold its lock across this check, so a
    /// recycle cannot slip in between. The header lock is always taken after
    /// the payload lock, never before.
    fn check_live(&self, generation: u64) -> Result<(), SchedulerError> {
        self.check_live_with(&self.header.lock(), generation)
    }

    fn check_live_with(&self, header: &Header, generation: u64) -> Result<(), SchedulerError> {
        match self.status_with(header, generation) {
            EventStatus::Disposed => Err(SchedulerError::InvalidState(format!(
                "{} #{} was disposed",
                T::type_name(),
                self.id
            ))),
            EventStatus::Recycled => Err(SchedulerError::InvalidState(format!(
                "{} #{} was recycled",
                T::type_name(),
                self.id
            ))),
            _ => Ok(()),
        }
    }
}

/// Type-erased view of a cell used by the queue and the tick processor.
pub(crate) trait ScheduledEvent: Send + Sync {
    fn id(&self) -> EventId;
    fn event_type(&self) -> TypeId;
    fn type_name(&self) -> &'static str;
    fn is_cancelled(&self) -> bool;
    /// Move `Pending` to `Running`. Fails if the event was cancelled.
    fn begin(&self) -> bool;
    /// Mark cancelled after the caller took the event out of the queue.
    fn mark_cancelled(&self) -> bool;
    fn run(&self, now: Duration, listeners: &ListenerRegistry);
    fn recycle(self: Arc<Self>, pools: &PoolRegistry) -> Result<(), SchedulerError>;
    fn dispose(&self);
}

impl<T: TimedEvent> ScheduledEvent for EventCell<T> {
    fn id(&self) -> EventId {
        self.id
    }

    fn event_type(&self) -> TypeId {
        TypeId::of::<T>()
    }

    fn type_name(&self) -> &'static str {
        T::type_name()
    }

    fn is_cancelled(&self) -> bool {
        self.header.lock().status == EventStatus::Cancelled
    }

    fn begin(&self) -> bool {
        let mut header = self.header.lock();
        if header.status == EventStatus::Pending {
            header.status = EventStatus::Running;
            true
        } else {
            false
        }
    }

    fn mark_cancelled(&self) -> bool {
        let mut header = self.header.lock();
        let newly = header.status != EventStatus::Cancelled;
        header.status = EventStatus::Cancelled;
        newly
    }

    fn run(&self, now: Duration, listeners: &ListenerRegistry) {
        let mut payload = self.payload.lock();
        payload.execute(now);
        listeners.notify::<T>(&payload);
    }

    fn recycle(self: Arc<Self>, pools: &PoolRegistry) -> Result<(), SchedulerError> {
        pools.try_release(self)
    }

    fn dispose(&self) {
        self.header.lock().status = EventStatus::Cancelled;
        self.disposed.store(true, AtomicOrdering::Release);
    }
}

impl<T: TimedEvent> Poolable for Arc<EventCell<T>> {
    fn create() -> Self {
        Arc::new(EventCell::new())
    }

    fn reset(&mut self) {
        {
            let mut header = self.header.lock();
            header.generation += 1;
            header.status = EventStatus::Idle;
            header.due_at = Duration::ZERO;
            header.seq = 0;
        }
        self.payload.lock().reset();
    }

    fn dispose(self) {
        ScheduledEvent::dispose(self.as_ref());
    }

    fn type_name() -> &'static str {
        T::type_name()
    }
}

/// Queue entry: the due time and sequence number are fixed at insertion.
#[derive(Clone)]
pub(crate) struct QueuedEvent {
    pub(crate) due_at: Duration,
    pub(crate) seq: u64,
    pub(crate) event: Arc<dyn ScheduledEvent>,
}

impl PartialEq for QueuedEvent {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq && self.due_at == other.due_at
    }
}

impl Eq for QueuedEvent {}

impl PartialOrd for QueuedEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        self.due_at
            .cmp(&other.due_at)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

impl fmt::Debug for QueuedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueuedEvent")
            .field("due_at", &self.due_at)
            .field("seq", &self.seq)
            .field("event", &self.event.id())
            .field("type", &self.event.type_name())
            .finish()
    }
}

/// Caller-side reference to a scheduled event.
///
/// A handle is tied to one use of a pooled instance. Once the instance is
/// recycled the handle reports [`EventStatus::Recycled`] and payload access
/// fails with [`SchedulerError::InvalidState`].
pub struct EventHandle<T: TimedEvent> {
    cell: Arc<EventCell<T>>,
    generation: u64,
}

impl<T: TimedEvent> EventHandle<T> {
    pub(crate) fn new(cell: Arc<EventCell<T>>) -> Self {
        let generation = cell.generation();
        Self { cell, generation }
    }

    pub(crate) const fn cell(&self) -> &Arc<EventCell<T>> {
        &self.cell
    }

    /// Identifier of the underlying instance. Reused across recycles.
    pub fn id(&self) -> EventId {
        self.cell.id
    }

    /// Use count of the underlying instance this handle belongs to.
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Current lifecycle state.
    pub fn status(&self) -> EventStatus {
        self.cell.status_for(self.generation)
    }

    /// Whether the event was cancelled and not yet reclaimed.
    pub fn is_cancelled(&self) -> bool {
        self.status() == EventStatus::Cancelled
    }

    /// Whether both handles refer to the same use of the same instance.
    pub fn same_event(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell) && self.generation == other.generation
    }

    /// Due time stamped at scheduling.
    ///
    /// # Errors
    ///
    /// `InvalidState` if the instance was recycled or disposed.
    pub fn due_at(&self) -> Result<Duration, SchedulerError> {
        let header = self.cell.header.lock();
        self.cell.check_live_with(&header, self.generation)?;
        Ok(header.due_at)
    }

    /// Read the payload.
    ///
    /// # Errors
    ///
    /// `InvalidState` if the instance was recycled or disposed.
    pub fn read<R>(&self, read: impl FnOnce(&T) -> R) -> Result<R, SchedulerError> {
        let payload = self.cell.payload.lock();
        self.cell.check_live(self.generation)?;
        Ok(read(&payload))
    }

    /// Mutate the payload. Does not affect the due time.
    ///
    /// # Errors
    ///
    /// `InvalidState` if the instance was recycled or disposed.
    pub fn update<R>(&self, update: impl FnOnce(&mut T) -> R) -> Result<R, SchedulerError> {
        let mut payload = self.cell.payload.lock();
        self.cell.check_live(self.generation)?;
        Ok(update(&mut payload))
    }
}

impl<T: TimedEvent> Clone for EventHandle<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
            generation: self.generation,
        }
    }
}

impl<T: TimedEvent> fmt::Debug for EventHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandle")
            .field("type", &T::type_name())
            .field("id", &self.id())
            .field("generation", &self.generation)
            .field("status", &self.status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Beacon {
        strength: u32,
        fired: u32,
    }

    impl TimedEvent for Beacon {
        fn execute(&mut self, _now: Duration) {
            self.fired += 1;
        }
    }

    fn cell() -> Arc<EventCell<Beacon>> {
        <Arc<EventCell<Beacon>> as Poolable>::create()
    }

    fn entry(due_ms: u64, seq: u64) -> QueuedEvent {
        QueuedEvent {
            due_at: Duration::from_millis(due_ms),
            seq,
            event: cell(),
        }
    }

    #[test]
    fn test_queue_entries_order_by_due_then_seq() {
        let mut entries = vec![entry(30, 1), entry(10, 3), entry(10, 2)];
        entries.sort();
        let keys: Vec<_> = entries.iter().map(|e| (e.due_at.as_millis(), e.seq)).collect();
        assert_eq!(keys, vec![(10, 2), (10, 3), (30, 1)]);
    }

    #[test]
    fn test_stamp_then_cancel_reports_queue_key() {
        let cell = cell();
        let handle = EventHandle::new(Arc::clone(&cell));
        assert_eq!(handle.status(), EventStatus::Idle);

        assert!(cell.stamp(Duration::from_secs(2), 7));
        assert_eq!(handle.status(), EventStatus::Pending);
        assert_eq!(handle.due_at().unwrap(), Duration::from_secs(2));

        match cell.request_cancel(handle.generation()) {
            CancelRequest::Queued { due_at, seq } => {
                assert_eq!(due_at, Duration::from_secs(2));
                assert_eq!(seq, 7);
            }
            _ => panic!("expected a queued cancel"),
        }
        assert!(matches!(
            cell.request_cancel(handle.generation()),
            CancelRequest::AlreadyCancelled
        ));
        assert!(!cell.stamp(Duration::from_secs(3), 8));
        assert!(!cell.begin());
    }

    #[test]
    fn test_reset_bumps_generation_and_clears_payload() {
        let mut cell = cell();
        let handle = EventHandle::new(Arc::clone(&cell));
        handle.update(|beacon| beacon.strength = 9).unwrap();

        Poolable::reset(&mut cell);

        assert_eq!(handle.status(), EventStatus::Recycled);
        assert!(matches!(
            handle.read(|beacon| beacon.strength),
            Err(SchedulerError::InvalidState(_))
        ));
        let fresh = EventHandle::new(Arc::clone(&cell));
        assert_eq!(fresh.read(|beacon| beacon.strength).unwrap(), 0);
        assert!(!fresh.same_event(&handle));
    }

    #[test]
    fn test_disposed_cell_fails_fast() {
        let cell = cell();
        let handle = EventHandle::new(Arc::clone(&cell));
        Poolable::dispose(cell);

        assert_eq!(handle.status(), EventStatus::Disposed);
        assert!(handle.update(|beacon| beacon.strength = 1).is_err());
        assert!(handle.due_at().is_err());
        assert!(matches!(
            handle.cell().request_cancel(handle.generation()),
            CancelRequest::Stale
        ));
    }

    #[test]
    fn test_run_executes_and_notifies() {
        let cell = cell();
        let listeners = ListenerRegistry::new();
        let _sub = listeners.subscribe::<Beacon, _>(|beacon| assert_eq!(beacon.fired, 1));

        assert!(cell.stamp(Duration::ZERO, 1));
        assert!(cell.begin());
        cell.run(Duration::from_millis(5), &listeners);
        assert_eq!(cell.payload.lock().fired, 1);
    }
}
