//! The scheduler facade: an explicit context object tying the tick processor
//! to the host clock and driving thread.

use std::any::TypeId;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::core::diagnostics::{DiagnosticKind, DiagnosticSink};
use crate::core::item::{
    CancelRequest, EventCell, EventHandle, EventStatus, QueuedEvent, ScheduledEvent, TimedEvent,
};
use crate::core::listeners::Subscription;
use crate::core::pool::PoolStats;
use crate::core::processor::{ProcessorSettings, TickProcessor, TickReport};
use crate::core::SchedulerError;
use crate::runtime::clock::Clock;
use crate::runtime::driver::DrivingThread;

struct Shared {
    processor: TickProcessor,
    clock: Arc<dyn Clock>,
    driver: Arc<dyn DrivingThread>,
}

impl Shared {
    fn needs_marshal(&self) -> bool {
        !self.clock.is_thread_safe() && !self.driver.is_driving_thread()
    }

    /// Stamp a due time and insert. Takes ownership of reclaiming the cell if
    /// it was cancelled before it could be queued.
    fn enqueue<T: TimedEvent>(&self, cell: Arc<EventCell<T>>, delay: Duration) {
        let due_at = self.clock.now().saturating_add(delay);
        let seq = self.processor.next_seq();
        if !cell.stamp(due_at, seq) {
            tracing::debug!(event = cell.id(), "event cancelled before enqueue");
            self.processor.release(cell);
            return;
        }

        let entry = QueuedEvent {
            due_at,
            seq,
            event: cell,
        };
        self.processor.enqueue(entry.clone());
        // A cancel that raced the insert could not find the entry to remove.
        if entry.event.is_cancelled() && self.processor.dequeue(&entry) {
            self.processor.release(entry.event);
        }
    }

    fn enqueue_on_driver<T: TimedEvent>(self: &Arc<Self>, cell: Arc<EventCell<T>>, delay: Duration) {
        if self.needs_marshal() {
            let shared = Arc::clone(self);
            self.driver
                .marshal(Box::new(move || shared.enqueue(cell, delay)));
        } else {
            self.enqueue(cell, delay);
        }
    }
}

/// Schedules pooled [`TimedEvent`]s and executes them from host ticks.
///
/// Cloning is cheap; clones share the same queue and pools. Any thread may
/// schedule, cancel, or reschedule. Only the driving thread should call
/// [`tick`](Self::tick).
///
/// ```
/// use std::sync::Arc;
/// use std::time::Duration;
/// use prometheus_event_scheduler::core::{EventScheduler, TimedEvent};
/// use prometheus_event_scheduler::runtime::{InlineDriver, ManualClock};
///
/// #[derive(Default)]
/// struct Heal {
///     amount: u32,
/// }
///
/// impl TimedEvent for Heal {
///     fn execute(&mut self, _now: Duration) {}
/// }
///
/// let clock = Arc::new(ManualClock::new());
/// let scheduler = EventScheduler::new(clock.clone(), Arc::new(InlineDriver));
/// let handle = scheduler.schedule_with::<Heal, _>(Duration::from_millis(50), |heal| heal.amount = 10);
///
/// assert!(scheduler.is_pending(&handle));
/// clock.advance(Duration::from_millis(50));
/// assert_eq!(scheduler.tick_now().executed, 1);
/// assert!(!scheduler.is_pending(&handle));
/// ```
#[derive(Clone)]
pub struct EventScheduler {
    shared: Arc<Shared>,
}

impl EventScheduler {
    /// Create a scheduler with default settings.
    pub fn new(clock: Arc<dyn Clock>, driver: Arc<dyn DrivingThread>) -> Self {
        Self::with_settings(clock, driver, &ProcessorSettings::default())
    }

    /// Create a scheduler with explicit settings.
    pub fn with_settings(
        clock: Arc<dyn Clock>,
        driver: Arc<dyn DrivingThread>,
        settings: &ProcessorSettings,
    ) -> Self {
        tracing::info!(
            item_budget = ?settings.item_budget,
            time_budget = ?settings.time_budget,
            cleanup_interval = settings.cleanup_interval_ticks,
            "event scheduler created"
        );
        Self {
            shared: Arc::new(Shared {
                processor: TickProcessor::new(settings),
                clock,
                driver,
            }),
        }
    }

    /// The underlying tick processor.
    pub fn processor(&self) -> &TickProcessor {
        &self.shared.processor
    }

    /// The host clock.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.shared.clock
    }

    /// Current time on the host clock.
    pub fn now(&self) -> Duration {
        self.shared.clock.now()
    }

    /// Time scale reported by the host clock.
    pub fn time_scale(&self) -> f64 {
        self.shared.clock.time_scale()
    }

    /// Schedule `T` to run `delay` from now after `configure` fills it in.
    ///
    /// When the clock may only be read on the driving thread and the caller is
    /// elsewhere, stamping and insertion are marshalled to the driving thread;
    /// the handle reports [`EventStatus::Idle`] until that happens.
    pub fn schedule_with<T, F>(&self, delay: Duration, configure: F) -> EventHandle<T>
    where
        T: TimedEvent,
        F: FnOnce(&mut T),
    {
        let cell: Arc<EventCell<T>> = self.shared.processor.pools().acquire();
        cell.configure(configure);
        let handle = EventHandle::new(Arc::clone(&cell));
        self.shared.enqueue_on_driver(cell, delay);
        handle
    }

    /// Schedule a default-initialized `T` to run `delay` from now.
    pub fn schedule<T: TimedEvent>(&self, delay: Duration) -> EventHandle<T> {
        self.schedule_with(delay, |_: &mut T| {})
    }

    /// Move a pending event to `delay` from now.
    ///
    /// # Errors
    ///
    /// `InvalidState` if the handle's instance was recycled or disposed;
    /// `NotFound` if the event is not waiting in the queue.
    pub fn reschedule<T: TimedEvent>(
        &self,
        handle: &EventHandle<T>,
        delay: Duration,
    ) -> Result<EventHandle<T>, SchedulerError> {
        let cell = handle.cell();
        let status = handle.status();
        if matches!(status, EventStatus::Recycled | EventStatus::Disposed) {
            let message = format!("cannot reschedule {} #{}: {status:?}", T::type_name(), handle.id());
            self.shared
                .processor
                .diagnostics()
                .emit(DiagnosticKind::InvalidState, Some(T::type_name()), message.clone());
            return Err(SchedulerError::InvalidState(message));
        }

        let taken = cell
            .pending_key(handle.generation())
            .map(|(due_at, seq)| QueuedEvent {
                due_at,
                seq,
                event: cell.clone(),
            })
            .is_some_and(|probe| self.shared.processor.dequeue(&probe));
        if !taken {
            let message = format!("{} #{} is not queued", T::type_name(), handle.id());
            self.shared
                .processor
                .diagnostics()
                .emit(DiagnosticKind::EventNotFound, Some(T::type_name()), message.clone());
            return Err(SchedulerError::NotFound(message));
        }

        self.shared.enqueue_on_driver(Arc::clone(cell), delay);
        Ok(handle.clone())
    }

    /// Cancel an event. Returns true if this call cancelled it.
    ///
    /// Cancelling an already cancelled, running, or recycled event is a no-op.
    pub fn cancel<T: TimedEvent>(&self, handle: &EventHandle<T>) -> bool {
        let cell = handle.cell();
        match cell.request_cancel(handle.generation()) {
            CancelRequest::Stale | CancelRequest::AlreadyCancelled | CancelRequest::Running => false,
            CancelRequest::Unqueued => true,
            CancelRequest::Queued { due_at, seq } => {
                self.shared.processor.cancel_entry(QueuedEvent {
                    due_at,
                    seq,
                    event: cell.clone(),
                });
                true
            }
        }
    }

    /// Cancel every queued event of type `T`. Returns how many were cancelled.
    pub fn cancel_all<T: TimedEvent>(&self) -> usize {
        let cancelled = self.shared.processor.cancel_where(TypeId::of::<T>());
        tracing::debug!(type_name = T::type_name(), cancelled, "cancelled all events of type");
        cancelled
    }

    /// Whether the event is waiting in the queue.
    pub fn is_pending<T: TimedEvent>(&self, handle: &EventHandle<T>) -> bool {
        handle.cell().pending_key(handle.generation()).is_some()
    }

    /// Run one tick at `now`. Call from the driving thread.
    pub fn tick(&self, now: Duration) -> TickReport {
        self.shared.processor.tick(now)
    }

    /// Run one tick at the host clock's current time.
    pub fn tick_now(&self) -> TickReport {
        self.tick(self.now())
    }

    /// Limit executions per tick; `None` is unlimited.
    pub fn set_item_budget(&self, budget: Option<usize>) {
        self.shared.processor.set_item_budget(budget);
    }

    /// Limit wall time per tick; `None` is unlimited.
    pub fn set_time_budget(&self, budget: Option<Duration>) {
        self.shared.processor.set_time_budget(budget);
    }

    /// Ticks between cancellation drains; zero disables interval drains.
    pub fn set_cleanup_interval(&self, ticks: u64) {
        self.shared.processor.set_cleanup_interval(ticks);
    }

    /// Ledger size that forces a drain on the next tick.
    pub fn set_eager_cleanup_threshold(&self, threshold: usize) {
        self.shared.processor.set_eager_cleanup_threshold(threshold);
    }

    /// Cap the pool for `T`; zero reverts to the default cap. Returns how
    /// many pooled instances were disposed to fit.
    pub fn set_pool_cap<T: TimedEvent>(&self, max: usize) -> usize {
        self.shared
            .processor
            .pools()
            .set_max_size::<Arc<EventCell<T>>>(max)
    }

    /// Occupancy of the pool for `T`.
    pub fn pool_stats<T: TimedEvent>(&self) -> PoolStats {
        self.shared.processor.pools().stats::<Arc<EventCell<T>>>()
    }

    /// Fill the pool for `T` with up to `count` instances.
    pub fn prewarm<T: TimedEvent>(&self, count: usize) -> usize {
        self.shared
            .processor
            .pools()
            .prewarm::<Arc<EventCell<T>>>(count)
    }

    /// Events in the queue.
    pub fn pending_count(&self) -> usize {
        self.shared.processor.pending_count()
    }

    /// Reclaim cancelled events now. Returns how many were reclaimed.
    pub fn force_cleanup(&self) -> usize {
        self.shared.processor.force_cleanup()
    }

    /// Reclaim cancelled events, trim pools, and release spare buffer capacity.
    pub fn optimize(&self) {
        self.shared.processor.optimize();
    }

    /// Dispose every queued event and every pooled instance.
    ///
    /// Outstanding handles report [`EventStatus::Disposed`]. Must not run
    /// concurrently with [`tick`](Self::tick).
    pub fn clear(&self) {
        self.shared.processor.clear();
    }

    /// Call `listener` after every execution of a `T`.
    pub fn subscribe<T, F>(&self, listener: F) -> Subscription
    where
        T: TimedEvent,
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.shared.processor.listeners().subscribe::<T, F>(listener)
    }

    /// Forward diagnostics to `sink` in addition to logging them.
    pub fn set_diagnostic_sink(&self, sink: Arc<dyn DiagnosticSink>) {
        self.shared.processor.diagnostics().attach(sink);
    }

    /// Stop forwarding diagnostics.
    pub fn clear_diagnostic_sink(&self) {
        self.shared.processor.diagnostics().detach();
    }
}

impl fmt::Debug for EventScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventScheduler")
            .field("pending", &self.pending_count())
            .field("ledger", &self.shared.processor.ledger_len())
            .field("ticks", &self.shared.processor.ticks_processed())
            .finish_non_exhaustive()
    }
}
