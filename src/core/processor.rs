//! One tick of scheduler work.
//!
//! A tick first reclaims cancelled events when the cleanup interval has passed
//! or the ledger has grown past its eager threshold, then pulls due events off
//! the queue in ascending batches. Execution stops when the item budget is
//! spent, the time budget runs out, or the next event is not yet due.
//!
//! Reclamation follows queue ownership: whoever takes an entry out of the queue
//! is responsible for returning it to its pool.

use std::any::TypeId;
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::core::diagnostics::{DiagnosticKind, Diagnostics};
use crate::core::item::{QueuedEvent, ScheduledEvent};
use crate::core::ledger::{CancellationLedger, DEFAULT_EAGER_CLEANUP_THRESHOLD};
use crate::core::listeners::ListenerRegistry;
use crate::core::error::SchedulerError;
use crate::core::pool::{PoolRegistry, DEFAULT_MAX_POOL_SIZE};
use crate::core::priority_queue::PriorityQueue;

/// Batch size used when the item budget is unlimited.
pub const UNBOUNDED_BATCH_SIZE: usize = 100;

/// Time budget applied per tick unless configured otherwise.
pub const DEFAULT_TIME_BUDGET: Duration = Duration::from_millis(5);

/// Ticks between interval-driven cancellation drains.
pub const DEFAULT_CLEANUP_INTERVAL_TICKS: u64 = 60;

/// Tunables for a [`TickProcessor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorSettings {
    /// Maximum events executed per tick. `None` is unlimited.
    pub item_budget: Option<usize>,
    /// Wall time a tick may spend executing. `None` is unlimited.
    pub time_budget: Option<Duration>,
    /// Ticks between cancellation drains. Zero disables interval drains.
    pub cleanup_interval_ticks: u64,
    /// Ledger size that forces a drain on the next tick. Zero disables it.
    pub eager_cleanup_threshold: usize,
    /// Pool cap for event types without an override.
    pub default_pool_cap: usize,
    /// Slots reserved in the queue up front.
    pub initial_queue_capacity: usize,
}

impl Default for ProcessorSettings {
    fn default() -> Self {
        Self {
            item_budget: None,
            time_budget: Some(DEFAULT_TIME_BUDGET),
            cleanup_interval_ticks: DEFAULT_CLEANUP_INTERVAL_TICKS,
            eager_cleanup_threshold: DEFAULT_EAGER_CLEANUP_THRESHOLD,
            default_pool_cap: DEFAULT_MAX_POOL_SIZE,
            initial_queue_capacity: 0,
        }
    }
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickReport {
    /// Events executed and returned to their pools.
    pub executed: usize,
    /// Events taken from the queue and put back unexecuted.
    pub deferred: usize,
    /// Cancelled events found in a batch and reclaimed.
    pub reclaimed: usize,
    /// Ledger entries reclaimed by the cancellation drain.
    pub cancellations_drained: usize,
    /// Whether the tick stopped on its time budget.
    pub time_budget_exhausted: bool,
    /// Wall time spent in the tick.
    pub elapsed: Duration,
}

fn duration_to_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

/// Owns the queue, the cancellation ledger, and the event pools, and runs ticks
/// over them.
pub struct TickProcessor {
    queue: PriorityQueue<QueuedEvent>,
    ledger: CancellationLedger<QueuedEvent>,
    pools: PoolRegistry,
    listeners: ListenerRegistry,
    diagnostics: Diagnostics,
    future: Mutex<Vec<QueuedEvent>>,
    item_budget: AtomicUsize,
    time_budget_nanos: AtomicU64,
    cleanup_interval: AtomicU64,
    ticks: AtomicU64,
    last_cleanup_tick: AtomicU64,
    next_seq: AtomicU64,
}

impl Default for TickProcessor {
    fn default() -> Self {
        Self::new(&ProcessorSettings::default())
    }
}

impl TickProcessor {
    /// Create a processor with `settings` applied.
    #[must_use]
    pub fn new(settings: &ProcessorSettings) -> Self {
        let processor = Self {
            queue: PriorityQueue::with_capacity(settings.initial_queue_capacity),
            ledger: CancellationLedger::new(settings.eager_cleanup_threshold),
            pools: PoolRegistry::with_default_max_size(settings.default_pool_cap),
            listeners: ListenerRegistry::new(),
            diagnostics: Diagnostics::default(),
            future: Mutex::new(Vec::new()),
            item_budget: AtomicUsize::new(0),
            time_budget_nanos: AtomicU64::new(0),
            cleanup_interval: AtomicU64::new(settings.cleanup_interval_ticks),
            ticks: AtomicU64::new(0),
            last_cleanup_tick: AtomicU64::new(0),
            next_seq: AtomicU64::new(1),
        };
        processor.set_item_budget(settings.item_budget);
        processor.set_time_budget(settings.time_budget);
        processor
    }

    /// Event pools.
    pub const fn pools(&self) -> &PoolRegistry {
        &self.pools
    }

    /// Per-type execution listeners.
    pub const fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }

    pub(crate) const fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub(crate) fn next_seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Limit executions per tick. `None` and `Some(0)` are both unlimited.
    pub fn set_item_budget(&self, budget: Option<usize>) {
        self.item_budget.store(budget.unwrap_or(0), Ordering::Release);
    }

    /// Current item budget.
    pub fn item_budget(&self) -> Option<usize> {
        match self.item_budget.load(Ordering::Acquire) {
            0 => None,
            budget => Some(budget),
        }
    }

    /// Limit wall time per tick. `None` and a zero duration are both unlimited.
    pub fn set_time_budget(&self, budget: Option<Duration>) {
        let nanos = budget.map_or(0, duration_to_nanos);
        self.time_budget_nanos.store(nanos, Ordering::Release);
    }

    /// Current time budget.
    pub fn time_budget(&self) -> Option<Duration> {
        match self.time_budget_nanos.load(Ordering::Acquire) {
            0 => None,
            nanos => Some(Duration::from_nanos(nanos)),
        }
    }

    /// Ticks between interval-driven cancellation drains; zero disables them.
    pub fn set_cleanup_interval(&self, ticks: u64) {
        self.cleanup_interval.store(ticks, Ordering::Release);
    }

    /// Current cleanup interval in ticks.
    pub fn cleanup_interval(&self) -> u64 {
        self.cleanup_interval.load(Ordering::Acquire)
    }

    /// Ledger size that forces a drain; zero disables eager drains.
    pub fn set_eager_cleanup_threshold(&self, threshold: usize) {
        self.ledger.set_threshold(threshold);
    }

    /// Current eager cleanup threshold.
    pub fn eager_cleanup_threshold(&self) -> usize {
        self.ledger.threshold()
    }

    /// Ticks run so far.
    pub fn ticks_processed(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }

    /// Events in the queue.
    pub fn pending_count(&self) -> usize {
        self.queue.count()
    }

    /// Cancelled events waiting for reclamation.
    pub fn ledger_len(&self) -> usize {
        self.ledger.len()
    }

    pub(crate) fn enqueue(&self, entry: QueuedEvent) {
        self.queue.insert(entry);
    }

    /// Take an entry back out of the queue so its caller can re-stamp it.
    pub(crate) fn dequeue(&self, entry: &QueuedEvent) -> bool {
        self.queue.try_remove(entry)
    }

    /// Remove a freshly cancelled entry and hand it to the ledger.
    ///
    /// Returns false when the entry was not in the queue; whoever holds it then
    /// sees the cancelled status and reclaims it.
    pub(crate) fn cancel_entry(&self, entry: QueuedEvent) -> bool {
        if !self.queue.try_remove(&entry) {
            tracing::debug!(
                event = entry.event.id(),
                "cancelled event not queued; holder reclaims it"
            );
            return false;
        }
        if self.ledger.push(entry) {
            tracing::debug!(ledger = self.ledger.len(), "cancellation ledger reached eager threshold");
        }
        true
    }

    /// Cancel every queued event of the given type. Returns how many were
    /// newly cancelled.
    pub(crate) fn cancel_where(&self, event_type: TypeId) -> usize {
        let removed = self
            .queue
            .remove_where(|entry| entry.event.event_type() == event_type);
        let mut cancelled = 0;
        for entry in removed {
            if entry.event.mark_cancelled() {
                cancelled += 1;
            }
            self.ledger.push(entry);
        }
        cancelled
    }

    /// Return a finished or cancelled event to its pool.
    pub(crate) fn release(&self, event: Arc<dyn ScheduledEvent>) {
        let type_name = event.type_name();
        let id = event.id();
        if let Err(error) = event.recycle(&self.pools) {
            let kind = if matches!(error, SchedulerError::Contention { .. }) {
                DiagnosticKind::PoolContention
            } else {
                DiagnosticKind::PoolCapacityExceeded
            };
            self.diagnostics
                .emit(kind, Some(type_name), format!("event #{id} disposed: {error}"));
        }
    }

    /// Reclaim every ledgered cancellation. Returns how many were reclaimed.
    pub fn drain_cancellations(&self) -> usize {
        let entries = self.ledger.take_all();
        if entries.is_empty() {
            return 0;
        }

        let seqs: HashSet<u64> = entries.iter().map(|entry| entry.seq).collect();
        let stray = self.queue.remove_where(|entry| seqs.contains(&entry.seq));
        if !stray.is_empty() {
            tracing::warn!(count = stray.len(), "ledgered events were still queued");
        }

        let drained = entries.len();
        for entry in entries {
            self.release(entry.event);
        }
        tracing::debug!(drained, "drained cancellation ledger");
        drained
    }

    fn cleanup_due(&self, tick: u64) -> bool {
        if self.ledger.should_drain() {
            return true;
        }
        let interval = self.cleanup_interval();
        interval > 0 && tick.saturating_sub(self.last_cleanup_tick.load(Ordering::Acquire)) >= interval
    }

    fn execute(&self, entry: QueuedEvent, now: Duration) {
        let event = entry.event;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| event.run(now, &self.listeners)));
        if outcome.is_err() {
            self.diagnostics.emit(
                DiagnosticKind::ExecutionPanicked,
                Some(event.type_name()),
                format!("event #{} panicked during execute", event.id()),
            );
        }
        self.release(event);
    }

    /// Run one tick at time `now`.
    pub fn tick(&self, now: Duration) -> TickReport {
        let started = Instant::now();
        let tick = self.ticks.fetch_add(1, Ordering::AcqRel) + 1;
        let mut report = TickReport::default();

        if self.cleanup_due(tick) {
            report.cancellations_drained = self.drain_cancellations();
            self.last_cleanup_tick.store(tick, Ordering::Release);
        }

        let ready = self
            .queue
            .try_peek()
            .is_some_and(|first| first.due_at <= now);
        if !ready {
            report.elapsed = started.elapsed();
            return report;
        }

        let time_budget = self.time_budget();
        let out_of_time = || time_budget.is_some_and(|budget| started.elapsed() >= budget);
        let mut remaining = self.item_budget();
        let mut future = std::mem::take(&mut *self.future.lock());

        loop {
            if remaining == Some(0) {
                break;
            }
            if out_of_time() {
                report.time_budget_exhausted = true;
                break;
            }
            let len = self.queue.count();
            if len == 0 {
                break;
            }
            let take = remaining.unwrap_or(UNBOUNDED_BATCH_SIZE).min(len);

            let mut reached_future = false;
            let mut batch = self.queue.remove_batch(take).into_iter();
            while let Some(entry) = batch.next() {
                if out_of_time() {
                    report.time_budget_exhausted = true;
                    future.push(entry);
                    future.extend(batch.by_ref());
                    break;
                }
                if entry.due_at > now {
                    reached_future = true;
                    future.push(entry);
                    continue;
                }
                if !entry.event.begin() {
                    self.release(entry.event);
                    report.reclaimed += 1;
                    continue;
                }
                self.execute(entry, now);
                report.executed += 1;
                remaining = remaining.map(|left| left - 1);
            }

            self.reinsert(&mut future, &mut report);
            if reached_future || report.time_budget_exhausted {
                break;
            }
        }

        *self.future.lock() = future;
        report.elapsed = started.elapsed();

        if report.time_budget_exhausted {
            self.diagnostics.emit(
                DiagnosticKind::BudgetExceeded,
                None,
                format!(
                    "tick {tick} stopped after {} executions in {:?}",
                    report.executed, report.elapsed
                ),
            );
        }
        tracing::debug!(
            tick,
            executed = report.executed,
            deferred = report.deferred,
            reclaimed = report.reclaimed,
            pending = self.queue.count(),
            "tick complete"
        );
        report
    }

    /// Put deferred entries back, reclaiming any cancelled while held here.
    fn reinsert(&self, future: &mut Vec<QueuedEvent>, report: &mut TickReport) {
        if future.is_empty() {
            return;
        }
        let mut cancelled = Vec::new();
        future.retain(|entry| {
            if entry.event.is_cancelled() {
                cancelled.push(Arc::clone(&entry.event));
                false
            } else {
                true
            }
        });
        report.reclaimed += cancelled.len();
        for event in cancelled {
            self.release(event);
        }

        let reinserted = future.clone();
        self.queue.insert_many(future.drain(..));

        // A cancel that landed after the scan above missed the queue; its
        // entry is back in there now and this tick reclaims it.
        let mut late = 0;
        for entry in reinserted.iter().filter(|entry| entry.event.is_cancelled()) {
            if self.queue.try_remove(entry) {
                self.release(Arc::clone(&entry.event));
                late += 1;
            }
        }
        report.reclaimed += late;
        report.deferred += reinserted.len() - late;
    }

    /// Drain cancellations now and trim pools to their caps.
    pub fn force_cleanup(&self) -> usize {
        let drained = self.drain_cancellations();
        self.last_cleanup_tick
            .store(self.ticks_processed(), Ordering::Release);
        let trimmed = self.pools.trim_all();
        tracing::debug!(drained, trimmed, "forced cleanup");
        drained
    }

    /// Drain cancellations, trim pools, and release spare capacity in every
    /// buffer.
    pub fn optimize(&self) {
        let drained = self.drain_cancellations();
        self.last_cleanup_tick
            .store(self.ticks_processed(), Ordering::Release);
        let trimmed = self.pools.trim_all();
        self.queue.shrink_to_fit();
        self.ledger.shrink_to_fit();
        self.pools.shrink_all();
        self.future.lock().shrink_to_fit();
        tracing::info!(
            drained,
            trimmed,
            pending = self.queue.count(),
            "optimized scheduler buffers"
        );
    }

    /// Dispose every queued and ledgered event and empty every pool.
    ///
    /// Must not run concurrently with [`tick`](Self::tick).
    pub fn clear(&self) {
        let queued = self.queue.drain();
        let ledgered = self.ledger.take_all();
        let scratch = std::mem::take(&mut *self.future.lock());
        let discarded = queued.len() + ledgered.len() + scratch.len();
        for entry in queued.into_iter().chain(ledgered).chain(scratch) {
            entry.event.dispose();
        }
        let disposed = self.pools.clear_all();
        tracing::info!(discarded, disposed, "cleared scheduler");
    }
}
