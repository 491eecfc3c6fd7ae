//! Core scheduling engine: the time-ordered queue, per-type pools, and the
//! tick processor that ties them together.

pub mod diagnostics;
pub mod error;
pub mod item;
pub mod ledger;
pub mod listeners;
pub mod pool;
pub mod priority_queue;
pub mod processor;
pub mod scheduler;

pub use diagnostics::{
    build_diagnostic, Diagnostic, DiagnosticKind, DiagnosticSink, InMemoryDiagnosticSink,
};
pub use error::{AppResult, SchedulerError};
pub use item::{EventHandle, EventId, EventStatus, TimedEvent};
pub use ledger::{CancellationLedger, DEFAULT_EAGER_CLEANUP_THRESHOLD};
pub use listeners::{ListenerRegistry, Subscription};
pub use pool::{
    DisposeReason, PoolRegistry, PoolStats, Poolable, ReleaseOutcome, DEFAULT_MAX_POOL_SIZE,
    MAX_RELEASE_ATTEMPTS,
};
pub use priority_queue::PriorityQueue;
pub use processor::{
    ProcessorSettings, TickProcessor, TickReport, DEFAULT_CLEANUP_INTERVAL_TICKS,
    DEFAULT_TIME_BUDGET, UNBOUNDED_BATCH_SIZE,
};
pub use scheduler::EventScheduler;
