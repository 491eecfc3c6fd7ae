//! Diagnostic records for routine-but-noteworthy scheduler conditions.
//!
//! Every diagnostic is logged through `tracing`; hosts that want to inspect
//! them programmatically attach a [`DiagnosticSink`].

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::util::clock::now_ms;

/// Category of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// A tick stopped because its time budget ran out.
    BudgetExceeded,
    /// A released instance was disposed because its pool was full.
    PoolCapacityExceeded,
    /// A released instance was disposed after losing every reservation race.
    PoolContention,
    /// A cancel or reschedule target was not in the queue.
    EventNotFound,
    /// A disposed or recycled event was used.
    InvalidState,
    /// An event's `execute` panicked.
    ExecutionPanicked,
}

impl DiagnosticKind {
    /// Stable snake-case name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::BudgetExceeded => "budget_exceeded",
            Self::PoolCapacityExceeded => "pool_capacity_exceeded",
            Self::PoolContention => "pool_contention",
            Self::EventNotFound => "event_not_found",
            Self::InvalidState => "invalid_state",
            Self::ExecutionPanicked => "execution_panicked",
        }
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single diagnostic record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Unique record identifier.
    pub id: String,
    /// Category.
    pub kind: DiagnosticKind,
    /// Event or pooled type involved, if any.
    pub type_name: Option<String>,
    /// Human-readable detail.
    pub message: String,
    /// Timestamp milliseconds.
    pub created_at_ms: u128,
}

/// Destination for diagnostic records.
pub trait DiagnosticSink: Send + Sync {
    /// Record a diagnostic.
    fn record(&self, diagnostic: Diagnostic);
}

/// Bounded in-memory sink, oldest records evicted first.
pub struct InMemoryDiagnosticSink {
    records: Mutex<VecDeque<Diagnostic>>,
    max_records: usize,
}

impl InMemoryDiagnosticSink {
    /// Create a sink holding at most `max_records` diagnostics.
    #[must_use]
    pub fn new(max_records: usize) -> Self {
        Self {
            records: Mutex::new(VecDeque::with_capacity(max_records.min(1024))),
            max_records,
        }
    }

    /// Snapshot of stored diagnostics, oldest first.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.records.lock().iter().cloned().collect()
    }

    /// Number of stored diagnostics of `kind`.
    pub fn count_of(&self, kind: DiagnosticKind) -> usize {
        self.records
            .lock()
            .iter()
            .filter(|record| record.kind == kind)
            .count()
    }

    /// Drop every stored diagnostic.
    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

impl DiagnosticSink for InMemoryDiagnosticSink {
    fn record(&self, diagnostic: Diagnostic) {
        if self.max_records == 0 {
            return;
        }
        let mut records = self.records.lock();
        if records.len() >= self.max_records {
            records.pop_front();
        }
        records.push_back(diagnostic);
    }
}

/// Helper to build a diagnostic stamped with a fresh id and the current time.
pub fn build_diagnostic(
    kind: DiagnosticKind,
    type_name: Option<&str>,
    message: impl Into<String>,
) -> Diagnostic {
    Diagnostic {
        id: uuid::Uuid::new_v4().to_string(),
        kind,
        type_name: type_name.map(str::to_owned),
        message: message.into(),
        created_at_ms: now_ms(),
    }
}

/// Logs diagnostics and forwards them to the attached sink.
#[derive(Default)]
pub(crate) struct Diagnostics {
    sink: RwLock<Option<Arc<dyn DiagnosticSink>>>,
}

impl Diagnostics {
    pub(crate) fn attach(&self, sink: Arc<dyn DiagnosticSink>) {
        *self.sink.write() = Some(sink);
    }

    pub(crate) fn detach(&self) {
        *self.sink.write() = None;
    }

    pub(crate) fn emit(&self, kind: DiagnosticKind, type_name: Option<&str>, message: impl Into<String>) {
        let message = message.into();
        match kind {
            DiagnosticKind::ExecutionPanicked | DiagnosticKind::InvalidState => {
                tracing::error!(kind = kind.as_str(), type_name, "{message}");
            }
            _ => tracing::warn!(kind = kind.as_str(), type_name, "{message}"),
        }

        let sink = self.sink.read().clone();
        if let Some(sink) = sink {
            sink.record(build_diagnostic(kind, type_name, message));
        }
    }
}
