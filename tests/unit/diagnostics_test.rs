//! Tests for diagnostic records and sinks

use std::sync::Arc;
use std::time::Duration;

use prometheus_event_scheduler::builders::SchedulerBuilder;
use prometheus_event_scheduler::core::{
    build_diagnostic, DiagnosticKind, DiagnosticSink, InMemoryDiagnosticSink, TimedEvent,
};
use prometheus_event_scheduler::runtime::ManualClock;

#[derive(Default)]
struct Flare;

impl TimedEvent for Flare {
    fn execute(&mut self, _now: Duration) {}
}

#[test]
fn test_build_diagnostic_fields() {
    let diagnostic = build_diagnostic(DiagnosticKind::EventNotFound, Some("Flare"), "missing");
    assert_eq!(diagnostic.kind, DiagnosticKind::EventNotFound);
    assert_eq!(diagnostic.type_name.as_deref(), Some("Flare"));
    assert_eq!(diagnostic.message, "missing");
    assert_eq!(diagnostic.id.len(), 36);
    assert!(diagnostic.created_at_ms > 0);
}

#[test]
fn test_diagnostic_serializes_kind_as_snake_case() {
    let diagnostic = build_diagnostic(DiagnosticKind::PoolContention, None, "contended");
    let json = serde_json::to_value(&diagnostic).unwrap();
    assert_eq!(json["kind"], "pool_contention");
    assert!(json["type_name"].is_null());
}

#[test]
fn test_zero_capacity_sink_records_nothing() {
    let sink = InMemoryDiagnosticSink::new(0);
    sink.record(build_diagnostic(DiagnosticKind::BudgetExceeded, None, "late"));
    assert!(sink.diagnostics().is_empty());
}

#[test]
fn test_scheduler_reports_not_found_to_sink() {
    let sink = Arc::new(InMemoryDiagnosticSink::new(16));
    let scheduler = SchedulerBuilder::new()
        .with_clock(Arc::new(ManualClock::new()))
        .with_diagnostic_sink(sink.clone())
        .build()
        .unwrap();

    let handle = scheduler.schedule::<Flare>(Duration::from_secs(1));
    assert!(scheduler.cancel(&handle));
    assert!(scheduler.reschedule(&handle, Duration::from_secs(2)).is_err());

    assert_eq!(sink.count_of(DiagnosticKind::EventNotFound), 1);
    let records = sink.diagnostics();
    assert!(records[0].type_name.as_deref().unwrap_or_default().ends_with("Flare"));

    scheduler.clear_diagnostic_sink();
    assert!(scheduler.reschedule(&handle, Duration::from_secs(2)).is_err());
    assert_eq!(sink.count_of(DiagnosticKind::EventNotFound), 1);
}
