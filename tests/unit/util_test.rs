//! Tests for utility functions

use prometheus_event_scheduler::util::telemetry::{init_tracing_with, DEFAULT_LOG_FILTER};
use prometheus_event_scheduler::util::{init_tracing, now_ms};

#[test]
fn test_now_ms_advances() {
    let first = now_ms();
    std::thread::sleep(std::time::Duration::from_millis(2));
    assert!(now_ms() > first);
}

#[test]
fn test_init_tracing_is_idempotent() {
    init_tracing();
    init_tracing();
    init_tracing_with("debug");
    assert!(DEFAULT_LOG_FILTER.starts_with("prometheus_event_scheduler"));
}
