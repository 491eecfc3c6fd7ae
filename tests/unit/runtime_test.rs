//! Tests for runtime adapters

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use prometheus_event_scheduler::core::{EventScheduler, TimedEvent};
use prometheus_event_scheduler::runtime::{
    spawn_tick_loop, Clock, InlineDriver, ManualClock, MonotonicClock, TokioTicker,
};

static BEATS: AtomicUsize = AtomicUsize::new(0);

#[derive(Default)]
struct Heartbeat;

impl TimedEvent for Heartbeat {
    fn execute(&mut self, _now: Duration) {
        BEATS.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_scheduler_reads_time_scale_from_clock() {
    let clock = Arc::new(ManualClock::new());
    clock.set_time_scale(2.0);
    let scheduler = EventScheduler::new(clock.clone(), Arc::new(InlineDriver));
    assert!((scheduler.time_scale() - 2.0).abs() < f64::EPSILON);

    let handle = scheduler.schedule::<Heartbeat>(Duration::from_millis(100));
    clock.advance(Duration::from_millis(50));
    assert_eq!(scheduler.now(), Duration::from_millis(100));
    assert_eq!(scheduler.tick_now().executed, 1);
    assert!(!scheduler.is_pending(&handle));
}

#[test]
fn test_monotonic_clock_scale_changes_are_continuous() {
    let clock = MonotonicClock::new();
    clock.set_time_scale(4.0);
    let before = clock.now();
    clock.set_time_scale(1.0);
    assert!(clock.now() >= before);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tick_loop_executes_due_events() {
    let scheduler = EventScheduler::new(Arc::new(MonotonicClock::new()), Arc::new(InlineDriver));
    let before = BEATS.load(Ordering::SeqCst);
    for _ in 0..3 {
        scheduler.schedule::<Heartbeat>(Duration::ZERO);
    }

    let handle = spawn_tick_loop(scheduler.clone(), Duration::from_millis(5)).unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;
    let ticks = handle.stop().await.unwrap();

    assert!(ticks > 0);
    assert_eq!(scheduler.pending_count(), 0);
    assert!(BEATS.load(Ordering::SeqCst) >= before + 3);
}

#[tokio::test]
async fn test_zero_period_is_rejected() {
    let scheduler = EventScheduler::new(Arc::new(MonotonicClock::new()), Arc::new(InlineDriver));
    let ticker = TokioTicker::current().unwrap();
    assert!(ticker.spawn(scheduler, Duration::ZERO).is_err());
}

#[test]
fn test_ticker_requires_runtime() {
    assert!(TokioTicker::current().is_err());
}
