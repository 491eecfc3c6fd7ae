//! Tests for builder modules

use std::sync::Arc;
use std::time::Duration;

use prometheus_event_scheduler::builders::{build_scheduler, SchedulerBuilder};
use prometheus_event_scheduler::config::SchedulerConfig;
use prometheus_event_scheduler::core::{SchedulerError, TimedEvent};
use prometheus_event_scheduler::runtime::{InlineDriver, ManualClock};

#[derive(Default)]
struct Respawn;

impl TimedEvent for Respawn {
    fn execute(&mut self, _now: Duration) {}
}

#[derive(Default)]
struct Heal;

impl TimedEvent for Heal {
    fn execute(&mut self, _now: Duration) {}
}

#[test]
fn test_builder_defaults() {
    let builder = SchedulerBuilder::new();
    assert_eq!(builder.config(), &SchedulerConfig::default());

    let scheduler = builder.build().unwrap();
    assert_eq!(scheduler.pending_count(), 0);
    assert_eq!(scheduler.processor().item_budget(), None);
    assert!((scheduler.time_scale() - 1.0).abs() < f64::EPSILON);
}

#[test]
fn test_build_scheduler_applies_named_caps() {
    let json = r#"{ "default_pool_cap": 20, "pool_caps": { "Respawn": 2 } }"#;
    let cfg = SchedulerConfig::from_json_str(json).unwrap();
    let scheduler = build_scheduler(
        &cfg,
        Arc::new(ManualClock::new()),
        Arc::new(InlineDriver),
    )
    .unwrap();

    assert_eq!(scheduler.pool_stats::<Respawn>().max, 2);
    assert_eq!(scheduler.pool_stats::<Heal>().max, 20);
}

#[test]
fn test_build_scheduler_rejects_invalid_config() {
    let cfg = SchedulerConfig {
        item_budget: Some(0),
        ..SchedulerConfig::default()
    };
    let result = build_scheduler(&cfg, Arc::new(ManualClock::new()), Arc::new(InlineDriver));
    assert!(matches!(result, Err(SchedulerError::InvalidConfig(_))));
}

#[test]
fn test_builder_from_config_keeps_overrides() {
    let cfg = SchedulerConfig {
        cleanup_interval_ticks: 7,
        ..SchedulerConfig::default()
    };
    let scheduler = SchedulerBuilder::from_config(cfg)
        .with_eager_cleanup_threshold(3)
        .with_initial_queue_capacity(64)
        .with_time_budget(Some(Duration::from_millis(2)))
        .build()
        .unwrap();

    let processor = scheduler.processor();
    assert_eq!(processor.cleanup_interval(), 7);
    assert_eq!(processor.eager_cleanup_threshold(), 3);
    assert_eq!(processor.time_budget(), Some(Duration::from_millis(2)));
}
