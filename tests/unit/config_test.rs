//! Tests for configuration validation

use std::collections::HashMap;
use std::io::Write;
use std::time::Duration;

use prometheus_event_scheduler::config::SchedulerConfig;
use prometheus_event_scheduler::core::{DEFAULT_MAX_POOL_SIZE, UNBOUNDED_BATCH_SIZE};

#[test]
fn test_default_config_is_valid() {
    let cfg = SchedulerConfig::default();
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.item_budget, None);
    assert_eq!(cfg.time_budget(), Some(Duration::from_millis(5)));
    assert_eq!(cfg.cleanup_interval_ticks, 60);
    assert_eq!(cfg.eager_cleanup_threshold, 100);
    assert_eq!(cfg.default_pool_cap, DEFAULT_MAX_POOL_SIZE);
    assert_eq!(UNBOUNDED_BATCH_SIZE, 100);
}

#[test]
fn test_zero_item_budget_is_invalid() {
    let cfg = SchedulerConfig {
        item_budget: Some(0),
        ..SchedulerConfig::default()
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_zero_time_budget_is_invalid() {
    let cfg = SchedulerConfig {
        time_budget_ms: Some(0),
        ..SchedulerConfig::default()
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_zero_pool_caps_are_invalid() {
    let cfg = SchedulerConfig {
        default_pool_cap: 0,
        ..SchedulerConfig::default()
    };
    assert!(cfg.validate().is_err());

    let mut pool_caps = HashMap::new();
    pool_caps.insert("Respawn".to_string(), 0);
    let cfg = SchedulerConfig {
        pool_caps,
        ..SchedulerConfig::default()
    };
    let err = cfg.validate().unwrap_err();
    assert!(err.contains("Respawn"));
}

#[test]
fn test_scheduler_config_from_json() {
    let json = r#"
    {
        "item_budget": 250,
        "time_budget_ms": null,
        "cleanup_interval_ticks": 30,
        "pool_caps": { "Respawn": 16, "Heal": 4 }
    }
    "#;

    let cfg = SchedulerConfig::from_json_str(json).unwrap();
    assert_eq!(cfg.item_budget, Some(250));
    assert_eq!(cfg.time_budget(), None);
    assert_eq!(cfg.cleanup_interval_ticks, 30);
    assert_eq!(cfg.eager_cleanup_threshold, 100);
    assert_eq!(cfg.pool_caps.len(), 2);

    let settings = cfg.to_settings();
    assert_eq!(settings.item_budget, Some(250));
    assert_eq!(settings.time_budget, None);
}

#[test]
fn test_scheduler_config_rejects_malformed_json() {
    let err = SchedulerConfig::from_json_str("{ \"item_budget\": \"many\" }").unwrap_err();
    assert!(err.starts_with("parse error"));
}

#[test]
fn test_scheduler_config_from_file() {
    let path = std::env::temp_dir().join(format!(
        "event-scheduler-config-{}.json",
        uuid::Uuid::new_v4()
    ));
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(br#"{ "default_pool_cap": 12 }"#).unwrap();
    drop(file);

    let cfg = SchedulerConfig::from_json_file(&path).unwrap();
    assert_eq!(cfg.default_pool_cap, 12);
    std::fs::remove_file(&path).unwrap();

    let err = SchedulerConfig::from_json_file(&path).unwrap_err();
    assert!(format!("{err:#}").contains("reading scheduler config"));
}

#[test]
fn test_scheduler_config_from_env_defaults() {
    // No EVENT_SCHEDULER_* variables are set in the test environment.
    let cfg = SchedulerConfig::from_env().unwrap();
    assert!(cfg.validate().is_ok());
}
