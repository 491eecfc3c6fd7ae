//! Tests for error types

use prometheus_event_scheduler::core::SchedulerError;

#[test]
fn test_not_found_error() {
    let err = SchedulerError::NotFound("Respawn #4 is not queued".to_string());
    assert_eq!(format!("{}", err), "event not found: Respawn #4 is not queued");
}

#[test]
fn test_capacity_exceeded_error() {
    let err = SchedulerError::CapacityExceeded {
        type_name: "Respawn",
        max: 8,
    };
    assert_eq!(format!("{}", err), "pool capacity exceeded for Respawn (max 8)");
}

#[test]
fn test_contention_error() {
    let err = SchedulerError::Contention {
        type_name: "Respawn",
        attempts: 10,
    };
    assert_eq!(format!("{}", err), "pool contention for Respawn after 10 attempts");
}

#[test]
fn test_invalid_state_error() {
    let err = SchedulerError::InvalidState("Respawn #4 was recycled".to_string());
    assert_eq!(format!("{}", err), "invalid state: Respawn #4 was recycled");
}

#[test]
fn test_invalid_config_error() {
    let err = SchedulerError::InvalidConfig("default_pool_cap must be greater than 0".to_string());
    assert_eq!(
        format!("{}", err),
        "invalid configuration: default_pool_cap must be greater than 0"
    );
}

#[test]
fn test_errors_convert_into_anyhow() {
    fn fails() -> prometheus_event_scheduler::core::AppResult<()> {
        Err(SchedulerError::NotFound("gone".into()).into())
    }
    let err = fails().unwrap_err();
    assert!(err.downcast_ref::<SchedulerError>().is_some());
}
