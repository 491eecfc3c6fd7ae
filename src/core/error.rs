//! Error types for scheduler operations.

use thiserror::Error;

/// Errors produced by scheduler components.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    /// The targeted event is not currently queued.
    #[error("event not found: {0}")]
    NotFound(String),
    /// A pool was already at its cap when an instance was returned.
    #[error("pool capacity exceeded for {type_name} (max {max})")]
    CapacityExceeded {
        /// Type whose pool was full.
        type_name: &'static str,
        /// Cap in force at the time of the release.
        max: usize,
    },
    /// Slot reservation kept losing races with concurrent releases.
    #[error("pool contention for {type_name} after {attempts} attempts")]
    Contention {
        /// Type whose pool was contended.
        type_name: &'static str,
        /// Number of reservation attempts made.
        attempts: u32,
    },
    /// The event instance was disposed or recycled and may not be used.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// Configuration values failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
