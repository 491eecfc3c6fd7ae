//! Configuration models for budgets, cleanup cadence, and pool caps.

pub mod scheduler;

pub use scheduler::{SchedulerConfig, ENV_PREFIX};
