//! # Prometheus Event Scheduler
//!
//! A tick-driven scheduler for timed events with per-tick latency and
//! throughput budgets and pooled event instances.
//!
//! Many producers submit work with a target execution time. A single driving
//! loop (a game frame, a simulation step, a tokio interval) calls
//! [`tick`](core::EventScheduler::tick) and the scheduler executes whatever is
//! due, in time order, until its item or time budget runs out.
//!
//! ## Key Features
//!
//! - **Time-ordered queue**: a locked binary min-heap with bulk insert and
//!   batched removal
//! - **Per-type pools**: event instances are reset and reused instead of
//!   reallocated; each type has its own capped free-list
//! - **Budgets**: cap executions per tick, wall time per tick, or both
//! - **Cancellation and rescheduling**: from any thread, linearizable with
//!   respect to the queue
//! - **Driving-thread affinity**: clocks that may only be read on the driving
//!   thread get their time stamping marshalled there
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use prometheus_event_scheduler::builders::SchedulerBuilder;
//! use prometheus_event_scheduler::core::TimedEvent;
//! use prometheus_event_scheduler::runtime::ManualClock;
//!
//! #[derive(Default)]
//! struct Respawn {
//!     player: u32,
//! }
//!
//! impl TimedEvent for Respawn {
//!     fn execute(&mut self, _now: Duration) {
//!         // bring the player back
//!     }
//! }
//!
//! let clock = Arc::new(ManualClock::new());
//! let scheduler = SchedulerBuilder::new()
//!     .with_clock(clock.clone())
//!     .with_item_budget(Some(64))
//!     .build()
//!     .expect("valid config");
//!
//! let handle = scheduler.schedule_with::<Respawn, _>(Duration::from_secs(3), |r| r.player = 7);
//! assert!(scheduler.is_pending(&handle));
//!
//! clock.advance(Duration::from_secs(3));
//! let report = scheduler.tick_now();
//! assert_eq!(report.executed, 1);
//! ```
//!
//! ## Configuration
//!
//! [`config::SchedulerConfig`] loads from JSON or from `EVENT_SCHEDULER_*`
//! environment variables, and [`builders::SchedulerBuilder`] turns it into a
//! scheduler. Logging goes through `tracing`; call
//! [`util::init_tracing`] for a default subscriber.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core scheduling engine: queue, pools, tick processor, and the scheduler facade.
pub mod core;
/// Configuration models for budgets, cleanup cadence, and pool caps.
pub mod config;
/// Builders to construct schedulers from configuration.
pub mod builders;
/// Infrastructure collaborators such as the keyed state store.
pub mod infra;
/// Host runtime adapters: clocks, driving threads, and tick loops.
pub mod runtime;
/// Shared utilities.
pub mod util;
