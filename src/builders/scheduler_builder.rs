//! Build an [`EventScheduler`] from configuration and host collaborators.

use std::sync::Arc;
use std::time::Duration;

use crate::config::SchedulerConfig;
use crate::core::{DiagnosticSink, EventScheduler, SchedulerError};
use crate::runtime::{Clock, DrivingThread, InlineDriver, MonotonicClock};

/// Build a scheduler from validated configuration.
///
/// Named pool caps are registered before any event is scheduled, so they
/// apply the first time each event type is used.
pub fn build_scheduler(
    cfg: &SchedulerConfig,
    clock: Arc<dyn Clock>,
    driver: Arc<dyn DrivingThread>,
) -> Result<EventScheduler, SchedulerError> {
    cfg.validate()
        .map_err(|e| SchedulerError::InvalidConfig(format!("config invalid: {e}")))?;

    let scheduler = EventScheduler::with_settings(clock, driver, &cfg.to_settings());
    for (name, cap) in &cfg.pool_caps {
        scheduler
            .processor()
            .pools()
            .set_named_max_size(name.clone(), *cap);
    }
    Ok(scheduler)
}

/// Fluent construction of an [`EventScheduler`].
///
/// Without an explicit clock the scheduler uses a [`MonotonicClock`]; without
/// an explicit driver every thread counts as the driving thread.
#[derive(Default)]
pub struct SchedulerBuilder {
    config: SchedulerConfig,
    clock: Option<Arc<dyn Clock>>,
    driver: Option<Arc<dyn DrivingThread>>,
    sink: Option<Arc<dyn DiagnosticSink>>,
}

impl SchedulerBuilder {
    /// Start from default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration.
    #[must_use]
    pub fn from_config(config: SchedulerConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Use `clock` as the time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Use `driver` to identify the driving thread.
    #[must_use]
    pub fn with_driver(mut self, driver: Arc<dyn DrivingThread>) -> Self {
        self.driver = Some(driver);
        self
    }

    /// Forward diagnostics to `sink`.
    #[must_use]
    pub fn with_diagnostic_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Executions per tick; `None` is unlimited.
    #[must_use]
    pub fn with_item_budget(mut self, budget: Option<usize>) -> Self {
        self.config.item_budget = budget;
        self
    }

    /// Wall time per tick; `None` and a zero duration are unlimited. Rounded
    /// up to whole milliseconds.
    #[must_use]
    pub fn with_time_budget(mut self, budget: Option<Duration>) -> Self {
        self.config.time_budget_ms = budget.filter(|budget| !budget.is_zero()).map(|budget| {
            u64::try_from(budget.as_nanos().div_ceil(1_000_000)).unwrap_or(u64::MAX)
        });
        self
    }

    /// Ticks between cancellation drains.
    #[must_use]
    pub fn with_cleanup_interval(mut self, ticks: u64) -> Self {
        self.config.cleanup_interval_ticks = ticks;
        self
    }

    /// Ledger size that forces a drain.
    #[must_use]
    pub fn with_eager_cleanup_threshold(mut self, threshold: usize) -> Self {
        self.config.eager_cleanup_threshold = threshold;
        self
    }

    /// Cap for pools without a named entry.
    #[must_use]
    pub fn with_default_pool_cap(mut self, cap: usize) -> Self {
        self.config.default_pool_cap = cap;
        self
    }

    /// Cap for the pool of the event type called `name`.
    #[must_use]
    pub fn with_pool_cap(mut self, name: impl Into<String>, cap: usize) -> Self {
        self.config.pool_caps.insert(name.into(), cap);
        self
    }

    /// Queue slots reserved up front.
    #[must_use]
    pub fn with_initial_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.initial_queue_capacity = capacity;
        self
    }

    /// Configuration accumulated so far.
    pub const fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Validate and build.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if the accumulated configuration does not validate.
    pub fn build(self) -> Result<EventScheduler, SchedulerError> {
        let clock: Arc<dyn Clock> = match self.clock {
            Some(clock) => clock,
            None => Arc::new(MonotonicClock::new()),
        };
        let driver: Arc<dyn DrivingThread> = match self.driver {
            Some(driver) => driver,
            None => Arc::new(InlineDriver),
        };
        let scheduler = build_scheduler(&self.config, clock, driver)?;
        if let Some(sink) = self.sink {
            scheduler.set_diagnostic_sink(sink);
        }
        Ok(scheduler)
    }
}
