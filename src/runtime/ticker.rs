//! Tokio-driven tick loop.
//!
//! Hosts without a frame loop of their own can drive a scheduler from a tokio
//! interval. Pair it with a driver that treats the runtime's worker threads as
//! driving threads, such as [`InlineDriver`](crate::runtime::InlineDriver).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::core::{EventScheduler, SchedulerError};

/// Spawns tick loops onto a tokio runtime.
#[derive(Clone)]
pub struct TokioTicker {
    handle: Arc<tokio::runtime::Handle>,
}

impl TokioTicker {
    /// Spawn onto the runtime behind `handle`.
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self {
            handle: Arc::new(handle),
        }
    }

    /// Spawn onto the runtime the caller is running in.
    ///
    /// # Errors
    ///
    /// `InvalidState` when called outside a tokio runtime.
    pub fn current() -> Result<Self, SchedulerError> {
        tokio::runtime::Handle::try_current()
            .map(Self::new)
            .map_err(|e| SchedulerError::InvalidState(format!("no tokio runtime: {e}")))
    }

    /// Call `scheduler.tick_now()` every `period` until stopped.
    ///
    /// Missed periods are skipped rather than replayed in a burst.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if `period` is zero.
    pub fn spawn(
        &self,
        scheduler: EventScheduler,
        period: Duration,
    ) -> Result<TickLoopHandle, SchedulerError> {
        if period.is_zero() {
            return Err(SchedulerError::InvalidConfig(
                "tick period must be greater than 0".into(),
            ));
        }
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let join = self.handle.spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut ticks = 0_u64;
            tracing::info!(?period, "tick loop started");

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let report = scheduler.tick_now();
                        ticks += 1;
                        if report.executed > 0 {
                            tracing::debug!(ticks, executed = report.executed, "tick loop executed events");
                        }
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            tracing::info!(ticks, "tick loop stopped");
            ticks
        });

        Ok(TickLoopHandle { stop_tx, join })
    }
}

/// Spawn a tick loop on the current tokio runtime.
///
/// # Errors
///
/// `InvalidState` outside a runtime; `InvalidConfig` for a zero period.
pub fn spawn_tick_loop(
    scheduler: EventScheduler,
    period: Duration,
) -> Result<TickLoopHandle, SchedulerError> {
    TokioTicker::current()?.spawn(scheduler, period)
}

/// Control handle for a running tick loop. Dropping it stops the loop.
pub struct TickLoopHandle {
    stop_tx: watch::Sender<bool>,
    join: JoinHandle<u64>,
}

impl TickLoopHandle {
    /// Ask the loop to stop and wait for it. Returns how many ticks ran.
    ///
    /// # Errors
    ///
    /// `InvalidState` if the loop task panicked or was aborted.
    pub async fn stop(self) -> Result<u64, SchedulerError> {
        let _ = self.stop_tx.send(true);
        self.join
            .await
            .map_err(|e| SchedulerError::InvalidState(format!("tick loop failed: {e}")))
    }

    /// Cancel the loop task without waiting.
    pub fn abort(&self) {
        self.join.abort();
    }

    /// Whether the loop task has ended.
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}
