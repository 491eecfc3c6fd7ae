//! Time sources for the scheduler.
//!
//! Due times live on the clock's own timescale: a time scale of 2.0 makes
//! scheduled delays elapse twice as fast in wall time.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Host clock read by the scheduler when stamping due times and ticking.
pub trait Clock: Send + Sync {
    /// Current time on the clock's scaled timeline.
    fn now(&self) -> Duration;

    /// Ratio of scaled time to wall time.
    fn time_scale(&self) -> f64;

    /// Whether `now` may be read from any thread. When false, reads from
    /// other threads are marshalled onto the driving thread.
    fn is_thread_safe(&self) -> bool {
        true
    }
}

fn sanitize_scale(scale: f64) -> f64 {
    if scale.is_finite() && scale >= 0.0 {
        scale
    } else {
        tracing::warn!(scale, "ignoring invalid time scale; using 0");
        0.0
    }
}

fn scaled(delta: Duration, scale: f64) -> Duration {
    Duration::try_from_secs_f64(delta.as_secs_f64() * scale).unwrap_or(Duration::MAX)
}

struct Timeline {
    base: Duration,
    since: Instant,
    scale: f64,
}

/// Wall clock built on [`Instant`] with an adjustable time scale.
///
/// Changing the scale folds the time elapsed so far into a base offset, so
/// `now` never jumps.
pub struct MonotonicClock {
    timeline: Mutex<Timeline>,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock {
    /// Start a clock at zero with a time scale of 1.0.
    #[must_use]
    pub fn new() -> Self {
        Self {
            timeline: Mutex::new(Timeline {
                base: Duration::ZERO,
                since: Instant::now(),
                scale: 1.0,
            }),
        }
    }

    /// Change the time scale. Negative and non-finite values become 0.
    pub fn set_time_scale(&self, scale: f64) {
        let scale = sanitize_scale(scale);
        let mut timeline = self.timeline.lock();
        let now = Instant::now();
        timeline.base = timeline
            .base
            .saturating_add(scaled(now - timeline.since, timeline.scale));
        timeline.since = now;
        timeline.scale = scale;
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        let timeline = self.timeline.lock();
        timeline
            .base
            .saturating_add(scaled(timeline.since.elapsed(), timeline.scale))
    }

    fn time_scale(&self) -> f64 {
        self.timeline.lock().scale
    }
}

struct ManualState {
    now: Duration,
    scale: f64,
}

/// Clock that only moves when told to. Used for lockstep simulations and tests.
pub struct ManualClock {
    state: Mutex<ManualState>,
    thread_safe: bool,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    /// Clock at zero, readable from any thread.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ManualState {
                now: Duration::ZERO,
                scale: 1.0,
            }),
            thread_safe: true,
        }
    }

    /// Clock at zero that reports it must only be read on the driving thread.
    #[must_use]
    pub fn driving_thread_only() -> Self {
        Self {
            state: Mutex::new(ManualState {
                now: Duration::ZERO,
                scale: 1.0,
            }),
            thread_safe: false,
        }
    }

    /// Move forward by `delta` wall time, scaled by the current time scale.
    pub fn advance(&self, delta: Duration) -> Duration {
        let mut state = self.state.lock();
        state.now = state.now.saturating_add(scaled(delta, state.scale));
        state.now
    }

    /// Jump to an absolute scaled time.
    pub fn set(&self, now: Duration) {
        self.state.lock().now = now;
    }

    /// Change the time scale. Negative and non-finite values become 0.
    pub fn set_time_scale(&self, scale: f64) {
        self.state.lock().scale = sanitize_scale(scale);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.state.lock().now
    }

    fn time_scale(&self) -> f64 {
        self.state.lock().scale
    }

    fn is_thread_safe(&self) -> bool {
        self.thread_safe
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_scales_advances() {
        let clock = ManualClock::new();
        clock.advance(Duration::from_millis(100));
        clock.set_time_scale(0.5);
        assert_eq!(clock.advance(Duration::from_millis(100)), Duration::from_millis(150));
        assert!((clock.time_scale() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_invalid_scale_freezes_time() {
        let clock = ManualClock::new();
        clock.set_time_scale(f64::NAN);
        clock.advance(Duration::from_secs(5));
        assert_eq!(clock.now(), Duration::ZERO);

        clock.set_time_scale(-3.0);
        assert!(clock.time_scale().abs() < f64::EPSILON);
    }

    #[test]
    fn test_monotonic_clock_never_goes_backwards() {
        let clock = MonotonicClock::new();
        let first = clock.now();
        clock.set_time_scale(0.0);
        let frozen = clock.now();
        std::thread::sleep(Duration::from_millis(2));
        assert!(frozen >= first);
        assert_eq!(clock.now(), frozen);

        clock.set_time_scale(1.0);
        std::thread::sleep(Duration::from_millis(2));
        assert!(clock.now() > frozen);
    }

    #[test]
    fn test_thread_safety_flag() {
        assert!(ManualClock::new().is_thread_safe());
        assert!(!ManualClock::driving_thread_only().is_thread_safe());
        assert!(MonotonicClock::new().is_thread_safe());
    }
}
