//! Telemetry helpers for structured logging and tracing.

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset: scheduler warnings and lifecycle
/// messages, nothing per-tick.
pub const DEFAULT_LOG_FILTER: &str = "prometheus_event_scheduler=info";

/// Install a default fmt subscriber unless the host already installed one.
///
/// `RUST_LOG` takes precedence; otherwise [`DEFAULT_LOG_FILTER`] applies.
pub fn init_tracing() {
    init_tracing_with(DEFAULT_LOG_FILTER);
}

/// Like [`init_tracing`], with a caller-chosen fallback filter.
pub fn init_tracing_with(fallback: &str) {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .try_init();
}
