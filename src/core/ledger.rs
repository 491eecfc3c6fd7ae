//! Buffer of cancelled items waiting to go back to their pools.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

/// Ledger size at which a drain runs on the next tick regardless of interval.
pub const DEFAULT_EAGER_CLEANUP_THRESHOLD: usize = 100;

/// Cancelled-but-unreclaimed items.
///
/// Items are owned by the ledger once pushed; nothing else may release them.
pub struct CancellationLedger<T> {
    entries: Mutex<Vec<T>>,
    threshold: AtomicUsize,
}

impl<T> Default for CancellationLedger<T> {
    fn default() -> Self {
        Self::new(DEFAULT_EAGER_CLEANUP_THRESHOLD)
    }
}

impl<T> CancellationLedger<T> {
    /// Create a ledger with the given eager threshold. Zero disables eager drains.
    pub fn new(threshold: usize) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            threshold: AtomicUsize::new(threshold),
        }
    }

    /// Record a cancelled item. Returns true once the eager threshold is reached.
    pub fn push(&self, item: T) -> bool {
        let len = {
            let mut entries = self.entries.lock();
            entries.push(item);
            entries.len()
        };
        self.reached(len)
    }

    fn reached(&self, len: usize) -> bool {
        let threshold = self.threshold();
        threshold > 0 && len >= threshold
    }

    /// Items currently buffered.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Eager drain threshold.
    pub fn threshold(&self) -> usize {
        self.threshold.load(Ordering::Acquire)
    }

    /// Change the eager drain threshold.
    pub fn set_threshold(&self, threshold: usize) {
        self.threshold.store(threshold, Ordering::Release);
    }

    /// Whether the buffered count has reached the eager threshold.
    pub fn should_drain(&self) -> bool {
        self.reached(self.len())
    }

    /// Take every buffered item, leaving the ledger empty.
    pub fn take_all(&self) -> Vec<T> {
        std::mem::take(&mut *self.entries.lock())
    }

    /// Release spare buffer capacity.
    pub fn shrink_to_fit(&self) {
        self.entries.lock().shrink_to_fit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_signals_at_threshold() {
        let ledger = CancellationLedger::new(3);
        assert!(!ledger.push(1));
        assert!(!ledger.push(2));
        assert!(ledger.push(3));
        assert!(ledger.should_drain());

        assert_eq!(ledger.take_all(), vec![1, 2, 3]);
        assert!(ledger.is_empty());
        assert!(!ledger.should_drain());
    }

    #[test]
    fn test_zero_threshold_never_signals() {
        let ledger = CancellationLedger::new(0);
        for i in 0..500 {
            assert!(!ledger.push(i));
        }
        assert_eq!(ledger.len(), 500);
        assert!(!ledger.should_drain());
    }

    #[test]
    fn test_lowering_threshold_applies_to_buffered_items() {
        let ledger: CancellationLedger<u32> = CancellationLedger::default();
        assert_eq!(ledger.threshold(), DEFAULT_EAGER_CLEANUP_THRESHOLD);
        ledger.push(7);
        ledger.push(8);
        assert!(!ledger.should_drain());

        ledger.set_threshold(2);
        assert!(ledger.should_drain());
    }
}
