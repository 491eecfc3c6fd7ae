//! Driving-thread affinity.
//!
//! The scheduler never guesses which thread drives ticks; the host injects a
//! [`DrivingThread`] that answers the question and accepts work that must run
//! there.

use std::thread::{self, ThreadId};

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::RwLock;

/// Work handed to the driving thread.
pub type MarshalledJob = Box<dyn FnOnce() + Send + 'static>;

/// Host collaborator describing the thread that runs ticks.
pub trait DrivingThread: Send + Sync {
    /// Whether the calling thread is the driving thread.
    fn is_driving_thread(&self) -> bool;

    /// Run `job` on the driving thread at its next opportunity.
    fn marshal(&self, job: MarshalledJob);
}

/// Treats every thread as the driving thread; marshalled jobs run inline.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineDriver;

impl DrivingThread for InlineDriver {
    fn is_driving_thread(&self) -> bool {
        true
    }

    fn marshal(&self, job: MarshalledJob) {
        job();
    }
}

/// Binds the driving role to one thread. Jobs marshalled from other threads
/// queue on a channel until the driving thread calls
/// [`run_pending`](Self::run_pending).
pub struct ThreadDriver {
    owner: RwLock<ThreadId>,
    tx: Sender<MarshalledJob>,
    rx: Receiver<MarshalledJob>,
}

impl Default for ThreadDriver {
    fn default() -> Self {
        Self::for_current_thread()
    }
}

impl ThreadDriver {
    /// Bind to the calling thread.
    #[must_use]
    pub fn for_current_thread() -> Self {
        let (tx, rx) = unbounded();
        Self {
            owner: RwLock::new(thread::current().id()),
            tx,
            rx,
        }
    }

    /// Move the driving role to the calling thread.
    pub fn bind_current_thread(&self) {
        *self.owner.write() = thread::current().id();
    }

    /// Jobs waiting for the driving thread.
    pub fn pending_jobs(&self) -> usize {
        self.rx.len()
    }

    /// Run every queued job. Returns how many ran.
    ///
    /// Jobs queued while this runs are picked up in the same call.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while let Ok(job) = self.rx.try_recv() {
            job();
            ran += 1;
        }
        if ran > 0 {
            tracing::debug!(ran, "ran marshalled jobs");
        }
        ran
    }
}

impl DrivingThread for ThreadDriver {
    fn is_driving_thread(&self) -> bool {
        *self.owner.read() == thread::current().id()
    }

    fn marshal(&self, job: MarshalledJob) {
        if self.is_driving_thread() {
            job();
            return;
        }
        // The receiver lives in `self`, so the channel cannot be disconnected.
        let _ = self.tx.send(job);
    }
}
