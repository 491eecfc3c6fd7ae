//! Infrastructure collaborators used alongside the scheduler.

pub mod state_store;

pub use state_store::StateStore;
