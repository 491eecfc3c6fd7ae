//! Host runtime adapters: clocks, driving-thread affinity, and tick loops.

pub mod clock;
pub mod driver;
#[cfg(feature = "tokio-runtime")]
pub mod ticker;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use driver::{DrivingThread, InlineDriver, MarshalledJob, ThreadDriver};
#[cfg(feature = "tokio-runtime")]
pub use ticker::{spawn_tick_loop, TickLoopHandle, TokioTicker};
