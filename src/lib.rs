//! Coopkern — the scheduling core of a cooperative, single-processor kernel.
//!
//! The crate centers on a pluggable thread-ordering policy — strict priority
//! with donation ([`PriorityPolicy`]) or probabilistic lottery with donation
//! ([`LotteryPolicy`]) — and the synchronization primitives built directly on
//! it: a donating [`Lock`], [`Condition`] variables, a tick-driven [`Alarm`],
//! and a rendezvous [`Communicator`].
//!
//! The scheduling state is a live graph: threads wait on resources, resources
//! are held by threads, and priority flows backward along wait-edges so a
//! low-priority holder cannot stall a high-priority waiter. The graph may
//! contain cycles; donation propagation terminates on them by value
//! convergence and per-wave revisit detection rather than any hop budget.
//!
//! Execution is strictly single-processor and cooperative: a deterministic
//! executor ([`Kernel`]) polls one thread at a time, threads suspend only at
//! explicit points (queue waits, sleeps, rendezvous,
//! [`KernelHandle::yield_now`]), and virtual time advances only when nothing
//! is runnable. Same seed, same schedule.
//!
//! # Example
//!
//! ```
//! use coopkern::config::KernelConfig;
//! use coopkern::runtime::Kernel;
//! use coopkern::sync::Communicator;
//! use std::rc::Rc;
//!
//! let mut kernel = Kernel::new(KernelConfig::new(42));
//! let comm = Rc::new(Communicator::new(&kernel.handle()));
//!
//! let speaker = Rc::clone(&comm);
//! kernel.spawn("speaker", async move { speaker.speak(5).await });
//! let listener = Rc::clone(&comm);
//! kernel.spawn("listener", async move {
//!     assert_eq!(listener.listen().await, 5);
//! });
//!
//! kernel.run_until_quiescent().unwrap();
//! assert_eq!(kernel.alive_threads(), 0);
//! ```

pub mod config;
pub mod error;
pub mod runtime;
pub mod sched;
pub mod sync;
pub mod time;
pub mod types;
pub mod util;

pub use config::{KernelConfig, PolicyChoice};
pub use error::RunError;
pub use runtime::{Kernel, KernelHandle};
pub use sched::{LotteryPolicy, PriorityPolicy, SchedCore, SchedPolicy};
pub use sync::{Communicator, Condition, Lock};
pub use time::{Alarm, TickHandler, VirtualClock};
pub use types::{QueueId, ThreadId, Time};

/// Phase tracking macro for structured test logging.
#[macro_export]
macro_rules! test_phase {
    ($name:expr) => {
        tracing::info!(test = $name, "=== TEST START ===");
    };
}

/// Completion marker for structured test logging.
#[macro_export]
macro_rules! test_complete {
    ($name:expr) => {
        tracing::info!(test = $name, "=== TEST COMPLETE ===");
    };
}

/// Assertion with logging for better test output.
#[macro_export]
macro_rules! assert_with_log {
    ($cond:expr, $msg:expr, $expected:expr, $actual:expr) => {
        if !$cond {
            tracing::error!(
                message = $msg,
                expected = ?$expected,
                actual = ?$actual,
                "Assertion failed"
            );
        }
        assert!($cond, "{}: expected {:?}, got {:?}", $msg, $expected, $actual);
    };
}
