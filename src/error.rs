//! Error types.
//!
//! The kernel's error-handling split is deliberate: violated preconditions
//! (releasing a lock you do not hold, sleeping on a condition without its
//! lock, double-waiting) are programmer errors that corrupt the wait/hold
//! graph if masked, so they fail fast with assertions. The typed errors here
//! cover the one surface where a recoverable result is meaningful — the run
//! loop's step limit, which is how tests turn an accidental livelock into a
//! failure instead of a hang.

use thiserror::Error;

/// Errors reported by the executor's run loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RunError {
    /// The configured step limit was exceeded before quiescence.
    #[error("step limit of {limit} exceeded after {steps} executor steps")]
    StepLimit {
        /// The configured cap.
        limit: u64,
        /// Steps executed by the kernel so far.
        steps: u64,
    },
}
