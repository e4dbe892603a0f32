//! Virtual clock.
//!
//! The kernel's time source is a tick counter advanced explicitly by the
//! executor, never by wall-clock time. Reads are cheap and lock-free;
//! advancement is monotonic by construction.

use crate::types::Time;
use std::sync::atomic::{AtomicU64, Ordering};

/// A monotonic virtual clock counted in ticks.
#[derive(Debug, Default)]
pub struct VirtualClock {
    ticks: AtomicU64,
}

impl VirtualClock {
    /// Creates a clock positioned at `start`.
    #[must_use]
    pub fn starting_at(start: Time) -> Self {
        Self {
            ticks: AtomicU64::new(start.ticks()),
        }
    }

    /// The current virtual time.
    #[must_use]
    pub fn now(&self) -> Time {
        Time::from_ticks(self.ticks.load(Ordering::Acquire))
    }

    /// Moves the clock forward to `target`.
    ///
    /// # Panics
    ///
    /// Panics if `target` is behind the current time; virtual time never
    /// runs backwards.
    pub fn advance_to(&self, target: Time) {
        let previous = self.ticks.swap(target.ticks(), Ordering::AcqRel);
        assert!(
            previous <= target.ticks(),
            "virtual clock moved backwards: {previous} -> {}",
            target.ticks()
        );
    }
}
