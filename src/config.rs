//! Kernel configuration.
//!
//! Controls deterministic execution:
//! - Random seed for lottery draws
//! - Tick period of the virtual timer
//! - Optional step limit (livelock guard for tests)
//! - Ordering policy selection
//!
//! # Builder Style
//!
//! `KernelConfig` uses a fluent, move-based builder. Each method consumes
//! `self` and returns an updated configuration so options chain safely:
//!
//! ```
//! use coopkern::config::{KernelConfig, PolicyChoice};
//!
//! let config = KernelConfig::new(42)
//!     .tick_period(100)
//!     .max_steps(10_000)
//!     .policy(PolicyChoice::Lottery);
//! assert!(config.has_step_limit());
//! ```

use crate::sched::{LotteryPolicy, PriorityPolicy, SchedPolicy};
use crate::util::DetRng;

/// Which ordering policy the kernel schedules with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PolicyChoice {
    /// Strict priority with donation; deterministic.
    #[default]
    Priority,
    /// Weighted random lottery with additive ticket donation.
    Lottery,
}

impl PolicyChoice {
    /// Instantiates the chosen policy.
    #[must_use]
    pub fn build(self) -> Box<dyn SchedPolicy> {
        match self {
            Self::Priority => Box::new(PriorityPolicy),
            Self::Lottery => Box::new(LotteryPolicy),
        }
    }
}

/// Configuration for a [`Kernel`](crate::runtime::Kernel).
#[derive(Debug, Clone)]
pub struct KernelConfig {
    /// Random seed for deterministic scheduling decisions.
    pub seed: u64,
    /// Virtual-clock ticks between timer interrupts. Sleep resolution is
    /// bounded by this period.
    pub tick_period: u64,
    /// Optional cap on executor steps per run call; exceeding it is reported
    /// as an error rather than spinning forever.
    pub max_steps: Option<u64>,
    /// The ordering policy.
    pub policy: PolicyChoice,
}

impl KernelConfig {
    /// Creates a configuration with the given seed and defaults
    /// (tick period 100, no step limit, priority policy).
    #[must_use]
    pub const fn new(seed: u64) -> Self {
        Self {
            seed,
            tick_period: 100,
            max_steps: None,
            policy: PolicyChoice::Priority,
        }
    }

    /// Sets the timer tick period.
    ///
    /// # Panics
    ///
    /// Panics if `ticks` is zero.
    #[must_use]
    pub fn tick_period(mut self, ticks: u64) -> Self {
        assert!(ticks > 0, "tick period must be positive");
        self.tick_period = ticks;
        self
    }

    /// Caps the number of executor steps per run call.
    #[must_use]
    pub const fn max_steps(mut self, steps: u64) -> Self {
        self.max_steps = Some(steps);
        self
    }

    /// Selects the ordering policy.
    #[must_use]
    pub const fn policy(mut self, policy: PolicyChoice) -> Self {
        self.policy = policy;
        self
    }

    /// Returns true when a step limit is configured.
    #[must_use]
    pub const fn has_step_limit(&self) -> bool {
        self.max_steps.is_some()
    }

    /// Creates the deterministic RNG for this configuration.
    #[must_use]
    pub const fn rng(&self) -> DetRng {
        DetRng::new(self.seed)
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self::new(42)
    }
}
