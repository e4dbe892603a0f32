//! Strict-priority policy with donation.
//!
//! The next thread to be admitted is always one whose effective priority is
//! no less than any other waiter's; among equals, the one that has waited
//! longest. A queue donates the maximum of its waiters' effective priorities,
//! and a holder's effective priority is the maximum of its base priority and
//! everything donated to it.

use crate::sched::policy::SchedPolicy;
use crate::sched::queue::WaiterSet;
use crate::types::ThreadId;
use crate::util::DetRng;

/// The default priority for a new thread.
pub const PRIORITY_DEFAULT: u64 = 1;
/// The minimum priority that a thread can have.
pub const PRIORITY_MINIMUM: u64 = 0;
/// The maximum priority that a thread can have.
pub const PRIORITY_MAXIMUM: u64 = 7;

/// Deterministic highest-priority-first ordering with donation by maximum.
#[derive(Debug, Default, Clone, Copy)]
pub struct PriorityPolicy;

impl SchedPolicy for PriorityPolicy {
    fn priority_min(&self) -> u64 {
        PRIORITY_MINIMUM
    }

    fn priority_max(&self) -> u64 {
        PRIORITY_MAXIMUM
    }

    fn priority_default(&self) -> u64 {
        PRIORITY_DEFAULT
    }

    fn donated(&self, waiters: &WaiterSet) -> Option<u64> {
        // The set is ordered best-first, so the front entry carries the max.
        waiters.first().map(|w| w.effective)
    }

    fn effective(&self, base: u64, donations: &mut dyn Iterator<Item = u64>) -> u64 {
        donations.fold(base, u64::max)
    }

    fn select(&self, waiters: &WaiterSet, _rng: &mut DetRng) -> Option<ThreadId> {
        waiters.first().map(|w| w.thread)
    }
}
