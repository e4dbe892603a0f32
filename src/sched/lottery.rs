//! Lottery policy: probabilistic scheduling by ticket count.
//!
//! Effective priorities are ticket counts. A queue donates the *sum* of its
//! waiters' tickets to its holder (tickets accumulate; they do not take a
//! maximum), and admission is a weighted random draw: a uniform draw in
//! `[0, total_tickets)` walks the ordered wait-set accumulating ticket ranges
//! until it lands inside one waiter's range. Starvation is probabilistic
//! rather than structurally prevented.

use crate::sched::policy::SchedPolicy;
use crate::sched::queue::WaiterSet;
use crate::types::ThreadId;
use crate::util::DetRng;

/// The default ticket count for a new thread.
pub const TICKETS_DEFAULT: u64 = 1;
/// The minimum ticket count; the clamp keeps every waiter holding at least
/// one ticket, so a non-empty wait-set always has a positive total.
pub const TICKETS_MINIMUM: u64 = 1;
/// The maximum ticket count. Tickets aggregate additively, so the cap leaves
/// headroom against overflowing a `u64` sum.
pub const TICKETS_MAXIMUM: u64 = u64::MAX / 4;

/// Weighted-random ordering with donation by ticket sum.
#[derive(Debug, Default, Clone, Copy)]
pub struct LotteryPolicy;

impl SchedPolicy for LotteryPolicy {
    fn priority_min(&self) -> u64 {
        TICKETS_MINIMUM
    }

    fn priority_max(&self) -> u64 {
        TICKETS_MAXIMUM
    }

    fn priority_default(&self) -> u64 {
        TICKETS_DEFAULT
    }

    fn donated(&self, waiters: &WaiterSet) -> Option<u64> {
        if waiters.is_empty() {
            None
        } else {
            Some(waiters.total_effective())
        }
    }

    fn effective(&self, base: u64, donations: &mut dyn Iterator<Item = u64>) -> u64 {
        donations.fold(base, u64::saturating_add)
    }

    fn select(&self, waiters: &WaiterSet, rng: &mut DetRng) -> Option<ThreadId> {
        if waiters.is_empty() {
            return None;
        }
        let total = waiters.total_effective();
        debug_assert!(total > 0, "non-empty wait-set with zero tickets");

        let draw = rng.next_u64_in(total);
        let mut accumulated = 0u64;
        for waiter in waiters.iter() {
            accumulated = accumulated.saturating_add(waiter.effective);
            if draw < accumulated {
                return Some(waiter.thread);
            }
        }
        unreachable!("draw {draw} exceeded ticket total {total}");
    }
}
