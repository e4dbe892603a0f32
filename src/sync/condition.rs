//! Condition variables.
//!
//! A `Condition` pairs one externally-supplied [`Lock`] with a private
//! non-transferring wait queue (plain FIFO wake order; the sleeping threads
//! donate nothing — there is nothing to donate to while the event has no
//! owner).
//!
//! The safety-critical step is `sleep`: enqueueing on the condition and
//! releasing the lock happen under a single scheduler critical section, so a
//! waker that takes the lock immediately afterwards cannot slip its `wake`
//! in between — no wakeup is ever lost. The sleeper reacquires the lock
//! before `sleep` returns.

use crate::sync::lock::Lock;
use crate::types::QueueId;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tracing::{trace, warn};

/// A condition variable bound to a lock.
pub struct Condition {
    lock: Arc<Lock>,
    queue: QueueId,
}

impl Condition {
    /// Creates a condition variable on `lock`'s kernel.
    #[must_use]
    pub fn new(lock: Arc<Lock>) -> Self {
        let queue = lock.shared().sched().new_queue(false);
        Self { lock, queue }
    }

    /// The lock this condition is bound to.
    #[must_use]
    pub fn lock(&self) -> &Arc<Lock> {
        &self.lock
    }

    /// Atomically releases the lock and blocks until another thread calls
    /// [`wake`](Self::wake) or [`wake_all`](Self::wake_all); reacquires the
    /// lock before returning.
    ///
    /// # Panics
    ///
    /// Panics if the calling thread does not hold the associated lock.
    #[must_use = "futures do nothing unless awaited"]
    pub fn sleep(&self) -> Sleep<'_> {
        Sleep {
            condition: self,
            state: SleepState::Init,
        }
    }

    /// Makes one sleeping thread runnable, in the queue's wake order. The
    /// caller keeps the lock. No-op when nothing sleeps here.
    ///
    /// # Panics
    ///
    /// Panics if the calling thread does not hold the associated lock.
    pub fn wake(&self) {
        let shared = self.lock.shared();
        let thread = shared.current().expect("wake outside a kernel thread");
        let mut sched = shared.sched();
        assert_eq!(
            sched
                .queue(self.lock.queue())
                .expect("lock queue missing")
                .holder(),
            Some(thread),
            "condition woken without holding the lock"
        );

        if let Some(woken) = sched.next_thread(self.queue) {
            // Admission token only; the condition is not a held resource.
            sched.release(self.queue, woken);
            sched.wait_for_access(shared.ready_queue(), woken);
            trace!(waker = ?thread, woken = ?woken, "condition wake");
        }
    }

    /// Makes every currently sleeping thread runnable; each re-admits to the
    /// lock in turn.
    ///
    /// # Panics
    ///
    /// Panics if the calling thread does not hold the associated lock.
    pub fn wake_all(&self) {
        let shared = self.lock.shared();
        let thread = shared.current().expect("wake_all outside a kernel thread");
        let mut sched = shared.sched();
        assert_eq!(
            sched
                .queue(self.lock.queue())
                .expect("lock queue missing")
                .holder(),
            Some(thread),
            "condition woken without holding the lock"
        );

        while let Some(woken) = sched.next_thread(self.queue) {
            sched.release(self.queue, woken);
            sched.wait_for_access(shared.ready_queue(), woken);
            trace!(waker = ?thread, woken = ?woken, "condition wake (broadcast)");
        }
    }

    /// Number of threads currently sleeping on this condition.
    #[must_use]
    pub fn waiters(&self) -> usize {
        self.lock
            .shared()
            .sched()
            .queue(self.queue)
            .expect("condition queue missing")
            .len()
    }
}

impl Drop for Condition {
    fn drop(&mut self) {
        if !self.lock.shared().sched().remove_queue_if_idle(self.queue) {
            warn!(queue = ?self.queue, "condition dropped with sleeping threads");
        }
    }
}

enum SleepState {
    Init,
    Parked,
    Reacquiring,
    Done,
}

/// Future returned by [`Condition::sleep`].
pub struct Sleep<'a> {
    condition: &'a Condition,
    state: SleepState,
}

impl Future for Sleep<'_> {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, _context: &mut Context<'_>) -> Poll<Self::Output> {
        let condition = self.condition;
        let lock = condition.lock.as_ref();
        let shared = lock.shared();
        match self.state {
            SleepState::Init => {
                let thread = shared.current().expect("sleep outside a kernel thread");
                let mut sched = shared.sched();
                assert_eq!(
                    sched
                        .queue(lock.queue())
                        .expect("lock queue missing")
                        .holder(),
                    Some(thread),
                    "condition slept without holding the lock"
                );

                // One critical section: park on the condition, then pass the
                // lock on. A waker acquiring the lock after us must observe
                // our wait-set entry.
                sched.wait_for_access(self.condition.queue, thread);
                if let Some(next) = sched.next_thread(lock.queue()) {
                    sched.wait_for_access(shared.ready_queue(), next);
                }
                trace!(thread = ?thread, "thread sleeping on condition");
                self.state = SleepState::Parked;
                Poll::Pending
            }
            // A wake made us runnable; take the lock back before returning.
            SleepState::Parked => {
                let thread = shared.current().expect("sleep outside a kernel thread");
                let mut sched = shared.sched();
                let holder = sched
                    .queue(lock.queue())
                    .expect("lock queue missing")
                    .holder();
                if holder.is_none() {
                    sched.acquire(lock.queue(), thread);
                    self.state = SleepState::Done;
                    return Poll::Ready(());
                }
                sched.wait_for_access(lock.queue(), thread);
                self.state = SleepState::Reacquiring;
                Poll::Pending
            }
            SleepState::Reacquiring => {
                debug_assert!(lock.held_by_current(), "woken without lock ownership");
                self.state = SleepState::Done;
                Poll::Ready(())
            }
            SleepState::Done => panic!("Sleep polled after completion"),
        }
    }
}
