//! Mutual-exclusion lock with priority donation.
//!
//! A `Lock` is one transferring wait queue: whoever holds it receives the
//! donated priority of everyone queued behind it, which is what keeps a
//! low-priority holder from stalling a high-priority waiter indefinitely.
//!
//! Acquisition is two-phase. If the queue is free the caller takes it
//! immediately; otherwise it enqueues and suspends, and `next_thread` makes
//! it the holder *before* it resumes — by the time the acquire future is
//! polled again, the lock is already its.

use crate::runtime::{KernelHandle, KernelShared};
use crate::types::QueueId;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tracing::{trace, warn};

/// A cooperative mutual-exclusion lock.
pub struct Lock {
    shared: Arc<KernelShared>,
    queue: QueueId,
}

impl Lock {
    /// Creates a lock on the given kernel. The lock's queue transfers
    /// priority to its holder.
    #[must_use]
    pub fn new(handle: &KernelHandle) -> Self {
        let shared = handle.shared();
        let queue = shared.sched().new_queue(true);
        Self { shared, queue }
    }

    pub(crate) fn queue(&self) -> QueueId {
        self.queue
    }

    pub(crate) fn shared(&self) -> &Arc<KernelShared> {
        &self.shared
    }

    /// Acquires the lock, suspending until it is available.
    ///
    /// # Panics
    ///
    /// Panics if the calling thread already holds this lock.
    #[must_use = "futures do nothing unless awaited"]
    pub fn acquire(&self) -> Acquire<'_> {
        Acquire {
            lock: self,
            state: AcquireState::Init,
        }
    }

    /// Releases the lock, handing it to the next waiter (if any) and making
    /// that waiter runnable.
    ///
    /// # Panics
    ///
    /// Panics if the calling thread does not hold the lock.
    pub fn release(&self) {
        let thread = self
            .shared
            .current()
            .expect("lock released outside a kernel thread");
        let mut sched = self.shared.sched();
        let holder = sched.queue(self.queue).expect("lock queue missing").holder();
        assert_eq!(holder, Some(thread), "lock released by non-holder");

        if let Some(next) = sched.next_thread(self.queue) {
            sched.wait_for_access(self.shared.ready_queue(), next);
            trace!(from = ?thread, to = ?next, "lock handed off");
        } else {
            trace!(from = ?thread, "lock freed");
        }
    }

    /// Returns true if any thread holds the lock.
    #[must_use]
    pub fn is_held(&self) -> bool {
        self.shared
            .sched()
            .queue(self.queue)
            .expect("lock queue missing")
            .holder()
            .is_some()
    }

    /// Returns true if the calling thread holds the lock.
    #[must_use]
    pub fn held_by_current(&self) -> bool {
        let current = self.shared.current();
        current.is_some()
            && self
                .shared
                .sched()
                .queue(self.queue)
                .expect("lock queue missing")
                .holder()
                == current
    }
}

impl Drop for Lock {
    fn drop(&mut self) {
        if !self.shared.sched().remove_queue_if_idle(self.queue) {
            warn!(queue = ?self.queue, "lock dropped while held or contended");
        }
    }
}

enum AcquireState {
    Init,
    Queued,
    Done,
}

/// Future returned by [`Lock::acquire`].
pub struct Acquire<'a> {
    lock: &'a Lock,
    state: AcquireState,
}

impl Future for Acquire<'_> {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, _context: &mut Context<'_>) -> Poll<Self::Output> {
        let lock = self.lock;
        match self.state {
            AcquireState::Init => {
                let thread = lock
                    .shared
                    .current()
                    .expect("lock acquired outside a kernel thread");
                let mut sched = lock.shared.sched();
                let holder = sched.queue(lock.queue).expect("lock queue missing").holder();
                assert_ne!(holder, Some(thread), "recursive lock acquire");

                if holder.is_none() {
                    sched.acquire(lock.queue, thread);
                    trace!(thread = ?thread, "lock taken uncontended");
                    self.state = AcquireState::Done;
                    return Poll::Ready(());
                }

                sched.wait_for_access(lock.queue, thread);
                trace!(thread = ?thread, "lock contended, thread queued");
                self.state = AcquireState::Queued;
                Poll::Pending
            }
            // `next_thread` acquired on our behalf before readying us.
            AcquireState::Queued => {
                debug_assert!(lock.held_by_current(), "woken without lock ownership");
                self.state = AcquireState::Done;
                Poll::Ready(())
            }
            AcquireState::Done => panic!("Acquire polled after completion"),
        }
    }
}
