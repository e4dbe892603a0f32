//! Timed sleep.
//!
//! The alarm keeps a time-ordered list of sleeping threads and drains it
//! against the virtual clock on every timer tick. A sleeper is made runnable
//! on the first tick where `now >= wake_time` — resolution is bounded by the
//! tick period, not by the requested duration.

use crate::runtime::{KernelHandle, KernelShared};
use crate::time::TickHandler;
use crate::types::{ThreadId, Time};
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tracing::trace;

/// A sleeping thread and its due time.
///
/// Ordering is reversed so the max-heap pops the earliest wake time; the
/// insertion sequence breaks ties FIFO.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Sleeper {
    wake_time: Time,
    seq: u64,
    thread: ThreadId,
}

impl Ord for Sleeper {
    #[inline]
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .wake_time
            .cmp(&self.wake_time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Sleeper {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Default)]
struct AlarmInner {
    pending: BinaryHeap<Sleeper>,
    next_seq: u64,
}

/// Tick-driven timed sleep for kernel threads.
pub struct Alarm {
    shared: Arc<KernelShared>,
    inner: Mutex<AlarmInner>,
}

impl Alarm {
    /// Creates an alarm and registers it as a tick handler with the kernel.
    #[must_use]
    pub fn new(handle: &KernelHandle) -> Arc<Self> {
        let alarm = Arc::new(Self {
            shared: handle.shared(),
            inner: Mutex::new(AlarmInner::default()),
        });
        let trait_arc: Arc<dyn TickHandler> = alarm.clone();
        let weak: std::sync::Weak<dyn TickHandler> = Arc::downgrade(&trait_arc);
        alarm.shared.register_tick_handler(weak);
        alarm
    }

    /// Puts the calling thread to sleep for at least `ticks` virtual ticks.
    ///
    /// The thread becomes runnable on the first timer tick where
    /// `now >= call_time + ticks`. A zero-tick wait is already due and
    /// completes without suspending.
    pub fn wait_until(&self, ticks: u64) -> WaitUntil<'_> {
        WaitUntil {
            alarm: self,
            ticks,
            state: WaitState::Init,
        }
    }

    /// Number of threads currently sleeping.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.lock().pending.len()
    }
}

impl TickHandler for Alarm {
    fn on_tick(&self, now: Time) {
        let mut due: Vec<ThreadId> = Vec::new();
        {
            let mut inner = self.inner.lock();
            while let Some(head) = inner.pending.peek() {
                if head.wake_time > now {
                    break;
                }
                let sleeper = inner.pending.pop().expect("peeked entry exists");
                due.push(sleeper.thread);
            }
        }
        for thread in due {
            trace!(thread = ?thread, now = %now, "alarm wake");
            self.shared.make_ready(thread);
        }
    }

    fn next_deadline(&self) -> Option<Time> {
        self.inner.lock().pending.peek().map(|s| s.wake_time)
    }
}

enum WaitState {
    Init,
    Parked,
    Done,
}

/// Future returned by [`Alarm::wait_until`].
pub struct WaitUntil<'a> {
    alarm: &'a Alarm,
    ticks: u64,
    state: WaitState,
}

impl Future for WaitUntil<'_> {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, _context: &mut Context<'_>) -> Poll<Self::Output> {
        match self.state {
            WaitState::Init => {
                if self.ticks == 0 {
                    self.state = WaitState::Done;
                    return Poll::Ready(());
                }
                let thread = self
                    .alarm
                    .shared
                    .current()
                    .expect("wait_until outside a kernel thread");
                let wake_time = self.alarm.shared.now().saturating_add(self.ticks);
                {
                    let mut inner = self.alarm.inner.lock();
                    let seq = inner.next_seq;
                    inner.next_seq += 1;
                    inner.pending.push(Sleeper {
                        wake_time,
                        seq,
                        thread,
                    });
                }
                trace!(thread = ?thread, wake_time = %wake_time, "thread sleeping");
                self.state = WaitState::Parked;
                Poll::Pending
            }
            // Re-polled only after the tick callback made us runnable.
            WaitState::Parked => {
                self.state = WaitState::Done;
                Poll::Ready(())
            }
            WaitState::Done => panic!("WaitUntil polled after completion"),
        }
    }
}
