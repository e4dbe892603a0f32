//! The deterministic single-processor executor.
//!
//! [`Kernel`] drives cooperative threads: stored futures polled one at a time
//! in the order the scheduling policy dictates. The ready set is itself a
//! non-transferring wait queue, so admission to the processor goes through
//! exactly the same machinery as admission to any lock.
//!
//! A thread suspends by registering in a wait queue (or the alarm's pending
//! list) and returning `Poll::Pending`; it runs again only after an explicit
//! readiness transition re-enqueues it on the ready queue. When nothing is
//! runnable but sleepers are pending, the executor advances the virtual clock
//! to the next tick boundary covering the earliest deadline and fires the
//! registered tick handlers.

pub(crate) mod task_table;
pub(crate) mod waker;

use crate::config::KernelConfig;
use crate::error::RunError;
use crate::sched::SchedCore;
use crate::time::{TickHandler, VirtualClock};
use crate::types::{QueueId, ThreadId, Time};
use parking_lot::{Mutex, MutexGuard};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll, Waker};
use task_table::{StoredThread, TaskTable};
use tracing::{debug, info, trace};

/// State shared between the executor, its handles, and the primitives.
pub(crate) struct KernelShared {
    sched: Mutex<SchedCore>,
    tasks: Mutex<TaskTable>,
    clock: VirtualClock,
    ready: QueueId,
    current: Mutex<Option<ThreadId>>,
    tick_handlers: Mutex<Vec<Weak<dyn TickHandler>>>,
}

impl KernelShared {
    /// Locks the scheduling core. Callers hold the guard for the whole
    /// mutation; this is the cooperative analog of disabling interrupts.
    pub(crate) fn sched(&self) -> MutexGuard<'_, SchedCore> {
        self.sched.lock()
    }

    /// The processor's ready queue.
    pub(crate) fn ready_queue(&self) -> QueueId {
        self.ready
    }

    /// The currently running thread, if a poll is in progress.
    pub(crate) fn current(&self) -> Option<ThreadId> {
        *self.current.lock()
    }

    /// Current virtual time.
    pub(crate) fn now(&self) -> Time {
        self.clock.now()
    }

    /// Transitions a suspended thread to runnable.
    pub(crate) fn make_ready(&self, thread: ThreadId) {
        self.sched.lock().wait_for_access(self.ready, thread);
        trace!(thread = ?thread, "thread made ready");
    }

    /// Registers a periodic tick handler.
    pub(crate) fn register_tick_handler(&self, handler: Weak<dyn TickHandler>) {
        self.tick_handlers.lock().push(handler);
    }

    fn spawn_inner(
        &self,
        name: &str,
        priority: Option<u64>,
        future: Pin<Box<dyn Future<Output = ()>>>,
    ) -> ThreadId {
        let thread = {
            let mut sched = self.sched.lock();
            match priority {
                Some(priority) => sched.register_thread_with_priority(name, priority),
                None => sched.register_thread(name),
            }
        };
        self.tasks.lock().insert(
            thread,
            StoredThread {
                name: name.to_owned(),
                future,
            },
        );
        debug!(thread = ?thread, name, "thread spawned");
        self.make_ready(thread);
        thread
    }

    fn earliest_deadline(&self) -> Option<Time> {
        let mut handlers = self.tick_handlers.lock();
        handlers.retain(|handler| handler.strong_count() > 0);
        handlers
            .iter()
            .filter_map(Weak::upgrade)
            .filter_map(|handler| handler.next_deadline())
            .min()
    }

    fn fire_tick(&self, now: Time) {
        // Collected first so a handler may register further handlers.
        let handlers: Vec<Arc<dyn TickHandler>> = self
            .tick_handlers
            .lock()
            .iter()
            .filter_map(Weak::upgrade)
            .collect();
        for handler in handlers {
            handler.on_tick(now);
        }
    }
}

/// A cloneable capability handle onto a running kernel.
///
/// Spawned thread bodies capture one of these (or a primitive built from
/// one) to reach the scheduler.
#[derive(Clone)]
pub struct KernelHandle {
    shared: Arc<KernelShared>,
}

impl KernelHandle {
    pub(crate) fn shared(&self) -> Arc<KernelShared> {
        Arc::clone(&self.shared)
    }

    /// Spawns a thread at the policy's default priority.
    pub fn spawn(&self, name: &str, future: impl Future<Output = ()> + 'static) -> ThreadId {
        self.shared.spawn_inner(name, None, Box::pin(future))
    }

    /// Spawns a thread at the given base priority (clamped to policy bounds).
    pub fn spawn_with_priority(
        &self,
        name: &str,
        priority: u64,
        future: impl Future<Output = ()> + 'static,
    ) -> ThreadId {
        self.shared.spawn_inner(name, Some(priority), Box::pin(future))
    }

    /// Current virtual time.
    #[must_use]
    pub fn now(&self) -> Time {
        self.shared.now()
    }

    /// The currently running thread, if any.
    #[must_use]
    pub fn current(&self) -> Option<ThreadId> {
        self.shared.current()
    }

    /// Relinquishes the processor once; the caller rejoins the ready queue
    /// and runs again when the policy selects it.
    #[must_use = "futures do nothing unless awaited"]
    pub fn yield_now(&self) -> YieldNow {
        YieldNow {
            shared: self.shared(),
            state: YieldState::Init,
        }
    }

    /// Sets a thread's base priority (clamped to policy bounds).
    pub fn set_priority(&self, thread: ThreadId, priority: u64) {
        self.shared.sched.lock().set_priority(thread, priority);
    }

    /// A thread's base priority.
    #[must_use]
    pub fn get_priority(&self, thread: ThreadId) -> u64 {
        self.shared.sched.lock().get_priority(thread)
    }

    /// A thread's effective priority (base plus donations).
    #[must_use]
    pub fn get_effective_priority(&self, thread: ThreadId) -> u64 {
        self.shared.sched.lock().get_effective_priority(thread)
    }

    /// Raises a thread's base priority one step; false at the maximum.
    pub fn raise_priority(&self, thread: ThreadId) -> bool {
        self.shared.sched.lock().raise_priority(thread)
    }

    /// Lowers a thread's base priority one step; false at the minimum.
    pub fn lower_priority(&self, thread: ThreadId) -> bool {
        self.shared.sched.lock().lower_priority(thread)
    }
}

enum YieldState {
    Init,
    Parked,
    Done,
}

/// Future returned by [`KernelHandle::yield_now`].
pub struct YieldNow {
    shared: Arc<KernelShared>,
    state: YieldState,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, _context: &mut Context<'_>) -> Poll<Self::Output> {
        match self.state {
            YieldState::Init => {
                let thread = self.shared.current().expect("yield outside a kernel thread");
                self.shared.make_ready(thread);
                self.state = YieldState::Parked;
                Poll::Pending
            }
            YieldState::Parked => {
                self.state = YieldState::Done;
                Poll::Ready(())
            }
            YieldState::Done => panic!("YieldNow polled after completion"),
        }
    }
}

/// The deterministic cooperative executor.
pub struct Kernel {
    shared: Arc<KernelShared>,
    config: KernelConfig,
    waker: Waker,
    steps: u64,
}

impl Kernel {
    /// Builds a kernel from the configuration.
    #[must_use]
    pub fn new(config: KernelConfig) -> Self {
        let mut sched = SchedCore::new(config.policy.build(), config.seed);
        let ready = sched.new_queue(false);
        info!(
            seed = config.seed,
            tick_period = config.tick_period,
            policy = ?config.policy,
            "kernel initialized"
        );
        Self {
            shared: Arc::new(KernelShared {
                sched: Mutex::new(sched),
                tasks: Mutex::new(TaskTable::default()),
                clock: VirtualClock::starting_at(Time::ZERO),
                ready,
                current: Mutex::new(None),
                tick_handlers: Mutex::new(Vec::new()),
            }),
            config,
            waker: waker::inert_waker(),
            steps: 0,
        }
    }

    /// Returns a cloneable handle onto this kernel.
    #[must_use]
    pub fn handle(&self) -> KernelHandle {
        KernelHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Spawns a thread at the policy's default priority.
    pub fn spawn(&self, name: &str, future: impl Future<Output = ()> + 'static) -> ThreadId {
        self.handle().spawn(name, future)
    }

    /// Spawns a thread at the given base priority.
    pub fn spawn_with_priority(
        &self,
        name: &str,
        priority: u64,
        future: impl Future<Output = ()> + 'static,
    ) -> ThreadId {
        self.handle().spawn_with_priority(name, priority, future)
    }

    /// Current virtual time.
    #[must_use]
    pub fn now(&self) -> Time {
        self.shared.now()
    }

    /// Executor steps taken so far.
    #[must_use]
    pub const fn steps(&self) -> u64 {
        self.steps
    }

    /// Number of live (spawned, unfinished) threads.
    #[must_use]
    pub fn alive_threads(&self) -> usize {
        self.shared.tasks.lock().len()
    }

    /// Runs until no thread is runnable and no timer deadline is pending.
    ///
    /// Threads still alive afterwards are deadlocked (blocked with nothing
    /// left to wake them) — the caller decides whether that is a failure.
    /// Returns the number of steps this call executed.
    ///
    /// # Errors
    ///
    /// [`RunError::StepLimit`] if the configured `max_steps` is exceeded.
    pub fn run_until_quiescent(&mut self) -> Result<u64, RunError> {
        let start_steps = self.steps;
        loop {
            if let Some(limit) = self.config.max_steps {
                if self.steps - start_steps >= limit {
                    return Err(RunError::StepLimit {
                        limit,
                        steps: self.steps,
                    });
                }
            }

            let next = {
                let mut sched = self.shared.sched.lock();
                let admitted = sched.next_thread(self.shared.ready);
                if let Some(thread) = admitted {
                    // The processor is not a held resource; drop the
                    // admission token so teardown can assert an empty
                    // hold set.
                    sched.release(self.shared.ready, thread);
                }
                admitted
            };

            if let Some(thread) = next {
                self.step_thread(thread);
                continue;
            }

            let Some(deadline) = self.shared.earliest_deadline() else {
                break;
            };
            self.fire_ticks_for(deadline);
        }
        Ok(self.steps - start_steps)
    }

    fn step_thread(&mut self, thread: ThreadId) {
        self.steps += 1;
        let mut stored = self
            .shared
            .tasks
            .lock()
            .take(thread)
            .expect("admitted thread has no stored body");

        *self.shared.current.lock() = Some(thread);
        trace!(thread = ?thread, name = %stored.name, step = self.steps, "thread running");
        let mut context = Context::from_waker(&self.waker);
        let result = stored.future.as_mut().poll(&mut context);
        *self.shared.current.lock() = None;

        match result {
            Poll::Ready(()) => {
                debug!(thread = ?thread, name = %stored.name, "thread finished");
                self.shared.sched.lock().unregister_thread(thread);
            }
            Poll::Pending => {
                self.shared.tasks.lock().restore(thread, stored);
            }
        }
    }

    /// Advances the clock to the first tick boundary covering `deadline` and
    /// fires the tick handlers there.
    fn fire_ticks_for(&self, deadline: Time) {
        let period = self.config.tick_period;
        let now = self.shared.clock.now();
        let target = if deadline <= now {
            now
        } else {
            let behind = deadline.ticks() - now.ticks();
            let periods = behind.div_ceil(period);
            now.saturating_add(periods.saturating_mul(period))
        };
        self.shared.clock.advance_to(target);
        trace!(now = %target, "timer tick");
        self.shared.fire_tick(target);
    }
}
