//! The scheduling core: thread records, the wait/hold graph, and donation
//! propagation.
//!
//! [`SchedCore`] owns two arenas — per-thread scheduling records and wait
//! queues — and implements the five queue operations
//! ([`wait_for_access`](SchedCore::wait_for_access),
//! [`acquire`](SchedCore::acquire), [`next_thread`](SchedCore::next_thread),
//! [`release`](SchedCore::release), [`set_priority`](SchedCore::set_priority))
//! on top of a policy that decides aggregation and selection. Everything here
//! runs under one external lock; callers hold it for the whole mutation, the
//! cooperative analog of disabling interrupts.
//!
//! # Donation propagation
//!
//! A local effective-priority change is pushed along the thread's unique
//! `waiting_on` chain: the queue it waits in re-aggregates its donation, the
//! new donation re-derives the holder's effective priority, and so on. The
//! wave stops as soon as a recomputed value equals the cached one, and —
//! because the chain may close into a wait-for cycle, where additive ticket
//! donation has no finite fixpoint — also when it returns to a queue it
//! already updated. Each wave therefore touches a queue at most once, updates
//! flow through chains of any length, and the walk is iterative so deep
//! chains cannot overflow the stack.

use crate::sched::policy::SchedPolicy;
use crate::sched::queue::{WaitQueue, Waiter};
use crate::types::{QueueId, ThreadId};
use crate::util::{Arena, DetRng};
use smallvec::SmallVec;
use tracing::{debug, trace};

const NO_THREAD: &str = "unknown or retired thread id";
const NO_QUEUE: &str = "unknown or removed queue id";

/// Per-thread scheduling state.
///
/// Created when a thread is registered and retired when it terminates. The
/// `held` entries are usage links into the queue arena, not ownership; queues
/// routinely outlive any particular holder.
#[derive(Debug)]
pub struct ThreadSched {
    name: String,
    base: u64,
    effective: u64,
    enqueue_seq: u64,
    waiting_on: Option<QueueId>,
    held: SmallVec<[QueueId; 4]>,
}

impl ThreadSched {
    /// The thread's display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Client-set base priority.
    #[must_use]
    pub const fn base_priority(&self) -> u64 {
        self.base
    }

    /// Base priority combined with every donation the thread receives.
    #[must_use]
    pub const fn effective_priority(&self) -> u64 {
        self.effective
    }

    /// The queue this thread is blocked on, if any.
    #[must_use]
    pub const fn waiting_on(&self) -> Option<QueueId> {
        self.waiting_on
    }

    /// Queues this thread currently occupies.
    #[must_use]
    pub fn held(&self) -> &[QueueId] {
        &self.held
    }
}

/// The thread registry and wait/hold graph, parameterized by policy.
#[derive(Debug)]
pub struct SchedCore {
    threads: Arena<ThreadSched>,
    queues: Arena<WaitQueue>,
    policy: Box<dyn SchedPolicy>,
    rng: DetRng,
    /// Scheduler-wide logical clock; stamps queue insertions for FIFO
    /// tie-breaking.
    enqueue_clock: u64,
}

impl SchedCore {
    /// Creates a core with the given policy and RNG seed.
    #[must_use]
    pub fn new(policy: Box<dyn SchedPolicy>, seed: u64) -> Self {
        Self {
            threads: Arena::new(),
            queues: Arena::new(),
            policy,
            rng: DetRng::new(seed),
            enqueue_clock: 0,
        }
    }

    /// The active ordering policy.
    #[must_use]
    pub fn policy(&self) -> &dyn SchedPolicy {
        self.policy.as_ref()
    }

    // ------------------------------------------------------------------
    // Registry
    // ------------------------------------------------------------------

    /// Registers a thread at the policy's default priority.
    pub fn register_thread(&mut self, name: &str) -> ThreadId {
        let priority = self.policy.priority_default();
        self.register_thread_with_priority(name, priority)
    }

    /// Registers a thread at the given base priority (clamped).
    pub fn register_thread_with_priority(&mut self, name: &str, priority: u64) -> ThreadId {
        let base = self.policy.clamp(priority);
        let idx = self.threads.insert(ThreadSched {
            name: name.to_owned(),
            base,
            effective: base,
            enqueue_seq: 0,
            waiting_on: None,
            held: SmallVec::new(),
        });
        let tid = ThreadId::from_arena(idx);
        trace!(thread = ?tid, name, base, "thread registered");
        tid
    }

    /// Retires a terminated thread's scheduling record.
    ///
    /// # Panics
    ///
    /// Panics if the thread is still waiting on a queue or holding one; a
    /// thread that terminates mid-wait or mid-hold is a client bug and must
    /// not be papered over.
    pub fn unregister_thread(&mut self, tid: ThreadId) {
        let record = self.threads.get(tid.arena_index()).expect(NO_THREAD);
        assert!(
            record.waiting_on.is_none(),
            "thread {tid:?} torn down while waiting on {:?}",
            record.waiting_on
        );
        assert!(
            record.held.is_empty(),
            "thread {tid:?} torn down while holding {} queue(s)",
            record.held.len()
        );
        self.threads.remove(tid.arena_index());
        trace!(thread = ?tid, "scheduling record retired");
    }

    /// Looks up a thread's scheduling record.
    #[must_use]
    pub fn thread(&self, tid: ThreadId) -> Option<&ThreadSched> {
        self.threads.get(tid.arena_index())
    }

    /// Iterates all live scheduling records.
    pub fn threads(&self) -> impl Iterator<Item = (ThreadId, &ThreadSched)> {
        self.threads
            .iter()
            .map(|(idx, record)| (ThreadId::from_arena(idx), record))
    }

    /// Number of live threads.
    #[must_use]
    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }

    /// Creates a wait queue; `transfers_priority` is fixed at construction.
    pub fn new_queue(&mut self, transfers_priority: bool) -> QueueId {
        let qid = QueueId::from_arena(self.queues.insert(WaitQueue::new(transfers_priority)));
        trace!(queue = ?qid, transfers_priority, "queue created");
        qid
    }

    /// Removes a queue if it has no holder and no waiters. Returns whether
    /// it was removed.
    pub fn remove_queue_if_idle(&mut self, qid: QueueId) -> bool {
        match self.queues.get(qid.arena_index()) {
            Some(q) if q.holder().is_none() && q.is_empty() => {
                self.queues.remove(qid.arena_index());
                true
            }
            _ => false,
        }
    }

    /// Looks up a queue record.
    #[must_use]
    pub fn queue(&self, qid: QueueId) -> Option<&WaitQueue> {
        self.queues.get(qid.arena_index())
    }

    // ------------------------------------------------------------------
    // Priority accessors
    // ------------------------------------------------------------------

    /// The thread's base priority.
    #[must_use]
    pub fn get_priority(&self, tid: ThreadId) -> u64 {
        self.threads.get(tid.arena_index()).expect(NO_THREAD).base
    }

    /// The thread's effective priority (base plus donations).
    #[must_use]
    pub fn get_effective_priority(&self, tid: ThreadId) -> u64 {
        self.threads
            .get(tid.arena_index())
            .expect(NO_THREAD)
            .effective
    }

    /// Sets the thread's base priority, clamped to the policy bounds, and
    /// propagates the resulting effective-priority change.
    pub fn set_priority(&mut self, tid: ThreadId, value: u64) {
        let clamped = self.policy.clamp(value);
        if clamped != value {
            debug!(thread = ?tid, requested = value, clamped, "priority clamped to policy bounds");
        }
        let old = self.threads.get(tid.arena_index()).expect(NO_THREAD).base;
        if clamped == old {
            return;
        }
        self.threads.get_mut(tid.arena_index()).expect(NO_THREAD).base = clamped;
        debug!(thread = ?tid, base = clamped, "base priority changed");
        self.refresh_thread(tid);
    }

    /// Bumps the thread's base priority one step up. Returns false at the
    /// policy maximum.
    pub fn raise_priority(&mut self, tid: ThreadId) -> bool {
        let current = self.get_priority(tid);
        if current == self.policy.priority_max() {
            return false;
        }
        self.set_priority(tid, current + 1);
        true
    }

    /// Bumps the thread's base priority one step down. Returns false at the
    /// policy minimum.
    pub fn lower_priority(&mut self, tid: ThreadId) -> bool {
        let current = self.get_priority(tid);
        if current == self.policy.priority_min() {
            return false;
        }
        self.set_priority(tid, current - 1);
        true
    }

    // ------------------------------------------------------------------
    // Queue operations
    // ------------------------------------------------------------------

    /// Enqueues `tid` to wait for the resource guarded by `qid`.
    ///
    /// # Panics
    ///
    /// Panics if the thread is already waiting on any queue.
    pub fn wait_for_access(&mut self, qid: QueueId, tid: ThreadId) {
        self.enqueue_clock += 1;
        let seq = self.enqueue_clock;

        let effective = {
            let record = self.threads.get_mut(tid.arena_index()).expect(NO_THREAD);
            assert!(
                record.waiting_on.is_none(),
                "thread {tid:?} already waits on {:?}",
                record.waiting_on
            );
            record.waiting_on = Some(qid);
            record.enqueue_seq = seq;
            record.effective
        };

        let queue = self.queues.get_mut(qid.arena_index()).expect(NO_QUEUE);
        debug_assert!(
            queue.holder() != Some(tid),
            "thread {tid:?} cannot wait on a queue it holds"
        );
        let inserted = queue.waiters.insert(Waiter {
            effective,
            enqueue_seq: seq,
            thread: tid,
        });
        assert!(inserted, "duplicate wait-set entry for {tid:?}");
        trace!(thread = ?tid, queue = ?qid, effective, seq, "waiter enqueued");

        self.propagate_from(qid);
    }

    /// Marks `tid` as the holder of `qid`.
    ///
    /// Used directly when the resource is uncontended; [`next_thread`]
    /// (SchedCore::next_thread) calls it for the waiter it admits.
    ///
    /// # Panics
    ///
    /// Panics if the queue already has a holder, or if the thread is in the
    /// queue's own wait-set.
    pub fn acquire(&mut self, qid: QueueId, tid: ThreadId) {
        let transfers = {
            let queue = self.queues.get_mut(qid.arena_index()).expect(NO_QUEUE);
            assert!(
                queue.holder().is_none(),
                "queue {qid:?} already held by {:?}",
                queue.holder()
            );
            assert!(
                !queue.waiters.contains_thread(tid),
                "thread {tid:?} cannot acquire a queue it waits on"
            );
            queue.holder = Some(tid);
            queue.transfers_priority()
        };

        let record = self.threads.get_mut(tid.arena_index()).expect(NO_THREAD);
        debug_assert!(!record.held.contains(&qid), "duplicate hold of {qid:?}");
        record.held.push(qid);
        trace!(thread = ?tid, queue = ?qid, "resource acquired");

        if transfers {
            self.refresh_thread(tid);
        }
    }

    /// Releases `qid` from its holder `tid` and recomputes the holder's
    /// effective priority without the queue's donation.
    ///
    /// # Panics
    ///
    /// Panics if `tid` is not the holder.
    pub fn release(&mut self, qid: QueueId, tid: ThreadId) {
        {
            let queue = self.queues.get_mut(qid.arena_index()).expect(NO_QUEUE);
            assert_eq!(
                queue.holder(),
                Some(tid),
                "release of {qid:?} by non-holder {tid:?}"
            );
            queue.holder = None;
        }
        {
            let record = self.threads.get_mut(tid.arena_index()).expect(NO_THREAD);
            let pos = record
                .held
                .iter()
                .position(|&held| held == qid)
                .expect("held set out of sync with queue holder");
            record.held.swap_remove(pos);
        }
        trace!(thread = ?tid, queue = ?qid, "resource released");
        self.refresh_thread(tid);
    }

    /// Admits the next waiter: releases the current holder (if any), selects
    /// per policy, removes the selection from the wait-set, and acquires the
    /// queue on its behalf. Returns `None` when no thread is waiting — the
    /// queue is then left holderless.
    pub fn next_thread(&mut self, qid: QueueId) -> Option<ThreadId> {
        if let Some(previous) = self.queues.get(qid.arena_index()).expect(NO_QUEUE).holder() {
            self.release(qid, previous);
        }

        let chosen = {
            let queue = self.queues.get(qid.arena_index()).expect(NO_QUEUE);
            self.policy.select(&queue.waiters, &mut self.rng)
        }?;

        let (effective, seq) = {
            let record = self.threads.get(chosen.arena_index()).expect(NO_THREAD);
            (record.effective, record.enqueue_seq)
        };
        {
            let queue = self.queues.get_mut(qid.arena_index()).expect(NO_QUEUE);
            let removed = queue.waiters.remove(&Waiter {
                effective,
                enqueue_seq: seq,
                thread: chosen,
            });
            assert!(removed, "selected waiter {chosen:?} missing from wait-set");
        }
        {
            let record = self.threads.get_mut(chosen.arena_index()).expect(NO_THREAD);
            debug_assert_eq!(record.waiting_on, Some(qid));
            record.waiting_on = None;
        }

        // The wait-set shrank; refresh the donation cache before handing the
        // queue to its new holder.
        self.propagate_from(qid);
        self.acquire(qid, chosen);
        trace!(thread = ?chosen, queue = ?qid, "next thread admitted");
        Some(chosen)
    }

    // ------------------------------------------------------------------
    // Propagation
    // ------------------------------------------------------------------

    /// Re-derives `tid`'s effective priority from its base and held
    /// donations, repositioning and propagating when it changed.
    fn refresh_thread(&mut self, tid: ThreadId) {
        let new_effective = self.recompute_effective(tid);
        let old_effective = self
            .threads
            .get(tid.arena_index())
            .expect(NO_THREAD)
            .effective;
        if new_effective == old_effective {
            return;
        }
        if let Some(waiting_queue) = self.apply_effective(tid, new_effective) {
            self.propagate_from(waiting_queue);
        }
    }

    /// Combines `tid`'s base priority with the donations of every
    /// transferring queue it holds.
    fn recompute_effective(&self, tid: ThreadId) -> u64 {
        let record = self.threads.get(tid.arena_index()).expect(NO_THREAD);
        let mut donations: SmallVec<[u64; 4]> = SmallVec::new();
        for &qid in &record.held {
            if let Some(donated) = self.queues.get(qid.arena_index()).and_then(WaitQueue::donated)
            {
                donations.push(donated);
            }
        }
        self.policy.effective(record.base, &mut donations.into_iter())
    }

    /// Stores a new effective priority, repositioning the thread's wait-set
    /// entry when it is queued. Returns the queue it waits on, if any.
    fn apply_effective(&mut self, tid: ThreadId, new_effective: u64) -> Option<QueueId> {
        let (old_effective, seq, waiting_on) = {
            let record = self.threads.get(tid.arena_index()).expect(NO_THREAD);
            (record.effective, record.enqueue_seq, record.waiting_on)
        };

        if let Some(waiting_queue) = waiting_on {
            let queue = self
                .queues
                .get_mut(waiting_queue.arena_index())
                .expect(NO_QUEUE);
            let removed = queue.waiters.remove(&Waiter {
                effective: old_effective,
                enqueue_seq: seq,
                thread: tid,
            });
            assert!(removed, "wait-set entry out of sync for {tid:?}");
            queue.waiters.insert(Waiter {
                effective: new_effective,
                enqueue_seq: seq,
                thread: tid,
            });
        }

        self.threads
            .get_mut(tid.arena_index())
            .expect(NO_THREAD)
            .effective = new_effective;
        trace!(thread = ?tid, effective = new_effective, "effective priority updated");
        waiting_on
    }

    /// Pushes a wait-set change along the holder's waiting chain.
    ///
    /// Terminates by value convergence (a recomputed donation or effective
    /// priority equal to the cached one ends the wave) and by revisit
    /// detection (returning to a queue already updated in this wave means the
    /// chain closed into a cycle; a second lap would re-donate a value that
    /// is already incorporated).
    fn propagate_from(&mut self, start: QueueId) {
        let mut visited: SmallVec<[QueueId; 8]> = SmallVec::new();
        let mut qid = start;

        loop {
            if visited.contains(&qid) {
                trace!(queue = ?qid, "donation wave closed a wait-for cycle");
                break;
            }
            visited.push(qid);

            let (cached, holder) = {
                let queue = self.queues.get(qid.arena_index()).expect(NO_QUEUE);
                (queue.donated(), queue.holder())
            };
            let fresh = {
                let queue = self.queues.get(qid.arena_index()).expect(NO_QUEUE);
                if queue.transfers_priority() {
                    self.policy.donated(&queue.waiters)
                } else {
                    None
                }
            };
            if fresh == cached {
                break;
            }
            self.queues.get_mut(qid.arena_index()).expect(NO_QUEUE).donated = fresh;
            trace!(queue = ?qid, donated = ?fresh, "queue donation updated");

            let Some(holder) = holder else { break };
            let new_effective = self.recompute_effective(holder);
            let old_effective = self
                .threads
                .get(holder.arena_index())
                .expect(NO_THREAD)
                .effective;
            if new_effective == old_effective {
                break;
            }
            match self.apply_effective(holder, new_effective) {
                Some(next_queue) => qid = next_queue,
                None => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sched::lottery::LotteryPolicy;
    use crate::sched::priority::{PriorityPolicy, PRIORITY_MAXIMUM};
    use crate::{assert_with_log, test_complete, test_phase};

    fn init_test(name: &str) {
        crate::test_utils::init_test_logging();
        test_phase!(name);
    }

    fn priority_core() -> SchedCore {
        SchedCore::new(Box::new(PriorityPolicy), 42)
    }

    fn lottery_core() -> SchedCore {
        SchedCore::new(Box::new(LotteryPolicy), 42)
    }

    #[test]
    fn registered_thread_starts_at_default() {
        init_test("registered_thread_starts_at_default");
        let mut core = priority_core();
        let t = core.register_thread("t");
        assert_eq!(core.get_priority(t), 1);
        assert_eq!(core.get_effective_priority(t), 1);
        test_complete!("registered_thread_starts_at_default");
    }

    #[test]
    fn set_priority_clamps_to_bounds() {
        init_test("set_priority_clamps_to_bounds");
        let mut core = priority_core();
        let t = core.register_thread("t");
        core.set_priority(t, 99);
        assert_eq!(core.get_priority(t), PRIORITY_MAXIMUM);
        test_complete!("set_priority_clamps_to_bounds");
    }

    #[test]
    fn raise_and_lower_stop_at_bounds() {
        init_test("raise_and_lower_stop_at_bounds");
        let mut core = priority_core();
        let t = core.register_thread("t");

        core.set_priority(t, PRIORITY_MAXIMUM);
        assert!(!core.raise_priority(t));
        assert!(core.lower_priority(t));
        assert_eq!(core.get_priority(t), PRIORITY_MAXIMUM - 1);

        core.set_priority(t, 0);
        assert!(!core.lower_priority(t));
        assert!(core.raise_priority(t));
        assert_eq!(core.get_priority(t), 1);
        test_complete!("raise_and_lower_stop_at_bounds");
    }

    #[test]
    fn non_transferring_queue_never_donates() {
        init_test("non_transferring_queue_never_donates");
        let mut core = priority_core();
        let holder = core.register_thread("holder");
        let waiter = core.register_thread("waiter");
        let q = core.new_queue(false);

        core.acquire(q, holder);
        core.set_priority(waiter, 7);
        core.wait_for_access(q, waiter);

        assert_with_log!(
            core.get_effective_priority(holder) == 1,
            "no donation through a non-transferring queue",
            1u64,
            core.get_effective_priority(holder)
        );
        assert_eq!(core.queue(q).unwrap().donated(), None);
        test_complete!("non_transferring_queue_never_donates");
    }

    #[test]
    fn donation_raises_holder_and_recomputes_down() {
        init_test("donation_raises_holder_and_recomputes_down");
        let mut core = priority_core();
        let holder = core.register_thread("holder");
        let w3 = core.register_thread("w3");
        let w4 = core.register_thread("w4");
        let q = core.new_queue(true);

        core.acquire(q, holder);
        core.set_priority(w3, 3);
        core.set_priority(w4, 4);
        core.wait_for_access(q, w3);
        core.wait_for_access(q, w4);

        assert_with_log!(
            core.get_effective_priority(holder) >= 4,
            "holder inherits the max waiter priority",
            4u64,
            core.get_effective_priority(holder)
        );

        // Admitting the priority-4 waiter removes its donation; the holder
        // recomputes down to max(base, 3).
        let admitted = core.next_thread(q);
        assert_eq!(admitted, Some(w4));
        assert_with_log!(
            core.get_effective_priority(holder) == 1,
            "previous holder dropped all donations",
            1u64,
            core.get_effective_priority(holder)
        );
        assert_with_log!(
            core.get_effective_priority(w4) >= 3,
            "new holder inherits the remaining waiter",
            3u64,
            core.get_effective_priority(w4)
        );
        test_complete!("donation_raises_holder_and_recomputes_down");
    }

    #[test]
    fn next_thread_orders_by_priority_then_fifo() {
        init_test("next_thread_orders_by_priority_then_fifo");
        let mut core = priority_core();
        let a = core.register_thread("a");
        let b = core.register_thread("b");
        let c = core.register_thread("c");
        let q = core.new_queue(true);

        core.set_priority(a, 2);
        core.set_priority(b, 5);
        core.set_priority(c, 2);
        core.wait_for_access(q, a);
        core.wait_for_access(q, b);
        core.wait_for_access(q, c);

        assert_eq!(core.next_thread(q), Some(b), "highest priority first");
        assert_eq!(core.next_thread(q), Some(a), "FIFO within equal priority");
        assert_eq!(core.next_thread(q), Some(c));
        assert_eq!(core.next_thread(q), None, "empty queue yields none");
        test_complete!("next_thread_orders_by_priority_then_fifo");
    }

    #[test]
    fn next_thread_on_empty_queue_releases_holder() {
        init_test("next_thread_on_empty_queue_releases_holder");
        let mut core = priority_core();
        let holder = core.register_thread("holder");
        let q = core.new_queue(true);

        core.acquire(q, holder);
        assert_eq!(core.next_thread(q), None);
        assert_eq!(core.queue(q).unwrap().holder(), None);
        assert!(core.thread(holder).unwrap().held().is_empty());
        test_complete!("next_thread_on_empty_queue_releases_holder");
    }

    #[test]
    fn priority_change_repositions_waiter() {
        init_test("priority_change_repositions_waiter");
        let mut core = priority_core();
        let a = core.register_thread("a");
        let b = core.register_thread("b");
        let q = core.new_queue(true);

        core.set_priority(a, 4);
        core.set_priority(b, 3);
        core.wait_for_access(q, a);
        core.wait_for_access(q, b);

        // b overtakes a while both wait.
        core.set_priority(b, 6);
        assert_eq!(core.next_thread(q), Some(b));
        test_complete!("priority_change_repositions_waiter");
    }

    #[test]
    fn donation_flows_through_two_queues() {
        init_test("donation_flows_through_two_queues");
        // The two-queue scenario from the original priority self-test:
        // t1 is admitted to r0, then waits on r1 while still holding r0.
        let mut core = priority_core();
        let t0 = core.register_thread("t0");
        let t1 = core.register_thread("t1");
        let r0 = core.new_queue(true);
        let r1 = core.new_queue(true);

        core.wait_for_access(r0, t0);
        core.set_priority(t0, 3);
        core.wait_for_access(r0, t1);
        core.set_priority(t1, 4);

        let admitted = core.next_thread(r0).expect("r0 has waiters");
        assert_eq!(admitted, t1, "priority 4 beats priority 3");
        assert_eq!(core.get_effective_priority(t1), 4);

        core.wait_for_access(r1, t1);
        assert_eq!(core.queue(r1).unwrap().donated(), Some(4));

        // Raising t0 raises r0's donation, t1's effective priority, and the
        // donation t1 forwards into r1.
        core.set_priority(t0, 5);
        assert_eq!(core.get_effective_priority(t1), 5);
        assert_eq!(core.queue(r1).unwrap().donated(), Some(5));

        // Lowering t1's base leaves its effective priority pinned by r0.
        core.set_priority(t1, 2);
        assert_eq!(core.get_effective_priority(t1), 5);

        // Admitting t1 from r1 makes it holder of both queues.
        assert_eq!(core.next_thread(r1), Some(t1));
        assert_eq!(core.get_effective_priority(t1), 5);

        // Admitting t0 from r0 strips t1 of the r0 donation.
        assert_eq!(core.next_thread(r0), Some(t0));
        assert_eq!(core.get_effective_priority(t1), 2);
        assert_eq!(core.get_effective_priority(t0), 5);
        test_complete!("donation_flows_through_two_queues");
    }

    #[test]
    fn propagation_covers_long_chains() {
        init_test("propagation_covers_long_chains");
        // t[i] holds q[i] and waits on q[i+1]; a donation entering at the
        // head must reach the far end of the chain undiminished — there is
        // no hop limit to under-propagate behind.
        const CHAIN: usize = 64;
        let mut core = priority_core();

        let threads: Vec<ThreadId> = (0..CHAIN)
            .map(|i| core.register_thread(&format!("t{i}")))
            .collect();
        let queues: Vec<QueueId> = (0..CHAIN).map(|_| core.new_queue(true)).collect();

        for i in 0..CHAIN {
            core.acquire(queues[i], threads[i]);
        }
        for i in 0..CHAIN - 1 {
            core.wait_for_access(queues[i + 1], threads[i]);
        }

        let booster = core.register_thread("booster");
        core.set_priority(booster, 7);
        core.wait_for_access(queues[0], booster);

        for (i, &tid) in threads.iter().enumerate() {
            assert_eq!(
                core.get_effective_priority(tid),
                7,
                "chain position {i} missed the donation"
            );
        }
        test_complete!("propagation_covers_long_chains");
    }

    #[test]
    fn propagation_terminates_on_cycle() {
        init_test("propagation_terminates_on_cycle");
        // t1 holds q1 and waits on q3; t3 holds q3 and waits on q2; t2 holds
        // q2 and waits on q1 — the wait-for graph is a 3-cycle. Propagation
        // must stop, not loop or overflow.
        let mut core = priority_core();
        let t1 = core.register_thread("t1");
        let t2 = core.register_thread("t2");
        let t3 = core.register_thread("t3");
        let q1 = core.new_queue(true);
        let q2 = core.new_queue(true);
        let q3 = core.new_queue(true);

        core.acquire(q1, t1);
        core.acquire(q2, t2);
        core.acquire(q3, t3);
        core.wait_for_access(q1, t2);
        core.wait_for_access(q2, t3);
        core.wait_for_access(q3, t1);

        core.set_priority(t1, 4);
        core.set_priority(t2, 5);
        core.set_priority(t3, 6);

        // Every member of the cycle sees the highest priority in it.
        assert_eq!(core.get_effective_priority(t1), 6);
        assert_eq!(core.get_effective_priority(t2), 6);
        assert_eq!(core.get_effective_priority(t3), 6);
        test_complete!("propagation_terminates_on_cycle");
    }

    #[test]
    fn lottery_cycle_terminates() {
        init_test("lottery_cycle_terminates");
        // Same cycle under additive donation: no finite fixpoint exists, so
        // the wave must stop after one update per queue.
        let mut core = lottery_core();
        let t1 = core.register_thread("t1");
        let t2 = core.register_thread("t2");
        let t3 = core.register_thread("t3");
        let q1 = core.new_queue(true);
        let q2 = core.new_queue(true);
        let q3 = core.new_queue(true);

        core.acquire(q1, t1);
        core.acquire(q2, t2);
        core.acquire(q3, t3);
        core.wait_for_access(q1, t2);
        core.wait_for_access(q2, t3);
        core.wait_for_access(q3, t1);

        core.set_priority(t1, 4);
        core.set_priority(t2, 5);
        core.set_priority(t3, 6);

        // Terminated with every ticket count at least the base.
        assert!(core.get_effective_priority(t1) >= 4);
        assert!(core.get_effective_priority(t2) >= 5);
        assert!(core.get_effective_priority(t3) >= 6);
        test_complete!("lottery_cycle_terminates");
    }

    #[test]
    fn lottery_donation_sums_tickets() {
        init_test("lottery_donation_sums_tickets");
        let mut core = lottery_core();
        let holder = core.register_thread("holder");
        let a = core.register_thread("a");
        let b = core.register_thread("b");
        let q = core.new_queue(true);

        core.acquire(q, holder);
        core.set_priority(a, 3);
        core.set_priority(b, 4);
        core.wait_for_access(q, a);
        core.wait_for_access(q, b);

        // Tickets accumulate: base 1 + (3 + 4).
        assert_with_log!(
            core.get_effective_priority(holder) == 8,
            "ticket donation is additive",
            8u64,
            core.get_effective_priority(holder)
        );
        test_complete!("lottery_donation_sums_tickets");
    }

    #[test]
    fn lottery_selection_is_seed_deterministic() {
        init_test("lottery_selection_is_seed_deterministic");
        let build = || {
            let mut core = SchedCore::new(Box::new(LotteryPolicy), 7);
            let q = core.new_queue(true);
            let threads: Vec<ThreadId> = (0..5)
                .map(|i| core.register_thread(&format!("t{i}")))
                .collect();
            for (i, &t) in threads.iter().enumerate() {
                core.set_priority(t, (i + 1) as u64);
                core.wait_for_access(q, t);
            }
            (core, q)
        };

        let (mut core_a, q_a) = build();
        let (mut core_b, q_b) = build();
        for _ in 0..5 {
            assert_eq!(core_a.next_thread(q_a), core_b.next_thread(q_b));
        }
        test_complete!("lottery_selection_is_seed_deterministic");
    }

    #[test]
    #[should_panic(expected = "already waits on")]
    fn double_wait_is_rejected() {
        let mut core = priority_core();
        let t = core.register_thread("t");
        let q1 = core.new_queue(true);
        let q2 = core.new_queue(true);
        core.wait_for_access(q1, t);
        core.wait_for_access(q2, t);
    }

    #[test]
    #[should_panic(expected = "already held")]
    fn double_acquire_is_rejected() {
        let mut core = priority_core();
        let a = core.register_thread("a");
        let b = core.register_thread("b");
        let q = core.new_queue(true);
        core.acquire(q, a);
        core.acquire(q, b);
    }

    #[test]
    #[should_panic(expected = "non-holder")]
    fn release_by_non_holder_is_rejected() {
        let mut core = priority_core();
        let a = core.register_thread("a");
        let b = core.register_thread("b");
        let q = core.new_queue(true);
        core.acquire(q, a);
        core.release(q, b);
    }

    #[test]
    #[should_panic(expected = "torn down while holding")]
    fn teardown_while_holding_is_rejected() {
        let mut core = priority_core();
        let t = core.register_thread("t");
        let q = core.new_queue(true);
        core.acquire(q, t);
        core.unregister_thread(t);
    }

    #[test]
    fn idle_queue_removal() {
        init_test("idle_queue_removal");
        let mut core = priority_core();
        let t = core.register_thread("t");
        let q = core.new_queue(true);

        core.acquire(q, t);
        assert!(!core.remove_queue_if_idle(q), "held queue stays");
        core.release(q, t);
        assert!(core.remove_queue_if_idle(q));
        assert!(core.queue(q).is_none());
        test_complete!("idle_queue_removal");
    }
}
