//! Wait queues: the per-resource wait-set and ownership record.
//!
//! A [`WaitQueue`] is the contention point for one exclusively-held resource:
//! an ordered set of waiting threads, at most one holder, and a cached
//! aggregate of the priority its waiters donate to that holder. The ordering
//! key is (effective priority descending, enqueue sequence ascending, thread
//! id) — round-robin among the highest-priority waiters, with the id as a
//! stable total-order tiebreak.

use crate::types::ThreadId;
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// A waiting thread's position in a queue's ordered wait-set.
///
/// The key mirrors the thread's scheduling record at insertion time; when a
/// thread's effective priority changes while it waits, the entry is removed
/// and reinserted under the new key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Waiter {
    /// Effective priority at the time of the last (re)insertion.
    pub effective: u64,
    /// Logical-clock stamp from when the thread joined the queue.
    pub enqueue_seq: u64,
    /// The waiting thread.
    pub thread: ThreadId,
}

impl Ord for Waiter {
    #[inline]
    fn cmp(&self, other: &Self) -> Ordering {
        // Higher effective priority first; FIFO within a priority level.
        other
            .effective
            .cmp(&self.effective)
            .then_with(|| self.enqueue_seq.cmp(&other.enqueue_seq))
            .then_with(|| self.thread.cmp(&other.thread))
    }
}

impl PartialOrd for Waiter {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The ordered wait-set of a queue.
#[derive(Debug, Default)]
pub struct WaiterSet {
    entries: BTreeSet<Waiter>,
}

impl WaiterSet {
    /// Creates an empty wait-set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a waiter. Returns false if an identical entry was present.
    pub fn insert(&mut self, waiter: Waiter) -> bool {
        self.entries.insert(waiter)
    }

    /// Removes a waiter by its exact key. Returns false if absent.
    pub fn remove(&mut self, waiter: &Waiter) -> bool {
        self.entries.remove(waiter)
    }

    /// The best-placed waiter: highest effective priority, earliest enqueue.
    #[must_use]
    pub fn first(&self) -> Option<&Waiter> {
        self.entries.iter().next()
    }

    /// Iterates waiters in selection order.
    pub fn iter(&self) -> impl Iterator<Item = &Waiter> {
        self.entries.iter()
    }

    /// Number of waiting threads.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no thread is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns true if `thread` has an entry in this set.
    #[must_use]
    pub fn contains_thread(&self, thread: ThreadId) -> bool {
        self.entries.iter().any(|w| w.thread == thread)
    }

    /// Sum of waiter effective priorities, saturating on overflow.
    #[must_use]
    pub fn total_effective(&self) -> u64 {
        self.entries
            .iter()
            .fold(0u64, |acc, w| acc.saturating_add(w.effective))
    }
}

/// The wait-set/ownership record for one exclusively-held resource.
#[derive(Debug)]
pub struct WaitQueue {
    transfers_priority: bool,
    pub(crate) waiters: WaiterSet,
    pub(crate) holder: Option<ThreadId>,
    /// Cached donation aggregate over `waiters`; `None` when the queue does
    /// not transfer priority or has no waiters. Recomputed on every wait-set
    /// change, never adjusted independently.
    pub(crate) donated: Option<u64>,
}

impl WaitQueue {
    /// Creates a queue; `transfers_priority` is fixed for its lifetime.
    #[must_use]
    pub fn new(transfers_priority: bool) -> Self {
        Self {
            transfers_priority,
            waiters: WaiterSet::new(),
            holder: None,
            donated: None,
        }
    }

    /// Whether waiting threads donate priority to the holder.
    #[must_use]
    pub const fn transfers_priority(&self) -> bool {
        self.transfers_priority
    }

    /// The thread currently occupying the resource, if any.
    #[must_use]
    pub const fn holder(&self) -> Option<ThreadId> {
        self.holder
    }

    /// The cached donation aggregate.
    #[must_use]
    pub const fn donated(&self) -> Option<u64> {
        self.donated
    }

    /// Number of waiting threads.
    #[must_use]
    pub fn len(&self) -> usize {
        self.waiters.len()
    }

    /// Returns true if no thread is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }
}
