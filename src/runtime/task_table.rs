//! Stored-thread table.
//!
//! Kernel threads are stored futures keyed by their `ThreadId`'s arena index:
//! a `Vec<Option<_>>` gives O(1) insert/take on the poll hot path, and the
//! executor takes a thread out of the table while polling it so a poll that
//! spawns new threads never aliases the slot it came from.

use crate::types::ThreadId;
use std::future::Future;
use std::pin::Pin;

/// A spawned thread's body and metadata.
pub(crate) struct StoredThread {
    pub(crate) name: String,
    pub(crate) future: Pin<Box<dyn Future<Output = ()>>>,
}

/// Index-addressed storage for live thread bodies.
#[derive(Default)]
pub(crate) struct TaskTable {
    slots: Vec<Option<StoredThread>>,
    len: usize,
}

impl TaskTable {
    /// Stores a newly spawned thread.
    ///
    /// # Panics
    ///
    /// Panics if the slot is already occupied.
    pub(crate) fn insert(&mut self, thread: ThreadId, stored: StoredThread) {
        let slot = thread.arena_index().index() as usize;
        if slot >= self.slots.len() {
            self.slots.resize_with(slot + 1, || None);
        }
        assert!(
            self.slots[slot].is_none(),
            "duplicate stored thread for {thread:?}"
        );
        self.slots[slot] = Some(stored);
        self.len += 1;
    }

    /// Removes and returns a thread's body for polling.
    pub(crate) fn take(&mut self, thread: ThreadId) -> Option<StoredThread> {
        let taken = self
            .slots
            .get_mut(thread.arena_index().index() as usize)?
            .take();
        if taken.is_some() {
            self.len -= 1;
        }
        taken
    }

    /// Puts a still-pending thread body back.
    pub(crate) fn restore(&mut self, thread: ThreadId, stored: StoredThread) {
        self.insert(thread, stored);
    }

    /// Number of live thread bodies.
    pub(crate) fn len(&self) -> usize {
        self.len
    }
}
