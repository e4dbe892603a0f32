//! Synchronous rendezvous.
//!
//! A `Communicator` lets threads exchange 32-bit words one at a time: a
//! speaker and a listener must both be present for a handoff to complete, and
//! `speak` does not return until its word has been consumed by exactly one
//! `listen`. Built purely as a client of [`Lock`] and [`Condition`] — the
//! state below is only ever touched with the lock held.
//!
//! Both speaker phases (waiting for a listener, waiting for the handoff to
//! finish) share one condition variable, so consumption broadcasts with
//! `wake_all`: a single `wake` could resurrect an entry-phase speaker and
//! leave the handoff-phase speaker parked forever.

use crate::runtime::KernelHandle;
use crate::sync::condition::Condition;
use crate::sync::lock::Lock;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::trace;

#[derive(Debug, Default)]
struct CommInner {
    /// Listeners that have registered and not yet consumed a word.
    listeners: usize,
    /// A published word awaits consumption.
    word_ready: bool,
    word: i32,
}

/// One-word synchronous rendezvous channel.
pub struct Communicator {
    lock: Arc<Lock>,
    speaker_cv: Condition,
    listener_cv: Condition,
    inner: Mutex<CommInner>,
}

impl Communicator {
    /// Creates a communicator on the given kernel.
    #[must_use]
    pub fn new(handle: &KernelHandle) -> Self {
        let lock = Arc::new(Lock::new(handle));
        Self {
            speaker_cv: Condition::new(Arc::clone(&lock)),
            listener_cv: Condition::new(Arc::clone(&lock)),
            lock,
            inner: Mutex::new(CommInner::default()),
        }
    }

    /// Waits for a listener, transfers `word` to it, and returns once the
    /// listener has taken the word. Exactly one listener receives it.
    pub async fn speak(&self, word: i32) {
        self.lock.acquire().await;

        // Wait for a listener, and for any in-flight handoff to clear.
        loop {
            let can_publish = {
                let inner = self.inner.lock();
                inner.listeners > 0 && !inner.word_ready
            };
            if can_publish {
                break;
            }
            self.speaker_cv.sleep().await;
        }

        {
            let mut inner = self.inner.lock();
            inner.word = word;
            inner.word_ready = true;
        }
        trace!(word, "word published");
        self.listener_cv.wake();

        // Synchronous handoff: stay until the word is consumed.
        while self.inner.lock().word_ready {
            self.speaker_cv.sleep().await;
        }

        self.lock.release();
        trace!(word, "speaker done");
    }

    /// Waits for a speaker and returns the word it transferred.
    pub async fn listen(&self) -> i32 {
        self.lock.acquire().await;

        {
            let mut inner = self.inner.lock();
            inner.listeners += 1;
        }
        self.speaker_cv.wake();

        while !self.inner.lock().word_ready {
            self.listener_cv.sleep().await;
        }

        let word = {
            let mut inner = self.inner.lock();
            inner.word_ready = false;
            inner.listeners -= 1;
            inner.word
        };
        trace!(word, "word consumed");
        // Releases the handoff-phase speaker and lets entry-phase speakers
        // recheck for the remaining listeners.
        self.speaker_cv.wake_all();

        self.lock.release();
        word
    }
}
