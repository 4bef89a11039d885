//! Closures posted to a [`MainContext`](crate::MainContext) and the
//! handshake that lets a poster wait for them.
//!
//! A [`CompletionHandle`] travels with the invocation. Its paired
//! [`CompletionWaiter`] learns whether the closure actually ran, or whether
//! it was discarded because the context closed first.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// A boxed closure waiting in a context queue.
pub struct QueuedInvocation {
    invoke: Box<dyn FnOnce() + Send>,
    completion: Option<CompletionHandle>,
}

impl QueuedInvocation {
    pub fn new<F>(invoke: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            invoke: Box::new(invoke),
            completion: None,
        }
    }

    /// An invocation whose poster blocks on the waiter paired with
    /// `completion`.
    pub fn with_completion<F>(invoke: F, completion: CompletionHandle) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            invoke: Box::new(invoke),
            completion: Some(completion),
        }
    }

    /// Run the closure, then mark the completion as having run.
    pub fn execute(self) {
        (self.invoke)();
        if let Some(completion) = self.completion {
            completion.signal_done();
        }
    }
}

impl std::fmt::Debug for QueuedInvocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuedInvocation")
            .field("blocking", &self.completion.is_some())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Pending,
    Ran,
    Discarded,
}

struct Shared {
    outcome: Mutex<Outcome>,
    changed: Condvar,
}

impl Shared {
    fn settle(&self, outcome: Outcome) {
        let mut current = self.outcome.lock();
        if *current == Outcome::Pending {
            *current = outcome;
            self.changed.notify_all();
        }
    }
}

/// Settles the paired [`CompletionWaiter`].
///
/// Dropping the handle unsignalled settles it as discarded, so a thrown
/// away invocation never strands its poster.
pub struct CompletionHandle {
    shared: Arc<Shared>,
}

impl CompletionHandle {
    pub fn signal_done(self) {
        self.shared.settle(Outcome::Ran);
    }
}

impl Drop for CompletionHandle {
    fn drop(&mut self) {
        self.shared.settle(Outcome::Discarded);
    }
}

/// Blocks until the paired [`CompletionHandle`] is settled.
pub struct CompletionWaiter {
    shared: Arc<Shared>,
}

impl CompletionWaiter {
    /// Wait for the invocation. Returns `true` if it ran and `false` if it
    /// was discarded.
    ///
    /// Waiting on the thread that drains the queue deadlocks.
    pub fn wait(self) -> bool {
        let mut outcome = self.shared.outcome.lock();
        while *outcome == Outcome::Pending {
            self.shared.changed.wait(&mut outcome);
        }
        *outcome == Outcome::Ran
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`, returning
    /// `None` if the invocation is still pending.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<bool> {
        let mut outcome = self.shared.outcome.lock();
        if *outcome == Outcome::Pending {
            self.shared.changed.wait_for(&mut outcome, timeout);
        }
        match *outcome {
            Outcome::Pending => None,
            settled => Some(settled == Outcome::Ran),
        }
    }

    pub fn is_done(&self) -> bool {
        *self.shared.outcome.lock() != Outcome::Pending
    }
}

/// Create a linked handle and waiter.
pub fn completion_pair() -> (CompletionHandle, CompletionWaiter) {
    let shared = Arc::new(Shared {
        outcome: Mutex::new(Outcome::Pending),
        changed: Condvar::new(),
    });
    (
        CompletionHandle {
            shared: shared.clone(),
        },
        CompletionWaiter { shared },
    )
}
