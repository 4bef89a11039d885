//! Thread binding for queues that must be drained on one thread.
//!
//! A [`MainContext`](crate::MainContext) remembers the thread that created it
//! in a [`ThreadAffinity`]. Pumping the context from any other thread is a
//! programming error; the check is on in debug builds and can be toggled with
//! [`set_thread_checks_enabled`].
//!
//! ```
//! use horizon_sections_core::thread_check::ThreadAffinity;
//!
//! let affinity = ThreadAffinity::current();
//! assert!(affinity.is_same_thread());
//!
//! let handle = std::thread::spawn(move || affinity.is_same_thread());
//! assert!(!handle.join().unwrap());
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, ThreadId};

static CHECKS: AtomicBool = AtomicBool::new(cfg!(debug_assertions));

/// Turn the wrong-thread panic in [`ThreadAffinity::check_same_thread`] on
/// or off for the whole process.
pub fn set_thread_checks_enabled(enabled: bool) {
    CHECKS.store(enabled, Ordering::SeqCst);
}

#[inline]
pub fn are_thread_checks_enabled() -> bool {
    CHECKS.load(Ordering::Relaxed)
}

/// The thread a queue is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadAffinity {
    owner: ThreadId,
}

impl Default for ThreadAffinity {
    fn default() -> Self {
        Self::current()
    }
}

impl ThreadAffinity {
    /// Bind to the calling thread.
    #[inline]
    pub fn current() -> Self {
        Self {
            owner: thread::current().id(),
        }
    }

    #[inline]
    pub fn thread_id(&self) -> ThreadId {
        self.owner
    }

    /// Returns `true` when called on the bound thread.
    #[inline]
    pub fn is_same_thread(&self) -> bool {
        thread::current().id() == self.owner
    }

    /// Panic with `context` if the caller is not on the bound thread and
    /// checks are enabled.
    #[inline]
    pub fn check_same_thread(&self, context: &str) {
        if are_thread_checks_enabled() && !self.is_same_thread() {
            self.violation(context);
        }
    }

    #[cold]
    #[inline(never)]
    fn violation(&self, context: &str) -> ! {
        let caller = thread::current();
        panic!(
            "{context}: queue is bound to thread {:?}, caller is {:?} ({}). \
             Post work to the context instead of draining it from here.",
            self.owner,
            caller.id(),
            caller.name().unwrap_or("<unnamed>"),
        )
    }
}
