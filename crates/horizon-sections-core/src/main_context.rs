//! UI-affinity execution context.
//!
//! A [`MainContext`] is bound to the thread that created it (normally the UI
//! thread) and owns a FIFO of [`QueuedInvocation`]s. Any thread may post work
//! to it; only the bound thread may pump it. This is the context on which
//! change notifications are delivered so that observers can touch UI state
//! directly.
//!
//! # Example
//!
//! ```
//! use horizon_sections_core::MainContext;
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicBool, Ordering};
//!
//! let context = MainContext::for_current_thread();
//! let ran = Arc::new(AtomicBool::new(false));
//!
//! let ran_clone = ran.clone();
//! let poster = context.clone();
//! std::thread::spawn(move || {
//!     poster.post(move || ran_clone.store(true, Ordering::SeqCst)).unwrap();
//! })
//! .join()
//! .unwrap();
//!
//! assert_eq!(context.process_pending(), 1);
//! assert!(ran.load(Ordering::SeqCst));
//! ```
//!
//! # Blocking delivery
//!
//! [`MainContext::post_blocking`] waits until the bound thread has run the
//! invocation. If the bound thread is itself blocked waiting on the poster
//! and is not pumping, both threads deadlock. Use
//! [`MainContext::process_until`] when the UI thread needs to wait.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::invocation::{QueuedInvocation, completion_pair};
use crate::logging::{span_names, targets};
use crate::thread_check::ThreadAffinity;

const TARGET: &str = targets::MAIN_CONTEXT;

/// Longest single wait inside [`MainContext::process_until`] before the
/// predicate is re-checked.
const PUMP_SLICE: Duration = Duration::from_millis(5);

struct Inner {
    affinity: ThreadAffinity,
    sender: Sender<QueuedInvocation>,
    receiver: Receiver<QueuedInvocation>,
    closed: Mutex<bool>,
    processed: AtomicU64,
}

/// A cloneable handle to a thread-bound invocation queue.
#[derive(Clone)]
pub struct MainContext {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for MainContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MainContext")
            .field("thread", &self.inner.affinity.thread_id())
            .field("pending", &self.inner.receiver.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl MainContext {
    /// Create a context bound to the calling thread.
    pub fn for_current_thread() -> Self {
        let (sender, receiver) = unbounded();
        crate::sections_debug!(thread = ?std::thread::current().id(), "main context created");
        Self {
            inner: Arc::new(Inner {
                affinity: ThreadAffinity::current(),
                sender,
                receiver,
                closed: Mutex::new(false),
                processed: AtomicU64::new(0),
            }),
        }
    }

    /// The thread affinity of this context.
    pub fn affinity(&self) -> ThreadAffinity {
        self.inner.affinity
    }

    /// Returns `true` if the calling thread is the bound thread.
    #[inline]
    pub fn is_current(&self) -> bool {
        self.inner.affinity.is_same_thread()
    }

    /// Queue `invoke` to run on the bound thread.
    ///
    /// # Errors
    ///
    /// Returns [`Error::QueueClosed`] after [`close`](Self::close).
    pub fn post<F>(&self, invoke: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.enqueue(QueuedInvocation::new(invoke))
    }

    /// Run `invoke` on the bound thread and wait until it has finished.
    ///
    /// Runs inline when already on the bound thread.
    ///
    /// # Errors
    ///
    /// Returns [`Error::QueueClosed`] if the context is closed before or
    /// while waiting; in the latter case `invoke` never runs.
    pub fn post_blocking<F>(&self, invoke: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_current() {
            if self.is_closed() {
                return Err(Error::QueueClosed);
            }
            invoke();
            return Ok(());
        }

        let (handle, waiter) = completion_pair();
        self.enqueue(QueuedInvocation::with_completion(invoke, handle))?;
        if waiter.wait() {
            Ok(())
        } else {
            Err(Error::QueueClosed)
        }
    }

    fn enqueue(&self, invocation: QueuedInvocation) -> Result<()> {
        let closed = self.inner.closed.lock();
        if *closed {
            return Err(Error::QueueClosed);
        }
        // The receiver lives in `inner`, so the channel cannot disconnect.
        self.inner
            .sender
            .send(invocation)
            .map_err(|_| Error::QueueClosed)
    }

    /// Number of invocations waiting to be pumped.
    pub fn pending_count(&self) -> usize {
        self.inner.receiver.len()
    }

    /// Total number of invocations this context has executed.
    pub fn processed_count(&self) -> u64 {
        self.inner.processed.load(Ordering::Relaxed)
    }

    /// Run every queued invocation, including ones posted while draining.
    ///
    /// Returns the number of invocations executed.
    ///
    /// # Panics
    ///
    /// Panics when thread checks are enabled and the caller is not on the
    /// bound thread.
    pub fn process_pending(&self) -> usize {
        self.inner
            .affinity
            .check_same_thread("MainContext::process_pending called off the bound thread");

        let _span = tracing::trace_span!(target: TARGET, span_names::MAIN_CONTEXT).entered();
        let mut count = 0;
        while let Ok(invocation) = self.inner.receiver.try_recv() {
            self.run(invocation);
            count += 1;
        }
        if count > 0 {
            tracing::trace!(target: TARGET, count, "processed queued invocations");
        }
        count
    }

    /// Pump the queue until `done` returns `true` or `timeout` elapses.
    ///
    /// Returns the final value of `done`.
    pub fn process_until<P>(&self, mut done: P, timeout: Duration) -> bool
    where
        P: FnMut() -> bool,
    {
        let deadline = Instant::now() + timeout;
        loop {
            self.process_pending();
            if done() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return done();
            }
            match self
                .inner
                .receiver
                .recv_timeout(PUMP_SLICE.min(deadline - now))
            {
                Ok(invocation) => self.run(invocation),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return done(),
            }
        }
    }

    fn run(&self, invocation: QueuedInvocation) {
        invocation.execute();
        self.inner.processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Close the context.
    ///
    /// Pending invocations are discarded (releasing any blocked posters) and
    /// later posts fail with [`Error::QueueClosed`].
    pub fn close(&self) {
        let mut closed = self.inner.closed.lock();
        if *closed {
            return;
        }
        *closed = true;
        let mut discarded = 0usize;
        while let Ok(invocation) = self.inner.receiver.try_recv() {
            drop(invocation);
            discarded += 1;
        }
        tracing::debug!(target: TARGET, discarded, "main context closed");
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        *self.inner.closed.lock()
    }
}

static_assertions::assert_impl_all!(MainContext: Send, Sync);
