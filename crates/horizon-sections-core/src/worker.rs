//! A single background thread that runs closures one at a time.
//!
//! Every mutation of a sectioned model is a task on one [`Worker`]. Tasks
//! from any number of submitting threads run in the order they were queued,
//! never concurrently. The queue is unbounded, so submission never drops or
//! rejects work while the worker is running.
//!
//! ```no_run
//! use horizon_sections_core::worker::Worker;
//!
//! let worker = Worker::new().unwrap();
//! worker.send(|| println!("on the worker")).unwrap();
//! assert_eq!(worker.send_sync(|| 6 * 7).unwrap(), 42);
//! worker.stop_and_join();
//! ```

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use parking_lot::{Condvar, Mutex};

use crate::error::{Error, Result};
use crate::logging::targets;

const TARGET: &str = targets::WORKER;

/// Thread settings for [`Worker::with_config`].
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub name: String,
    /// `None` keeps the platform default.
    pub stack_size: Option<usize>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self::with_name("horizon-sections-worker")
    }
}

impl WorkerConfig {
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stack_size: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct WorkerBuilder {
    config: WorkerConfig,
}

impl WorkerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.config.stack_size = Some(bytes);
        self
    }

    /// Spawn the thread.
    ///
    /// # Errors
    ///
    /// [`Error::WorkerStopped`] if the thread could not be spawned.
    pub fn build(self) -> Result<Worker> {
        Worker::with_config(self.config)
    }
}

struct Counters {
    accepting: AtomicBool,
    queued: AtomicUsize,
    finished: AtomicU64,
    idle_lock: Mutex<()>,
    idle: Condvar,
}

impl Counters {
    fn wake_idle_waiters(&self) {
        let _guard = self.idle_lock.lock();
        self.idle.notify_all();
    }

    fn finish_one(&self) {
        self.finished.fetch_add(1, Ordering::AcqRel);
        if self.queued.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.wake_idle_waiters();
        }
    }
}

type Task = Box<dyn FnOnce() + Send + 'static>;

enum Message {
    Run(Task),
    Stop,
}

/// Handle to the serial worker thread.
///
/// A task that panics is caught and logged at `error`; the tasks queued
/// behind it still run.
pub struct Worker {
    sender: Sender<Message>,
    thread: Mutex<Option<JoinHandle<()>>>,
    counters: Arc<Counters>,
    thread_id: ThreadId,
}

impl Worker {
    /// Spawn a worker named `horizon-sections-worker`.
    ///
    /// # Errors
    ///
    /// [`Error::WorkerStopped`] if the thread could not be spawned.
    pub fn new() -> Result<Self> {
        Self::with_config(WorkerConfig::default())
    }

    /// # Errors
    ///
    /// [`Error::WorkerStopped`] if the thread could not be spawned.
    pub fn with_config(config: WorkerConfig) -> Result<Self> {
        let (sender, receiver) = unbounded();
        let counters = Arc::new(Counters {
            accepting: AtomicBool::new(true),
            queued: AtomicUsize::new(0),
            finished: AtomicU64::new(0),
            idle_lock: Mutex::new(()),
            idle: Condvar::new(),
        });

        let mut spawner = thread::Builder::new().name(config.name.clone());
        if let Some(bytes) = config.stack_size {
            spawner = spawner.stack_size(bytes);
        }

        let loop_counters = counters.clone();
        let thread = spawner
            .spawn(move || {
                drain(&receiver, &loop_counters);
                loop_counters.accepting.store(false, Ordering::Release);
                loop_counters.wake_idle_waiters();
            })
            .map_err(|err| {
                tracing::error!(target: TARGET, name = %config.name, %err, "could not spawn worker");
                Error::WorkerStopped
            })?;

        let thread_id = thread.thread().id();
        tracing::debug!(target: TARGET, name = %config.name, "worker started");

        Ok(Self {
            sender,
            thread: Mutex::new(Some(thread)),
            counters,
            thread_id,
        })
    }

    /// `false` once [`stop`](Self::stop) has been called.
    pub fn is_running(&self) -> bool {
        self.counters.accepting.load(Ordering::Acquire)
    }

    pub fn is_worker_thread(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    /// Tasks queued or running.
    pub fn pending_tasks(&self) -> usize {
        self.counters.queued.load(Ordering::Acquire)
    }

    pub fn completed_tasks(&self) -> u64 {
        self.counters.finished.load(Ordering::Acquire)
    }

    /// Queue `task` behind everything already submitted.
    ///
    /// # Errors
    ///
    /// [`Error::WorkerStopped`] after [`stop`](Self::stop).
    pub fn send<F>(&self, task: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        if !self.is_running() {
            return Err(Error::WorkerStopped);
        }
        self.counters.queued.fetch_add(1, Ordering::AcqRel);
        self.sender.send(Message::Run(Box::new(task))).map_err(|_| {
            self.counters.queued.fetch_sub(1, Ordering::AcqRel);
            Error::WorkerStopped
        })
    }

    /// Queue `task` and wait for its return value.
    ///
    /// On the worker thread itself the task runs inline instead of
    /// deadlocking.
    ///
    /// # Errors
    ///
    /// [`Error::WorkerStopped`] if the worker is stopped or the task
    /// panicked.
    pub fn send_sync<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        if self.is_worker_thread() {
            return Ok(task());
        }
        let (reply, answer) = bounded(1);
        self.send(move || {
            let _ = reply.send(task());
        })?;
        answer.recv().map_err(|_| Error::WorkerStopped)
    }

    /// Wait until nothing is queued or running. Returns `false` on timeout.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.counters.idle_lock.lock();
        while self.pending_tasks() != 0 {
            if self
                .counters
                .idle
                .wait_until(&mut guard, deadline)
                .timed_out()
            {
                return self.pending_tasks() == 0;
            }
        }
        true
    }

    /// Refuse new tasks. Already queued tasks still run. Does not block.
    pub fn stop(&self) {
        if self.counters.accepting.swap(false, Ordering::AcqRel) {
            tracing::debug!(target: TARGET, pending = self.pending_tasks(), "worker stopping");
            let _ = self.sender.send(Message::Stop);
        }
    }

    /// Join the thread. `false` if it was already joined, if it panicked,
    /// or if called from the worker itself.
    pub fn join(&self) -> bool {
        if self.is_worker_thread() {
            return false;
        }
        self.thread
            .lock()
            .take()
            .is_some_and(|thread| thread.join().is_ok())
    }

    pub fn stop_and_join(&self) -> bool {
        self.stop();
        self.join()
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        // Queued tasks finish on the detached thread.
        self.stop();
    }
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("running", &self.is_running())
            .field("pending", &self.pending_tasks())
            .field("completed", &self.completed_tasks())
            .finish()
    }
}

static_assertions::assert_impl_all!(Worker: Send, Sync);

fn drain(receiver: &Receiver<Message>, counters: &Counters) {
    while let Ok(message) = receiver.recv() {
        match message {
            Message::Run(task) => run(task, counters),
            Message::Stop => {
                for message in receiver.try_iter() {
                    if let Message::Run(task) = message {
                        run(task, counters);
                    }
                }
                break;
            }
        }
    }
    tracing::debug!(target: TARGET, "worker exited");
}

fn run(task: Task, counters: &Counters) {
    if catch_unwind(AssertUnwindSafe(task)).is_err() {
        tracing::error!(target: TARGET, "worker task panicked");
    }
    counters.finish_one();
}
