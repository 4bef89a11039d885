//! Serialized mutation pipeline.
//!
//! Every mutating model operation becomes one [`MutationUnit`] executed on a
//! dedicated [`Worker`]. Units run strictly one at a time in submission
//! order. Within a unit the steps are:
//!
//! 1. `pre_hook` (optional): delivered to the main context and awaited
//! 2. `body`: runs on the worker, mutates state, returns the post hook and
//!    the completion
//! 3. post hook (optional): delivered to the main context and awaited
//! 4. completion: posted to the main context if the operation was submitted
//!    from it, otherwise run on the worker
//!
//! Because hooks are delivered with [`MainContext::post_blocking`], the next
//! unit cannot start until observers have seen the previous unit's
//! notifications, so observers always read state matching the batch they are
//! handling.
//!
//! # Deadlocks
//!
//! While a unit waits for delivery, the main context must be pumped. Use
//! [`Pipeline::flush`] rather than blocking the main thread some other way.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use horizon_sections_core::logging::{span_names, targets};
use horizon_sections_core::{MainContext, Result, Worker};

/// A step delivered to observers or the caller.
pub(crate) type Hook = Box<dyn FnOnce() + Send + 'static>;

/// What a unit body hands back to the pipeline.
#[derive(Default)]
pub(crate) struct UnitOutput {
    /// Notifications to deliver after the body.
    pub(crate) deliver: Option<Hook>,
    /// The caller's completion, already bound to its result.
    pub(crate) complete: Option<Hook>,
}

/// One queued mutation.
pub(crate) struct MutationUnit {
    pub(crate) label: &'static str,
    pub(crate) pre_hook: Option<Hook>,
    pub(crate) body: Box<dyn FnOnce() -> UnitOutput + Send + 'static>,
}

impl MutationUnit {
    pub(crate) fn new<B>(label: &'static str, body: B) -> Self
    where
        B: FnOnce() -> UnitOutput + Send + 'static,
    {
        Self {
            label,
            pre_hook: None,
            body: Box::new(body),
        }
    }

    pub(crate) fn with_pre_hook(mut self, hook: Hook) -> Self {
        self.pre_hook = Some(hook);
        self
    }
}

const FLUSH_SLICE: Duration = Duration::from_millis(50);

/// FIFO executor with concurrency one.
pub(crate) struct Pipeline {
    worker: Worker,
    main: Option<MainContext>,
    sequence: AtomicU64,
}

impl Pipeline {
    pub(crate) fn new(worker: Worker, main: Option<MainContext>) -> Self {
        Self {
            worker,
            main,
            sequence: AtomicU64::new(0),
        }
    }

    pub(crate) fn main_context(&self) -> Option<&MainContext> {
        self.main.as_ref()
    }

    /// Queue `unit`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WorkerStopped`](horizon_sections_core::Error::WorkerStopped)
    /// if the pipeline no longer accepts work. The unit is dropped unrun.
    pub(crate) fn submit(&self, unit: MutationUnit) -> Result<()> {
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let main = self.main.clone();
        let return_to_main = main.as_ref().is_some_and(MainContext::is_current);

        tracing::trace!(target: targets::PIPELINE, op = unit.label, sequence, "unit queued");
        self.worker.send(move || {
            let span = tracing::debug_span!(
                target: targets::PIPELINE,
                span_names::PIPELINE_UNIT,
                op = unit.label,
                sequence
            );
            let _entered = span.enter();

            if let Some(pre_hook) = unit.pre_hook {
                deliver(main.as_ref(), pre_hook);
            }

            let output = (unit.body)();

            if let Some(post_hook) = output.deliver {
                deliver(main.as_ref(), post_hook);
            }

            if let Some(complete) = output.complete {
                match main {
                    Some(context) if return_to_main => {
                        if context.post(complete).is_err() {
                            tracing::warn!(
                                target: targets::PIPELINE,
                                "main context closed, completion dropped"
                            );
                        }
                    }
                    _ => complete(),
                }
            }
            tracing::trace!(target: targets::PIPELINE, "unit finished");
        })
    }

    /// Block until every unit submitted so far has finished.
    ///
    /// On the main context's thread the context is pumped while waiting, so
    /// pending deliveries and completions posted there run before this
    /// returns. Called from inside a completion running on the pipeline
    /// thread, this returns immediately.
    pub(crate) fn flush(&self) {
        match self.main.as_ref().filter(|context| context.is_current()) {
            Some(context) => {
                let done = Arc::new(AtomicBool::new(false));
                let marker = done.clone();
                if self
                    .worker
                    .send(move || marker.store(true, Ordering::SeqCst))
                    .is_err()
                {
                    context.process_pending();
                    return;
                }
                while !context.process_until(|| done.load(Ordering::SeqCst), FLUSH_SLICE) {}
                // Completions posted just before the marker ran.
                context.process_pending();
            }
            None => {
                let _ = self.worker.send_sync(|| ());
            }
        }
    }

    /// Units queued or running.
    pub(crate) fn pending(&self) -> usize {
        self.worker.pending_tasks()
    }

    pub(crate) fn is_running(&self) -> bool {
        self.worker.is_running()
    }

    pub(crate) fn shutdown(&self) {
        self.worker.stop();
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.worker.stop();
    }
}

/// Run `hook` on the main context and wait for it, or inline without one.
fn deliver(main: Option<&MainContext>, hook: Hook) {
    let _span = tracing::trace_span!(target: targets::PIPELINE, span_names::DELIVERY).entered();
    match main {
        Some(context) => {
            if context.post_blocking(hook).is_err() {
                tracing::warn!(
                    target: targets::PIPELINE,
                    "main context closed, notifications dropped"
                );
            }
        }
        None => hook(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use horizon_sections_core::Error;
    use parking_lot::Mutex;
    use std::thread;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> Hook) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_clone = log.clone();
        let make = move |tag: &str| -> Hook {
            let log = log_clone.clone();
            let tag = tag.to_string();
            Box::new(move || log.lock().push(tag))
        };
        (log, make)
    }

    #[test]
    fn test_steps_run_in_order_without_main_context() {
        let pipeline = Pipeline::new(Worker::new().unwrap(), None);
        let (log, hook) = recorder();

        for i in 0..3 {
            let deliver = hook(&format!("deliver {i}"));
            let complete = hook(&format!("complete {i}"));
            let body_log = hook(&format!("body {i}"));
            let unit = MutationUnit::new("test", move || {
                body_log();
                UnitOutput {
                    deliver: Some(deliver),
                    complete: Some(complete),
                }
            })
            .with_pre_hook(hook(&format!("pre {i}")));
            pipeline.submit(unit).unwrap();
        }

        pipeline.flush();
        let expected: Vec<String> = (0..3)
            .flat_map(|i| {
                ["pre", "body", "deliver", "complete"].map(|step| format!("{step} {i}"))
            })
            .collect();
        assert_eq!(*log.lock(), expected);
        assert_eq!(pipeline.pending(), 0);
    }

    #[test]
    fn test_delivery_runs_on_main_context() {
        let main = MainContext::for_current_thread();
        let pipeline = Pipeline::new(Worker::new().unwrap(), Some(main.clone()));
        let delivered_on = Arc::new(Mutex::new(None));
        let completed_on = Arc::new(Mutex::new(None));

        let delivered = delivered_on.clone();
        let completed = completed_on.clone();
        pipeline
            .submit(MutationUnit::new("test", move || UnitOutput {
                deliver: Some(Box::new(move || {
                    *delivered.lock() = Some(thread::current().id());
                })),
                complete: Some(Box::new(move || {
                    *completed.lock() = Some(thread::current().id());
                })),
            }))
            .unwrap();

        pipeline.flush();
        let me = thread::current().id();
        assert_eq!(*delivered_on.lock(), Some(me));
        // Submitted from the main thread, so the completion comes back here.
        assert_eq!(*completed_on.lock(), Some(me));
    }

    #[test]
    fn test_completion_stays_on_worker_for_background_callers() {
        let main = MainContext::for_current_thread();
        let pipeline = Arc::new(Pipeline::new(Worker::new().unwrap(), Some(main.clone())));
        let completed_on = Arc::new(Mutex::new(None));

        let submitter = pipeline.clone();
        let completed = completed_on.clone();
        thread::spawn(move || {
            submitter
                .submit(MutationUnit::new("test", move || UnitOutput {
                    deliver: None,
                    complete: Some(Box::new(move || {
                        *completed.lock() = Some(thread::current().id());
                    })),
                }))
                .unwrap();
        })
        .join()
        .unwrap();

        pipeline.flush();
        let ran_on = (*completed_on.lock()).expect("completion ran");
        assert_ne!(ran_on, thread::current().id());
    }

    #[test]
    fn test_submit_after_shutdown_fails() {
        let pipeline = Pipeline::new(Worker::new().unwrap(), None);
        pipeline.shutdown();
        assert!(!pipeline.is_running());
        let result = pipeline.submit(MutationUnit::new("late", UnitOutput::default));
        assert_eq!(result, Err(Error::WorkerStopped));
    }
}
