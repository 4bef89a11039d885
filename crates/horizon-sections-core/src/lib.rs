//! Core runtime for Horizon Sections.
//!
//! This crate provides the plumbing the sectioned collection model is built
//! on. None of it knows about entities or sections:
//!
//! - **Signal**: type-safe broadcast of change notifications to any number of
//!   observers
//! - **Worker**: a dedicated serial thread with a FIFO task queue
//! - **MainContext**: a UI-affinity queue pumped by the thread that owns it
//! - **Thread checks**: affinity assertions for thread-bound state
//! - **Errors**: the error taxonomy shared by every Horizon Sections crate
//! - **Logging**: tracing targets, span names and helpers
//!
//! # Signal Example
//!
//! ```
//! use horizon_sections_core::Signal;
//!
//! let count_changed = Signal::<usize>::new();
//!
//! let conn_id = count_changed.connect(|count| {
//!     println!("now showing {count} rows");
//! });
//!
//! count_changed.emit(12);
//! count_changed.disconnect(conn_id);
//! ```
//!
//! # Worker + MainContext Example
//!
//! ```
//! use horizon_sections_core::{MainContext, Worker};
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicBool, Ordering};
//! use std::time::Duration;
//!
//! let main = MainContext::for_current_thread();
//! let worker = Worker::new().unwrap();
//! let delivered = Arc::new(AtomicBool::new(false));
//!
//! let ui = main.clone();
//! let flag = delivered.clone();
//! worker
//!     .send(move || {
//!         // Heavy work happens here, then the result is handed to the UI.
//!         ui.post(move || flag.store(true, Ordering::SeqCst)).unwrap();
//!     })
//!     .unwrap();
//!
//! assert!(main.process_until(|| delivered.load(Ordering::SeqCst), Duration::from_secs(5)));
//! worker.stop_and_join();
//! ```

mod error;
pub mod invocation;
pub mod logging;
pub mod main_context;
pub mod signal;
pub mod thread_check;
pub mod worker;

pub use error::{Error, Result};
pub use invocation::{CompletionHandle, CompletionWaiter, QueuedInvocation, completion_pair};
pub use logging::{PerfSpan, TreeFormatOptions, TreeStyle, tree_prefix};
pub use main_context::MainContext;
pub use signal::{ConnectionGuard, ConnectionId, ConnectionType, Signal};
pub use thread_check::ThreadAffinity;
pub use worker::{Worker, WorkerBuilder, WorkerConfig};
