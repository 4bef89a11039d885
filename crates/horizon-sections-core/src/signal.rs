//! Broadcast of model notifications to any number of observers.
//!
//! A [`Signal`] owns a set of slots. [`Signal::emit`] hands every slot a
//! reference to the payload, either inline on the emitting thread or by
//! posting a clone of it to a [`MainContext`].
//!
//! The model already emits on the main context when one is configured, so
//! plain [`Signal::connect`] observers see notifications on the UI thread.
//!
//! ```
//! use horizon_sections_core::Signal;
//!
//! let row_count_changed = Signal::<usize>::new();
//! let id = row_count_changed.connect(|rows| println!("{rows} rows"));
//!
//! row_count_changed.emit(12);
//! assert!(row_count_changed.disconnect(id));
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use slotmap::{SlotMap, new_key_type};

use crate::logging::{span_names, targets};
use crate::main_context::MainContext;

new_key_type! {
    /// Handle returned by [`Signal::connect`], used to disconnect later.
    pub struct ConnectionId;
}

/// Where a slot runs when its signal fires.
#[derive(Clone, Debug, Default)]
pub enum ConnectionType {
    /// Inline, on the emitting thread.
    #[default]
    Direct,
    /// Posted to the context without waiting. The payload is cloned for
    /// each such slot.
    Main(MainContext),
}

type Slot<Args> = Arc<dyn Fn(&Args) + Send + Sync>;

struct Connection<Args> {
    slot: Slot<Args>,
    kind: ConnectionType,
}

/// A thread-safe list of observers for payloads of type `Args`.
///
/// Slots are copied out of the lock before they run, so a slot may connect
/// or disconnect on the signal that is calling it.
pub struct Signal<Args> {
    slots: Mutex<SlotMap<ConnectionId, Connection<Args>>>,
    blocked: AtomicBool,
}

impl<Args: Clone + Send + 'static> Default for Signal<Args> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Args: Clone + Send + 'static> Signal<Args> {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(SlotMap::with_key()),
            blocked: AtomicBool::new(false),
        }
    }

    /// Observe on the emitting thread.
    pub fn connect<F>(&self, slot: F) -> ConnectionId
    where
        F: Fn(&Args) + Send + Sync + 'static,
    {
        self.connect_with_type(slot, ConnectionType::Direct)
    }

    /// Observe through `context`, whatever thread emits.
    pub fn connect_on<F>(&self, context: &MainContext, slot: F) -> ConnectionId
    where
        F: Fn(&Args) + Send + Sync + 'static,
    {
        self.connect_with_type(slot, ConnectionType::Main(context.clone()))
    }

    pub fn connect_with_type<F>(&self, slot: F, kind: ConnectionType) -> ConnectionId
    where
        F: Fn(&Args) + Send + Sync + 'static,
    {
        self.slots.lock().insert(Connection {
            slot: Arc::new(slot),
            kind,
        })
    }

    /// Like [`connect`](Self::connect), but the slot goes away with the
    /// returned guard. The guard holds the signal weakly.
    pub fn connect_scoped<F>(signal: &Arc<Self>, slot: F) -> ConnectionGuard<Args>
    where
        F: Fn(&Args) + Send + Sync + 'static,
    {
        ConnectionGuard {
            id: signal.connect(slot),
            signal: Arc::downgrade(signal),
        }
    }

    /// Returns `false` if `id` was already disconnected.
    pub fn disconnect(&self, id: ConnectionId) -> bool {
        self.slots.lock().remove(id).is_some()
    }

    pub fn disconnect_all(&self) {
        self.slots.lock().clear();
    }

    pub fn connection_count(&self) -> usize {
        self.slots.lock().len()
    }

    /// Suppress emission until unblocked. Payloads emitted meanwhile are
    /// dropped, not replayed.
    pub fn set_blocked(&self, blocked: bool) {
        self.blocked.store(blocked, Ordering::SeqCst);
    }

    pub fn is_blocked(&self) -> bool {
        self.blocked.load(Ordering::SeqCst)
    }

    /// Deliver `args` to every slot in connection order.
    pub fn emit(&self, args: Args) {
        let _span = tracing::trace_span!(target: targets::SIGNAL, span_names::SIGNAL).entered();
        if self.is_blocked() {
            tracing::trace!(target: targets::SIGNAL, "blocked, payload dropped");
            return;
        }

        let slots: Vec<(Slot<Args>, ConnectionType)> = self
            .slots
            .lock()
            .values()
            .map(|connection| (connection.slot.clone(), connection.kind.clone()))
            .collect();
        tracing::trace!(target: targets::SIGNAL, slots = slots.len(), "emit");

        for (slot, kind) in slots {
            match kind {
                ConnectionType::Direct => slot(&args),
                ConnectionType::Main(context) => {
                    let payload = args.clone();
                    if context.post(move || slot(&payload)).is_err() {
                        tracing::warn!(
                            target: targets::SIGNAL,
                            "main context closed, slot not delivered"
                        );
                    }
                }
            }
        }
    }
}

/// Disconnects its slot on drop.
///
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use horizon_sections_core::Signal;
///
/// let inserted = Arc::new(Signal::<usize>::new());
/// let total = Arc::new(AtomicUsize::new(0));
/// {
///     let total = total.clone();
///     let _guard = Signal::connect_scoped(&inserted, move |&rows| {
///         total.fetch_add(rows, Ordering::SeqCst);
///     });
///     inserted.emit(3);
/// }
/// inserted.emit(5);
/// assert_eq!(total.load(Ordering::SeqCst), 3);
/// ```
pub struct ConnectionGuard<Args: Clone + Send + 'static> {
    signal: Weak<Signal<Args>>,
    id: ConnectionId,
}

impl<Args: Clone + Send + 'static> ConnectionGuard<Args> {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl<Args: Clone + Send + 'static> Drop for ConnectionGuard<Args> {
    fn drop(&mut self) {
        if let Some(signal) = self.signal.upgrade() {
            signal.disconnect(self.id);
        }
    }
}

static_assertions::assert_impl_all!(Signal<()>: Send, Sync);
