//! Signal/slot system for Lattice Data.
//!
//! Signals are the notification channel of every observable type in the
//! workspace: objects announce property changes, lists announce collection
//! changes and views announce cursor movement through a [`Signal<Args>`].
//!
//! # Key Types
//!
//! - [`Signal<Args>`] - The signal type for emitting notifications
//! - [`ConnectionId`] - Unique identifier returned when connecting a slot
//! - [`SignalEmitter`] - Type-erased access used when the argument type is unknown
//!
//! # Re-entrancy
//!
//! Emission works on a snapshot of the connected slots. A slot may connect or
//! disconnect slots on the same signal (or emit it again) while it is being
//! invoked. Slots connected during an emission are first called on the next
//! emission; slots disconnected during an emission are skipped if they have
//! not run yet.
//!
//! # Example
//!
//! ```
//! use lattice_data_core::Signal;
//!
//! let text_changed = Signal::<String>::new();
//!
//! let conn_id = text_changed.connect(|text| {
//!     println!("Text changed to: {}", text);
//! });
//!
//! text_changed.emit("Hello, World!".to_string());
//! text_changed.disconnect(conn_id);
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use slotmap::{SlotMap, new_key_type};

use crate::logging::targets;

new_key_type! {
    /// A unique identifier for a signal-slot connection.
    ///
    /// Use this ID to disconnect a specific connection via [`Signal::disconnect`].
    /// The ID remains valid until the connection is explicitly disconnected or
    /// the signal is dropped.
    pub struct ConnectionId;
}

type Slot<Args> = Arc<dyn Fn(&Args) + Send + Sync>;

/// A type-safe signal that can have multiple connected slots.
///
/// # Type Parameter
///
/// - `Args`: The argument type passed to connected slots. Use `()` for signals
///   with no arguments, or a tuple like `(String, i32)` for multiple arguments.
///
/// # Thread Safety
///
/// `Signal<Args>` is `Send + Sync`. Slots always run on the emitting thread.
pub struct Signal<Args> {
    /// All active connections.
    connections: Mutex<SlotMap<ConnectionId, Slot<Args>>>,
}

impl<Args: Clone + Send + 'static> Default for Signal<Args> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Args: Clone + Send + 'static> Signal<Args> {
    /// Create a new signal with no connections.
    pub fn new() -> Self {
        Self {
            connections: Mutex::new(SlotMap::with_key()),
        }
    }

    /// Connect a slot (closure) to this signal.
    ///
    /// Returns a `ConnectionId` that can be used to disconnect the slot later.
    ///
    /// # Example
    ///
    /// ```
    /// use lattice_data_core::Signal;
    ///
    /// let signal = Signal::<String>::new();
    /// let id = signal.connect(|s| println!("Got: {}", s));
    /// signal.emit("Hello".to_string());
    /// ```
    pub fn connect<F>(&self, slot: F) -> ConnectionId
    where
        F: Fn(&Args) + Send + Sync + 'static,
    {
        self.connections.lock().insert(Arc::new(slot))
    }

    /// Disconnect a specific slot by its connection ID.
    ///
    /// Returns `true` if the connection was found and removed, `false` otherwise.
    pub fn disconnect(&self, id: ConnectionId) -> bool {
        self.connections.lock().remove(id).is_some()
    }

    /// Get the number of connected slots.
    pub fn connection_count(&self) -> usize {
        self.connections.lock().len()
    }

    /// Emit the signal, invoking all connected slots in connection order.
    ///
    /// The connection lock is released before the first slot runs.
    #[tracing::instrument(skip_all, target = "lattice_data_core::signal", level = "trace")]
    pub fn emit(&self, args: Args) {
        let snapshot: Vec<(ConnectionId, Slot<Args>)> = self
            .connections
            .lock()
            .iter()
            .map(|(id, slot)| (id, slot.clone()))
            .collect();
        tracing::trace!(target: targets::SIGNAL, connection_count = snapshot.len(), "emitting signal");

        for (id, slot) in snapshot {
            // Skip slots disconnected by an earlier slot of this emission.
            if !self.connections.lock().contains_key(id) {
                continue;
            }
            slot(&args);
        }
    }
}

/// Type-erased signal access.
///
/// Subscriptions that only need to undo a connection (such as path nodes
/// dropping their source) hold a `&dyn SignalEmitter` instead of knowing the
/// concrete argument type.
pub trait SignalEmitter: Send + Sync {
    /// Disconnect a connection by ID.
    fn disconnect(&self, id: ConnectionId) -> bool;
}

impl<Args: Clone + Send + 'static> SignalEmitter for Signal<Args> {
    fn disconnect(&self, id: ConnectionId) -> bool {
        Signal::disconnect(self, id)
    }
}

static_assertions::assert_impl_all!(Signal<String>: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[test]
    fn test_signal_connect_emit() {
        let signal = Signal::<i32>::new();
        let received = Arc::new(Mutex::new(Vec::new()));

        let received_clone = received.clone();
        signal.connect(move |&value| {
            received_clone.lock().push(value);
        });

        signal.emit(42);
        signal.emit(100);

        let values = received.lock();
        assert_eq!(*values, vec![42, 100]);
    }

    #[test]
    fn test_signal_disconnect() {
        let signal = Signal::<i32>::new();
        let received = Arc::new(Mutex::new(Vec::new()));

        let received_clone = received.clone();
        let conn_id = signal.connect(move |&value| {
            received_clone.lock().push(value);
        });

        signal.emit(1);
        assert!(signal.disconnect(conn_id));
        assert!(!signal.disconnect(conn_id));
        signal.emit(2);

        assert_eq!(*received.lock(), vec![1]);
    }

    #[test]
    fn test_slot_can_disconnect_itself_during_emit() {
        let signal = Arc::new(Signal::<()>::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let own_id = Arc::new(Mutex::new(None::<ConnectionId>));

        let sig = Arc::downgrade(&signal);
        let calls_clone = calls.clone();
        let own_id_clone = own_id.clone();
        let id = signal.connect(move |_| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            if let (Some(sig), Some(id)) = (sig.upgrade(), *own_id_clone.lock()) {
                sig.disconnect(id);
            }
        });
        *own_id.lock() = Some(id);

        signal.emit(());
        signal.emit(());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(signal.connection_count(), 0);
    }

    #[test]
    fn test_slot_connected_during_emit_runs_next_time() {
        let signal = Arc::new(Signal::<()>::new());
        let late_calls = Arc::new(AtomicUsize::new(0));

        let sig = Arc::downgrade(&signal);
        let late = late_calls.clone();
        let connected = Arc::new(AtomicBool::new(false));
        signal.connect(move |_| {
            if connected.swap(true, Ordering::SeqCst) {
                return;
            }
            if let Some(sig) = sig.upgrade() {
                let late = late.clone();
                sig.connect(move |_| {
                    late.fetch_add(1, Ordering::SeqCst);
                });
            }
        });

        signal.emit(());
        assert_eq!(late_calls.load(Ordering::SeqCst), 0);
        signal.emit(());
        assert_eq!(late_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_disconnected_by_earlier_slot_is_skipped() {
        let signal = Arc::new(Signal::<()>::new());
        let second_calls = Arc::new(AtomicUsize::new(0));
        let second_id = Arc::new(Mutex::new(None::<ConnectionId>));

        let sig = Arc::downgrade(&signal);
        let second_id_clone = second_id.clone();
        signal.connect(move |_| {
            if let (Some(sig), Some(id)) = (sig.upgrade(), *second_id_clone.lock()) {
                sig.disconnect(id);
            }
        });
        let counter = second_calls.clone();
        let id = signal.connect(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        *second_id.lock() = Some(id);

        signal.emit(());
        assert_eq!(second_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_signal_emitter_type_erased() {
        let signal = Signal::<String>::new();
        let id = signal.connect(|_| {});
        let emitter: &dyn SignalEmitter = &signal;
        assert!(emitter.disconnect(id));
        assert_eq!(signal.connection_count(), 0);
    }
}
