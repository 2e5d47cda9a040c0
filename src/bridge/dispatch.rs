//! Typed event dispatch for the realtime bridge
//!
//! The subscription table maps an [`EventType`] to an ordered list of
//! listeners (insertion order = invocation order, duplicates allowed).
//! Dispatch iterates over a snapshot of the list, so a listener may
//! unsubscribe itself (or anything else) mid-dispatch without corrupting
//! iteration. One-shot listeners consume themselves with a compare-and-swap
//! so back-to-back events cannot invoke them twice, and a panicking
//! listener is caught and logged per-listener so one faulty subscriber
//! cannot block delivery to the others.

use crate::types::{Envelope, EventType};
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Callback invoked with each dispatched Envelope of the subscribed type
pub type Listener = dyn Fn(&Envelope) + Send + Sync;

/// Identifies one registered listener for targeted removal
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Entry {
    id: ListenerId,
    once: bool,
    consumed: AtomicBool,
    callback: Box<Listener>,
}

/// Instance-owned subscription table
///
/// Created per bridge (no module-level singletons); torn down with the
/// bridge via [`clear`](Dispatcher::clear).
#[derive(Default)]
pub(crate) struct Dispatcher {
    table: Mutex<HashMap<EventType, Vec<Arc<Entry>>>>,
    next_id: AtomicU64,
}

impl Dispatcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Allocate a listener id without registering anything yet
    ///
    /// Lets a callback capture its own id before insertion (the trackers
    /// need this to remove themselves from inside a dispatch).
    pub(crate) fn reserve_id(&self) -> ListenerId {
        ListenerId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Register a listener; invoked for every event of `event_type`
    pub(crate) fn on<F>(&self, event_type: EventType, callback: F) -> ListenerId
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        let id = self.reserve_id();
        self.insert_with_id(event_type, id, false, callback);
        id
    }

    /// Register a one-shot listener; invoked at most once, then removed
    pub(crate) fn once<F>(&self, event_type: EventType, callback: F) -> ListenerId
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        let id = self.reserve_id();
        self.insert_with_id(event_type, id, true, callback);
        id
    }

    pub(crate) fn insert_with_id<F>(
        &self,
        event_type: EventType,
        id: ListenerId,
        once: bool,
        callback: F,
    ) where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.lock().entry(event_type).or_default().push(Arc::new(Entry {
            id,
            once,
            consumed: AtomicBool::new(false),
            callback: Box::new(callback),
        }));
    }

    /// Remove a listener; returns whether it was registered
    pub(crate) fn off(&self, event_type: EventType, id: ListenerId) -> bool {
        let mut table = self.lock();
        let Some(entries) = table.get_mut(&event_type) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        let removed = entries.len() != before;
        if entries.is_empty() {
            table.remove(&event_type);
        }
        removed
    }

    /// Drop every subscription (bridge teardown)
    pub(crate) fn clear(&self) {
        self.lock().clear();
    }

    /// Number of listeners currently registered for a type
    pub(crate) fn listener_count(&self, event_type: EventType) -> usize {
        self.lock().get(&event_type).map_or(0, Vec::len)
    }

    /// Deliver an envelope to every listener of its type, in subscription
    /// order
    pub(crate) fn dispatch(&self, envelope: &Envelope) {
        let event_type = envelope.event.event_type();

        // Snapshot before invoking: listeners may mutate the table
        let snapshot: Vec<Arc<Entry>> = self
            .lock()
            .get(&event_type)
            .map(|entries| entries.to_vec())
            .unwrap_or_default();

        let mut any_consumed = false;
        for entry in &snapshot {
            if entry.once {
                // CAS so concurrent back-to-back dispatches cannot invoke a
                // one-shot listener twice
                if entry.consumed.swap(true, Ordering::SeqCst) {
                    continue;
                }
                any_consumed = true;
            }

            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| (entry.callback)(envelope))) {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic payload".to_string());
                tracing::warn!(
                    event_type = %event_type,
                    listener = ?entry.id,
                    reason = %reason,
                    "listener panicked during dispatch"
                );
            }
        }

        if any_consumed {
            let mut table = self.lock();
            if let Some(entries) = table.get_mut(&event_type) {
                entries.retain(|entry| !(entry.once && entry.consumed.load(Ordering::SeqCst)));
                if entries.is_empty() {
                    table.remove(&event_type);
                }
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<EventType, Vec<Arc<Entry>>>> {
        // A panicking listener cannot leave the table unusable: panics are
        // caught outside the lock, and poisoning is recovered here anyway
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
