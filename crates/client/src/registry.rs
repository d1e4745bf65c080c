//! Listener registry for realtime channel events.
//!
//! Maps each [`EventKind`] to an ordered list of listeners. Listeners run in
//! registration order, outside the registry lock, so a listener may itself
//! register or remove listeners. A panicking listener is caught and logged
//! and the remaining listeners still run.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::events::{ChannelEvent, EventKind};

/// A channel event callback.
pub type Listener = Arc<dyn Fn(&ChannelEvent) + Send + Sync>;

/// Handle returned by [`ListenerRegistry::on`], used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
pub struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: Mutex<HashMap<EventKind, Vec<(ListenerId, Listener)>>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` for `kind`. It runs after every listener already
    /// registered for the same kind.
    pub fn on(&self, kind: EventKind, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().entry(kind).or_default().push((id, listener));
        id
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn off(&self, kind: EventKind, id: ListenerId) -> bool {
        let mut listeners = self.lock();
        let Some(list) = listeners.get_mut(&kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|(existing, _)| *existing != id);
        before != list.len()
    }

    /// Drop every listener.
    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.lock().get(&kind).map_or(0, Vec::len)
    }

    /// Invoke every listener registered for the event's kind.
    ///
    /// Returns how many listeners completed without panicking.
    pub fn dispatch(&self, event: &ChannelEvent) -> usize {
        let kind = event.kind();
        let listeners: Vec<Listener> = self
            .lock()
            .get(&kind)
            .map(|list| list.iter().map(|(_, l)| Arc::clone(l)).collect())
            .unwrap_or_default();

        let mut completed = 0;
        for listener in listeners {
            match catch_unwind(AssertUnwindSafe(|| listener(event))) {
                Ok(()) => completed += 1,
                Err(panic) => {
                    let detail = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "<non-string panic>".to_string());
                    tracing::error!(event = %kind, error = %detail, "Error in event listener");
                }
            }
        }
        completed
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<EventKind, Vec<(ListenerId, Listener)>>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
