//! Listener registry with disposable subscription handles.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use super::{Event, EventKind};

/// Callback invoked for every event of the subscribed kind.
pub type Listener = Arc<dyn Fn(&Event) + Send + Sync>;

pub(crate) type ListenerId = u64;

#[derive(Default)]
pub(crate) struct Registry {
    next_id: ListenerId,
    listeners: HashMap<EventKind, Vec<(ListenerId, Listener)>>,
}

impl Registry {
    pub(crate) fn insert(&mut self, kind: EventKind, listener: Listener) -> ListenerId {
        self.next_id += 1;
        let id = self.next_id;
        self.listeners.entry(kind).or_default().push((id, listener));
        id
    }

    pub(crate) fn remove(&mut self, kind: EventKind, id: ListenerId) -> bool {
        let Some(entries) = self.listeners.get_mut(&kind) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        let removed = entries.len() != before;
        if entries.is_empty() {
            self.listeners.remove(&kind);
        }
        removed
    }

    /// Snapshot of listeners for `kind`, in registration order.
    pub(crate) fn listeners_for(&self, kind: EventKind) -> Vec<Listener> {
        self.listeners
            .get(&kind)
            .map(|entries| entries.iter().map(|(_, listener)| Arc::clone(listener)).collect())
            .unwrap_or_default()
    }

    pub(crate) fn count(&self, kind: EventKind) -> usize {
        self.listeners.get(&kind).map_or(0, Vec::len)
    }
}

pub(crate) type SharedRegistry = Arc<Mutex<Registry>>;

pub(crate) fn lock(registry: &Mutex<Registry>) -> std::sync::MutexGuard<'_, Registry> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle for one registered listener. Dropping it unsubscribes.
#[must_use = "dropping a Subscription immediately unsubscribes the listener"]
pub struct Subscription {
    kind: EventKind,
    id: ListenerId,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    pub(crate) fn new(kind: EventKind, id: ListenerId, registry: &SharedRegistry) -> Self {
        Self { kind, id, registry: Arc::downgrade(registry) }
    }

    #[must_use]
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Remove the listener now. Equivalent to dropping the handle.
    pub fn dispose(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            lock(&registry).remove(self.kind, self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("kind", &self.kind).field("id", &self.id).finish()
    }
}

#[cfg(test)]
#[path = "registry_test.rs"]
mod tests;
