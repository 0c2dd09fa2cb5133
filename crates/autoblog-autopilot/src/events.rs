//! Change notification for observers of the autopilot state.
//!
//! Listeners are plain callbacks invoked synchronously, in subscription order,
//! after every persisted state change. A panicking listener is logged and
//! skipped; it never reaches the autopilot or the other listeners.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use tracing::warn;

use autoblog_types::JobState;

/// Callback receiving every new state snapshot.
pub type Listener = Arc<dyn Fn(&JobState) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: AtomicU64,
    listeners: RwLock<Vec<(u64, Listener)>>,
}

impl Registry {
    fn read(&self) -> RwLockReadGuard<'_, Vec<(u64, Listener)>> {
        self.listeners.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<(u64, Listener)>> {
        self.listeners.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn remove(&self, id: u64) -> bool {
        let mut listeners = self.write();
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }
}

/// Fan-out of state snapshots to subscribed listeners.
#[derive(Clone, Default)]
pub struct EventBus {
    registry: Arc<Registry>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. It stays registered until the returned
    /// [`Subscription`] is dropped or explicitly unsubscribed.
    pub fn subscribe(&self, listener: Listener) -> Subscription {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry.write().push((id, listener));
        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Deliver `state` to every current listener.
    pub fn notify(&self, state: &JobState) {
        // Snapshot so listeners may subscribe or unsubscribe from inside a callback.
        let listeners: Vec<Listener> = self
            .registry
            .read()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();

        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(state))).is_err() {
                warn!("Autopilot state listener panicked, skipping it");
            }
        }
    }

    pub fn listener_count(&self) -> usize {
        self.registry.read().len()
    }
}

/// Handle of a registered listener; dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes its listener immediately"]
pub struct Subscription {
    id: u64,
    registry: Weak<Registry>,
}

impl Subscription {
    /// Remove the listener now. Returns false if it was already gone.
    pub fn unsubscribe(mut self) -> bool {
        self.detach()
    }

    fn detach(&mut self) -> bool {
        let Some(registry) = self.registry.upgrade() else {
            return false;
        };
        self.registry = Weak::new();
        registry.remove(self.id)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}
