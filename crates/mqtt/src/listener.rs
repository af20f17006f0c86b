//! Observer traits and the registry that fans notifications out to them.
//!
//! Registries are copy-on-write: registering or unregistering swaps in a new
//! snapshot, and `notify` iterates whatever snapshot was current when it
//! started. Observers may therefore add or remove themselves (or others) from
//! inside a callback without deadlocking and without disturbing the iteration
//! in progress.
//!
//! A panicking observer is logged and skipped; the remaining observers are
//! still notified.

use std::{
    panic::{self, AssertUnwindSafe},
    sync::{Arc, PoisonError, RwLock},
};

use tracing::error;

use crate::state::ConnectionState;

/// Receives every connection state change, in order.
///
/// Callbacks run inside the manager's transition section; they must not call
/// `connect` or `disconnect` synchronously.
pub trait ConnectionStateListener: Send + Sync {
    fn on_connection_state_change(&self, state: ConnectionState);

    /// Raised once when the broker rejects the credentials of `client_id`.
    fn on_authentication_failure(&self, client_id: &str) {
        let _ = client_id;
    }
}

impl<F> ConnectionStateListener for F
where
    F: Fn(ConnectionState) + Send + Sync,
{
    fn on_connection_state_change(&self, state: ConnectionState) {
        self(state)
    }
}

/// Receives the edge-triggered queue signals of the publisher.
pub trait QueueBackpressureListener: Send + Sync {
    /// Occupancy reached the limit and a publish was dropped.
    fn on_queue_full(&self, queue_size: usize, queue_limit: usize);

    /// Occupancy fell below half the limit after a full episode.
    fn on_queue_drained(&self, queue_size: usize, queue_limit: usize);
}

/// Copy-on-write list of observers, iterated in insertion order.
pub struct ListenerRegistry<L: ?Sized> {
    snapshot: RwLock<Arc<Vec<Arc<L>>>>,
}

impl<L: ?Sized> Default for ListenerRegistry<L> {
    fn default() -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(Vec::new())),
        }
    }
}

impl<L: ?Sized> ListenerRegistry<L> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, listener: Arc<L>) {
        let mut guard = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = Vec::with_capacity(guard.len() + 1);
        next.extend(guard.iter().cloned());
        next.push(listener);
        *guard = Arc::new(next);
    }

    /// Removes `listener` by identity. Returns whether it was registered.
    pub fn unregister(&self, listener: &Arc<L>) -> bool {
        let mut guard = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
        let before = guard.len();
        let next: Vec<Arc<L>> = guard
            .iter()
            .filter(|existing| !Arc::ptr_eq(existing, listener))
            .cloned()
            .collect();
        let removed = next.len() != before;
        if removed {
            *guard = Arc::new(next);
        }
        removed
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.snapshot().len()
    }

    fn snapshot(&self) -> Arc<Vec<Arc<L>>> {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Calls `f` for every registered listener, containing panics per listener.
    pub fn notify<F>(&self, what: &str, f: F)
    where
        F: Fn(&L),
    {
        for listener in self.snapshot().iter() {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| f(listener)));
            if let Err(payload) = outcome {
                error!(
                    "Listener panicked while handling {}: {}",
                    what,
                    panic_message(payload.as_ref())
                );
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
