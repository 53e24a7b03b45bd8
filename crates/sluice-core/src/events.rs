//! Observer-style event bus.
//!
//! Handlers are grouped by event kind and invoked in registration order.
//! `publish` works on a snapshot of the handler list, so a handler may
//! subscribe or unsubscribe while being invoked; the change applies from
//! the next `publish` on.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};

/// Events that can be routed by kind.
pub trait Event {
    type Kind: Copy + Eq + Hash + Send;

    fn kind(&self) -> Self::Kind;
}

type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Registry<E: Event> {
    next_id: u64,
    handlers: HashMap<E::Kind, Vec<(SubscriptionId, Handler<E>)>>,
}

/// Cloneable handle; clones share the same subscriber list.
pub struct EventBus<E: Event> {
    inner: Arc<Mutex<Registry<E>>>,
}

impl<E: Event> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<E: Event> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Event> EventBus<E> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Registry {
                next_id: 0,
                handlers: HashMap::new(),
            })),
        }
    }

    fn registry(&self) -> MutexGuard<'_, Registry<E>> {
        // A handler panicking mid-publish never holds the lock, so the
        // registry is still consistent after poisoning.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register `handler` for events of `kind`.
    pub fn subscribe<F>(&self, kind: E::Kind, handler: F) -> SubscriptionId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let mut reg = self.registry();
        let id = SubscriptionId(reg.next_id);
        reg.next_id += 1;
        reg.handlers
            .entry(kind)
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Remove a handler. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut reg = self.registry();
        for list in reg.handlers.values_mut() {
            if let Some(pos) = list.iter().position(|(h, _)| *h == id) {
                list.remove(pos);
                return true;
            }
        }
        false
    }

    /// Invoke every handler registered for the event's kind.
    /// Returns the number of handlers called.
    pub fn publish(&self, event: &E) -> usize {
        let snapshot: Vec<Handler<E>> = match self.registry().handlers.get(&event.kind()) {
            Some(list) => list.iter().map(|(_, h)| h.clone()).collect(),
            None => return 0,
        };
        for handler in &snapshot {
            handler(event);
        }
        snapshot.len()
    }

    pub fn listener_count(&self, kind: E::Kind) -> usize {
        self.registry()
            .handlers
            .get(&kind)
            .map(|l| l.len())
            .unwrap_or(0)
    }
}
