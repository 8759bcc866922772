//! Publish/subscribe channel for inactivity events.
//!
//! Decouples the monitor from whatever presents the warning (a dialog, a
//! logger, a stdout printer). The channel is an explicit handle: clone it and
//! pass it to whoever needs to subscribe or publish.
//!
//! Invariants:
//! - Callbacks are invoked synchronously, in subscription order.
//! - Each publish delivers to a snapshot of the registry taken when it starts,
//!   so (un)subscribing from inside a callback never skips or repeats another
//!   subscriber. A subscription removed mid-publish is not invoked afterwards.
//! - A callback that returns an error or panics is logged and skipped; the
//!   rest still receive the event.

use crate::domain::InactivityEvent;
use anyhow::Result;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::{error, trace, warn};

type Callback = dyn Fn(&InactivityEvent) -> Result<()> + Send + Sync;

#[derive(Clone)]
struct Entry {
    id: u64,
    active: Arc<AtomicBool>,
    callback: Arc<Callback>,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    entries: Vec<Entry>,
}

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    // Callbacks never run under the lock, so a poisoned registry is still consistent.
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Event channel handle.
#[derive(Clone, Default)]
pub struct EventChannel {
    registry: Arc<Mutex<Registry>>,
}

impl EventChannel {
    /// Create an empty channel.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback.
    ///
    /// The callback stays registered until the returned [`Subscription`] is
    /// unsubscribed or dropped (unless it was detached).
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&InactivityEvent) -> Result<()> + Send + Sync + 'static,
    {
        let active = Arc::new(AtomicBool::new(true));
        let mut registry = lock(&self.registry);

        let id = registry.next_id;
        registry.next_id += 1;
        registry.entries.push(Entry {
            id,
            active: Arc::clone(&active),
            callback: Arc::new(callback),
        });
        trace!("Subscriber {} registered", id);

        Subscription {
            id,
            active,
            registry: Arc::downgrade(&self.registry),
            detached: false,
        }
    }

    /// Deliver `event` to every registered callback.
    ///
    /// Returns the number of callbacks that completed successfully.
    pub fn publish(&self, event: &InactivityEvent) -> usize {
        let snapshot = lock(&self.registry).entries.clone();
        let mut delivered = 0;

        for entry in snapshot {
            if !entry.active.load(Ordering::Acquire) {
                trace!("Subscriber {} removed during publish, skipping", entry.id);
                continue;
            }

            match catch_unwind(AssertUnwindSafe(|| (entry.callback)(event))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => warn!("Subscriber {} failed on {:?}: {:#}", entry.id, event, e),
                Err(_) => error!("Subscriber {} panicked on {:?}", entry.id, event),
            }
        }

        delivered
    }

    /// Number of registered callbacks.
    pub fn len(&self) -> usize {
        lock(&self.registry).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for EventChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventChannel")
            .field("subscribers", &self.len())
            .finish()
    }
}

/// Handle to a registered callback. Unsubscribes on drop.
#[derive(Debug)]
#[must_use = "dropping a Subscription unsubscribes it"]
pub struct Subscription {
    id: u64,
    active: Arc<AtomicBool>,
    registry: Weak<Mutex<Registry>>,
    detached: bool,
}

impl Subscription {
    /// Remove the callback from the channel. Calling this more than once is a no-op.
    pub fn unsubscribe(&self) {
        if !self.active.swap(false, Ordering::AcqRel) {
            return;
        }

        if let Some(registry) = self.registry.upgrade() {
            lock(&registry).entries.retain(|e| e.id != self.id);
            trace!("Subscriber {} unregistered", self.id);
        }
    }

    /// Returns true while the callback is registered.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Keep the callback registered for the lifetime of the channel.
    pub fn detach(mut self) {
        self.detached = true;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if !self.detached {
            self.unsubscribe();
        }
    }
}
