//! In-process notifications for authentication state changes.
//!
//! The bus carries no payload: listeners re-read the session store, which is
//! always committed before `publish()` runs.
//!
//! The bus is owned by whoever wires the application together and handed to
//! the components that need it. Clones share the same registry.

use parking_lot::Mutex;
use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};

/// A registered callback.
pub type AuthListener = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: Vec<(u64, AuthListener)>,
}

/// Outcome of one [`AuthStateBus::publish`] call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PublishReport {
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Clone, Default)]
pub struct AuthStateBus {
    registry: Arc<Mutex<Registry>>,
}

impl AuthStateBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback. Keep the returned handle and call
    /// [`Subscription::unsubscribe`] on teardown.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.subscribe_shared(Arc::new(listener))
    }

    /// Register an existing callback. Registering the same `Arc` twice yields
    /// two entries, each removed only by its own handle.
    pub fn subscribe_shared(&self, listener: AuthListener) -> Subscription {
        let mut registry = self.registry.lock();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.listeners.push((id, listener));
        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Call every listener in registration order on the current thread.
    ///
    /// Listeners run against a snapshot taken on entry; (un)subscribing from
    /// inside a listener affects the next publish. A panicking listener is
    /// logged and counted, and the remaining listeners still run.
    pub fn publish(&self) -> PublishReport {
        let snapshot: Vec<AuthListener> = self
            .registry
            .lock()
            .listeners
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        let mut report = PublishReport::default();
        for (index, listener) in snapshot.iter().enumerate() {
            match catch_unwind(AssertUnwindSafe(|| listener())) {
                Ok(()) => report.delivered += 1,
                Err(panic) => {
                    report.failed += 1;
                    tracing::warn!(
                        listener = index,
                        "Auth state listener panicked: {}",
                        panic_message(panic.as_ref())
                    );
                }
            }
        }
        tracing::debug!(
            delivered = report.delivered,
            failed = report.failed,
            "Auth state change published"
        );
        report
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.lock().listeners.len()
    }
}

impl fmt::Debug for AuthStateBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthStateBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Handle for one registration. Dropping it does not unsubscribe.
#[must_use = "dropping a Subscription leaves the listener registered; call unsubscribe()"]
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    /// Remove this registration. Returns `false` if the bus is gone.
    pub fn unsubscribe(self) -> bool {
        let Some(registry) = self.registry.upgrade() else {
            return false;
        };
        let mut registry = registry.lock();
        let before = registry.listeners.len();
        registry.listeners.retain(|(id, _)| *id != self.id);
        registry.listeners.len() != before
    }
}
