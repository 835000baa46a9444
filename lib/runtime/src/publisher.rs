//! Live Status Publisher.
//!
//! Fans status events out to subscriber callbacks. A callback that returns
//! an error or panics is logged and skipped; the remaining subscribers still
//! receive the event.

use crate::error::SubscriberCallbackError;
use crate::status::StatusEvent;
use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};
use tracing::{trace, warn};

type Callback = dyn Fn(&StatusEvent) -> Result<(), SubscriberCallbackError> + Send + Sync;

#[derive(Default)]
struct Subscribers {
    next_id: AtomicU64,
    callbacks: RwLock<BTreeMap<u64, Arc<Callback>>>,
}

impl Subscribers {
    fn remove(&self, id: u64) -> bool {
        self.callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some()
    }
}

/// Outcome of delivering one event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Subscriber registry and fan-out.
#[derive(Clone, Default)]
pub struct StatusPublisher {
    subscribers: Arc<Subscribers>,
}

impl StatusPublisher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a callback. It stays registered until the returned
    /// [`Subscription`] is unsubscribed.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&StatusEvent) -> Result<(), SubscriberCallbackError> + Send + Sync + 'static,
    {
        let id = self.subscribers.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Arc::new(callback));
        trace!(subscriber = id, "subscriber added");
        Subscription {
            id,
            subscribers: Arc::downgrade(&self.subscribers),
            active: AtomicBool::new(true),
        }
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Delivers an event to every subscriber.
    pub fn publish(&self, event: &StatusEvent) -> DeliveryReport {
        let callbacks: Vec<(u64, Arc<Callback>)> = self
            .subscribers
            .callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, callback)| (*id, Arc::clone(callback)))
            .collect();

        let mut report = DeliveryReport::default();
        for (id, callback) in callbacks {
            match catch_unwind(AssertUnwindSafe(|| callback(event))) {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(error)) => {
                    warn!(subscriber = id, error = %error, "status subscriber failed");
                    report.failed += 1;
                }
                Err(_) => {
                    warn!(subscriber = id, "status subscriber panicked");
                    report.failed += 1;
                }
            }
        }
        report
    }
}

impl std::fmt::Debug for StatusPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusPublisher")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Handle for removing a subscriber.
///
/// Dropping the handle leaves the subscriber registered.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    subscribers: Weak<Subscribers>,
    active: AtomicBool,
}

impl Subscription {
    /// Removes the subscriber. Returns true the first time only.
    pub fn unsubscribe(&self) -> bool {
        if !self.active.swap(false, Ordering::AcqRel) {
            return false;
        }
        self.subscribers
            .upgrade()
            .is_some_and(|subscribers| subscribers.remove(self.id))
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for Subscribers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscribers").finish_non_exhaustive()
    }
}
