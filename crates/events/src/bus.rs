//! In-process event bus with synchronous, ordered delivery.
//!
//! [`EventBus`] is the central publish/subscribe hub for [`PushEvent`]s.
//! It is explicitly constructed and shared via `Arc<EventBus>`; there is
//! no process-global instance.
//!
//! Delivery contract: handlers for an event kind run synchronously on
//! the publishing thread, in subscription order. A failing handler is
//! logged and does not prevent later handlers from running. There is no
//! buffering: events published before a subscriber registers are lost,
//! so components hydrate authoritative state instead of relying solely
//! on events. Only the latest event per kind is cached for late
//! subscribers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::push::{EventKind, PushEvent};

/// Error type handlers may return. Failures are isolated per handler.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

type Handler = Arc<dyn Fn(&PushEvent) -> Result<(), HandlerError> + Send + Sync>;

/// Identifies one subscription, for [`EventBus::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

#[derive(Default)]
struct BusInner {
    next_id: u64,
    /// Handlers per kind, in subscription order.
    handlers: HashMap<EventKind, Vec<(SubscriptionId, Handler)>>,
    /// Latest event per kind, for late subscribers.
    latest: HashMap<EventKind, PushEvent>,
}

/// In-process fan-out event bus with ordered synchronous delivery.
pub struct EventBus {
    inner: Mutex<BusInner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(BusInner::default()),
        }
    }

    /// Register a handler for one event kind.
    ///
    /// Handlers run in subscription order when an event of `kind` is
    /// published.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&PushEvent) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = SubscriptionId(inner.next_id);
        inner
            .handlers
            .entry(kind)
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Remove a subscription. Idempotent: unknown or already-removed ids
    /// are a no-op.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        let mut inner = self.lock();
        for handlers in inner.handlers.values_mut() {
            handlers.retain(|(sub_id, _)| *sub_id != id);
        }
    }

    /// Publish an event to all current subscribers of its kind.
    ///
    /// Handlers run synchronously in subscription order. A handler
    /// returning `Err` is logged and skipped; the remaining handlers
    /// still run. The hydration poll is the safety net for any state a
    /// failed handler missed.
    pub fn publish(&self, event: PushEvent) {
        let kind = event.kind();
        let handlers: Vec<Handler> = {
            let mut inner = self.lock();
            inner.latest.insert(kind, event.clone());
            inner
                .handlers
                .get(&kind)
                .map(|subs| subs.iter().map(|(_, h)| Arc::clone(h)).collect())
                .unwrap_or_default()
        };

        for handler in handlers {
            if let Err(e) = handler(&event) {
                tracing::warn!(
                    kind = ?kind,
                    job_id = %event.job_id(),
                    error = %e,
                    "Event handler failed, continuing with remaining handlers",
                );
            }
        }
    }

    /// The most recently published event of `kind`, if any.
    pub fn latest(&self, kind: EventKind) -> Option<PushEvent> {
        self.lock().latest.get(&kind).cloned()
    }

    /// Drop the latest-event cache. Called on scope teardown so a new
    /// context never observes events from the previous one.
    pub fn clear_latest(&self) {
        self.lock().latest.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BusInner> {
        // A panicking handler cannot poison the bus: publish never holds
        // the lock while running handlers.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
