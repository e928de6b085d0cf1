//! Per-key guard against duplicate concurrent operations.
//!
//! At most one execution is in flight per key. Callers choose the
//! policy on collision: read-style refreshes join the existing flight
//! and share its result; write-style "start job" intents are rejected
//! immediately instead of queuing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, FutureExt, WeakShared};

type WeakFut<T> = WeakShared<BoxFuture<'static, T>>;
type Slots<T> = Arc<Mutex<HashMap<String, Slot<T>>>>;

/// One occupied key. The map holds only a weak handle, so an aborted
/// flight cannot keep itself alive through its own slot.
struct Slot<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Distinguishes this flight from a replacement under the same key.
    id: u64,
    shared: WeakFut<T>,
}

/// What to do when the key already has an in-flight operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Await the existing flight and receive the same (cloned) result.
    Share,
    /// Fail immediately with [`SingleFlightError::AlreadyInFlight`].
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SingleFlightError {
    #[error("An operation with key \"{0}\" is already in flight")]
    AlreadyInFlight(String),
}

/// Keyed single-flight slots.
///
/// The slot clears when the underlying call settles. A drop guard
/// inside the wrapped future handles this, so the slot also clears if
/// the flight is dropped before completion.
pub struct SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    slots: Slots<T>,
    next_id: AtomicU64,
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        }
    }

    /// Run `make()` under the single-flight guarantee for `key`.
    ///
    /// `make` is only invoked when the key is free; no two overlapping
    /// executions ever share a key.
    pub async fn run<F>(&self, key: &str, policy: Policy, make: F) -> Result<T, SingleFlightError>
    where
        F: FnOnce() -> BoxFuture<'static, T>,
    {
        let shared = {
            let mut slots = lock(&self.slots);
            // A weak handle that no longer upgrades is a dead flight
            // (every awaiter was dropped); the key counts as free.
            let live = slots.get(key).and_then(|slot| slot.shared.upgrade());
            if let Some(existing) = live {
                match policy {
                    Policy::Share => existing,
                    Policy::Reject => {
                        return Err(SingleFlightError::AlreadyInFlight(key.to_string()))
                    }
                }
            } else {
                let inner = make();
                let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
                let guard = SlotGuard {
                    slots: Arc::clone(&self.slots),
                    key: key.to_string(),
                    id,
                };
                let wrapped: BoxFuture<'static, T> = async move {
                    let _guard = guard;
                    inner.await
                }
                .boxed();
                let shared = wrapped.shared();
                if let Some(weak) = shared.downgrade() {
                    slots.insert(key.to_string(), Slot { id, shared: weak });
                }
                shared
            }
        };

        Ok(shared.await)
    }

    /// Whether `key` currently has an in-flight operation.
    pub fn in_flight(&self, key: &str) -> bool {
        lock(&self.slots)
            .get(key)
            .and_then(|slot| slot.shared.upgrade())
            .is_some()
    }
}

impl<T> Default for SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Clears the slot when the wrapped future settles or is dropped.
struct SlotGuard<T>
where
    T: Clone + Send + Sync + 'static,
{
    slots: Slots<T>,
    key: String,
    id: u64,
}

impl<T> Drop for SlotGuard<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        // Remove our own entry unless a newer flight replaced it.
        let mut slots = lock(&self.slots);
        if slots.get(&self.key).map(|slot| slot.id) == Some(self.id) {
            slots.remove(&self.key);
        }
    }
}

fn lock<T>(slots: &Slots<T>) -> MutexGuard<'_, HashMap<String, Slot<T>>>
where
    T: Clone + Send + Sync + 'static,
{
    slots.lock().unwrap_or_else(PoisonError::into_inner)
}
