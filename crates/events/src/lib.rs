//! Push-event types and the in-process event bus.

pub mod bus;
pub mod push;

pub use bus::{EventBus, SubscriptionId};
pub use push::{parse_push, EventKind, PushEvent};
