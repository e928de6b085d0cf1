//! Shared types for the Atelier client engine.
//!
//! Zero internal dependencies: every other workspace crate builds on the
//! job model, scope tokens, backoff curve, and error taxonomy defined
//! here.

pub mod backoff;
pub mod error;
pub mod job;
pub mod scope;
pub mod types;

pub use backoff::{next_delay, PollConfig};
pub use error::{BridgeError, EngineError};
pub use job::{Job, JobKind, JobStatus, Progress};
pub use scope::{ScopeCounter, ScopeToken};
pub use types::{JobId, Timestamp};
