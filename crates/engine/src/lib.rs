//! Asynchronous job & event reconciliation engine.
//!
//! Keeps client-visible state consistent with server-side long-running
//! operations despite unreliable push delivery, network latency, and
//! user-driven context switches. Push events and poll results are merged
//! into one authoritative per-kind status; results captured under a
//! superseded scope are discarded.
//!
//! Data flow: UI intent -> [`Reconciler`] (single-flight check, captures
//! the current scope token) -> bridge call starts the job ->
//! [`JobTracker`] record tagged with the token -> bus events applied only
//! while the token is current -> [`PollLoop`] reconciles and terminates.

pub mod bridge;
pub mod engine;
pub mod poll;
pub mod reconciler;
pub mod singleflight;
pub mod tracker;

pub use bridge::{JobBridge, JobStatusReport, StartedJob};
pub use engine::{Engine, EngineConfig};
pub use poll::PollLoop;
pub use reconciler::Reconciler;
pub use singleflight::{Policy, SingleFlight, SingleFlightError};
pub use tracker::{ApplyOutcome, CompletionHook, JobTracker, JobUpdate};
