//! Error taxonomy for the engine and its bridge collaborator.

use crate::job::JobKind;
use crate::types::JobId;

/// Errors returned by the transport bridge.
///
/// `Clone` so a single bridge result can be fanned out to every caller
/// joining the same in-flight operation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BridgeError {
    /// Transient transport failure. Retried via backoff, never terminal
    /// for the job.
    #[error("Network error: {0}")]
    Network(String),

    /// The backend rejected the request outright.
    #[error("Request rejected: {0}")]
    Rejected(String),

    /// The backend has no record of the job.
    #[error("Job {0} not found")]
    JobNotFound(JobId),
}

impl BridgeError {
    /// Whether the failure is worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, BridgeError::Network(_))
    }
}

/// Errors surfaced by engine intents.
///
/// Only [`JobFailed`](EngineError::JobFailed) and the synchronous
/// validation variants are meant for the user; scope discards are
/// internal concurrency control.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    /// A job of this kind is already active in the current scope.
    /// `start` rejects synchronously instead of queuing.
    #[error("A {kind} job is already active")]
    JobAlreadyActive { kind: JobKind },

    /// The backend reported the job as failed. The message is surfaced
    /// verbatim.
    #[error("Job failed: {message}")]
    JobFailed { message: String },

    /// Pause/resume requested for a kind that does not support it.
    #[error("{kind} jobs cannot be paused or resumed")]
    PauseUnsupported { kind: JobKind },

    /// The intent named a job the engine is not tracking.
    #[error("No tracked job with id {0}")]
    UnknownJob(JobId),

    /// The scope changed while the intent was in flight; the result was
    /// discarded. Internal: callers treat this as a silent no-op.
    #[error("Scope changed while the operation was in flight")]
    StaleScope,

    /// A bridge call failed.
    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_network_errors_are_transient() {
        assert!(BridgeError::Network("timeout".into()).is_transient());
        assert!(!BridgeError::Rejected("bad params".into()).is_transient());
        assert!(!BridgeError::JobNotFound(uuid::Uuid::new_v4()).is_transient());
    }

    #[test]
    fn already_active_names_the_kind() {
        let err = EngineError::JobAlreadyActive {
            kind: JobKind::BrandCreation,
        };
        assert_eq!(err.to_string(), "A brand_creation job is already active");
    }
}
