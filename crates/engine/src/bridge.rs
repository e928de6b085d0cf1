//! The transport bridge consumed by the engine.
//!
//! The bridge is the only collaborator that talks to the backend. The
//! engine never assumes a wire format beyond the identity and ordering
//! guarantees encoded in these DTOs: every report carries the job id and
//! a timestamp that is monotonic per job.

use async_trait::async_trait;
use atelier_core::{BridgeError, JobId, JobKind, JobStatus, Progress, Timestamp};

/// Result of a `start_job` call.
///
/// `status` may already be terminal for short jobs; the response can
/// race ahead of (or replace) push delivery.
#[derive(Debug, Clone)]
pub struct StartedJob {
    pub job_id: JobId,
    pub status: JobStatus,
    /// Backend error message when `status` is already `Failed`.
    pub error: Option<String>,
    pub timestamp: Timestamp,
}

/// Authoritative job status as reported by the backend.
#[derive(Debug, Clone)]
pub struct JobStatusReport {
    pub job_id: JobId,
    pub status: JobStatus,
    pub progress: Progress,
    /// Kind-specific result data, present once the job completes.
    pub payload: serde_json::Value,
    pub error: Option<String>,
    pub timestamp: Timestamp,
}

/// Request/response surface of the backend transport.
///
/// Implemented by the transport collaborator; the engine only holds an
/// `Arc<dyn JobBridge>`. In-flight calls cannot be forcibly aborted, so
/// cancellation means "stop trusting this call's result", enforced by
/// scope tokens and sticky terminal states rather than request
/// termination.
#[async_trait]
pub trait JobBridge: Send + Sync {
    /// Ask the backend to start a job of `kind`.
    async fn start_job(
        &self,
        kind: JobKind,
        params: serde_json::Value,
    ) -> Result<StartedJob, BridgeError>;

    /// Query authoritative status for one job.
    async fn job_status(&self, job_id: JobId) -> Result<JobStatusReport, BridgeError>;

    /// Best-effort cancellation. The acknowledgment is confirmation
    /// only; the local record is already cancelled when this is called.
    async fn cancel_job(&self, job_id: JobId) -> Result<(), BridgeError>;

    /// Pause a running job (kinds with pause support).
    async fn pause_job(&self, job_id: JobId) -> Result<(), BridgeError>;

    /// Resume a paused job (kinds with pause support).
    async fn resume_job(&self, job_id: JobId) -> Result<(), BridgeError>;

    /// The backend's view of the active job of `kind`, if any. Used to
    /// hydrate trackers on mount instead of trusting `idle`.
    async fn active_job(&self, kind: JobKind) -> Result<Option<JobStatusReport>, BridgeError>;
}
