//! The client-side job model.
//!
//! A [`Job`] is the local record of one long-running backend operation.
//! Each record is owned exclusively by its kind's tracker; everything
//! the UI sees is a cloned snapshot.

use serde::{Deserialize, Serialize};

use crate::scope::ScopeToken;
use crate::types::{JobId, Timestamp};

// ---------------------------------------------------------------------------
// JobKind
// ---------------------------------------------------------------------------

/// All long-running operation kinds the engine tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Full brand creation from a name and website URL.
    BrandCreation,
    /// Batch inspiration generation for the active brand.
    InspirationGeneration,
    /// One-off quick image generation.
    QuickImage,
    /// A single assistant chat turn.
    ChatTurn,
    /// Todo-list generation for the active brand.
    TodoList,
    /// An approval request awaiting a backend decision.
    ApprovalRequest,
}

impl JobKind {
    /// Every kind, in a stable order. Used to build one reconciler per
    /// kind and to group snapshots.
    pub const ALL: [JobKind; 6] = [
        JobKind::BrandCreation,
        JobKind::InspirationGeneration,
        JobKind::QuickImage,
        JobKind::ChatTurn,
        JobKind::TodoList,
        JobKind::ApprovalRequest,
    ];

    /// Stable snake_case name, matching the serde representation.
    pub fn as_str(self) -> &'static str {
        match self {
            JobKind::BrandCreation => "brand_creation",
            JobKind::InspirationGeneration => "inspiration_generation",
            JobKind::QuickImage => "quick_image",
            JobKind::ChatTurn => "chat_turn",
            JobKind::TodoList => "todo_list",
            JobKind::ApprovalRequest => "approval_request",
        }
    }

    /// Whether the backend supports pausing and resuming this kind.
    ///
    /// Only batch inspiration generation can be paused mid-run; every
    /// other kind either finishes quickly or has no meaningful paused
    /// state.
    pub fn supports_pause(self) -> bool {
        matches!(self, JobKind::InspirationGeneration)
    }
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// JobStatus
// ---------------------------------------------------------------------------

/// Lifecycle status of a tracked job.
///
/// `Pending` covers the window between the backend accepting the intent
/// and the first confirmed running state. The three terminal states are
/// final: once reached, no later notification may change the status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Whether this status is final.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Paused => "paused",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Unit-based progress of a job (e.g. 2 of 3 inspirations generated).
///
/// `total` is `None` for kinds that report no step count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub completed: u32,
    pub total: Option<u32>,
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// Local record of one long-running backend operation.
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    /// The scope token captured when the job was started. Updates are
    /// applied only while this token is still current.
    pub scope: ScopeToken,
    pub status: JobStatus,
    pub progress: Progress,
    /// Kind-specific data: the start parameters, later replaced by the
    /// completion payload.
    pub payload: serde_json::Value,
    pub created_at: Timestamp,
    /// Monotonic merge point: an update with an older timestamp than
    /// this loses.
    pub last_updated_at: Timestamp,
    pub error: Option<String>,
}
