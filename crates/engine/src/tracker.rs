//! Per-kind job state machine.
//!
//! Merges three update sources (the initial bridge-call result, push
//! events correlated by job id, and poll results) into one
//! authoritative status. Merge rule: last-writer-wins by monotonic
//! `last_updated_at`, except terminal states are sticky. Updates
//! captured under a superseded scope are discarded; that is expected
//! concurrency behavior, not a fault.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use atelier_core::{Job, JobId, JobKind, JobStatus, Progress, ScopeCounter, ScopeToken, Timestamp};
use atelier_events::PushEvent;

use crate::bridge::JobStatusReport;

// ---------------------------------------------------------------------------
// JobUpdate
// ---------------------------------------------------------------------------

/// One piece of information about a job, from any of the three sources.
///
/// `scope` is the token under which the information was obtained.
#[derive(Debug, Clone)]
pub struct JobUpdate {
    pub job_id: JobId,
    pub scope: ScopeToken,
    pub status: JobStatus,
    pub progress: Option<Progress>,
    pub payload: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: Timestamp,
}

impl JobUpdate {
    /// Translate a push event into an update, tagging it with the scope
    /// the tracked job was started under.
    pub fn from_push(event: &PushEvent, scope: ScopeToken) -> Self {
        let (status, payload, error) = match event {
            PushEvent::JobRunning(_) | PushEvent::JobProgress(_) => (JobStatus::Running, None, None),
            PushEvent::JobCompleted(d) => (
                JobStatus::Completed,
                (!d.payload.is_null()).then(|| d.payload.clone()),
                None,
            ),
            PushEvent::JobFailed(d) => (JobStatus::Failed, None, Some(d.error.clone())),
            PushEvent::JobCancelled(_) => (JobStatus::Cancelled, None, None),
        };
        Self {
            job_id: event.job_id(),
            scope,
            status,
            progress: event.progress(),
            payload,
            error,
            timestamp: event.timestamp(),
        }
    }

    /// Translate an authoritative poll result into an update.
    pub fn from_report(report: &JobStatusReport, scope: ScopeToken) -> Self {
        Self {
            job_id: report.job_id,
            scope,
            status: report.status,
            progress: Some(report.progress),
            payload: (!report.payload.is_null()).then(|| report.payload.clone()),
            error: report.error.clone(),
            timestamp: report.timestamp,
        }
    }
}

// ---------------------------------------------------------------------------
// ApplyOutcome
// ---------------------------------------------------------------------------

/// What the tracker decided to do with an update.
///
/// Everything except [`Applied`](ApplyOutcome::Applied) is a silent
/// discard; the variants exist so callers and tests can observe the
/// decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The update was merged into the record.
    Applied,
    /// No tracked job, or the correlation id does not match.
    NotTracked,
    /// The update's scope token is no longer current.
    StaleScope,
    /// The update is older than the record's `last_updated_at`.
    StaleTimestamp,
    /// The record is already terminal; a different status cannot revive
    /// or replace it.
    TerminalSticky,
    /// A repeat of the terminal status already applied.
    DuplicateTerminal,
}

// ---------------------------------------------------------------------------
// JobTracker
// ---------------------------------------------------------------------------

/// Side effect to run exactly once when a job of this kind completes
/// (data refresh, success notification).
pub type CompletionHook = Box<dyn Fn(&Job) + Send + Sync>;

struct TrackerInner {
    job: Option<Job>,
    /// Set when the completion hook has run; tolerates duplicate
    /// completion notifications.
    finalized: bool,
}

/// Authoritative local state for one job kind.
///
/// The tracker is the exclusive owner of its [`Job`] record; the UI
/// only ever sees cloned snapshots.
pub struct JobTracker {
    kind: JobKind,
    scope: Arc<ScopeCounter>,
    inner: Mutex<TrackerInner>,
    on_complete: Option<CompletionHook>,
}

impl JobTracker {
    pub fn new(kind: JobKind, scope: Arc<ScopeCounter>) -> Self {
        Self {
            kind,
            scope,
            inner: Mutex::new(TrackerInner {
                job: None,
                finalized: false,
            }),
            on_complete: None,
        }
    }

    /// Attach the kind's exactly-once completion side effect.
    pub fn with_completion_hook(mut self, hook: CompletionHook) -> Self {
        self.on_complete = Some(hook);
        self
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    /// Install a fresh record, superseding any previous job of this
    /// kind.
    pub fn begin(&self, job: Job) {
        let mut inner = self.lock();
        inner.job = Some(job);
        inner.finalized = false;
    }

    /// Read-only snapshot of the current record.
    pub fn snapshot(&self) -> Option<Job> {
        self.lock().job.clone()
    }

    /// The tracked job, if it is non-terminal and belongs to the
    /// current scope. Drives the one-active-job-per-kind guard.
    pub fn active_job(&self) -> Option<Job> {
        self.lock()
            .job
            .as_ref()
            .filter(|job| !job.status.is_terminal() && self.scope.is_current(job.scope))
            .cloned()
    }

    /// Merge one update into the record.
    pub fn apply(&self, update: &JobUpdate) -> ApplyOutcome {
        let completed = {
            let mut guard = self.lock();
            let inner = &mut *guard;

            let Some(job) = inner.job.as_mut() else {
                return ApplyOutcome::NotTracked;
            };
            if job.id != update.job_id {
                return ApplyOutcome::NotTracked;
            }
            if !self.scope.is_current(update.scope) {
                tracing::debug!(
                    kind = %self.kind,
                    job_id = %update.job_id,
                    scope = %update.scope,
                    "Discarding update captured under a superseded scope",
                );
                return ApplyOutcome::StaleScope;
            }
            if job.status.is_terminal() {
                return if update.status == job.status {
                    ApplyOutcome::DuplicateTerminal
                } else {
                    ApplyOutcome::TerminalSticky
                };
            }
            if update.timestamp < job.last_updated_at {
                return ApplyOutcome::StaleTimestamp;
            }

            job.status = update.status;
            if let Some(progress) = update.progress {
                job.progress = progress;
            }
            if let Some(payload) = &update.payload {
                job.payload = payload.clone();
            }
            if let Some(error) = &update.error {
                job.error = Some(error.clone());
            }
            job.last_updated_at = update.timestamp;

            if update.status == JobStatus::Completed && !inner.finalized {
                inner.finalized = true;
                Some(job.clone())
            } else {
                None
            }
        };

        // Run the completion hook outside the lock so it may read
        // snapshots freely.
        if let Some(job) = completed {
            if let Some(hook) = &self.on_complete {
                hook(&job);
            }
        }

        ApplyOutcome::Applied
    }

    /// Apply one authoritative status query, installing the record if
    /// the tracker had none. Called once on mount before trusting
    /// `idle`.
    pub fn hydrate(&self, report: &JobStatusReport, scope: ScopeToken) -> ApplyOutcome {
        if !self.scope.is_current(scope) {
            return ApplyOutcome::StaleScope;
        }

        {
            let mut inner = self.lock();
            if inner.job.is_none() {
                inner.job = Some(Job {
                    id: report.job_id,
                    kind: self.kind,
                    scope,
                    status: report.status,
                    progress: report.progress,
                    payload: report.payload.clone(),
                    created_at: report.timestamp,
                    last_updated_at: report.timestamp,
                    error: report.error.clone(),
                });
                inner.finalized = report.status.is_terminal();
                return ApplyOutcome::Applied;
            }
        }

        self.apply(&JobUpdate::from_report(report, scope))
    }

    /// Drop the record: user dismissal or scope teardown.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.job = None;
        inner.finalized = false;
    }

    fn lock(&self) -> MutexGuard<'_, TrackerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
