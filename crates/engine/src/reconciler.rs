//! Per-kind composition root: intents in, snapshots out.
//!
//! A [`Reconciler`] owns the tracker for one job kind and wires it to
//! the bridge, the single-flight guard, and the poll loop. `start` is
//! guarded so at most one job of the kind is active per scope; `cancel`
//! is optimistic-local with best-effort backend notification.

use std::sync::Arc;

use atelier_core::{
    BridgeError, EngineError, Job, JobId, JobKind, JobStatus, PollConfig, Progress, ScopeCounter,
    ScopeToken,
};
use atelier_events::PushEvent;
use chrono::Utc;
use futures::FutureExt;

use crate::bridge::{JobBridge, StartedJob};
use crate::poll::PollLoop;
use crate::singleflight::{Policy, SingleFlight};
use crate::tracker::{ApplyOutcome, CompletionHook, JobTracker, JobUpdate};

pub struct Reconciler {
    kind: JobKind,
    bridge: Arc<dyn JobBridge>,
    scope: Arc<ScopeCounter>,
    tracker: Arc<JobTracker>,
    flights: SingleFlight<Result<StartedJob, BridgeError>>,
    polls: Arc<PollLoop>,
    poll_config: PollConfig,
}

impl Reconciler {
    pub fn new(
        kind: JobKind,
        bridge: Arc<dyn JobBridge>,
        scope: Arc<ScopeCounter>,
        polls: Arc<PollLoop>,
        poll_config: PollConfig,
        completion_hook: Option<CompletionHook>,
    ) -> Self {
        let mut tracker = JobTracker::new(kind, Arc::clone(&scope));
        if let Some(hook) = completion_hook {
            tracker = tracker.with_completion_hook(hook);
        }
        Self {
            kind,
            bridge,
            scope,
            tracker: Arc::new(tracker),
            flights: SingleFlight::new(),
            polls,
            poll_config,
        }
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    /// Read-only snapshot of the kind's current job, if any.
    pub fn snapshot(&self) -> Option<Job> {
        self.tracker.snapshot()
    }

    /// Start a job of this kind.
    ///
    /// Rejects with [`EngineError::JobAlreadyActive`] while a job of the
    /// kind is active in the current scope: no queuing, no second
    /// record. The tracked record appears as `Pending` as soon as the
    /// backend accepts the intent; short jobs may come back already
    /// terminal.
    pub async fn start(&self, params: serde_json::Value) -> Result<JobId, EngineError> {
        let token = self.scope.current();

        if let Some(active) = self.tracker.active_job() {
            tracing::debug!(
                kind = %self.kind,
                job_id = %active.id,
                "Rejecting start: a job of this kind is already active",
            );
            return Err(EngineError::JobAlreadyActive { kind: self.kind });
        }

        let key = format!("start:{}:{}", self.kind, token);
        let bridge = Arc::clone(&self.bridge);
        let kind = self.kind;
        let start_params = params.clone();
        let started = self
            .flights
            .run(&key, Policy::Reject, move || {
                async move { bridge.start_job(kind, start_params).await }.boxed()
            })
            .await
            .map_err(|_| EngineError::JobAlreadyActive { kind: self.kind })?
            .map_err(EngineError::from)?;

        // The user may have switched context while the call was in
        // flight; the accepted job belongs to the dead scope.
        if !self.scope.is_current(token) {
            tracing::debug!(
                kind = %self.kind,
                job_id = %started.job_id,
                "Scope changed while starting job, discarding result",
            );
            self.cancel_backend_best_effort(started.job_id);
            return Err(EngineError::StaleScope);
        }

        self.tracker.begin(Job {
            id: started.job_id,
            kind: self.kind,
            scope: token,
            status: JobStatus::Pending,
            progress: Progress::default(),
            payload: params,
            created_at: started.timestamp,
            last_updated_at: started.timestamp,
            error: None,
        });

        // Short jobs can come back Running or even terminal.
        if started.status != JobStatus::Pending {
            self.tracker.apply(&JobUpdate {
                job_id: started.job_id,
                scope: token,
                status: started.status,
                progress: None,
                payload: None,
                error: started.error.clone(),
                timestamp: started.timestamp,
            });
        }

        if started.status == JobStatus::Failed {
            let message = started
                .error
                .unwrap_or_else(|| "backend reported failure".to_string());
            tracing::warn!(
                kind = %self.kind,
                job_id = %started.job_id,
                error = %message,
                "Job failed on start",
            );
            return Err(EngineError::JobFailed { message });
        }

        if !started.status.is_terminal() {
            self.spawn_poll(started.job_id, token);
        }

        tracing::info!(
            kind = %self.kind,
            job_id = %started.job_id,
            status = %started.status,
            "Job started",
        );
        Ok(started.job_id)
    }

    /// Cancel a tracked job.
    ///
    /// Applies `Cancelled` locally first; the backend is notified
    /// best-effort. If the backend later reports a different terminal
    /// state, the sticky-terminal rule keeps whichever was applied
    /// first.
    pub fn cancel(&self, job_id: JobId) -> Result<(), EngineError> {
        let job = self
            .tracker
            .snapshot()
            .filter(|j| j.id == job_id)
            .ok_or(EngineError::UnknownJob(job_id))?;

        // Server timestamps may run ahead of the local clock; never let
        // the optimistic cancel lose to a stale-timestamp check.
        let timestamp = job.last_updated_at.max(Utc::now());
        let outcome = self.tracker.apply(&JobUpdate {
            job_id,
            scope: job.scope,
            status: JobStatus::Cancelled,
            progress: None,
            payload: None,
            error: None,
            timestamp,
        });

        self.polls.stop(&self.poll_key());
        self.cancel_backend_best_effort(job_id);

        tracing::info!(
            kind = %self.kind,
            job_id = %job_id,
            outcome = ?outcome,
            "Cancel applied locally",
        );
        Ok(())
    }

    /// Pause a running job. Only kinds with pause support.
    pub async fn pause(&self, job_id: JobId) -> Result<(), EngineError> {
        self.pause_transition(job_id, JobStatus::Paused).await
    }

    /// Resume a paused job. Only kinds with pause support.
    pub async fn resume(&self, job_id: JobId) -> Result<(), EngineError> {
        self.pause_transition(job_id, JobStatus::Running).await
    }

    async fn pause_transition(&self, job_id: JobId, target: JobStatus) -> Result<(), EngineError> {
        if !self.kind.supports_pause() {
            return Err(EngineError::PauseUnsupported { kind: self.kind });
        }
        let job = self
            .tracker
            .active_job()
            .filter(|j| j.id == job_id)
            .ok_or(EngineError::UnknownJob(job_id))?;

        match target {
            JobStatus::Paused => self.bridge.pause_job(job_id).await?,
            _ => self.bridge.resume_job(job_id).await?,
        }

        let timestamp = job.last_updated_at.max(Utc::now());
        self.tracker.apply(&JobUpdate {
            job_id,
            scope: job.scope,
            status: target,
            progress: None,
            payload: None,
            error: None,
            timestamp,
        });
        Ok(())
    }

    /// Drop a terminal record the user dismissed.
    pub fn dismiss(&self, job_id: JobId) -> Result<(), EngineError> {
        let job = self
            .tracker
            .snapshot()
            .filter(|j| j.id == job_id)
            .ok_or(EngineError::UnknownJob(job_id))?;
        if !job.status.is_terminal() {
            // Active jobs are cancelled, not dismissed.
            return Err(EngineError::JobAlreadyActive { kind: self.kind });
        }
        self.tracker.clear();
        Ok(())
    }

    /// Route a push event to the tracker if it concerns our job.
    /// Terminal events also stop the poll loop.
    pub fn handle_push(&self, event: &PushEvent) {
        let Some(job) = self.tracker.snapshot() else {
            return;
        };
        if job.id != event.job_id() {
            return;
        }

        let update = JobUpdate::from_push(event, job.scope);
        let outcome = self.tracker.apply(&update);
        if outcome == ApplyOutcome::Applied && update.status.is_terminal() {
            self.polls.stop(&self.poll_key());
        }
    }

    /// Query the backend's authoritative view once and install it.
    /// Called on mount before trusting an `idle` tracker.
    pub async fn hydrate(&self) -> Result<(), EngineError> {
        let token = self.scope.current();
        if let Some(report) = self.bridge.active_job(self.kind).await? {
            let outcome = self.tracker.hydrate(&report, token);
            if outcome == ApplyOutcome::Applied && !report.status.is_terminal() {
                self.spawn_poll(report.job_id, token);
            }
        }
        Ok(())
    }

    /// Scope teardown: best-effort backend cancel of the active job,
    /// stop local polling, drop the record. Failures are swallowed;
    /// the backend job may legitimately continue unobserved.
    pub fn teardown(&self) {
        if let Some(job) = self.tracker.snapshot() {
            if !job.status.is_terminal() {
                self.cancel_backend_best_effort(job.id);
            }
        }
        self.polls.stop(&self.poll_key());
        self.tracker.clear();
    }

    fn poll_key(&self) -> String {
        format!("poll:{}", self.kind)
    }

    fn spawn_poll(&self, job_id: JobId, token: ScopeToken) {
        let bridge = Arc::clone(&self.bridge);
        let tracker = Arc::clone(&self.tracker);
        self.polls.start(
            &self.poll_key(),
            self.poll_config.clone(),
            move || {
                let bridge = Arc::clone(&bridge);
                let tracker = Arc::clone(&tracker);
                async move {
                    let report = bridge.job_status(job_id).await?;
                    tracker.apply(&JobUpdate::from_report(&report, token));
                    Ok::<JobStatus, BridgeError>(report.status)
                }
            },
            |status: &JobStatus| status.is_terminal(),
        );
    }

    fn cancel_backend_best_effort(&self, job_id: JobId) {
        let bridge = Arc::clone(&self.bridge);
        let kind = self.kind;
        tokio::spawn(async move {
            if let Err(e) = bridge.cancel_job(job_id).await {
                tracing::warn!(
                    kind = %kind,
                    job_id = %job_id,
                    error = %e,
                    "Best-effort cancel failed",
                );
            }
        });
    }
}
