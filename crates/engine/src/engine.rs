//! Engine composition root.
//!
//! Owns the event bus, the scope counter, the poll loops and one
//! [`Reconciler`] per job kind. Push payloads enter through
//! [`Engine::ingest`], which validates them into the closed event union
//! before anything else sees them.

use std::collections::HashMap;
use std::sync::Arc;

use atelier_core::{EngineError, Job, JobId, JobKind, PollConfig, ScopeCounter, ScopeToken};
use atelier_events::{parse_push, EventBus, EventKind};

use crate::bridge::JobBridge;
use crate::poll::PollLoop;
use crate::reconciler::Reconciler;
use crate::tracker::CompletionHook;

/// Engine-wide configuration.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub poll: PollConfig,
}

impl EngineConfig {
    /// Read poll timing overrides from the environment, falling back to
    /// the defaults.
    pub fn from_env() -> Self {
        Self {
            poll: PollConfig::from_env(),
        }
    }
}

/// One engine per client session, shared via `Arc`.
pub struct Engine {
    bus: Arc<EventBus>,
    scope: Arc<ScopeCounter>,
    polls: Arc<PollLoop>,
    reconcilers: HashMap<JobKind, Arc<Reconciler>>,
}

impl Engine {
    pub fn new(bridge: Arc<dyn JobBridge>, config: EngineConfig) -> Arc<Self> {
        Self::with_hooks(bridge, config, HashMap::new())
    }

    /// Build an engine with kind-specific completion side effects (data
    /// refresh, success notification). Each hook runs exactly once per
    /// completed job.
    pub fn with_hooks(
        bridge: Arc<dyn JobBridge>,
        config: EngineConfig,
        mut hooks: HashMap<JobKind, CompletionHook>,
    ) -> Arc<Self> {
        let bus = Arc::new(EventBus::new());
        let scope = Arc::new(ScopeCounter::new());
        let polls = Arc::new(PollLoop::new());

        let mut reconcilers = HashMap::new();
        for kind in JobKind::ALL {
            let reconciler = Arc::new(Reconciler::new(
                kind,
                Arc::clone(&bridge),
                Arc::clone(&scope),
                Arc::clone(&polls),
                config.poll.clone(),
                hooks.remove(&kind),
            ));
            reconcilers.insert(kind, reconciler);
        }

        // Every push event fans out to all reconcilers; each applies it
        // only if the correlation id matches its tracked job.
        for kind in EventKind::ALL {
            let recipients: Vec<Arc<Reconciler>> = reconcilers.values().cloned().collect();
            bus.subscribe(kind, move |event| {
                for reconciler in &recipients {
                    reconciler.handle_push(event);
                }
                Ok(())
            });
        }

        Arc::new(Self {
            bus,
            scope,
            polls,
            reconcilers,
        })
    }

    /// The bus, for UI collaborators that want live-update
    /// subscriptions.
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// The token of the active context.
    pub fn current_scope(&self) -> ScopeToken {
        self.scope.current()
    }

    /// Boundary for raw push payloads from the transport. Unknown or
    /// malformed payloads are logged and dropped; the hydration poll
    /// recovers anything missed.
    pub fn ingest(&self, raw: &str) {
        match parse_push(raw) {
            Ok(event) => self.bus.publish(event),
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring unrecognized push payload");
            }
        }
    }

    /// Start a job of `kind` in the current scope.
    pub async fn start(
        &self,
        kind: JobKind,
        params: serde_json::Value,
    ) -> Result<JobId, EngineError> {
        self.reconciler(kind).start(params).await
    }

    /// Cancel a tracked job, whichever kind it belongs to.
    pub fn cancel(&self, job_id: JobId) -> Result<(), EngineError> {
        self.find_by_job(job_id)?.cancel(job_id)
    }

    pub async fn pause(&self, job_id: JobId) -> Result<(), EngineError> {
        self.find_by_job(job_id)?.pause(job_id).await
    }

    pub async fn resume(&self, job_id: JobId) -> Result<(), EngineError> {
        self.find_by_job(job_id)?.resume(job_id).await
    }

    /// Drop a terminal record the user dismissed.
    pub fn dismiss(&self, job_id: JobId) -> Result<(), EngineError> {
        self.find_by_job(job_id)?.dismiss(job_id)
    }

    /// Read-only snapshot for one kind.
    pub fn snapshot(&self, kind: JobKind) -> Option<Job> {
        self.reconciler(kind).snapshot()
    }

    /// Read-only snapshots grouped by kind. Kinds without a record are
    /// absent.
    pub fn snapshots(&self) -> HashMap<JobKind, Job> {
        self.reconcilers
            .iter()
            .filter_map(|(kind, reconciler)| reconciler.snapshot().map(|job| (*kind, job)))
            .collect()
    }

    /// Query the backend's authoritative view for every kind. Called on
    /// mount and after reconnects; transient failures are logged, the
    /// poll loops remain the safety net.
    pub async fn hydrate_all(&self) {
        for reconciler in self.reconcilers.values() {
            if let Err(e) = reconciler.hydrate().await {
                tracing::warn!(
                    kind = %reconciler.kind(),
                    error = %e,
                    "Hydration query failed",
                );
            }
        }
    }

    /// Switch to a new context (brand/session).
    ///
    /// Mints the new token exactly once, then tears down every tracker,
    /// poll loop and cache tied to the previous one. Teardown failures
    /// are swallowed: the backend jobs may legitimately continue
    /// unobserved.
    pub fn switch_scope(&self) -> ScopeToken {
        let token = self.scope.advance();
        tracing::info!(scope = %token, "Switching scope");

        for reconciler in self.reconcilers.values() {
            reconciler.teardown();
        }
        self.bus.clear_latest();
        token
    }

    /// Stop all background polling. Called once when the client shuts
    /// down.
    pub fn shutdown(&self) {
        self.polls.shutdown();
    }

    fn reconciler(&self, kind: JobKind) -> &Reconciler {
        // The constructor registers a reconciler for every kind.
        &self.reconcilers[&kind]
    }

    fn find_by_job(&self, job_id: JobId) -> Result<&Reconciler, EngineError> {
        self.reconcilers
            .values()
            .find(|reconciler| {
                reconciler
                    .snapshot()
                    .is_some_and(|job| job.id == job_id)
            })
            .map(|reconciler| reconciler.as_ref())
            .ok_or(EngineError::UnknownJob(job_id))
    }
}
