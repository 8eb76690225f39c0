//! Engine - the public surface: producers, dashboards and operators.
//!
//! `Engine` is a cheap handle (`Arc` inside). It owns every collaborator it
//! needs; nothing is global. Workers and the reaper share the same inner
//! state through [`Worker`] and [`Reaper`].

use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use super::reaper_loop::Reaper;
use super::status::{HealthReport, KindHealth, RunStatus};
use super::worker_group::WorkerGroup;
use super::worker_loop::Worker;
use crate::config::EngineConfig;
use crate::domain::{
    ActionKind, AuditEntry, ClassifiedError, DeadLetterRecord, Decider, DefaultDecider,
    DomainEvent, EnqueueRequest, Job, JobId, NewJob, QueueStats, ResourceKey, ResourceStats,
};
use crate::error::EngineError;
use crate::impls::BroadcastEventSink;
use crate::ports::{
    AuditLog, Clock, DeadLetterSink, EventSink, JobStore, RateLimiter, StoreError,
};
use crate::typed::{Action, HandlerRegistry};

/// Shared state behind [`Engine`].
pub(crate) struct EngineInner {
    pub(crate) config: EngineConfig,
    pub(crate) store: Arc<dyn JobStore>,
    pub(crate) audit: Arc<dyn AuditLog>,
    pub(crate) dead_letters: Arc<dyn DeadLetterSink>,
    pub(crate) limiter: Arc<dyn RateLimiter>,
    pub(crate) events: Arc<dyn EventSink>,
    pub(crate) status_feed: BroadcastEventSink,
    pub(crate) registry: Arc<HandlerRegistry>,
    pub(crate) decider: Option<Arc<dyn Decider>>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) paused: RwLock<HashSet<ActionKind>>,
    pub(crate) started: AtomicBool,
}

impl EngineInner {
    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub(crate) fn is_paused(&self, kind: &ActionKind) -> bool {
        self.paused
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains(kind)
    }

    /// Decider for `kind`: the injected one, or backoff from the kind's config.
    pub(crate) fn decider_for(&self, kind: &ActionKind) -> Arc<dyn Decider> {
        match &self.decider {
            Some(decider) => Arc::clone(decider),
            None => Arc::new(DefaultDecider::new(self.config.kind(kind).retry.clone())),
        }
    }

    pub(crate) async fn emit(&self, event: DomainEvent) {
        self.events.emit(event).await;
    }

    /// Run a store call until it succeeds or fails for a reason retrying
    /// cannot fix.
    pub(crate) async fn with_store_retry<T, F, Fut>(&self, op_name: &'static str, mut op: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut failures: u32 = 0;
        loop {
            match op().await {
                Err(e) if e.is_transient() => {
                    failures = failures.saturating_add(1);
                    tracing::warn!(op = op_name, failures, error = %e, "store unavailable, retrying");
                    tokio::time::sleep(self.config.store_retry_pause()).await;
                }
                other => return other,
            }
        }
    }

    /// File the dead-letter record of `job` and raise the alert event.
    ///
    /// Called after the store has moved the job to `dead-letter`, so the
    /// history already contains the final audit entry.
    pub(crate) async fn quarantine(&self, job: &Job, error: &ClassifiedError) -> Result<(), StoreError> {
        let history = self
            .with_store_retry("audit_entries", || self.audit.entries_for(job.id))
            .await?;
        let record = DeadLetterRecord::from_job(job, error.clone(), history);
        let inserted = self
            .with_store_retry("dead_letter_insert", || self.dead_letters.insert(record.clone()))
            .await?;
        if !inserted {
            tracing::debug!(job_id = %job.id, "dead-letter record already present");
        }

        self.emit(DomainEvent::DeadLettered {
            job_id: job.id,
            kind: job.kind.clone(),
            attempt: job.attempt,
            class: error.class,
            reason: error.message.clone(),
        })
        .await;
        Ok(())
    }

    async fn enqueue(&self, req: EnqueueRequest) -> Result<JobId, EngineError> {
        // no worker would ever claim it
        if !self.registry.contains(&req.kind) {
            return Err(EngineError::UnknownKind(req.kind));
        }
        let kind_config = self.config.kind(&req.kind);
        let now = self.now();

        let due_at = match (req.due_at, &kind_config.pacing) {
            (Some(due_at), _) => due_at,
            (None, None) => now,
            (None, Some(pacing)) => {
                let anchor = self.store.latest_due_at(&req.kind, &req.resource_key).await?;
                // ThreadRng は Send ではないので await を跨がない
                let mut rng = rand::thread_rng();
                pacing.next_due(now, anchor, &mut rng)
            }
        };

        let new_job = NewJob {
            kind: req.kind,
            payload: req.payload,
            resource_key: req.resource_key,
            due_at: Some(due_at),
            idempotency_key: req.idempotency_key,
            max_attempts: req.max_attempts.unwrap_or(kind_config.max_attempts).max(1),
        };
        let kind = new_job.kind.clone();
        let resource_key = new_job.resource_key.clone();

        let enqueued = self.store.enqueue(new_job).await?;
        if enqueued.duplicate {
            tracing::debug!(job_id = %enqueued.job_id, kind = %kind, "idempotency key already live");
            return Ok(enqueued.job_id);
        }

        tracing::info!(job_id = %enqueued.job_id, kind = %kind, resource_key = %resource_key, due_at = %due_at, "job enqueued");
        self.emit(DomainEvent::Enqueued {
            job_id: enqueued.job_id,
            kind,
            resource_key,
            due_at,
        })
        .await;
        Ok(enqueued.job_id)
    }
}

/// The delivery engine.
///
/// # 使用例
/// ```ignore
/// let engine = EngineBuilder::new()
///     .config(EngineConfig::with_presets())
///     .register::<WebhookDelivery, _>(WebhookHandler::new(client))?
///     .expect_kinds(&[ActionKind::WEBHOOK_DELIVERY])
///     .build()?;
///
/// let handle = engine.start()?;
/// engine.enqueue_action(&delivery, "endpoint-42").await?;
/// handle.shutdown_and_join().await;
/// ```
#[derive(Clone)]
pub struct Engine {
    pub(crate) inner: Arc<EngineInner>,
}

impl Engine {
    pub(crate) fn from_inner(inner: EngineInner) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.inner.registry
    }

    /// Enqueue a job. With a live idempotency key the existing job's id is
    /// returned and nothing is created. Kinds without a registered handler are
    /// rejected with [`EngineError::UnknownKind`].
    ///
    /// Without `due_at`, kinds with pacing are spaced after the latest queued
    /// job of the same resource; other kinds are due immediately.
    pub async fn enqueue(&self, req: EnqueueRequest) -> Result<JobId, EngineError> {
        self.inner.enqueue(req).await
    }

    /// Typed enqueue: kind from `A::KIND`, payload from `action`.
    pub async fn enqueue_action<A: Action>(
        &self,
        action: &A,
        resource_key: impl Into<ResourceKey>,
    ) -> Result<JobId, EngineError> {
        let payload = serde_json::to_value(action)?;
        self.enqueue(EnqueueRequest::new(A::KIND, payload, resource_key))
            .await
    }

    pub async fn queue_stats(&self, kind: Option<&ActionKind>) -> Result<QueueStats, EngineError> {
        Ok(self.inner.store.queue_stats(kind).await?)
    }

    pub async fn resource_stats(&self, resource_key: &ResourceKey) -> Result<ResourceStats, EngineError> {
        Ok(self.inner.store.resource_stats(resource_key).await?)
    }

    pub async fn job(&self, job_id: JobId) -> Result<Option<Job>, EngineError> {
        Ok(self.inner.store.get(job_id).await?)
    }

    /// Audit entries of a job, oldest first.
    pub async fn audit_trail(&self, job_id: JobId) -> Result<Vec<AuditEntry>, EngineError> {
        Ok(self.inner.audit.entries_for(job_id).await?)
    }

    pub async fn dead_letters(&self, kind: Option<&ActionKind>) -> Result<Vec<DeadLetterRecord>, EngineError> {
        Ok(self.inner.dead_letters.list(kind).await?)
    }

    pub async fn dead_letter(&self, job_id: JobId) -> Result<Option<DeadLetterRecord>, EngineError> {
        Ok(self.inner.dead_letters.get(job_id).await?)
    }

    /// Live feed of domain events.
    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.inner.status_feed.subscribe()
    }

    /// Enqueue a fresh job from a dead-letter record: same kind, payload,
    /// resource and idempotency key, back at attempt 1 and due now. The
    /// dead-lettered job itself stays terminal.
    pub async fn requeue_dead_letter(&self, job_id: JobId) -> Result<JobId, EngineError> {
        let record = self
            .inner
            .dead_letters
            .get(job_id)
            .await?
            .ok_or(EngineError::DeadLetterNotFound(job_id))?;

        let mut req = EnqueueRequest::new(record.kind, record.payload, record.resource_key)
            .due_at(self.inner.now())
            .max_attempts(record.max_attempts);
        req.idempotency_key = record.idempotency_key;

        let new_id = self.enqueue(req).await?;
        tracing::info!(job_id = %new_id, from = %job_id, "dead letter requeued");
        Ok(new_id)
    }

    /// Operator override: dead-letter a non-terminal job now, revoking any
    /// lease a worker holds on it.
    pub async fn mark_dead_letter(&self, job_id: JobId, reason: ClassifiedError) -> Result<Job, EngineError> {
        let job = self.inner.store.mark_dead_letter(job_id, reason.clone()).await?;
        tracing::warn!(job_id = %job_id, kind = %job.kind, reason = %reason, "job dead-lettered by operator");
        self.inner.quarantine(&job, &reason).await?;
        Ok(job)
    }

    /// Workers of `kind` stop claiming until `resume`. In-flight jobs finish.
    pub fn pause(&self, kind: &ActionKind) {
        self.inner
            .paused
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(kind.clone());
        tracing::info!(kind = %kind, "kind paused");
    }

    pub fn resume(&self, kind: &ActionKind) {
        self.inner
            .paused
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(kind);
        tracing::info!(kind = %kind, "kind resumed");
    }

    pub fn is_paused(&self, kind: &ActionKind) -> bool {
        self.inner.is_paused(kind)
    }

    pub async fn health(&self) -> HealthReport {
        let kinds = self.inner.registry.kinds();
        let mut healthy = true;

        let queue_stats = match self.inner.store.queue_stats(None).await {
            Ok(stats) => stats,
            Err(e) => {
                tracing::warn!(error = %e, "health check could not reach the job store");
                healthy = false;
                QueueStats::default()
            }
        };

        let mut per_kind = Vec::with_capacity(kinds.len());
        for kind in kinds {
            let queue = if healthy {
                self.inner.store.queue_stats(Some(&kind)).await.unwrap_or_default()
            } else {
                QueueStats::default()
            };
            per_kind.push(KindHealth {
                paused: self.inner.is_paused(&kind),
                concurrency: self.inner.config.kind(&kind).concurrency,
                queue,
                kind,
            });
        }

        let all_paused = !per_kind.is_empty() && per_kind.iter().all(|k| k.paused);
        HealthReport {
            healthy,
            status: if all_paused {
                RunStatus::Paused
            } else {
                RunStatus::Running
            },
            started: self.inner.started.load(Ordering::SeqCst),
            kinds: per_kind,
            queue_stats,
        }
    }

    /// A worker of `kind` for stepping by hand with `run_once`.
    pub fn worker(&self, kind: impl Into<ActionKind>) -> Worker {
        Worker::new(Arc::clone(&self.inner), kind.into(), 0)
    }

    pub fn reaper(&self) -> Reaper {
        Reaper::new(Arc::clone(&self.inner))
    }

    /// Spawn `concurrency` workers per registered kind plus the reaper.
    pub fn start(&self) -> Result<EngineHandle, EngineError> {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            return Err(EngineError::AlreadyStarted);
        }

        let mut group = WorkerGroup::new();
        for kind in self.inner.registry.kinds() {
            let concurrency = self.inner.config.kind(&kind).concurrency;
            for worker_id in 0..concurrency {
                let worker = Worker::new(Arc::clone(&self.inner), kind.clone(), worker_id);
                group.spawn(move |rx| worker.run(rx));
            }
            tracing::info!(kind = %kind, concurrency, "workers started");
        }
        let reaper = self.reaper();
        group.spawn(move |rx| reaper.run(rx));

        Ok(EngineHandle {
            group,
            engine: self.clone(),
        })
    }
}

/// Running workers. Dropping the handle leaves them running.
pub struct EngineHandle {
    group: WorkerGroup,
    engine: Engine,
}

impl EngineHandle {
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn task_count(&self) -> usize {
        self.group.len()
    }

    pub fn request_shutdown(&self) {
        self.group.request_shutdown();
    }

    /// Stop claiming, let in-flight jobs finish, and wait for every loop.
    pub async fn shutdown_and_join(self) {
        self.group.shutdown_and_join().await;
        self.engine.inner.started.store(false, Ordering::SeqCst);
        tracing::info!("engine stopped");
    }
}
