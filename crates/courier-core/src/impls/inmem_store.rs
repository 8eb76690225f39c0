//! InMemoryJobStore - 開発・テスト用の正本
//!
//! All state sits behind one `tokio::sync::Mutex`, so every operation is a
//! single critical section: a claim selects and flips the job in one step,
//! and a report checks the lease and applies the transition in one step.
//! Audit entries are appended inside the same section.
//!
//! Claimable jobs are kept in a per-kind `BTreeSet<ReadyKey>`; a claim walks
//! it in ready order and stops at the first entry that is not yet due.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::app::scheduler::{DEFAULT_PRIORITY_CAP, ReadyKey};
use crate::domain::{
    ActionKind, AttemptOutcome, AuditEntry, ClassifiedError, Job, JobId, JobStatus, NewJob,
    QueueStats, ResourceKey, ResourceStats,
};
use crate::impls::InMemoryAuditLog;
use crate::ports::{
    ClaimFilter, Clock, Enqueued, IdGenerator, JobStore, Lease, StoreError, Transition,
};

#[derive(Default)]
struct StoreState {
    jobs: HashMap<JobId, Job>,

    /// Claimable jobs (due or not) per kind, in ready order.
    ready: HashMap<ActionKind, BTreeSet<ReadyKey>>,

    /// `(kind, idempotency_key)` -> most recent job holding the key.
    idempotency: HashMap<(ActionKind, String), JobId>,
}

impl StoreState {
    fn index(&mut self, job: &Job, cap: u32) {
        if job.status.is_claimable() {
            self.ready
                .entry(job.kind.clone())
                .or_default()
                .insert(ReadyKey::of(job, cap));
        }
    }

    fn unindex(&mut self, kind: &ActionKind, key: &ReadyKey) {
        if let Some(set) = self.ready.get_mut(kind) {
            set.remove(key);
        }
    }

    /// First due key in `kind`'s index that passes `filter`.
    fn first_ready(
        &self,
        kind: &ActionKind,
        filter: &ClaimFilter,
        now: DateTime<Utc>,
    ) -> Option<ReadyKey> {
        let set = self.ready.get(kind)?;
        set.iter()
            .take_while(|key| key.is_due(now))
            .find(|key| {
                self.jobs
                    .get(&key.job_id)
                    .is_some_and(|job| filter.matches(job))
            })
            .copied()
    }

    fn live_duplicate(&self, new_job: &NewJob) -> Option<JobId> {
        let key = new_job.idempotency_key.as_ref()?;
        let id = self.idempotency.get(&(new_job.kind.clone(), key.clone()))?;
        self.jobs
            .get(id)
            .filter(|job| !job.status.is_terminal())
            .map(|job| job.id)
    }
}

/// In-process [`JobStore`].
///
/// `set_available(false)` makes every call fail with
/// `StoreError::Unavailable`, for exercising the workers' retry paths.
pub struct InMemoryJobStore {
    state: Mutex<StoreState>,
    audit: Arc<InMemoryAuditLog>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    priority_cap: u32,
    available: AtomicBool,
}

impl InMemoryJobStore {
    pub fn new(clock: Arc<dyn Clock>, ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
            audit: Arc::new(InMemoryAuditLog::new()),
            clock,
            ids,
            priority_cap: DEFAULT_PRIORITY_CAP,
            available: AtomicBool::new(true),
        }
    }

    pub fn with_priority_cap(mut self, cap: u32) -> Self {
        self.priority_cap = cap;
        self
    }

    /// Share an audit log with the rest of the engine.
    pub fn with_audit_log(mut self, audit: Arc<InMemoryAuditLog>) -> Self {
        self.audit = audit;
        self
    }

    pub fn audit_log(&self) -> Arc<InMemoryAuditLog> {
        Arc::clone(&self.audit)
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("in-memory store switched off".into()))
        }
    }

    fn audit(
        &self,
        job: &Job,
        attempt: u32,
        outcome: AttemptOutcome,
        error: Option<&ClassifiedError>,
        at: DateTime<Utc>,
    ) {
        self.audit.record(AuditEntry::new(
            self.ids.generate_audit_id(),
            job,
            attempt,
            outcome,
            error,
            at,
        ));
    }

    /// Look up the job and check that `lease` still holds it.
    fn held_mut<'a>(state: &'a mut StoreState, lease: &Lease) -> Result<&'a mut Job, StoreError> {
        let job_id = lease.job_id();
        let job = state
            .jobs
            .get_mut(&job_id)
            .ok_or(StoreError::NotFound(job_id))?;
        if !job.is_held_by(lease.lease_id, lease.attempt()) {
            return Err(StoreError::Conflict {
                job_id,
                reason: format!(
                    "{} at attempt {} no longer holds the job (status {}, attempt {})",
                    lease.lease_id,
                    lease.attempt(),
                    job.status,
                    job.attempt
                ),
            });
        }
        Ok(job)
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn enqueue(&self, new_job: NewJob) -> Result<Enqueued, StoreError> {
        self.ensure_available()?;
        let now = self.clock.now();
        let mut state = self.state.lock().await;

        if let Some(job_id) = state.live_duplicate(&new_job) {
            return Ok(Enqueued {
                job_id,
                duplicate: true,
            });
        }

        let job = Job::new(self.ids.generate_job_id(), new_job, now);
        let job_id = job.id;
        if let Some(key) = &job.idempotency_key {
            // 終端状態の保持者はキーを手放す
            state
                .idempotency
                .insert((job.kind.clone(), key.clone()), job_id);
        }
        state.index(&job, self.priority_cap);
        state.jobs.insert(job_id, job);

        Ok(Enqueued {
            job_id,
            duplicate: false,
        })
    }

    async fn claim_next(&self, filter: &ClaimFilter) -> Result<Option<Lease>, StoreError> {
        self.ensure_available()?;
        let now = self.clock.now();
        let mut state = self.state.lock().await;

        let key = match &filter.kind {
            Some(kind) => state.first_ready(kind, filter, now).map(|k| (kind.clone(), k)),
            None => state
                .ready
                .keys()
                .filter_map(|kind| state.first_ready(kind, filter, now).map(|k| (kind.clone(), k)))
                .min_by_key(|(_, k)| *k),
        };
        let Some((kind, key)) = key else {
            return Ok(None);
        };

        state.unindex(&kind, &key);
        let lease_id = self.ids.generate_lease_id();
        let job = state
            .jobs
            .get_mut(&key.job_id)
            .ok_or(StoreError::NotFound(key.job_id))?;
        job.start(lease_id, now)
            .map_err(|source| StoreError::InvalidTransition {
                job_id: key.job_id,
                source,
            })?;

        Ok(Some(Lease {
            lease_id,
            job: job.clone(),
        }))
    }

    async fn report_outcome(&self, lease: &Lease, transition: Transition) -> Result<Job, StoreError> {
        self.ensure_available()?;
        let now = self.clock.now();
        let mut state = self.state.lock().await;

        let job = Self::held_mut(&mut state, lease)?;
        let job_id = job.id;
        let attempt = job.attempt;
        let invalid = |source| StoreError::InvalidTransition { job_id, source };

        let (outcome, error) = match transition {
            Transition::Succeeded => {
                job.mark_succeeded(now).map_err(invalid)?;
                (AttemptOutcome::Succeeded, None)
            }
            Transition::Retry { error, due_at } => {
                job.schedule_retry(due_at, error.clone(), now)
                    .map_err(invalid)?;
                (AttemptOutcome::Failed, Some(error))
            }
            Transition::DeadLetter { error } => {
                job.mark_dead(error.clone(), now).map_err(invalid)?;
                (AttemptOutcome::DeadLettered, Some(error))
            }
        };

        let snapshot = job.clone();
        state.index(&snapshot, self.priority_cap);
        self.audit(&snapshot, attempt, outcome, error.as_ref(), now);
        Ok(snapshot)
    }

    async fn defer(&self, lease: &Lease, until: DateTime<Utc>) -> Result<Job, StoreError> {
        self.ensure_available()?;
        let now = self.clock.now();
        let mut state = self.state.lock().await;

        let job = Self::held_mut(&mut state, lease)?;
        let job_id = job.id;
        job.defer(until, now)
            .map_err(|source| StoreError::InvalidTransition { job_id, source })?;

        let snapshot = job.clone();
        state.index(&snapshot, self.priority_cap);
        let reason = ClassifiedError::rate_limited(format!("throttled until {until}"));
        self.audit(&snapshot, snapshot.attempt, AttemptOutcome::Throttled, Some(&reason), now);
        Ok(snapshot)
    }

    async fn mark_dead_letter(&self, job_id: JobId, reason: ClassifiedError) -> Result<Job, StoreError> {
        self.ensure_available()?;
        let now = self.clock.now();
        let mut state = self.state.lock().await;

        let job = state
            .jobs
            .get_mut(&job_id)
            .ok_or(StoreError::NotFound(job_id))?;
        let previous = job.status.is_claimable().then(|| ReadyKey::of(job, self.priority_cap));
        job.mark_dead(reason.clone(), now)
            .map_err(|source| StoreError::InvalidTransition { job_id, source })?;

        let snapshot = job.clone();
        if let Some(key) = previous {
            state.unindex(&snapshot.kind, &key);
        }
        self.audit(&snapshot, snapshot.attempt, AttemptOutcome::DeadLettered, Some(&reason), now);
        Ok(snapshot)
    }

    async fn reclaim_stale(
        &self,
        kind: &ActionKind,
        claimed_before: DateTime<Utc>,
    ) -> Result<Vec<Job>, StoreError> {
        self.ensure_available()?;
        let now = self.clock.now();
        let mut state = self.state.lock().await;

        let stale: Vec<JobId> = state
            .jobs
            .values()
            .filter(|job| {
                job.kind == *kind
                    && job.status == JobStatus::Active
                    && job.claimed_at.is_some_and(|at| at < claimed_before)
            })
            .map(|job| job.id)
            .collect();

        let mut reclaimed = Vec::with_capacity(stale.len());
        for job_id in stale {
            let Some(job) = state.jobs.get_mut(&job_id) else {
                continue;
            };
            job.reclaim(now)
                .map_err(|source| StoreError::InvalidTransition { job_id, source })?;
            let snapshot = job.clone();
            state.index(&snapshot, self.priority_cap);
            let reason = ClassifiedError::timeout("lease went stale");
            self.audit(&snapshot, snapshot.attempt, AttemptOutcome::Reclaimed, Some(&reason), now);
            reclaimed.push(snapshot);
        }
        Ok(reclaimed)
    }

    async fn get(&self, job_id: JobId) -> Result<Option<Job>, StoreError> {
        self.ensure_available()?;
        Ok(self.state.lock().await.jobs.get(&job_id).cloned())
    }

    async fn latest_due_at(
        &self,
        kind: &ActionKind,
        resource_key: &ResourceKey,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        self.ensure_available()?;
        let state = self.state.lock().await;
        Ok(state
            .jobs
            .values()
            .filter(|job| {
                job.kind == *kind && job.resource_key == *resource_key && !job.status.is_terminal()
            })
            .map(|job| job.due_at)
            .max())
    }

    async fn queue_stats(&self, kind: Option<&ActionKind>) -> Result<QueueStats, StoreError> {
        self.ensure_available()?;
        let now = self.clock.now();
        let state = self.state.lock().await;

        let mut stats = QueueStats::default();
        for job in state.jobs.values().filter(|j| kind.is_none_or(|k| j.kind == *k)) {
            stats.total += 1;
            match job.status {
                JobStatus::Active => stats.active += 1,
                JobStatus::Success => stats.completed += 1,
                JobStatus::DeadLetter => stats.failed += 1,
                _ if job.due_at <= now => stats.waiting += 1,
                _ => stats.delayed += 1,
            }
        }
        Ok(stats)
    }

    async fn resource_stats(&self, resource_key: &ResourceKey) -> Result<ResourceStats, StoreError> {
        self.ensure_available()?;
        let now = self.clock.now();
        let state = self.state.lock().await;

        let mut stats = ResourceStats::default();
        for job in state.jobs.values().filter(|j| j.resource_key == *resource_key) {
            match job.status {
                JobStatus::Success => stats.executed_activities += 1,
                JobStatus::DeadLetter => stats.failed_activities += 1,
                JobStatus::Active => stats.pending_activities += 1,
                _ if job.due_at <= now => stats.pending_activities += 1,
                _ => stats.scheduled_activities += 1,
            }
        }
        Ok(stats)
    }
}
