//! JobStore port: the source of truth for jobs.
//!
//! Every operation that changes a job's status is a single conditional
//! update: the store checks the expected state (and, for a worker's report,
//! the lease and attempt it was handed) and applies the change in one step.
//! There is no read-then-write window between two callers.
//!
//! Each transition out of `active`, and each manual dead-lettering, appends
//! exactly one audit entry in the same step. A relational implementation does
//! this in one transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    ActionKind, ClassifiedError, Job, JobId, LeaseId, NewJob, QueueStats, ResourceKey,
    ResourceStats, TransitionError,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The backing store could not be reached. Callers retry.
    #[error("job store unavailable: {0}")]
    Unavailable(String),

    /// The job is no longer held by this lease/attempt (stale or duplicate
    /// report). Retrying cannot help.
    #[error("lease conflict for {job_id}: {reason}")]
    Conflict { job_id: JobId, reason: String },

    #[error("job not found: {0}")]
    NotFound(JobId),

    #[error("{job_id}: {source}")]
    InvalidTransition {
        job_id: JobId,
        #[source]
        source: TransitionError,
    },
}

impl StoreError {
    /// Worth trying the same call again.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Result of an enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Enqueued {
    pub job_id: JobId,
    /// An existing non-terminal job with the same idempotency key was returned.
    pub duplicate: bool,
}

/// Which jobs a claimer is willing to take.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClaimFilter {
    pub kind: Option<ActionKind>,
    pub resource_key: Option<ResourceKey>,
}

impl ClaimFilter {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn kind(kind: ActionKind) -> Self {
        Self {
            kind: Some(kind),
            resource_key: None,
        }
    }

    pub fn with_resource(mut self, resource_key: ResourceKey) -> Self {
        self.resource_key = Some(resource_key);
        self
    }

    pub fn matches(&self, job: &Job) -> bool {
        self.kind.as_ref().is_none_or(|k| *k == job.kind)
            && self
                .resource_key
                .as_ref()
                .is_none_or(|r| *r == job.resource_key)
    }
}

/// Exclusive, transient ownership of an active job.
///
/// `job` is a snapshot taken at claim time. Reports are accepted only while
/// the stored job still carries this lease id at this attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct Lease {
    pub lease_id: LeaseId,
    pub job: Job,
}

impl Lease {
    pub fn job_id(&self) -> JobId {
        self.job.id
    }

    pub fn attempt(&self) -> u32 {
        self.job.attempt
    }
}

/// Outcome a worker reports for its lease.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Succeeded,
    Retry {
        error: ClassifiedError,
        due_at: DateTime<Utc>,
    },
    DeadLetter {
        error: ClassifiedError,
    },
}

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a job, or return the live job holding the same
    /// `(kind, idempotency_key)`.
    async fn enqueue(&self, new_job: NewJob) -> Result<Enqueued, StoreError>;

    /// Atomically move the first ready job matching `filter` to `active`.
    async fn claim_next(&self, filter: &ClaimFilter) -> Result<Option<Lease>, StoreError>;

    /// Apply a worker's outcome. Idempotent per lease: a repeated report for
    /// a lease that already landed is a `Conflict`.
    async fn report_outcome(&self, lease: &Lease, transition: Transition) -> Result<Job, StoreError>;

    /// Push an active job back to `scheduled` at `until` without consuming
    /// an attempt.
    async fn defer(&self, lease: &Lease, until: DateTime<Utc>) -> Result<Job, StoreError>;

    /// Dead-letter any non-terminal job, revoking an outstanding lease.
    async fn mark_dead_letter(&self, job_id: JobId, reason: ClassifiedError) -> Result<Job, StoreError>;

    /// Return jobs of `kind` claimed before `claimed_before` to `pending`.
    async fn reclaim_stale(
        &self,
        kind: &ActionKind,
        claimed_before: DateTime<Utc>,
    ) -> Result<Vec<Job>, StoreError>;

    async fn get(&self, job_id: JobId) -> Result<Option<Job>, StoreError>;

    /// Latest due time among live jobs of `kind` for `resource_key`.
    async fn latest_due_at(
        &self,
        kind: &ActionKind,
        resource_key: &ResourceKey,
    ) -> Result<Option<DateTime<Utc>>, StoreError>;

    async fn queue_stats(&self, kind: Option<&ActionKind>) -> Result<QueueStats, StoreError>;

    async fn resource_stats(&self, resource_key: &ResourceKey) -> Result<ResourceStats, StoreError>;
}
