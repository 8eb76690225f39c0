//! Job record and its state transitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::ClassifiedError;
use super::ids::{JobId, LeaseId};
use super::kind::{ActionKind, ResourceKey};
use super::state::JobStatus;

/// Rejected state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid transition {from} -> {to}")]
pub struct TransitionError {
    pub from: JobStatus,
    pub to: JobStatus,
}

/// A unit of externally-directed work.
///
/// This is the single source of truth for a job. Stores hold `Job`s and
/// mutate them only through the transition methods below, which refuse any
/// edge outside the lifecycle graph in [`JobStatus`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub kind: ActionKind,
    pub payload: serde_json::Value,
    pub resource_key: ResourceKey,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,

    pub status: JobStatus,

    /// Not dispatched before this instant.
    pub due_at: DateTime<Utc>,

    /// When `due_at` was last assigned; priority is derived from the gap.
    pub scheduled_at: DateTime<Utc>,

    /// Current attempt number, starting at 1.
    pub attempt: u32,
    pub max_attempts: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<ClassifiedError>,

    /// Lease of the worker holding the job; set only while `Active`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lease: Option<LeaseId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Build a fresh job. Its status is `Scheduled` when `due_at` is in the
    /// future, `Pending` otherwise.
    pub fn new(id: JobId, new_job: NewJob, now: DateTime<Utc>) -> Self {
        let due_at = new_job.due_at.unwrap_or(now);
        let status = if due_at > now {
            JobStatus::Scheduled
        } else {
            JobStatus::Pending
        };
        Self {
            id,
            kind: new_job.kind,
            payload: new_job.payload,
            resource_key: new_job.resource_key,
            idempotency_key: new_job.idempotency_key,
            status,
            due_at,
            scheduled_at: now,
            attempt: 1,
            max_attempts: new_job.max_attempts.max(1),
            last_error: None,
            lease: None,
            claimed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Derived priority: minutes between scheduling and due time, clamped to
    /// `[0, cap]`. Lower sorts first.
    pub fn priority(&self, cap: u32) -> u32 {
        let minutes = (self.due_at - self.scheduled_at).num_minutes().max(0);
        u32::try_from(minutes).unwrap_or(u32::MAX).min(cap)
    }

    /// Claimable now: right status and due.
    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        self.status.is_claimable() && self.due_at <= now
    }

    /// Whether `lease` is the one currently holding this job at `attempt`.
    pub fn is_held_by(&self, lease: LeaseId, attempt: u32) -> bool {
        self.status == JobStatus::Active && self.lease == Some(lease) && self.attempt == attempt
    }

    fn transition(&mut self, to: JobStatus, now: DateTime<Utc>) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(to) {
            return Err(TransitionError {
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.updated_at = now;
        Ok(())
    }

    fn release_lease(&mut self) {
        self.lease = None;
        self.claimed_at = None;
    }

    /// Claim: hand the job to `lease`.
    pub fn start(&mut self, lease: LeaseId, now: DateTime<Utc>) -> Result<(), TransitionError> {
        self.transition(JobStatus::Active, now)?;
        self.lease = Some(lease);
        self.claimed_at = Some(now);
        Ok(())
    }

    pub fn mark_succeeded(&mut self, now: DateTime<Utc>) -> Result<(), TransitionError> {
        self.transition(JobStatus::Success, now)?;
        self.release_lease();
        Ok(())
    }

    /// Schedule the next attempt after a retryable failure.
    ///
    /// Fails if the job already used its last attempt.
    pub fn schedule_retry(
        &mut self,
        due_at: DateTime<Utc>,
        error: ClassifiedError,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        if self.attempt >= self.max_attempts {
            return Err(TransitionError {
                from: self.status,
                to: JobStatus::FailedRetryable,
            });
        }
        self.transition(JobStatus::FailedRetryable, now)?;
        self.release_lease();
        self.attempt += 1;
        self.due_at = due_at;
        self.scheduled_at = now;
        self.last_error = Some(error);
        Ok(())
    }

    /// Push the job back without consuming an attempt (flow control).
    pub fn defer(&mut self, until: DateTime<Utc>, now: DateTime<Utc>) -> Result<(), TransitionError> {
        self.transition(JobStatus::Scheduled, now)?;
        self.release_lease();
        self.due_at = until.max(now);
        self.scheduled_at = now;
        Ok(())
    }

    /// Return a job whose worker went silent to the ready pool.
    pub fn reclaim(&mut self, now: DateTime<Utc>) -> Result<(), TransitionError> {
        self.transition(JobStatus::Pending, now)?;
        self.release_lease();
        self.due_at = now;
        self.scheduled_at = now;
        Ok(())
    }

    pub fn mark_dead(&mut self, error: ClassifiedError, now: DateTime<Utc>) -> Result<(), TransitionError> {
        self.transition(JobStatus::DeadLetter, now)?;
        self.release_lease();
        self.last_error = Some(error);
        Ok(())
    }
}

/// A fully resolved job ready to be stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewJob {
    pub kind: ActionKind,
    pub payload: serde_json::Value,
    pub resource_key: ResourceKey,
    pub due_at: Option<DateTime<Utc>>,
    pub idempotency_key: Option<String>,
    pub max_attempts: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use ulid::Ulid;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn new_job(due_at: Option<DateTime<Utc>>, max_attempts: u32) -> Job {
        let fresh = NewJob {
            kind: ActionKind::new(ActionKind::WEBHOOK_DELIVERY),
            payload: serde_json::json!({"url": "https://example.test/hook"}),
            resource_key: ResourceKey::new("endpoint-1"),
            due_at,
            idempotency_key: None,
            max_attempts,
        };
        Job::new(JobId::from_ulid(Ulid::new()), fresh, t0())
    }

    fn lease() -> LeaseId {
        LeaseId::from_ulid(Ulid::new())
    }

    #[test]
    fn immediate_job_starts_pending_at_attempt_one() {
        let job = new_job(None, 4);
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.attempt, 1);
        assert!(job.is_ready(t0()));
    }

    #[test]
    fn future_job_starts_scheduled_and_is_not_ready() {
        let job = new_job(Some(t0() + Duration::minutes(30)), 3);
        assert_eq!(job.status, JobStatus::Scheduled);
        assert!(!job.is_ready(t0()));
        assert!(job.is_ready(t0() + Duration::minutes(30)));
        assert_eq!(job.priority(1000), 30);
    }

    #[test]
    fn priority_is_capped() {
        let job = new_job(Some(t0() + Duration::days(3)), 3);
        assert_eq!(job.priority(1000), 1000);
    }

    #[test]
    fn retry_increments_attempt_and_releases_lease() {
        let mut job = new_job(None, 3);
        let l = lease();
        job.start(l, t0()).unwrap();
        assert!(job.is_held_by(l, 1));

        let due = t0() + Duration::seconds(5);
        job.schedule_retry(due, ClassifiedError::http(503, "unavailable"), t0())
            .unwrap();

        assert_eq!(job.status, JobStatus::FailedRetryable);
        assert_eq!(job.attempt, 2);
        assert_eq!(job.due_at, due);
        assert_eq!(job.lease, None);
        assert!(!job.is_held_by(l, 1));
    }

    #[test]
    fn retry_refused_on_last_attempt() {
        let mut job = new_job(None, 1);
        job.start(lease(), t0()).unwrap();
        let err = job
            .schedule_retry(t0(), ClassifiedError::network("reset"), t0())
            .unwrap_err();
        assert_eq!(err.to, JobStatus::FailedRetryable);
        assert_eq!(job.attempt, 1);
    }

    #[test]
    fn defer_keeps_attempt() {
        let mut job = new_job(None, 3);
        job.start(lease(), t0()).unwrap();
        let until = t0() + Duration::hours(1);
        job.defer(until, t0()).unwrap();
        assert_eq!(job.status, JobStatus::Scheduled);
        assert_eq!(job.attempt, 1);
        assert_eq!(job.due_at, until);
    }

    #[test]
    fn terminal_job_cannot_be_claimed_again() {
        let mut job = new_job(None, 3);
        job.start(lease(), t0()).unwrap();
        job.mark_succeeded(t0()).unwrap();
        assert!(job.start(lease(), t0()).is_err());
        assert!(job.mark_dead(ClassifiedError::unknown("late"), t0()).is_err());
    }

    #[test]
    fn pending_job_can_be_dead_lettered_manually() {
        let mut job = new_job(None, 3);
        job.mark_dead(ClassifiedError::validation("operator"), t0()).unwrap();
        assert_eq!(job.status, JobStatus::DeadLetter);
        assert!(job.reclaim(t0()).is_err());
    }
}
