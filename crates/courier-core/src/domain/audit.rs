//! Audit entries and dead-letter records: the execution history of a job.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::{ClassifiedError, ErrorClass};
use super::ids::{AuditId, JobId};
use super::job::Job;
use super::kind::{ActionKind, ResourceKey};
use super::outcome::AttemptOutcome;

/// One immutable line of the audit log.
///
/// Written in the same step as the status transition it describes, never
/// updated, never deleted by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: AuditId,
    pub job_id: JobId,
    pub kind: ActionKind,
    pub attempt: u32,
    pub attempted_at: DateTime<Utc>,
    pub outcome: AttemptOutcome,
    pub will_retry: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_classification: Option<ErrorClass>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl AuditEntry {
    pub fn new(
        id: AuditId,
        job: &Job,
        attempt: u32,
        outcome: AttemptOutcome,
        error: Option<&ClassifiedError>,
        attempted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            job_id: job.id,
            kind: job.kind.clone(),
            attempt,
            attempted_at,
            outcome,
            will_retry: outcome.will_retry(),
            error_classification: error.map(|e| e.class),
            message: error.map(|e| e.message.clone()),
        }
    }
}

/// A terminally failed job with everything needed for manual remediation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterRecord {
    pub job_id: JobId,
    pub kind: ActionKind,
    pub resource_key: ResourceKey,
    pub payload: serde_json::Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,

    pub error: ClassifiedError,
    pub attempts: u32,
    pub max_attempts: u32,

    /// Audit entries of the job, oldest first.
    pub history: Vec<AuditEntry>,

    pub first_enqueued_at: DateTime<Utc>,
    pub dead_lettered_at: DateTime<Utc>,
}

impl DeadLetterRecord {
    pub fn from_job(job: &Job, error: ClassifiedError, history: Vec<AuditEntry>) -> Self {
        Self {
            job_id: job.id,
            kind: job.kind.clone(),
            resource_key: job.resource_key.clone(),
            payload: job.payload.clone(),
            idempotency_key: job.idempotency_key.clone(),
            error,
            attempts: job.attempt,
            max_attempts: job.max_attempts,
            history,
            first_enqueued_at: job.created_at,
            dead_lettered_at: job.updated_at,
        }
    }
}
