//! Domain events emitted by the engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::ErrorClass;
use super::ids::JobId;
use super::kind::{ActionKind, ResourceKey};

/// Something observable happened to a job.
///
/// Events are a side channel for dashboards and alerting; the job store stays
/// the source of truth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    Enqueued {
        job_id: JobId,
        kind: ActionKind,
        resource_key: ResourceKey,
        due_at: DateTime<Utc>,
    },
    Claimed {
        job_id: JobId,
        kind: ActionKind,
        attempt: u32,
    },
    Succeeded {
        job_id: JobId,
        kind: ActionKind,
        attempt: u32,
    },
    RetryScheduled {
        job_id: JobId,
        kind: ActionKind,
        next_attempt: u32,
        due_at: DateTime<Utc>,
        class: ErrorClass,
    },
    Throttled {
        job_id: JobId,
        kind: ActionKind,
        resource_key: ResourceKey,
        until: DateTime<Utc>,
    },
    DeadLettered {
        job_id: JobId,
        kind: ActionKind,
        attempt: u32,
        class: ErrorClass,
        reason: String,
    },
    Reclaimed {
        job_id: JobId,
        kind: ActionKind,
    },
}

impl DomainEvent {
    pub fn job_id(&self) -> JobId {
        match self {
            DomainEvent::Enqueued { job_id, .. }
            | DomainEvent::Claimed { job_id, .. }
            | DomainEvent::Succeeded { job_id, .. }
            | DomainEvent::RetryScheduled { job_id, .. }
            | DomainEvent::Throttled { job_id, .. }
            | DomainEvent::DeadLettered { job_id, .. }
            | DomainEvent::Reclaimed { job_id, .. } => *job_id,
        }
    }

    /// Whether the job is finished after this event.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DomainEvent::Succeeded { .. } | DomainEvent::DeadLettered { .. }
        )
    }
}
