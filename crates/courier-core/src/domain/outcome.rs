//! Recorded outcome of a job leaving the `active` state.
//!
//! This module does not assume any particular store: it only fixes the
//! vocabulary the audit log and the dead-letter sink use.

use serde::{Deserialize, Serialize};

/// What happened when a job left `active` (or was dead-lettered by hand).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// The handler confirmed the action.
    Succeeded,
    /// The handler failed; the job will be retried.
    Failed,
    /// The job is terminal in the dead-letter sink.
    DeadLettered,
    /// The rate limiter pushed the job back; no attempt consumed.
    Throttled,
    /// The lease went stale and the job was returned to the pool.
    Reclaimed,
}

impl AttemptOutcome {
    /// Whether the job goes around again after this outcome.
    pub fn will_retry(self) -> bool {
        matches!(
            self,
            AttemptOutcome::Failed | AttemptOutcome::Throttled | AttemptOutcome::Reclaimed
        )
    }
}
