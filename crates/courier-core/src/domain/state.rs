//! Job lifecycle states.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a job.
///
/// Transitions:
/// - Pending | Scheduled | FailedRetryable -> Active (claim)
/// - Active -> Success
/// - Active -> FailedRetryable (retry with backoff)
/// - Active -> Scheduled (rate-limit deferral, attempt unchanged)
/// - Active -> Pending (stale lease reclaimed)
/// - any non-terminal -> DeadLetter
///
/// Nothing leaves Success or DeadLetter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobStatus {
    Pending,
    Scheduled,
    Active,
    Success,
    FailedRetryable,
    DeadLetter,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Success | JobStatus::DeadLetter)
    }

    /// Eligible for a claim once `due_at` has passed.
    pub fn is_claimable(self) -> bool {
        matches!(
            self,
            JobStatus::Pending | JobStatus::Scheduled | JobStatus::FailedRetryable
        )
    }

    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        match (self, next) {
            (Pending | Scheduled | FailedRetryable, Active) => true,
            (Active, Success | FailedRetryable | Scheduled | Pending) => true,
            (Pending | Scheduled | FailedRetryable | Active, DeadLetter) => true,
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Scheduled => "scheduled",
            JobStatus::Active => "active",
            JobStatus::Success => "success",
            JobStatus::FailedRetryable => "failed-retryable",
            JobStatus::DeadLetter => "dead-letter",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const ALL: [JobStatus; 6] = [
        JobStatus::Pending,
        JobStatus::Scheduled,
        JobStatus::Active,
        JobStatus::Success,
        JobStatus::FailedRetryable,
        JobStatus::DeadLetter,
    ];

    #[rstest]
    #[case(JobStatus::Success)]
    #[case(JobStatus::DeadLetter)]
    fn terminal_states_have_no_exits(#[case] terminal: JobStatus) {
        assert!(terminal.is_terminal());
        for next in ALL {
            assert!(!terminal.can_transition_to(next), "{terminal} -> {next}");
        }
    }

    #[test]
    fn only_active_reaches_success() {
        for from in ALL {
            let allowed = from.can_transition_to(JobStatus::Success);
            assert_eq!(allowed, from == JobStatus::Active, "{from} -> success");
        }
    }

    #[test]
    fn claimable_states_can_become_active() {
        for from in ALL {
            assert_eq!(from.is_claimable(), from.can_transition_to(JobStatus::Active));
        }
    }

    #[test]
    fn serializes_as_kebab_case() {
        let s = serde_json::to_string(&JobStatus::FailedRetryable).unwrap();
        assert_eq!(s, "\"failed-retryable\"");
        assert_eq!(JobStatus::DeadLetter.to_string(), "dead-letter");
    }
}
