//! InMemoryAuditLog - append-only history kept in process memory.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::{AuditEntry, JobId};
use crate::ports::{AuditLog, StoreError};

/// Append-only vector of audit entries.
///
/// `record` is synchronous so that `InMemoryJobStore` can append inside the
/// same critical section as the transition it describes.
#[derive(Debug, Default)]
pub struct InMemoryAuditLog {
    entries: Mutex<Vec<AuditEntry>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&self, entry: AuditEntry) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot_for(&self, job_id: Option<JobId>) -> Vec<AuditEntry> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries
            .iter()
            .filter(|e| job_id.is_none_or(|id| e.job_id == id))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl AuditLog for InMemoryAuditLog {
    async fn append(&self, entry: AuditEntry) -> Result<(), StoreError> {
        self.record(entry);
        Ok(())
    }

    async fn entries_for(&self, job_id: JobId) -> Result<Vec<AuditEntry>, StoreError> {
        Ok(self.snapshot_for(Some(job_id)))
    }

    async fn entries(&self) -> Result<Vec<AuditEntry>, StoreError> {
        Ok(self.snapshot_for(None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        ActionKind, AttemptOutcome, AuditId, ClassifiedError, Job, NewJob, ResourceKey,
    };
    use chrono::{TimeZone, Utc};
    use ulid::Ulid;

    fn job() -> Job {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        Job::new(
            JobId::from_ulid(Ulid::new()),
            NewJob {
                kind: ActionKind::new(ActionKind::SEND_DM),
                payload: serde_json::json!({}),
                resource_key: ResourceKey::new("account-1"),
                due_at: None,
                idempotency_key: None,
                max_attempts: 3,
            },
            now,
        )
    }

    #[tokio::test]
    async fn entries_are_filtered_per_job_in_append_order() {
        let log = InMemoryAuditLog::new();
        let a = job();
        let b = job();
        let err = ClassifiedError::network("reset");

        for (j, attempt, outcome) in [
            (&a, 1, AttemptOutcome::Failed),
            (&b, 1, AttemptOutcome::Succeeded),
            (&a, 2, AttemptOutcome::Succeeded),
        ] {
            let e = (outcome == AttemptOutcome::Failed).then_some(&err);
            log.append(AuditEntry::new(
                AuditId::from_ulid(Ulid::new()),
                j,
                attempt,
                outcome,
                e,
                j.created_at,
            ))
            .await
            .unwrap();
        }

        let trail = log.entries_for(a.id).await.unwrap();
        assert_eq!(trail.len(), 2);
        assert_eq!(trail[0].attempt, 1);
        assert!(trail[0].will_retry);
        assert_eq!(trail[1].outcome, AttemptOutcome::Succeeded);
        assert_eq!(log.entries().await.unwrap().len(), 3);
    }
}
