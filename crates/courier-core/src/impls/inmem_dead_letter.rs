//! InMemoryDeadLetterSink - dead-letter records keyed by job id.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{ActionKind, DeadLetterRecord, JobId};
use crate::ports::{DeadLetterSink, StoreError};

#[derive(Debug, Default)]
struct Records {
    by_id: HashMap<JobId, DeadLetterRecord>,
    /// Insertion order.
    order: Vec<JobId>,
}

#[derive(Debug, Default)]
pub struct InMemoryDeadLetterSink {
    records: Mutex<Records>,
}

impl InMemoryDeadLetterSink {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeadLetterSink for InMemoryDeadLetterSink {
    async fn insert(&self, record: DeadLetterRecord) -> Result<bool, StoreError> {
        let mut records = self.records.lock().await;
        if records.by_id.contains_key(&record.job_id) {
            return Ok(false);
        }
        records.order.push(record.job_id);
        records.by_id.insert(record.job_id, record);
        Ok(true)
    }

    async fn get(&self, job_id: JobId) -> Result<Option<DeadLetterRecord>, StoreError> {
        Ok(self.records.lock().await.by_id.get(&job_id).cloned())
    }

    async fn list(&self, kind: Option<&ActionKind>) -> Result<Vec<DeadLetterRecord>, StoreError> {
        let records = self.records.lock().await;
        Ok(records
            .order
            .iter()
            .filter_map(|id| records.by_id.get(id))
            .filter(|r| kind.is_none_or(|k| r.kind == *k))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ClassifiedError, Job, NewJob, ResourceKey};
    use chrono::{TimeZone, Utc};
    use ulid::Ulid;

    fn record(kind: &str) -> DeadLetterRecord {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let job = Job::new(
            JobId::from_ulid(Ulid::new()),
            NewJob {
                kind: ActionKind::new(kind),
                payload: serde_json::json!({"text": "hi"}),
                resource_key: ResourceKey::new("account-1"),
                due_at: None,
                idempotency_key: None,
                max_attempts: 3,
            },
            now,
        );
        DeadLetterRecord::from_job(&job, ClassifiedError::auth("token revoked"), Vec::new())
    }

    #[tokio::test]
    async fn insert_is_idempotent_by_job_id() {
        let sink = InMemoryDeadLetterSink::new();
        let first = record(ActionKind::SEND_DM);
        let mut second = first.clone();
        second.error = ClassifiedError::unknown("second write");

        assert!(sink.insert(first.clone()).await.unwrap());
        assert!(!sink.insert(second).await.unwrap());

        let stored = sink.get(first.job_id).await.unwrap().unwrap();
        assert_eq!(stored.error, first.error);
        assert_eq!(sink.list(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn list_filters_by_kind() {
        let sink = InMemoryDeadLetterSink::new();
        sink.insert(record(ActionKind::SEND_DM)).await.unwrap();
        sink.insert(record(ActionKind::WEBHOOK_DELIVERY)).await.unwrap();
        sink.insert(record(ActionKind::SEND_DM)).await.unwrap();

        let dms = sink
            .list(Some(&ActionKind::new(ActionKind::SEND_DM)))
            .await
            .unwrap();
        assert_eq!(dms.len(), 2);
        assert!(dms.iter().all(|r| r.kind.as_str() == ActionKind::SEND_DM));
    }
}
