//! DeadLetterSink port: terminal quarantine for failed jobs.

use async_trait::async_trait;

use crate::domain::{ActionKind, DeadLetterRecord, JobId};

use super::job_store::StoreError;

#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    /// Store a record. Inserting a job id that is already present keeps the
    /// first record and reports `false`.
    async fn insert(&self, record: DeadLetterRecord) -> Result<bool, StoreError>;

    async fn get(&self, job_id: JobId) -> Result<Option<DeadLetterRecord>, StoreError>;

    /// Records of one kind, or all of them, oldest first.
    async fn list(&self, kind: Option<&ActionKind>) -> Result<Vec<DeadLetterRecord>, StoreError>;
}
