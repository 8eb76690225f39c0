//! AuditLog port: append-only attempt history.

use async_trait::async_trait;

use crate::domain::{AuditEntry, JobId};

use super::job_store::StoreError;

#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn append(&self, entry: AuditEntry) -> Result<(), StoreError>;

    /// Entries for one job, in append order.
    async fn entries_for(&self, job_id: JobId) -> Result<Vec<AuditEntry>, StoreError>;

    /// Every entry, in append order.
    async fn entries(&self) -> Result<Vec<AuditEntry>, StoreError>;
}
