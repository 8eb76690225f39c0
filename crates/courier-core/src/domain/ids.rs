//! Strongly-typed identifiers.
//!
//! Every id is a ULID wrapped in `Id<T>`, where `T` is a zero-sized marker.
//! ULIDs sort by creation time and can be minted on any node without
//! coordination. The marker keeps a `JobId` from being passed where a
//! `LeaseId` is expected, at no runtime cost.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// Marker trait for id kinds; supplies the display prefix.
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// Generic ULID-backed id.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Job {}

impl IdMarker for Job {
    fn prefix() -> &'static str {
        "job-"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Lease {}

impl IdMarker for Lease {
    fn prefix() -> &'static str {
        "lease-"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Audit {}

impl IdMarker for Audit {
    fn prefix() -> &'static str {
        "audit-"
    }
}

/// Identifier of a Job (enqueue/status/dead-letter unit).
pub type JobId = Id<Job>;

/// Identifier of one claim of a job by a worker.
///
/// A fresh lease id is issued on every claim, so a report carrying an old
/// lease is recognisable even when the attempt number has not moved.
pub type LeaseId = Id<Lease>;

/// Identifier of an audit log entry.
pub type AuditId = Id<Audit>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_uses_marker_prefix() {
        let job = JobId::from_ulid(Ulid::new());
        let lease = LeaseId::from_ulid(Ulid::new());
        let audit = AuditId::from_ulid(Ulid::new());

        assert!(job.to_string().starts_with("job-"));
        assert!(lease.to_string().starts_with("lease-"));
        assert!(audit.to_string().starts_with("audit-"));
    }

    #[test]
    fn ids_sort_by_creation_time() {
        let id1 = JobId::from_ulid(Ulid::new());
        std::thread::sleep(std::time::Duration::from_millis(2));
        let id2 = JobId::from_ulid(Ulid::new());

        assert!(id1 < id2);
    }

    #[test]
    fn ids_serialize_as_bare_ulid() {
        let job_id = JobId::from_ulid(Ulid::new());

        let serialized = serde_json::to_string(&job_id).unwrap();
        let deserialized: JobId = serde_json::from_str(&serialized).unwrap();

        assert_eq!(job_id, deserialized);
        assert!(!serialized.contains("job-"));
    }

    #[test]
    fn marker_adds_no_size() {
        assert_eq!(std::mem::size_of::<JobId>(), std::mem::size_of::<Ulid>());
        assert_eq!(std::mem::size_of::<LeaseId>(), 16);
    }
}
