//! Aggregated counts for dashboards.

use serde::{Deserialize, Serialize};

/// Queue depth by bucket, for one kind or for all kinds.
///
/// `waiting` counts claimable jobs that are due; `delayed` counts claimable
/// jobs whose due time is still ahead (fresh scheduled jobs, retries in
/// backoff, throttled jobs).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub waiting: usize,
    pub active: usize,
    pub delayed: usize,
    pub completed: usize,
    pub failed: usize,
    pub total: usize,
}

/// Activity counts for one resource key, across kinds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceStats {
    /// Due or in flight.
    pub pending_activities: usize,
    /// Not yet due.
    pub scheduled_activities: usize,
    pub executed_activities: usize,
    pub failed_activities: usize,
}
