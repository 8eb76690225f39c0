//! Status - health and queue views for dashboards.

use serde::{Deserialize, Serialize};

use crate::domain::{ActionKind, QueueStats};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Paused,
}

/// Per-kind slice of the health report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindHealth {
    pub kind: ActionKind,
    pub paused: bool,
    pub concurrency: usize,
    pub queue: QueueStats,
}

/// `healthy` is false when the job store could not be queried; the queue
/// numbers are then zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub status: RunStatus,
    /// Workers are running.
    pub started: bool,
    pub kinds: Vec<KindHealth>,
    pub queue_stats: QueueStats,
}

impl HealthReport {
    pub fn kind(&self, kind: &ActionKind) -> Option<&KindHealth> {
        self.kinds.iter().find(|k| k.kind == *kind)
    }
}
