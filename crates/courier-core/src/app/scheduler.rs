//! Scheduler - ready ordering and humanlike pacing.
//!
//! Jobs are dispatched in `(due_at, priority, created_at, id)` order. The
//! priority is not stored: it is derived from how far ahead of its
//! scheduling time a job was placed, so a retry pushed out by backoff sorts
//! behind fresh work that is due at the same instant.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::domain::{Job, JobId};
use crate::ports::clock::later;

pub const DEFAULT_PRIORITY_CAP: u32 = 1000;

/// Position of a claimable job in the ready index.
///
/// Field order is the sort order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReadyKey {
    pub due_at: DateTime<Utc>,
    pub priority: u32,
    pub created_at: DateTime<Utc>,
    pub job_id: JobId,
}

impl ReadyKey {
    pub fn of(job: &Job, priority_cap: u32) -> Self {
        Self {
            due_at: job.due_at,
            priority: job.priority(priority_cap),
            created_at: job.created_at,
            job_id: job.id,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.due_at <= now
    }
}

/// Random spacing between consecutive actions on one resource.
///
/// Applied once at enqueue time when the producer leaves `due_at` unset;
/// the result is stored on the job.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pacing {
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Chance of leaving one extra gap, as if the user got distracted.
    #[serde(default)]
    pub skip_probability: f64,
}

impl Pacing {
    pub fn new(min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            min_delay_ms: u64::try_from(min_delay.as_millis()).unwrap_or(u64::MAX),
            max_delay_ms: u64::try_from(max_delay.as_millis()).unwrap_or(u64::MAX),
            skip_probability: 0.0,
        }
    }

    pub fn with_skip_probability(mut self, p: f64) -> Self {
        self.skip_probability = p;
        self
    }

    fn gap<R: Rng + ?Sized>(&self, rng: &mut R) -> u64 {
        let lo = self.min_delay_ms.min(self.max_delay_ms);
        let hi = self.min_delay_ms.max(self.max_delay_ms);
        rng.gen_range(lo..=hi)
    }

    /// Due time for the next action on a resource whose latest queued action
    /// is due at `anchor`.
    pub fn next_due<R: Rng + ?Sized>(
        &self,
        now: DateTime<Utc>,
        anchor: Option<DateTime<Utc>>,
        rng: &mut R,
    ) -> DateTime<Utc> {
        let base = anchor.map_or(now, |a| a.max(now));
        let mut gap = self.gap(rng);
        if self.skip_probability > 0.0 && rng.gen_bool(self.skip_probability.min(1.0)) {
            gap = gap.saturating_add(self.gap(rng));
        }
        later(base, Duration::from_millis(gap))
    }
}
