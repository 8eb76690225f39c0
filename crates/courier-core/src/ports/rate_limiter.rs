//! RateLimiter port: per-resource budgets over fixed windows.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ActionKind, ResourceKey};

use super::job_store::StoreError;

/// Budget identity: a scope (usually an action kind) and a resource inside it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RateKey {
    pub scope: String,
    pub resource: String,
}

impl RateKey {
    pub const GLOBAL_SCOPE: &'static str = "global";

    pub fn new(scope: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            resource: resource.into(),
        }
    }

    /// Budget of one resource for one kind.
    pub fn for_job(kind: &ActionKind, resource_key: &ResourceKey) -> Self {
        Self::new(kind.as_str(), resource_key.as_str())
    }

    /// Process-wide budget shared by every kind.
    pub fn global() -> Self {
        Self::new(Self::GLOBAL_SCOPE, "*")
    }
}

impl fmt::Display for RateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scope, self.resource)
    }
}

/// `limit` units per `window_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateQuota {
    pub limit: u32,
    pub window_ms: u64,
}

impl RateQuota {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window_ms: u64::try_from(window.as_millis()).unwrap_or(u64::MAX),
        }
    }

    pub fn per_second(limit: u32) -> Self {
        Self::new(limit, Duration::from_secs(1))
    }

    pub fn per_minute(limit: u32) -> Self {
        Self::new(limit, Duration::from_secs(60))
    }

    pub fn per_hour(limit: u32) -> Self {
        Self::new(limit, Duration::from_secs(60 * 60))
    }

    pub fn per_day(limit: u32) -> Self {
        Self::new(limit, Duration::from_secs(24 * 60 * 60))
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

/// Consumption state of one key in its current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateBudget {
    pub consumed: u32,
    pub limit: u32,
    pub resets_at: DateTime<Utc>,
}

impl RateBudget {
    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.consumed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    /// Not before this instant.
    ThrottledUntil(DateTime<Utc>),
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allowed)
    }
}

#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Consume `cost` from every key, or from none of them.
    ///
    /// When any key lacks budget the result is the latest reset time among
    /// the exhausted keys.
    async fn try_consume(&self, keys: &[RateKey], cost: u32) -> Result<RateDecision, StoreError>;

    /// Current window of `key`, if it has a quota and an open window.
    async fn budget(&self, key: &RateKey) -> Result<Option<RateBudget>, StoreError>;
}
