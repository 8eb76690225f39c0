//! WindowRateLimiter - fixed-window budgets kept in process memory.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::ports::clock::later;
use crate::ports::{Clock, RateBudget, RateDecision, RateKey, RateLimiter, RateQuota, StoreError};

#[derive(Debug, Clone, Copy)]
struct Window {
    consumed: u32,
    resets_at: DateTime<Utc>,
}

/// Quotas are set per scope; each resource inside a scope gets its own
/// window. A window opens on first use and resets `window` later.
pub struct WindowRateLimiter {
    quotas: HashMap<String, RateQuota>,
    windows: Mutex<HashMap<RateKey, Window>>,
    clock: Arc<dyn Clock>,
}

impl WindowRateLimiter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            quotas: HashMap::new(),
            windows: Mutex::new(HashMap::new()),
            clock,
        }
    }

    pub fn with_quota(mut self, scope: impl Into<String>, quota: RateQuota) -> Self {
        self.quotas.insert(scope.into(), quota);
        self
    }

    pub fn with_global_quota(self, quota: RateQuota) -> Self {
        self.with_quota(RateKey::GLOBAL_SCOPE, quota)
    }

    pub fn quota(&self, scope: &str) -> Option<RateQuota> {
        self.quotas.get(scope).copied()
    }

    /// The window `key` would consume from at `now`.
    fn current(windows: &HashMap<RateKey, Window>, key: &RateKey, quota: RateQuota, now: DateTime<Utc>) -> Window {
        match windows.get(key) {
            Some(w) if now < w.resets_at => *w,
            _ => Window {
                consumed: 0,
                resets_at: later(now, quota.window()),
            },
        }
    }
}

#[async_trait]
impl RateLimiter for WindowRateLimiter {
    async fn try_consume(&self, keys: &[RateKey], cost: u32) -> Result<RateDecision, StoreError> {
        let now = self.clock.now();
        let mut windows = self.windows.lock().await;
        // an expired window holds nothing a later call would read
        windows.retain(|_, w| now < w.resets_at);

        let mut next: Vec<(RateKey, Window)> = Vec::with_capacity(keys.len());
        let mut blocked_until: Option<DateTime<Utc>> = None;
        for key in keys {
            let Some(quota) = self.quota(&key.scope) else {
                continue;
            };
            let mut window = Self::current(&windows, key, quota, now);
            match window.consumed.checked_add(cost) {
                Some(total) if total <= quota.limit => {
                    window.consumed = total;
                    next.push((key.clone(), window));
                }
                _ => {
                    blocked_until = Some(blocked_until.map_or(window.resets_at, |t| t.max(window.resets_at)));
                }
            }
        }

        // all or nothing
        if let Some(until) = blocked_until {
            return Ok(RateDecision::ThrottledUntil(until));
        }
        for (key, window) in next {
            windows.insert(key, window);
        }
        Ok(RateDecision::Allowed)
    }

    async fn budget(&self, key: &RateKey) -> Result<Option<RateBudget>, StoreError> {
        let Some(quota) = self.quota(&key.scope) else {
            return Ok(None);
        };
        let now = self.clock.now();
        let windows = self.windows.lock().await;
        Ok(windows
            .get(key)
            .filter(|w| now < w.resets_at)
            .map(|w| RateBudget {
                consumed: w.consumed,
                limit: quota.limit,
                resets_at: w.resets_at,
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ActionKind, ResourceKey};
    use crate::ports::FixedClock;
    use chrono::TimeZone;
    use std::time::Duration;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn likes() -> RateKey {
        RateKey::for_job(
            &ActionKind::new(ActionKind::ENGAGEMENT_LIKE),
            &ResourceKey::new("acct-1"),
        )
    }

    #[tokio::test]
    async fn exhausted_window_throttles_until_reset() {
        let clock = FixedClock::new(t0());
        let limiter = WindowRateLimiter::new(Arc::new(clock.clone()))
            .with_quota(ActionKind::ENGAGEMENT_LIKE, RateQuota::per_hour(3));

        for _ in 0..3 {
            assert!(limiter.try_consume(&[likes()], 1).await.unwrap().is_allowed());
        }
        let reset = t0() + chrono::Duration::hours(1);
        assert_eq!(
            limiter.try_consume(&[likes()], 1).await.unwrap(),
            RateDecision::ThrottledUntil(reset)
        );

        clock.set(reset);
        assert!(limiter.try_consume(&[likes()], 1).await.unwrap().is_allowed());
        let budget = limiter.budget(&likes()).await.unwrap().unwrap();
        assert_eq!(budget.remaining(), 2);
    }

    #[tokio::test]
    async fn resources_have_separate_windows() {
        let clock = FixedClock::new(t0());
        let limiter = WindowRateLimiter::new(Arc::new(clock))
            .with_quota(ActionKind::SEND_DM, RateQuota::per_day(1));
        let kind = ActionKind::new(ActionKind::SEND_DM);
        let a = RateKey::for_job(&kind, &ResourceKey::new("a"));
        let b = RateKey::for_job(&kind, &ResourceKey::new("b"));

        assert!(limiter.try_consume(&[a.clone()], 1).await.unwrap().is_allowed());
        assert!(!limiter.try_consume(&[a], 1).await.unwrap().is_allowed());
        assert!(limiter.try_consume(&[b], 1).await.unwrap().is_allowed());
    }

    #[tokio::test]
    async fn consumption_is_all_or_nothing() {
        let clock = FixedClock::new(t0());
        let limiter = WindowRateLimiter::new(Arc::new(clock.clone()))
            .with_quota(ActionKind::ENGAGEMENT_LIKE, RateQuota::per_hour(3))
            .with_global_quota(RateQuota::per_second(1));

        assert!(limiter
            .try_consume(&[likes(), RateKey::global()], 1)
            .await
            .unwrap()
            .is_allowed());

        // global is spent, so the like budget must not move
        let decision = limiter
            .try_consume(&[likes(), RateKey::global()], 1)
            .await
            .unwrap();
        assert_eq!(
            decision,
            RateDecision::ThrottledUntil(t0() + chrono::Duration::seconds(1))
        );
        assert_eq!(limiter.budget(&likes()).await.unwrap().unwrap().consumed, 1);

        clock.advance(Duration::from_secs(1));
        assert!(limiter
            .try_consume(&[likes(), RateKey::global()], 1)
            .await
            .unwrap()
            .is_allowed());
    }

    #[tokio::test]
    async fn expired_windows_are_forgotten() {
        let clock = FixedClock::new(t0());
        let limiter = WindowRateLimiter::new(Arc::new(clock.clone()))
            .with_quota(ActionKind::SEND_DM, RateQuota::per_hour(5));
        let kind = ActionKind::new(ActionKind::SEND_DM);

        for n in 0..50 {
            let key = RateKey::for_job(&kind, &ResourceKey::new(format!("acct-{n}")));
            assert!(limiter.try_consume(&[key], 1).await.unwrap().is_allowed());
        }
        assert_eq!(limiter.windows.lock().await.len(), 50);

        clock.advance(Duration::from_secs(3_600));
        let fresh = RateKey::for_job(&kind, &ResourceKey::new("acct-new"));
        assert!(limiter.try_consume(&[fresh], 1).await.unwrap().is_allowed());
        assert_eq!(limiter.windows.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn scopes_without_quota_always_allow() {
        let limiter = WindowRateLimiter::new(Arc::new(FixedClock::new(t0())));
        for _ in 0..100 {
            assert!(limiter.try_consume(&[likes()], 1).await.unwrap().is_allowed());
        }
        assert!(limiter.budget(&likes()).await.unwrap().is_none());
    }
}
