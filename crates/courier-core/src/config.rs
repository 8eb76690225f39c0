//! Engine configuration.
//!
//! Every field has a default, so `{}` is a valid config file. Per-kind
//! settings fall back to `default_kind` for kinds without an entry.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::app::scheduler::{DEFAULT_PRIORITY_CAP, Pacing};
use crate::domain::{ActionKind, RetryPolicy};
use crate::ports::RateQuota;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Settings of one action kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KindConfig {
    /// Workers for this kind.
    pub concurrency: usize,
    /// Hard limit on one handler call.
    pub job_timeout_ms: u64,
    pub max_attempts: u32,
    pub retry: RetryPolicy,
    /// Per-resource budget for this kind.
    pub quota: Option<RateQuota>,
    /// Spacing applied when the producer gives no due time.
    pub pacing: Option<Pacing>,
}

impl Default for KindConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            job_timeout_ms: 30_000,
            max_attempts: 3,
            retry: RetryPolicy::default(),
            quota: None,
            pacing: None,
        }
    }
}

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;

fn minutes(n: u64) -> Duration {
    Duration::from_secs(n * MINUTE)
}

impl KindConfig {
    pub fn webhook_delivery() -> Self {
        Self {
            max_attempts: 4,
            ..Self::default()
        }
    }

    /// One DM at a time per worker, 2-15 minutes apart, 100 per day.
    pub fn send_dm() -> Self {
        Self {
            concurrency: 1,
            quota: Some(RateQuota::per_day(100)),
            pacing: Some(Pacing::new(minutes(2), minutes(15))),
            ..Self::default()
        }
    }

    /// Likes, 5-30 minutes apart, 3 per hour per account.
    pub fn engagement() -> Self {
        Self {
            quota: Some(RateQuota::per_hour(3)),
            pacing: Some(Pacing::new(minutes(5), minutes(30))),
            ..Self::default()
        }
    }

    /// Comments spread over 1-6 hours.
    pub fn engagement_comment() -> Self {
        Self {
            quota: Some(RateQuota::per_hour(3)),
            pacing: Some(Pacing::new(
                Duration::from_secs(HOUR),
                Duration::from_secs(6 * HOUR),
            )),
            ..Self::default()
        }
    }

    /// Polls every 15-45 minutes with a 10% chance of skipping a round.
    pub fn comment_poll() -> Self {
        Self {
            concurrency: 2,
            pacing: Some(Pacing::new(minutes(15), minutes(45)).with_skip_probability(0.10)),
            ..Self::default()
        }
    }

    pub fn job_timeout(&self) -> Duration {
        Duration::from_millis(self.job_timeout_ms)
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_quota(mut self, quota: RateQuota) -> Self {
        self.quota = Some(quota);
        self
    }

    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = Some(pacing);
        self
    }

    fn validate(&self, kind: &str) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(format!("{kind}: {msg}")));
        if self.concurrency == 0 {
            return invalid("concurrency must be at least 1");
        }
        if self.job_timeout_ms == 0 {
            return invalid("job_timeout_ms must be positive");
        }
        if self.max_attempts == 0 {
            return invalid("max_attempts must be at least 1");
        }
        if self.retry.base == 0 {
            return invalid("retry.base must be at least 1");
        }
        if let Some(quota) = &self.quota {
            if quota.limit == 0 || quota.window_ms == 0 {
                return invalid("quota limit and window must be positive");
            }
        }
        if let Some(pacing) = &self.pacing {
            if pacing.min_delay_ms > pacing.max_delay_ms {
                return invalid("pacing.min_delay_ms exceeds max_delay_ms");
            }
            if !(0.0..=1.0).contains(&pacing.skip_probability) {
                return invalid("pacing.skip_probability must be within [0, 1]");
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Idle sleep when a worker finds nothing to claim.
    pub poll_interval_ms: u64,
    /// Pause before retrying a failed store call.
    pub store_retry_pause_ms: u64,
    pub reaper_interval_ms: u64,
    /// A lease is stale after `job_timeout * stale_grace_factor`.
    pub stale_grace_factor: f64,
    pub priority_cap: u32,
    /// Shared budget across every kind and resource.
    pub global_quota: Option<RateQuota>,
    /// Buffer of the status broadcast channel.
    pub event_buffer: usize,
    pub default_kind: KindConfig,
    pub kinds: BTreeMap<ActionKind, KindConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 250,
            store_retry_pause_ms: 500,
            reaper_interval_ms: 5_000,
            stale_grace_factor: 2.0,
            priority_cap: DEFAULT_PRIORITY_CAP,
            global_quota: None,
            event_buffer: 1024,
            default_kind: KindConfig::default(),
            kinds: BTreeMap::new(),
        }
    }
}

impl EngineConfig {
    /// Defaults plus the presets of every built-in kind and a 50/s global cap.
    pub fn with_presets() -> Self {
        Self {
            global_quota: Some(RateQuota::per_second(50)),
            ..Self::default()
        }
        .with_kind(ActionKind::WEBHOOK_DELIVERY, KindConfig::webhook_delivery())
        .with_kind(ActionKind::SEND_DM, KindConfig::send_dm())
        .with_kind(ActionKind::ENGAGEMENT_LIKE, KindConfig::engagement())
        .with_kind(ActionKind::ENGAGEMENT_COMMENT, KindConfig::engagement_comment())
        .with_kind(ActionKind::REPOST, KindConfig::engagement())
        .with_kind(ActionKind::COMMENT_POLL, KindConfig::comment_poll())
    }

    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn with_kind(mut self, kind: impl Into<ActionKind>, config: KindConfig) -> Self {
        self.kinds.insert(kind.into(), config);
        self
    }

    pub fn with_global_quota(mut self, quota: RateQuota) -> Self {
        self.global_quota = Some(quota);
        self
    }

    /// Settings for `kind`, falling back to `default_kind`.
    pub fn kind(&self, kind: &ActionKind) -> &KindConfig {
        self.kinds.get(kind).unwrap_or(&self.default_kind)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn store_retry_pause(&self) -> Duration {
        Duration::from_millis(self.store_retry_pause_ms)
    }

    pub fn reaper_interval(&self) -> Duration {
        Duration::from_millis(self.reaper_interval_ms)
    }

    /// Age after which an active lease of `kind` is considered abandoned.
    pub fn stale_after(&self, kind: &ActionKind) -> Duration {
        let timeout = self.kind(kind).job_timeout();
        let factor = self.stale_grace_factor.max(1.0);
        Duration::try_from_secs_f64(timeout.as_secs_f64() * factor).unwrap_or(Duration::MAX)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid("poll_interval_ms must be positive".into()));
        }
        if self.reaper_interval_ms == 0 {
            return Err(ConfigError::Invalid("reaper_interval_ms must be positive".into()));
        }
        if !(self.stale_grace_factor >= 1.0 && self.stale_grace_factor.is_finite()) {
            return Err(ConfigError::Invalid(
                "stale_grace_factor must be a finite number >= 1".into(),
            ));
        }
        if let Some(quota) = &self.global_quota {
            if quota.limit == 0 || quota.window_ms == 0 {
                return Err(ConfigError::Invalid("global_quota limit and window must be positive".into()));
            }
        }
        self.default_kind.validate("default_kind")?;
        for (kind, config) in &self.kinds {
            config.validate(kind.as_str())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_the_default() {
        let config = EngineConfig::from_json_str("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.stale_grace_factor, 2.0);
        assert_eq!(config.priority_cap, 1000);
    }

    #[test]
    fn presets_cover_the_built_in_kinds() {
        let config = EngineConfig::with_presets();
        config.validate().unwrap();

        let webhook = config.kind(&ActionKind::new(ActionKind::WEBHOOK_DELIVERY));
        assert_eq!(webhook.max_attempts, 4);
        assert_eq!(webhook.concurrency, 5);

        let dm = config.kind(&ActionKind::new(ActionKind::SEND_DM));
        assert_eq!(dm.quota, Some(RateQuota::per_day(100)));
        assert_eq!(dm.max_attempts, 3);

        let like = config.kind(&ActionKind::new(ActionKind::ENGAGEMENT_LIKE));
        assert_eq!(like.quota, Some(RateQuota::per_hour(3)));
        assert_eq!(config.global_quota, Some(RateQuota::per_second(50)));
    }

    #[test]
    fn unknown_kinds_fall_back_to_the_default() {
        let config = EngineConfig::default();
        let custom = config.kind(&ActionKind::new("custom"));
        assert_eq!(custom.concurrency, 5);
        assert_eq!(custom.job_timeout(), Duration::from_secs(30));
        assert_eq!(config.stale_after(&ActionKind::new("custom")), Duration::from_secs(60));
    }

    #[test]
    fn partial_kind_entries_keep_field_defaults() {
        let config = EngineConfig::from_json_str(
            r#"{
                "poll_interval_ms": 50,
                "kinds": {
                    "send_dm": { "concurrency": 1, "quota": { "limit": 10, "window_ms": 60000 } }
                }
            }"#,
        )
        .unwrap();
        let dm = config.kind(&ActionKind::new("send_dm"));
        assert_eq!(dm.concurrency, 1);
        assert_eq!(dm.job_timeout_ms, 30_000);
        assert_eq!(dm.quota, Some(RateQuota::per_minute(10)));
        assert_eq!(config.poll_interval(), Duration::from_millis(50));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let zero_workers = r#"{ "kinds": { "repost": { "concurrency": 0 } } }"#;
        assert!(matches!(
            EngineConfig::from_json_str(zero_workers),
            Err(ConfigError::Invalid(msg)) if msg.starts_with("repost")
        ));

        let bad_grace = r#"{ "stale_grace_factor": 0.5 }"#;
        assert!(matches!(
            EngineConfig::from_json_str(bad_grace),
            Err(ConfigError::Invalid(_))
        ));

        assert!(matches!(
            EngineConfig::from_json_str("not json"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = EngineConfig::from_path("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
