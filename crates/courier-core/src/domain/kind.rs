//! Action kinds and resource keys.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Discriminator selecting the handler for a job.
///
/// Kinds are plain snake_case strings so that integration layers can add
/// their own without touching this crate. The well-known kinds used by the
/// product are provided as constants.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionKind(String);

impl ActionKind {
    pub const SEND_DM: &'static str = "send_dm";
    pub const WEBHOOK_DELIVERY: &'static str = "webhook_delivery";
    pub const ENGAGEMENT_LIKE: &'static str = "engagement_like";
    pub const ENGAGEMENT_COMMENT: &'static str = "engagement_comment";
    pub const REPOST: &'static str = "repost";
    pub const COMMENT_POLL: &'static str = "comment_poll";

    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for ActionKind {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ActionKind {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// The rate-limited external identity a job consumes quota against
/// (an external account id, a pod member id, a webhook endpoint host).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceKey(String);

impl ResourceKey {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for ResourceKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ResourceKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}
