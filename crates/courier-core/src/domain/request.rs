//! Producer-facing enqueue request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::kind::{ActionKind, ResourceKey};

/// What a producer hands to the engine.
///
/// Anything left unset is filled in from the kind's configuration: the
/// attempt ceiling, and the due time (pacing jitter, or "now").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnqueueRequest {
    pub kind: ActionKind,
    pub payload: serde_json::Value,
    pub resource_key: ResourceKey,

    #[serde(default)]
    pub due_at: Option<DateTime<Utc>>,

    /// Dedup key, scoped to the kind.
    #[serde(default)]
    pub idempotency_key: Option<String>,

    #[serde(default)]
    pub max_attempts: Option<u32>,
}

impl EnqueueRequest {
    pub fn new(
        kind: impl Into<ActionKind>,
        payload: serde_json::Value,
        resource_key: impl Into<ResourceKey>,
    ) -> Self {
        Self {
            kind: kind.into(),
            payload,
            resource_key: resource_key.into(),
            due_at: None,
            idempotency_key: None,
            max_attempts: None,
        }
    }

    pub fn due_at(mut self, due_at: DateTime<Utc>) -> Self {
        self.due_at = Some(due_at);
        self
    }

    pub fn idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }
}
