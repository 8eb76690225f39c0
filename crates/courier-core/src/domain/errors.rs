//! Failure classification.
//!
//! Handlers report failures as a [`ClassifiedError`]: the class is decided at
//! the boundary where the HTTP status or transport error is still known, and
//! everything downstream (retry policy, dead-letter sink, audit log) works on
//! the typed class only.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Taxonomy bucket of a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// HTTP 429 or an explicit throttling signal from the remote side.
    RateLimit,
    /// HTTP 401/403.
    AuthError,
    /// HTTP 404.
    NotFound,
    /// Connection-level failure (DNS, reset, TLS).
    Network,
    /// Hard per-job timeout hit, or the remote timed out.
    Timeout,
    /// The request can never succeed as formed (bad payload, 400/422).
    ValidationError,
    /// Anything else, including 5xx and handler panics.
    UnknownError,
}

impl ErrorClass {
    /// Map an HTTP status code to its class.
    pub fn from_http_status(status: u16) -> Self {
        match status {
            429 => ErrorClass::RateLimit,
            401 | 403 => ErrorClass::AuthError,
            404 => ErrorClass::NotFound,
            408 => ErrorClass::Timeout,
            400 | 422 => ErrorClass::ValidationError,
            _ => ErrorClass::UnknownError,
        }
    }

    /// Whether a later attempt can possibly change the outcome.
    pub fn is_retryable(self) -> bool {
        match self {
            ErrorClass::RateLimit
            | ErrorClass::Network
            | ErrorClass::Timeout
            | ErrorClass::UnknownError => true,
            ErrorClass::AuthError | ErrorClass::NotFound | ErrorClass::ValidationError => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorClass::RateLimit => "rate_limit",
            ErrorClass::AuthError => "auth_error",
            ErrorClass::NotFound => "not_found",
            ErrorClass::Network => "network",
            ErrorClass::Timeout => "timeout",
            ErrorClass::ValidationError => "validation_error",
            ErrorClass::UnknownError => "unknown_error",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A handler failure with its classification.
///
/// This is also the shape persisted as a job's `last_error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{class}: {message}")]
pub struct ClassifiedError {
    pub class: ErrorClass,
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,

    /// Minimum delay the remote side asked for (e.g. `Retry-After`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}

impl ClassifiedError {
    pub fn new(class: ErrorClass, message: impl Into<String>) -> Self {
        Self {
            class,
            message: message.into(),
            http_status: None,
            retry_after_ms: None,
        }
    }

    /// Classify from an HTTP response status.
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        let mut err = Self::new(ErrorClass::from_http_status(status), message);
        err.http_status = Some(status);
        err
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::RateLimit, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::AuthError, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::NotFound, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Network, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Timeout, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::ValidationError, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::UnknownError, message)
    }

    pub fn with_retry_after(mut self, delay: Duration) -> Self {
        self.retry_after_ms = Some(u64::try_from(delay.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn retry_after(&self) -> Option<Duration> {
        self.retry_after_ms.map(Duration::from_millis)
    }

    pub fn is_retryable(&self) -> bool {
        self.class.is_retryable()
    }
}
