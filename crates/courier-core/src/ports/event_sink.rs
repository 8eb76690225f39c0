//! EventSink port: side channel for domain events.

use async_trait::async_trait;

use crate::domain::DomainEvent;

/// Receives domain events.
///
/// Emission is fire-and-forget: a sink swallows its own delivery failures so
/// that observing a job can never fail it.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: DomainEvent);
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

#[async_trait]
impl EventSink for NoopEventSink {
    async fn emit(&self, _event: DomainEvent) {}
}
