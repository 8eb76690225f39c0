//! EventSink implementations: tracing, broadcast, fan-out.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::domain::DomainEvent;
use crate::ports::EventSink;

/// Logs every event through `tracing`.
///
/// Dead letters are logged at `warn` so they reach alerting.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

#[async_trait]
impl EventSink for TracingEventSink {
    async fn emit(&self, event: DomainEvent) {
        match &event {
            DomainEvent::DeadLettered {
                job_id,
                kind,
                attempt,
                class,
                reason,
            } => {
                tracing::warn!(
                    job_id = %job_id,
                    kind = %kind,
                    attempt,
                    class = %class,
                    reason = %reason,
                    "job dead-lettered"
                );
            }
            DomainEvent::RetryScheduled {
                job_id,
                kind,
                next_attempt,
                due_at,
                class,
            } => {
                tracing::info!(
                    job_id = %job_id,
                    kind = %kind,
                    next_attempt,
                    due_at = %due_at,
                    class = %class,
                    "retry scheduled"
                );
            }
            other => {
                tracing::debug!(job_id = %other.job_id(), event = ?other, "job event");
            }
        }
    }
}

/// Publishes events on a tokio broadcast channel.
///
/// Slow subscribers lag and miss events; the sender never blocks.
#[derive(Debug, Clone)]
pub struct BroadcastEventSink {
    tx: broadcast::Sender<DomainEvent>,
}

impl BroadcastEventSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastEventSink {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl EventSink for BroadcastEventSink {
    async fn emit(&self, event: DomainEvent) {
        // no subscribers is fine
        let _ = self.tx.send(event);
    }
}

/// Forwards every event to each inner sink in order.
#[derive(Clone, Default)]
pub struct FanoutEventSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

#[async_trait]
impl EventSink for FanoutEventSink {
    async fn emit(&self, event: DomainEvent) {
        for sink in &self.sinks {
            sink.emit(event.clone()).await;
        }
    }
}
