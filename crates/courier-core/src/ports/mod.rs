//! Ports: traits at the edges of the engine.
//!
//! Each trait hides one external collaborator (the relational job store, a
//! shared rate-limit counter, an alerting channel). `impls` provides the
//! in-memory versions used by tests and the demo binary.

pub mod audit_log;
pub mod clock;
pub mod dead_letter;
pub mod event_sink;
pub mod id_generator;
pub mod job_store;
pub mod rate_limiter;

pub use self::audit_log::AuditLog;
pub use self::clock::{Clock, FixedClock, MonotonicClock, SystemClock};
pub use self::dead_letter::DeadLetterSink;
pub use self::event_sink::{EventSink, NoopEventSink};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::job_store::{ClaimFilter, Enqueued, JobStore, Lease, StoreError, Transition};
pub use self::rate_limiter::{RateBudget, RateDecision, RateKey, RateLimiter, RateQuota};
