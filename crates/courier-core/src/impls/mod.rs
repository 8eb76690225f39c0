//! Impls - 実装（開発用・テスト用）
//!
//! In-process implementations of the ports. They are complete enough to run
//! the engine end to end and are what the tests and the demo binary use.
//! A relational store or a shared counter service plugs in behind the same
//! traits.

pub mod event_sinks;
pub mod inmem_audit;
pub mod inmem_dead_letter;
pub mod inmem_store;
pub mod window_limiter;

pub use self::event_sinks::{BroadcastEventSink, FanoutEventSink, TracingEventSink};
pub use self::inmem_audit::InMemoryAuditLog;
pub use self::inmem_dead_letter::InMemoryDeadLetterSink;
pub use self::inmem_store::InMemoryJobStore;
pub use self::window_limiter::WindowRateLimiter;
