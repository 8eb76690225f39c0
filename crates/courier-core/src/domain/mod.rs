//! Domain model: jobs, lifecycle, classification, retry policy, history.
//!
//! Nothing in here performs I/O. Stores, limiters and sinks live behind
//! `ports`; the decision logic here is pure and unit-tested on its own.

pub mod audit;
pub mod decision;
pub mod errors;
pub mod events;
pub mod ids;
pub mod job;
pub mod kind;
pub mod outcome;
pub mod request;
pub mod retry;
pub mod state;
pub mod stats;

pub use audit::{AuditEntry, DeadLetterRecord};
pub use decision::{Decider, Decision, DefaultDecider};
pub use errors::{ClassifiedError, ErrorClass};
pub use events::DomainEvent;
pub use ids::{AuditId, JobId, LeaseId};
pub use job::{Job, NewJob, TransitionError};
pub use kind::{ActionKind, ResourceKey};
pub use outcome::AttemptOutcome;
pub use request::EnqueueRequest;
pub use retry::RetryPolicy;
pub use state::JobStatus;
pub use stats::{QueueStats, ResourceStats};
