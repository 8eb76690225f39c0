//! courier-core
//!
//! Reliable delivery of actions against rate-limited, unreliable third-party
//! APIs: bounded concurrency, paced scheduling, exponential backoff,
//! dead-letter quarantine and an append-only audit trail, without losing or
//! double-executing a job.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（Job, lifecycle, classification, retry policy, audit）
//! - **ports**: 抽象化レイヤー（JobStore, AuditLog, DeadLetterSink, RateLimiter, EventSink, Clock）
//! - **impls**: in-memory implementations of the ports
//! - **typed**: 型付き Action API（Action, Handler, HandlerRegistry）
//! - **app**: EngineBuilder, Engine, workers, reaper, scheduler
//! - **config**: EngineConfig / KindConfig
//! - **observability**: tracing の初期化

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod impls;
pub mod observability;
pub mod ports;
pub mod typed;

pub use app::{Engine, EngineBuilder, EngineHandle, Tick};
pub use config::{EngineConfig, KindConfig};
pub use domain::{ActionKind, ClassifiedError, EnqueueRequest, ErrorClass, JobId, JobStatus, ResourceKey};
pub use error::EngineError;
