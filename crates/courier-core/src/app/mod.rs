//! App - アプリケーション層
//!
//! Wires the ports into a running engine.
//!
//! # 主要コンポーネント
//! - **EngineBuilder**: 構築とワイヤリング（起動時検証）
//! - **Engine**: producer / dashboard / operator API
//! - **Worker**: claim → rate check → handle → decide → report
//! - **Reaper**: 放置された lease の回収
//! - **scheduler**: ready order and pacing

pub mod builder;
pub mod engine;
pub mod reaper_loop;
pub mod scheduler;
pub mod status;
pub mod worker_group;
pub mod worker_loop;

pub use self::builder::{BuildError, EngineBuilder};
pub use self::engine::{Engine, EngineHandle};
pub use self::reaper_loop::Reaper;
pub use self::scheduler::{Pacing, ReadyKey};
pub use self::status::{HealthReport, KindHealth, RunStatus};
pub use self::worker_group::WorkerGroup;
pub use self::worker_loop::{Tick, Worker};
