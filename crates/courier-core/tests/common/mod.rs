#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use courier_core::app::EngineBuilder;
use courier_core::impls::InMemoryJobStore;
use courier_core::ports::{AuditLog, Clock, FixedClock, UlidGenerator};
use courier_core::typed::{ActionContext, DynHandler};
use courier_core::{ClassifiedError, Engine, EngineConfig};

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
}

pub fn secs(n: i64) -> chrono::Duration {
    chrono::Duration::seconds(n)
}

/// What a scripted handler does on one call.
pub enum Step {
    Ok,
    Fail(ClassifiedError),
    Sleep(Duration),
    Panic,
}

/// Handler for any kind that plays back a script, then succeeds.
pub struct Scripted {
    kind: String,
    clock: Arc<dyn Clock>,
    script: Mutex<VecDeque<Step>>,
    calls: Mutex<Vec<(u32, DateTime<Utc>)>>,
}

impl Scripted {
    pub fn new(kind: &str, clock: Arc<dyn Clock>, script: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            kind: kind.to_string(),
            clock,
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// `(attempt, at)` for every call so far.
    pub fn calls(&self) -> Vec<(u32, DateTime<Utc>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl DynHandler for Scripted {
    async fn handle_dyn(
        &self,
        _payload: serde_json::Value,
        ctx: ActionContext,
    ) -> Result<serde_json::Value, ClassifiedError> {
        self.calls.lock().unwrap().push((ctx.attempt, self.clock.now()));
        let step = self.script.lock().unwrap().pop_front().unwrap_or(Step::Ok);
        match step {
            Step::Ok => Ok(serde_json::json!({"attempt": ctx.attempt})),
            Step::Fail(e) => Err(e),
            Step::Sleep(d) => {
                tokio::time::sleep(d).await;
                Ok(serde_json::json!({"slept_ms": d.as_millis() as u64}))
            }
            Step::Panic => panic!("scripted handler panic"),
        }
    }

    fn kind(&self) -> &str {
        &self.kind
    }
}

pub struct Harness {
    pub engine: Engine,
    pub clock: FixedClock,
    pub store: Arc<InMemoryJobStore>,
}

/// Engine on `clock` with an in-memory store the test can reach.
pub fn harness(clock: &FixedClock, config: EngineConfig, handlers: &[Arc<Scripted>]) -> Harness {
    let shared: Arc<dyn Clock> = Arc::new(clock.clone());
    let ids = Arc::new(UlidGenerator::new(Arc::clone(&shared)));
    let store = Arc::new(
        InMemoryJobStore::new(Arc::clone(&shared), ids).with_priority_cap(config.priority_cap),
    );
    let audit: Arc<dyn AuditLog> = store.audit_log();

    let mut builder = EngineBuilder::new()
        .config(config)
        .clock(shared)
        .store(store.clone(), audit);
    for handler in handlers {
        builder = builder.register_dyn(handler.clone()).unwrap();
    }

    Harness {
        engine: builder.build().unwrap(),
        clock: clock.clone(),
        store,
    }
}
