//! Delivery guarantees under many jobs and concurrent workers.

mod common;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use common::{Scripted, Step, harness, t0};
use courier_core::domain::DomainEvent;
use courier_core::ports::{FixedClock, JobStore};
use courier_core::typed::{ActionContext, DynHandler};
use courier_core::{
    ClassifiedError, EngineBuilder, EngineConfig, EnqueueRequest, JobId, JobStatus, KindConfig,
    Tick,
};
use proptest::prelude::*;
use serde_json::json;

const KIND: &str = "crm_sync";

/// Fails with a network error while `attempt <= payload.fail`.
#[derive(Default)]
struct FailsFirst {
    calls: Mutex<HashMap<JobId, Vec<u32>>>,
}

impl FailsFirst {
    fn calls_for(&self, job_id: JobId) -> Vec<u32> {
        self.calls.lock().unwrap().get(&job_id).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl DynHandler for FailsFirst {
    async fn handle_dyn(
        &self,
        payload: serde_json::Value,
        ctx: ActionContext,
    ) -> Result<serde_json::Value, ClassifiedError> {
        self.calls.lock().unwrap().entry(ctx.job_id).or_default().push(ctx.attempt);
        let fail = payload["fail"].as_u64().unwrap_or(0);
        if u64::from(ctx.attempt) <= fail {
            return Err(ClassifiedError::network("connection reset"));
        }
        tokio::task::yield_now().await;
        Ok(json!({"synced": true}))
    }

    fn kind(&self) -> &str {
        KIND
    }
}

fn config(max_attempts: u32) -> EngineConfig {
    EngineConfig::default().with_kind(
        KIND,
        KindConfig::default().with_max_attempts(max_attempts),
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn every_job_ends_terminal_with_one_call_per_attempt(fails in prop::collection::vec(0u32..5, 1..12)) {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        rt.block_on(async {
            let clock = FixedClock::new(t0());
            let handler = Arc::new(FailsFirst::default());
            let engine = EngineBuilder::new()
                .config(config(3))
                .clock(Arc::new(clock.clone()))
                .register_dyn(handler.clone())
                .unwrap()
                .build()
                .unwrap();

            let mut ids = Vec::new();
            for (n, fail) in fails.iter().enumerate() {
                let req = EnqueueRequest::new(KIND, json!({"fail": fail}), format!("contact-{n}"));
                ids.push(engine.enqueue(req).await.unwrap());
            }

            let worker = engine.worker(KIND);
            for _ in 0..10 {
                while worker.run_once().await != Tick::Idle {}
                clock.advance(Duration::from_secs(3_600));
            }

            for (job_id, fail) in ids.iter().zip(&fails) {
                let job = engine.job(*job_id).await.unwrap().unwrap();
                let calls = handler.calls_for(*job_id);
                let expected: Vec<u32> = (1..=(*fail + 1).min(3)).collect();
                assert_eq!(calls, expected);
                if *fail < 3 {
                    assert_eq!(job.status, JobStatus::Success);
                    assert!(engine.dead_letter(*job_id).await.unwrap().is_none());
                } else {
                    assert_eq!(job.status, JobStatus::DeadLetter);
                    assert_eq!(job.attempt, 3);
                    assert!(engine.dead_letter(*job_id).await.unwrap().is_some());
                }
                let trail = engine.audit_trail(*job_id).await.unwrap();
                assert_eq!(trail.len(), calls.len());
            }

            let stats = engine.queue_stats(None).await.unwrap();
            assert_eq!(stats.total, fails.len());
            assert_eq!(stats.waiting + stats.delayed + stats.active, 0);
        });
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_workers_never_share_a_job() {
    let clock = FixedClock::new(t0());
    let handler = Arc::new(FailsFirst::default());
    let engine = EngineBuilder::new()
        .config(config(1))
        .clock(Arc::new(clock.clone()))
        .register_dyn(handler.clone())
        .unwrap()
        .build()
        .unwrap();

    let mut ids = Vec::new();
    for n in 0..60 {
        let req = EnqueueRequest::new(KIND, json!({"fail": 0}), format!("contact-{}", n % 7));
        ids.push(engine.enqueue(req).await.unwrap());
    }

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let worker = engine.worker(KIND);
        tasks.push(tokio::spawn(async move {
            let mut done = Vec::new();
            loop {
                match worker.run_once().await {
                    Tick::Idle => break,
                    Tick::Succeeded { job_id } => done.push(job_id),
                    other => panic!("unexpected tick {other:?}"),
                }
            }
            done
        }));
    }

    let mut succeeded = Vec::new();
    for task in tasks {
        succeeded.extend(task.await.unwrap());
    }
    succeeded.sort();
    ids.sort();
    assert_eq!(succeeded, ids);
    for id in &ids {
        assert_eq!(handler.calls_for(*id), vec![1]);
    }
}

#[tokio::test]
async fn the_claimed_event_precedes_the_outcome() {
    let clock = FixedClock::new(t0());
    let handler = Scripted::new(
        "ping",
        Arc::new(clock.clone()),
        vec![Step::Fail(ClassifiedError::validation("bad host"))],
    );
    let h = harness(&clock, EngineConfig::default(), &[handler]);
    let mut events = h.engine.subscribe();

    let job_id = h
        .engine
        .enqueue(EnqueueRequest::new("ping", json!({}), "host-1"))
        .await
        .unwrap();
    assert_eq!(h.engine.worker("ping").run_once().await, Tick::DeadLettered { job_id });

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert!(matches!(seen[0], DomainEvent::Enqueued { .. }));
    assert!(matches!(seen[1], DomainEvent::Claimed { attempt: 1, .. }));
    assert!(matches!(seen[2], DomainEvent::DeadLettered { .. }));
    assert_eq!(seen.len(), 3);

    // nothing left behind an active lease
    let job = h.store.get(job_id).await.unwrap().unwrap();
    assert!(job.lease.is_none());
}
