//! ReaperLoop - 放置された lease の回収
//!
//! A worker that dies (or hangs past its timeout without being aborted)
//! leaves its job `active`. Once the lease is older than
//! `job_timeout * stale_grace_factor` the reaper returns the job to
//! `pending` without consuming an attempt, and any late report from the old
//! lease is rejected by the store.

use std::sync::Arc;

use tokio::sync::watch;

use super::engine::EngineInner;
use super::worker_group::idle;
use crate::domain::{DomainEvent, Job};
use crate::ports::clock::earlier;

pub struct Reaper {
    inner: Arc<EngineInner>,
}

impl Reaper {
    pub(crate) fn new(inner: Arc<EngineInner>) -> Self {
        Self { inner }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let interval = self.inner.config.reaper_interval();
        loop {
            if idle(&mut shutdown, interval).await {
                break;
            }
            self.run_once().await;
        }
    }

    /// One sweep over every registered kind. Returns the reclaimed jobs.
    pub async fn run_once(&self) -> Vec<Job> {
        let now = self.inner.now();
        let mut reclaimed = Vec::new();

        for kind in self.inner.registry.kinds() {
            let cutoff = earlier(now, self.inner.config.stale_after(&kind));
            match self.inner.store.reclaim_stale(&kind, cutoff).await {
                Ok(jobs) => {
                    for job in jobs {
                        tracing::warn!(job_id = %job.id, kind = %kind, attempt = job.attempt, "stale lease reclaimed");
                        self.inner
                            .emit(DomainEvent::Reclaimed {
                                job_id: job.id,
                                kind: kind.clone(),
                            })
                            .await;
                        reclaimed.push(job);
                    }
                }
                Err(e) => {
                    tracing::warn!(kind = %kind, error = %e, "reclaim sweep failed");
                }
            }
        }
        reclaimed
    }
}
