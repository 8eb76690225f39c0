//! WorkerLoop - タスク実行ループ
//!
//! # フロー
//! 1. `JobStore::claim_next()` で lease 取得
//! 2. `RateLimiter::try_consume()` で予算確認（不足なら defer、attempt は消費しない）
//! 3. Handler を別タスクで実行、timeout で abort
//! 4. `Decider` で retry / dead-letter を決定
//! 5. `JobStore::report_outcome()` で状態更新・監査ログ記録（受理されるまで再試行）

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use super::engine::EngineInner;
use super::worker_group::idle;
use crate::domain::{ActionKind, ClassifiedError, Decision, DomainEvent, JobId};
use crate::ports::clock::later;
use crate::ports::{ClaimFilter, Lease, RateDecision, RateKey, StoreError, Transition};
use crate::typed::ActionContext;

/// What one iteration of a worker did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tick {
    /// Nothing due.
    Idle,
    /// The kind is paused.
    Paused,
    /// The store could not be reached; nothing was claimed.
    StoreUnavailable,
    /// Out of budget; pushed back without consuming an attempt.
    Throttled { job_id: JobId, until: DateTime<Utc> },
    Succeeded { job_id: JobId },
    RetryScheduled { job_id: JobId, next_attempt: u32, due_at: DateTime<Utc> },
    DeadLettered { job_id: JobId },
    /// The store refused the report: the lease was revoked or reclaimed
    /// while the handler ran.
    Rejected { job_id: JobId },
}

impl Tick {
    pub fn job_id(&self) -> Option<JobId> {
        match self {
            Tick::Idle | Tick::Paused | Tick::StoreUnavailable => None,
            Tick::Throttled { job_id, .. }
            | Tick::Succeeded { job_id }
            | Tick::RetryScheduled { job_id, .. }
            | Tick::DeadLettered { job_id }
            | Tick::Rejected { job_id } => Some(*job_id),
        }
    }

    /// Whether the loop should sleep before the next iteration.
    fn idle_for(&self, inner: &EngineInner) -> Option<Duration> {
        match self {
            Tick::Idle | Tick::Paused => Some(inner.config.poll_interval()),
            Tick::StoreUnavailable => Some(inner.config.store_retry_pause()),
            _ => None,
        }
    }
}

/// One executor of one action kind.
pub struct Worker {
    inner: Arc<EngineInner>,
    kind: ActionKind,
    filter: ClaimFilter,
    worker_id: usize,
}

impl Worker {
    pub(crate) fn new(inner: Arc<EngineInner>, kind: ActionKind, worker_id: usize) -> Self {
        Self {
            filter: ClaimFilter::kind(kind.clone()),
            inner,
            kind,
            worker_id,
        }
    }

    pub fn kind(&self) -> &ActionKind {
        &self.kind
    }

    /// Loop until shutdown. The job in hand always finishes first.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::debug!(kind = %self.kind, worker_id = self.worker_id, "worker started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            let tick = self.run_once().await;
            match tick.idle_for(&self.inner) {
                Some(pause) => {
                    if idle(&mut shutdown, pause).await {
                        break;
                    }
                }
                None => tokio::task::yield_now().await,
            }
        }
        tracing::debug!(kind = %self.kind, worker_id = self.worker_id, "worker stopped");
    }

    /// Claim at most one job and carry it to its next state.
    pub async fn run_once(&self) -> Tick {
        if self.inner.is_paused(&self.kind) {
            return Tick::Paused;
        }

        let lease = match self.inner.store.claim_next(&self.filter).await {
            Ok(Some(lease)) => lease,
            Ok(None) => return Tick::Idle,
            Err(e) => {
                tracing::warn!(kind = %self.kind, worker_id = self.worker_id, error = %e, "claim failed");
                return Tick::StoreUnavailable;
            }
        };

        let job_id = lease.job_id();
        tracing::debug!(job_id = %job_id, kind = %self.kind, attempt = lease.attempt(), "job claimed");
        self.inner
            .emit(DomainEvent::Claimed {
                job_id,
                kind: self.kind.clone(),
                attempt: lease.attempt(),
            })
            .await;

        if let Some(until) = self.check_budget(&lease).await {
            return self.defer(&lease, until).await;
        }

        match self.execute(&lease).await {
            Ok(_) => self.report_success(&lease).await,
            Err(error) => self.report_failure(&lease, error).await,
        }
    }

    /// `Some(until)` when the job must wait for budget.
    async fn check_budget(&self, lease: &Lease) -> Option<DateTime<Utc>> {
        let mut keys = vec![RateKey::for_job(&self.kind, &lease.job.resource_key)];
        if self.inner.config.global_quota.is_some() {
            keys.push(RateKey::global());
        }

        match self.inner.limiter.try_consume(&keys, 1).await {
            Ok(RateDecision::Allowed) => None,
            Ok(RateDecision::ThrottledUntil(until)) => Some(until),
            Err(e) => {
                // 予算が確認できないときは実行しない
                tracing::warn!(job_id = %lease.job_id(), error = %e, "rate limiter unavailable, deferring");
                Some(later(self.inner.now(), self.inner.config.store_retry_pause()))
            }
        }
    }

    async fn defer(&self, lease: &Lease, until: DateTime<Utc>) -> Tick {
        let job_id = lease.job_id();
        let deferred = self
            .inner
            .with_store_retry("defer", || self.inner.store.defer(lease, until))
            .await;
        match deferred {
            Ok(job) => {
                tracing::info!(job_id = %job_id, kind = %self.kind, resource_key = %job.resource_key, until = %job.due_at, "job throttled");
                self.inner
                    .emit(DomainEvent::Throttled {
                        job_id,
                        kind: self.kind.clone(),
                        resource_key: job.resource_key.clone(),
                        until: job.due_at,
                    })
                    .await;
                Tick::Throttled {
                    job_id,
                    until: job.due_at,
                }
            }
            Err(e) => self.rejected(job_id, &e),
        }
    }

    /// Run the handler in its own task, aborted at the deadline.
    async fn execute(&self, lease: &Lease) -> Result<serde_json::Value, ClassifiedError> {
        let job = &lease.job;
        let Some(handler) = self.inner.registry.get(&job.kind) else {
            return Err(ClassifiedError::validation(format!(
                "no handler registered for kind '{}'",
                job.kind
            )));
        };

        let timeout = self.inner.config.kind(&job.kind).job_timeout();
        let ctx = ActionContext {
            job_id: job.id,
            kind: job.kind.clone(),
            attempt: job.attempt,
            max_attempts: job.max_attempts,
            resource_key: job.resource_key.clone(),
            deadline: later(self.inner.now(), timeout),
        };
        let payload = job.payload.clone();

        let mut task = tokio::spawn(async move { handler.handle_dyn(payload, ctx).await });
        match tokio::time::timeout(timeout, &mut task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) if join_err.is_panic() => Err(ClassifiedError::unknown(format!(
                "handler panicked: {join_err}"
            ))),
            Ok(Err(join_err)) => Err(ClassifiedError::unknown(format!(
                "handler task cancelled: {join_err}"
            ))),
            Err(_elapsed) => {
                task.abort();
                Err(ClassifiedError::timeout(format!(
                    "handler exceeded {}ms",
                    timeout.as_millis()
                )))
            }
        }
    }

    async fn report_success(&self, lease: &Lease) -> Tick {
        let job_id = lease.job_id();
        let reported = self
            .inner
            .with_store_retry("report_outcome", || {
                self.inner.store.report_outcome(lease, Transition::Succeeded)
            })
            .await;
        match reported {
            Ok(job) => {
                tracing::info!(job_id = %job_id, kind = %self.kind, attempt = job.attempt, "job succeeded");
                self.inner
                    .emit(DomainEvent::Succeeded {
                        job_id,
                        kind: self.kind.clone(),
                        attempt: job.attempt,
                    })
                    .await;
                Tick::Succeeded { job_id }
            }
            Err(e) => self.rejected(job_id, &e),
        }
    }

    async fn report_failure(&self, lease: &Lease, error: ClassifiedError) -> Tick {
        let job_id = lease.job_id();
        let job = &lease.job;
        let decision = self
            .inner
            .decider_for(&self.kind)
            .decide(&error, job.attempt, job.max_attempts);
        // the store refuses a retry at the ceiling, whatever the decider says
        let decision = match decision {
            Decision::Retry { .. } if job.attempt >= job.max_attempts => Decision::DeadLetter {
                reason: format!("max attempts reached: {}/{}", job.attempt, job.max_attempts),
            },
            other => other,
        };

        match decision {
            Decision::Retry { delay, reason } => {
                let due_at = later(self.inner.now(), delay);
                let transition = Transition::Retry {
                    error: error.clone(),
                    due_at,
                };
                let reported = self
                    .inner
                    .with_store_retry("report_outcome", || {
                        self.inner.store.report_outcome(lease, transition.clone())
                    })
                    .await;
                match reported {
                    Ok(job) => {
                        tracing::info!(
                            job_id = %job_id,
                            kind = %self.kind,
                            class = %error.class,
                            next_attempt = job.attempt,
                            due_at = %job.due_at,
                            reason = %reason,
                            "attempt failed, retry scheduled"
                        );
                        self.inner
                            .emit(DomainEvent::RetryScheduled {
                                job_id,
                                kind: self.kind.clone(),
                                next_attempt: job.attempt,
                                due_at: job.due_at,
                                class: error.class,
                            })
                            .await;
                        Tick::RetryScheduled {
                            job_id,
                            next_attempt: job.attempt,
                            due_at: job.due_at,
                        }
                    }
                    Err(e) => self.rejected(job_id, &e),
                }
            }
            Decision::DeadLetter { reason } => {
                let transition = Transition::DeadLetter {
                    error: error.clone(),
                };
                let reported = self
                    .inner
                    .with_store_retry("report_outcome", || {
                        self.inner.store.report_outcome(lease, transition.clone())
                    })
                    .await;
                let job = match reported {
                    Ok(job) => job,
                    Err(e) => return self.rejected(job_id, &e),
                };
                tracing::warn!(
                    job_id = %job_id,
                    kind = %self.kind,
                    class = %error.class,
                    attempt = job.attempt,
                    reason = %reason,
                    "job dead-lettered"
                );
                if let Err(e) = self.inner.quarantine(&job, &error).await {
                    tracing::error!(job_id = %job_id, error = %e, "dead-letter record not written");
                }
                Tick::DeadLettered { job_id }
            }
        }
    }

    fn rejected(&self, job_id: JobId, error: &StoreError) -> Tick {
        tracing::warn!(job_id = %job_id, kind = %self.kind, error = %error, "report rejected, dropping stale lease");
        Tick::Rejected { job_id }
    }
}
