use std::collections::HashSet;
use std::error::Error;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use tokio::time::{Duration, timeout};

use courier_core::domain::{DomainEvent, RetryPolicy};
use courier_core::observability;
use courier_core::typed::actions::{SendDm, WebhookDelivery};
use courier_core::typed::{Action, ActionContext, Handler};
use courier_core::{ActionKind, ClassifiedError, EngineBuilder, EngineConfig, KindConfig};

/// 503 を `failures` 回返してから成功する webhook
struct FlakyWebhook {
    remaining_failures: AtomicU32,
}

impl FlakyWebhook {
    fn new(failures: u32) -> Self {
        Self {
            remaining_failures: AtomicU32::new(failures),
        }
    }
}

#[async_trait]
impl Handler<WebhookDelivery> for FlakyWebhook {
    async fn handle(
        &self,
        action: WebhookDelivery,
        ctx: ActionContext,
    ) -> Result<serde_json::Value, ClassifiedError> {
        let left = self.remaining_failures.load(Ordering::Relaxed);
        if left > 0 {
            self.remaining_failures.fetch_sub(1, Ordering::Relaxed);
            return Err(ClassifiedError::http(503, format!("{} unavailable (left={left})", action.url)));
        }
        println!("delivered {} to {} on attempt {}", action.event, action.url, ctx.attempt);
        Ok(serde_json::json!({"status": 200}))
    }
}

/// 認証切れのアカウント: 常に 401
struct ExpiredSessionDm;

#[async_trait]
impl Handler<SendDm> for ExpiredSessionDm {
    async fn handle(&self, action: SendDm, _ctx: ActionContext) -> Result<serde_json::Value, ClassifiedError> {
        Err(ClassifiedError::http(
            401,
            format!("session expired while messaging {}", action.recipient),
        ))
    }
}

/// `COURIER_CONFIG` があればそれを、なければ presets を短い間隔に縮めて使う
fn load_config() -> Result<EngineConfig, Box<dyn Error>> {
    if let Ok(path) = std::env::var("COURIER_CONFIG") {
        return Ok(EngineConfig::from_path(path)?);
    }

    let webhook = KindConfig::webhook_delivery().with_retry(RetryPolicy::new(5, Duration::from_millis(20)));
    let mut dm = KindConfig::send_dm();
    dm.pacing = None;
    Ok(EngineConfig::with_presets()
        .with_kind(ActionKind::WEBHOOK_DELIVERY, webhook)
        .with_kind(ActionKind::SEND_DM, dm))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    observability::init();

    // (A) Engine を構築（handler 未登録の kind があれば起動前に失敗）
    let engine = EngineBuilder::new()
        .config(load_config()?)
        .register::<WebhookDelivery, _>(FlakyWebhook::new(2))?
        .register::<SendDm, _>(ExpiredSessionDm)?
        .expect_kinds(&[WebhookDelivery::KIND, SendDm::KIND])
        .build()?;

    // (B) イベントを購読してから worker を起動
    let mut events = engine.subscribe();
    let handle = engine.start()?;
    println!("started {} tasks", handle.task_count());

    // (C) ジョブ投入
    let delivery = WebhookDelivery {
        url: "https://hooks.example.com/orders".into(),
        event: "order.paid".into(),
        body: serde_json::json!({"order_id": 42}),
    };
    let dm = SendDm {
        recipient: "@someone".into(),
        message: "thanks for the follow".into(),
        campaign_id: None,
    };
    let mut pending: HashSet<_> = [
        engine.enqueue_action(&delivery, "endpoint-orders").await?,
        engine.enqueue_action(&dm, "account-1").await?,
    ]
    .into_iter()
    .collect();

    // (D) 両方が終端状態になるまで待つ
    let waited = timeout(Duration::from_secs(30), async {
        while !pending.is_empty() {
            match events.recv().await {
                Ok(event) => {
                    println!("event: {}", serde_json::to_string(&event).unwrap_or_default());
                    if event.is_terminal() {
                        pending.remove(&event.job_id());
                    }
                    if let DomainEvent::DeadLettered { job_id, reason, .. } = &event {
                        println!("ALERT dead letter {job_id}: {reason}");
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "event feed interrupted");
                    break;
                }
            }
        }
    })
    .await;
    if waited.is_err() {
        println!("gave up waiting for {} job(s)", pending.len());
    }

    // (E) ダッシュボード相当の出力
    let health = engine.health().await;
    println!("health: {}", serde_json::to_string_pretty(&health)?);
    for record in engine.dead_letters(None).await? {
        println!(
            "dead letter: job={} kind={} class={} attempts={}/{} history={}",
            record.job_id,
            record.kind,
            record.error.class,
            record.attempts,
            record.max_attempts,
            record.history.len()
        );
    }

    // (F) graceful shutdown: in-flight のジョブを終えてから止まる
    handle.shutdown_and_join().await;
    Ok(())
}
