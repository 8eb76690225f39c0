//! Handler trait - Action を実行する Handler の定義
//!
//! - 表層: `Handler<T>` (typed, one payload type)
//! - 内部: `DynHandler` (object-safe, stored in the registry)
//! - `TypedHandler<T, H>` erases the first into the second.

use std::marker::PhantomData;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::action::Action;
use crate::domain::{ActionKind, ClassifiedError, JobId, ResourceKey};

/// What a handler knows about the attempt it is running.
///
/// On `attempt > 1` a non-idempotent handler should check whether the
/// previous attempt already took effect before acting again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionContext {
    pub job_id: JobId,
    pub kind: ActionKind,
    pub attempt: u32,
    pub max_attempts: u32,
    pub resource_key: ResourceKey,
    /// The call is aborted at this instant.
    pub deadline: DateTime<Utc>,
}

impl ActionContext {
    pub fn is_retry(&self) -> bool {
        self.attempt > 1
    }

    pub fn is_last_attempt(&self) -> bool {
        self.attempt >= self.max_attempts
    }
}

/// Handler は Action を実行して結果を返す
///
/// # 使用例
/// ```ignore
/// struct LikeHandler { client: Client }
///
/// #[async_trait]
/// impl Handler<EngagementLike> for LikeHandler {
///     async fn handle(&self, action: EngagementLike, ctx: ActionContext)
///         -> Result<serde_json::Value, ClassifiedError>
///     {
///         let status = self.client.like(&action.post_id).await?;
///         if status != 200 {
///             return Err(ClassifiedError::http(status, "like rejected"));
///         }
///         Ok(serde_json::json!({"liked": action.post_id}))
///     }
/// }
/// ```
///
/// Failures must be classified here, at the boundary. The engine never looks
/// at the message text.
#[async_trait]
pub trait Handler<T: Action>: Send + Sync {
    async fn handle(&self, action: T, ctx: ActionContext) -> Result<serde_json::Value, ClassifiedError>;
}

/// Object-safe handler over raw JSON payloads.
///
/// Implement this directly for kinds without a Rust payload type.
#[async_trait]
pub trait DynHandler: Send + Sync {
    async fn handle_dyn(
        &self,
        payload: serde_json::Value,
        ctx: ActionContext,
    ) -> Result<serde_json::Value, ClassifiedError>;

    fn kind(&self) -> &str;
}

pub struct TypedHandler<T: Action, H: Handler<T>> {
    handler: H,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Action, H: Handler<T>> TypedHandler<T, H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T: Action, H: Handler<T>> DynHandler for TypedHandler<T, H> {
    async fn handle_dyn(
        &self,
        payload: serde_json::Value,
        ctx: ActionContext,
    ) -> Result<serde_json::Value, ClassifiedError> {
        // 壊れた payload は何度やり直しても直らない
        let action: T = serde_json::from_value(payload)
            .map_err(|e| ClassifiedError::validation(format!("payload decode for {}: {e}", T::KIND)))?;
        self.handler.handle(action, ctx).await
    }

    fn kind(&self) -> &str {
        T::KIND
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::domain::ErrorClass;
    use crate::typed::actions::SendDm;
    use serde_json::json;

    #[tokio::test]
    async fn typed_handler_decodes_and_runs() {
        let handler = TypedHandler::<SendDm, _>::new(EchoDmHandler);
        assert_eq!(handler.kind(), "send_dm");

        let out = handler
            .handle_dyn(json!({"recipient": "u-9", "message": "hello"}), ctx("send_dm", 2))
            .await
            .unwrap();
        assert_eq!(out, json!({"to": "u-9", "attempt": 2}));
    }

    #[tokio::test]
    async fn undecodable_payload_is_a_validation_error() {
        let handler = TypedHandler::<SendDm, _>::new(EchoDmHandler);
        let err = handler
            .handle_dyn(json!({"recipient": 42}), ctx("send_dm", 1))
            .await
            .unwrap_err();
        assert_eq!(err.class, ErrorClass::ValidationError);
        assert!(!err.is_retryable());
    }

    #[test]
    fn context_reports_retry_position() {
        let first = ctx("send_dm", 1);
        assert!(!first.is_retry());
        let last = ctx("send_dm", 3);
        assert!(last.is_retry());
        assert!(last.is_last_attempt());
    }
}
