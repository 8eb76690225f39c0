//! Action trait - 型付き Action の定義
//!
//! A typed payload is bound to its kind by an associated constant, so a
//! handler registered for `SendDm` can only ever see `send_dm` jobs.

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Action は kind と payload 型を対応付ける
///
/// # 使用例
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct Nudge {
///     account: String,
/// }
///
/// impl Action for Nudge {
///     const KIND: &'static str = "nudge";
/// }
/// ```
pub trait Action: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// snake_case kind, unique per registry.
    const KIND: &'static str;
}
