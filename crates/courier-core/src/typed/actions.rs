//! Payloads of the built-in action kinds.
//!
//! These only carry what a handler needs to make the call; the wire format of
//! the third-party API stays inside the handler.

use serde::{Deserialize, Serialize};

use super::action::Action;
use crate::domain::ActionKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendDm {
    pub recipient: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub campaign_id: Option<String>,
}

impl Action for SendDm {
    const KIND: &'static str = ActionKind::SEND_DM;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookDelivery {
    pub url: String,
    pub event: String,
    pub body: serde_json::Value,
}

impl Action for WebhookDelivery {
    const KIND: &'static str = ActionKind::WEBHOOK_DELIVERY;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngagementLike {
    pub post_id: String,
}

impl Action for EngagementLike {
    const KIND: &'static str = ActionKind::ENGAGEMENT_LIKE;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngagementComment {
    pub post_id: String,
    pub text: String,
}

impl Action for EngagementComment {
    const KIND: &'static str = ActionKind::ENGAGEMENT_COMMENT;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repost {
    pub post_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commentary: Option<String>,
}

impl Action for Repost {
    const KIND: &'static str = ActionKind::REPOST;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentPoll {
    pub post_id: String,
    /// Only comments newer than this cursor are reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<String>,
}

impl Action for CommentPoll {
    const KIND: &'static str = ActionKind::COMMENT_POLL;
}
