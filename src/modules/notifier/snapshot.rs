use serde::Serialize;
use uuid::Uuid;

use crate::modules::conversation::model::ConversationDetail;
use crate::modules::message::model::MessageDetail;

/// Payload một lần phát trên list feed: toàn bộ danh sách conversation
/// của user, đã sắp lại và trộn typing hiện tại.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationListSnapshot {
    pub conversations: Vec<ConversationDetail>,
}

/// Payload một lần phát trên log feed: đuôi log mới nhất của conversation
/// cộng tập user đang gõ tại thời điểm phát.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageTailSnapshot {
    pub conversation_id: Uuid,
    pub messages: Vec<MessageDetail>,
    pub typing: Vec<Uuid>,
}
