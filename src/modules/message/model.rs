use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::modules::message::schema::MessageEntity;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDetail {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub seq: i64,
    pub sender_id: Uuid,
    pub sender_name: String,
    pub sender_photo_url: Option<String>,
    pub text: String,
    pub attachments: Vec<String>,
    /// Sorted. Chỉ thêm, không bao giờ rút lại.
    pub read_by: Vec<Uuid>,
    /// emoji → sorted user ids. Emoji hết người thả thì biến mất khỏi map,
    /// không bao giờ tồn tại key với set rỗng.
    pub reactions: BTreeMap<String, Vec<Uuid>>,
    pub edited: bool,
    pub edited_at: Option<chrono::DateTime<chrono::Utc>>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl MessageDetail {
    pub fn from_entity(
        entity: MessageEntity,
        read_by: Vec<Uuid>,
        reactions: BTreeMap<String, Vec<Uuid>>,
    ) -> Self {
        MessageDetail {
            id: entity.id,
            conversation_id: entity.conversation_id,
            seq: entity.seq,
            sender_id: entity.sender_id,
            sender_name: entity.sender_name,
            sender_photo_url: entity.sender_photo_url,
            text: entity.text,
            attachments: entity.attachments,
            read_by,
            reactions,
            edited: entity.edited,
            edited_at: entity.edited_at,
            created_at: entity.created_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewMessage {
    #[serde(default)]
    #[validate(length(max = 4000))]
    pub text: String,
    #[serde(default)]
    pub attachments: Vec<String>,
}

impl NewMessage {
    /// Một message phải có chữ hoặc ít nhất một attachment.
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.attachments.is_empty()
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct EditMessage {
    #[validate(length(min = 1, max = 4000))]
    pub text: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct TailQuery {
    #[validate(range(min = 1, max = 200))]
    pub limit: Option<i64>,
}

#[derive(Debug)]
pub struct AppendOutcome {
    pub message: MessageDetail,
    /// Danh sách thành viên tại thời điểm append, cho fan-out.
    pub participant_ids: Vec<Uuid>,
}
