use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::modules::conversation::schema::ConversationType;

/// Danh tính do identity service cấp, đính kèm theo mọi thao tác ghi.
/// Store cache lại display_name/photo_url cho participant và message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub user_id: Uuid,
    #[validate(length(min = 1, max = 120))]
    pub display_name: String,
    pub photo_url: Option<String>,
}

/// Ai đang gọi thao tác quản lý thành viên. `System` dành cho mã nội bộ
/// (seed team roster), không bao giờ đến từ HTTP.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Actor {
    System,
    User(Uuid),
}

impl Actor {
    pub fn can_manage(&self, _type: &ConversationType) -> bool {
        matches!(self, Actor::System) || matches!(_type, ConversationType::Group)
    }
}

#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantDetail {
    pub user_id: Uuid,
    pub display_name: String,
    pub photo_url: Option<String>,
    pub unread_count: i32,
    pub last_read_seq: i64,
    pub joined_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LastMessageSummary {
    pub text: String,
    pub sender_id: Uuid,
    pub sender_name: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationDetail {
    pub conversation_id: Uuid,
    #[serde(rename = "type")]
    pub _type: ConversationType,
    pub name: Option<String>,
    pub description: Option<String>,
    pub photo_url: Option<String>,
    pub created_by: Uuid,
    pub participants: Vec<ParticipantDetail>,
    pub last_message: Option<LastMessageSummary>,
    /// Store luôn trả rỗng; notifier hub trộn typing hiện tại vào snapshot.
    pub typing: Vec<Uuid>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(FromRow)]
pub struct ConversationRaw {
    pub id: Uuid,
    #[sqlx(rename = "type")]
    pub _type: ConversationType,
    pub name: Option<String>,
    pub description: Option<String>,
    pub photo_url: Option<String>,
    pub created_by: Uuid,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,

    pub last_text: Option<String>,
    pub last_sender_id: Option<Uuid>,
    pub last_sender_name: Option<String>,
    pub last_created_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl ConversationRaw {
    pub fn into_detail(self, participants: Vec<ParticipantDetail>) -> ConversationDetail {
        let last_message = match (
            self.last_text,
            self.last_sender_id,
            self.last_sender_name,
            self.last_created_at,
        ) {
            (Some(text), Some(sender_id), Some(sender_name), Some(created_at)) => {
                Some(LastMessageSummary { text, sender_id, sender_name, created_at })
            }
            _ => None,
        };

        ConversationDetail {
            conversation_id: self.id,
            _type: self._type,
            name: self.name,
            description: self.description,
            photo_url: self.photo_url,
            created_by: self.created_by,
            participants,
            last_message,
            typing: Vec::new(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ParticipantWithConversation {
    pub conversation_id: Uuid,
    pub user_id: Uuid,
    pub display_name: String,
    pub photo_url: Option<String>,
    pub unread_count: i32,
    pub last_read_seq: i64,
    pub joined_at: chrono::DateTime<chrono::Utc>,
}

impl ParticipantWithConversation {
    pub fn into_detail(self) -> ParticipantDetail {
        ParticipantDetail {
            user_id: self.user_id,
            display_name: self.display_name,
            photo_url: self.photo_url,
            unread_count: self.unread_count,
            last_read_seq: self.last_read_seq,
            joined_at: self.joined_at,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct NewConversation {
    #[validate(length(min = 1, max = 120))]
    pub name: Option<String>,
    #[validate(length(max = 500))]
    pub description: Option<String>,
    #[validate(length(min = 1), nested)]
    pub members: Vec<Profile>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct DirectPeer {
    #[validate(nested)]
    pub peer: Profile,
}

#[derive(Debug, Deserialize, Validate)]
pub struct NewParticipant {
    #[validate(nested)]
    pub member: Profile,
}
