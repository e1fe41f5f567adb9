use sqlx::prelude::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct MessageEntity {
    pub id: Uuid,
    pub conversation_id: Uuid,
    /// Thứ tự trong conversation, cấp tuần tự dưới row lock, bắt đầu từ 1.
    pub seq: i64,
    pub sender_id: Uuid,
    pub sender_name: String,
    pub sender_photo_url: Option<String>,
    pub text: String,
    pub attachments: Vec<String>,
    pub edited: bool,
    pub edited_at: Option<chrono::DateTime<chrono::Utc>>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}
