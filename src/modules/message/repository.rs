use uuid::Uuid;

use crate::api::error::ChatError;
use crate::modules::conversation::model::Profile;
use crate::modules::message::model::{AppendOutcome, MessageDetail, NewMessage};

/// Như bên conversation: mỗi method tự atomic trên một conversation,
/// backend Postgres khoá row, backend in-memory khoá cell. Append và
/// mark_read vì thế không bao giờ đan xen trên cùng conversation.
#[async_trait::async_trait]
pub trait MessageRepository {
    /// Cấp seq kế tiếp, ghi message với read_by = {sender}, +1 unread
    /// cho mọi thành viên khác, refresh meta người gửi, bump updated_at.
    async fn append(
        &self,
        conversation_id: &Uuid,
        sender: &Profile,
        content: &NewMessage,
    ) -> Result<AppendOutcome, ChatError>;

    /// `limit` message mới nhất, trả theo seq tăng dần.
    async fn tail(
        &self,
        conversation_id: &Uuid,
        limit: i64,
    ) -> Result<Vec<MessageDetail>, ChatError>;

    async fn edit(
        &self,
        conversation_id: &Uuid,
        message_id: &Uuid,
        editor_id: &Uuid,
        text: &str,
    ) -> Result<MessageDetail, ChatError>;

    /// Cursor-based: chốt cursor = last_seq dưới khoá ghi, điền read_by cho
    /// mọi message có seq <= cursor rồi reset unread về 0. Message append
    /// sau khi chốt cursor giữ nguyên trạng thái chưa đọc.
    async fn mark_read(&self, conversation_id: &Uuid, user_id: &Uuid) -> Result<(), ChatError>;

    /// Đánh dấu một message duy nhất; không đụng unread counter.
    async fn mark_message_read(
        &self,
        conversation_id: &Uuid,
        message_id: &Uuid,
        user_id: &Uuid,
    ) -> Result<(), ChatError>;

    /// Idempotent theo khoá (message, user, emoji).
    async fn add_reaction(
        &self,
        conversation_id: &Uuid,
        message_id: &Uuid,
        user_id: &Uuid,
        emoji: &str,
    ) -> Result<(), ChatError>;

    /// Gỡ reaction chưa từng thả là no-op.
    async fn remove_reaction(
        &self,
        conversation_id: &Uuid,
        message_id: &Uuid,
        user_id: &Uuid,
        emoji: &str,
    ) -> Result<(), ChatError>;
}
