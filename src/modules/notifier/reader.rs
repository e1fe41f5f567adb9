use std::sync::Arc;

use uuid::Uuid;

use crate::api::error::ChatError;
use crate::modules::conversation::{model::ConversationDetail, repository::ConversationRepository};
use crate::modules::message::{model::MessageDetail, repository::MessageRepository};

/// Hub chỉ cần hai phép đọc này. Tách trait để test cắm reader giả
/// (giả lập store lỗi, đếm số lần đọc) mà không cần store thật.
#[async_trait::async_trait]
pub trait SnapshotReader: Send + Sync {
    async fn conversation_list(
        &self,
        user_id: &Uuid,
    ) -> Result<Vec<ConversationDetail>, ChatError>;

    async fn message_tail(
        &self,
        conversation_id: &Uuid,
        limit: i64,
    ) -> Result<Vec<MessageDetail>, ChatError>;
}

/// Reader mặc định: đọc thẳng từ hai repository.
pub struct StoreReader<C, M> {
    conversations: Arc<C>,
    messages: Arc<M>,
}

impl<C, M> StoreReader<C, M> {
    pub fn new(conversations: Arc<C>, messages: Arc<M>) -> Self {
        Self { conversations, messages }
    }
}

#[async_trait::async_trait]
impl<C, M> SnapshotReader for StoreReader<C, M>
where
    C: ConversationRepository + Send + Sync,
    M: MessageRepository + Send + Sync,
{
    async fn conversation_list(
        &self,
        user_id: &Uuid,
    ) -> Result<Vec<ConversationDetail>, ChatError> {
        self.conversations.list_for_user(user_id).await
    }

    async fn message_tail(
        &self,
        conversation_id: &Uuid,
        limit: i64,
    ) -> Result<Vec<MessageDetail>, ChatError> {
        self.messages.tail(conversation_id, limit).await
    }
}
