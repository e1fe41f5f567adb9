use std::collections::{BTreeMap, BTreeSet};

use uuid::Uuid;

use crate::api::error::ChatError;
use crate::modules::conversation::model::Profile;
use crate::modules::conversation::repository_mem::MemBackend;
use crate::modules::message::{
    model::{AppendOutcome, MessageDetail, NewMessage},
    repository::MessageRepository,
};

pub(crate) struct MessageState {
    pub(crate) id: Uuid,
    pub(crate) seq: i64,
    pub(crate) sender: Profile,
    pub(crate) text: String,
    pub(crate) attachments: Vec<String>,
    pub(crate) read_by: BTreeSet<Uuid>,
    pub(crate) reactions: BTreeMap<String, BTreeSet<Uuid>>,
    pub(crate) edited: bool,
    pub(crate) edited_at: Option<chrono::DateTime<chrono::Utc>>,
    pub(crate) created_at: chrono::DateTime<chrono::Utc>,
}

impl MessageState {
    pub(crate) fn detail(&self, conversation_id: &Uuid) -> MessageDetail {
        MessageDetail {
            id: self.id,
            conversation_id: *conversation_id,
            seq: self.seq,
            sender_id: self.sender.user_id,
            sender_name: self.sender.display_name.clone(),
            sender_photo_url: self.sender.photo_url.clone(),
            text: self.text.clone(),
            attachments: self.attachments.clone(),
            read_by: self.read_by.iter().copied().collect(),
            reactions: self
                .reactions
                .iter()
                .map(|(emoji, users)| (emoji.clone(), users.iter().copied().collect()))
                .collect(),
            edited: self.edited,
            edited_at: self.edited_at,
            created_at: self.created_at,
        }
    }
}

#[derive(Clone)]
pub struct MessageMemRepository {
    backend: MemBackend,
}

impl MessageMemRepository {
    pub fn new(backend: MemBackend) -> Self {
        Self { backend }
    }
}

#[async_trait::async_trait]
impl MessageRepository for MessageMemRepository {
    async fn append(
        &self,
        conversation_id: &Uuid,
        sender: &Profile,
        content: &NewMessage,
    ) -> Result<AppendOutcome, ChatError> {
        let cell = self
            .backend
            .cell(conversation_id)
            .await
            .ok_or(ChatError::ConversationNotFound(*conversation_id))?;
        let mut cell = cell.lock().await;

        if !cell.is_participant(&sender.user_id) {
            return Err(ChatError::NotAParticipant(*conversation_id));
        }

        cell.entity.last_seq += 1;
        let seq = cell.entity.last_seq;

        // created_at không tụt lùi so với message trước, kể cả khi đồng hồ lùi.
        let created_at = chrono::Utc::now().max(cell.last_message_at);
        cell.last_message_at = created_at;
        cell.entity.updated_at = created_at;

        if let Some(p) = cell.participant_mut(&sender.user_id) {
            p.profile = sender.clone();
        }
        for p in cell.participants.iter_mut() {
            if p.profile.user_id != sender.user_id {
                p.unread_count += 1;
            }
        }

        let state = MessageState {
            id: Uuid::now_v7(),
            seq,
            sender: sender.clone(),
            text: content.text.clone(),
            attachments: content.attachments.clone(),
            read_by: BTreeSet::from([sender.user_id]),
            reactions: BTreeMap::new(),
            edited: false,
            edited_at: None,
            created_at,
        };
        let message = state.detail(conversation_id);
        cell.messages.push(state);

        Ok(AppendOutcome { message, participant_ids: cell.participant_ids() })
    }

    async fn tail(
        &self,
        conversation_id: &Uuid,
        limit: i64,
    ) -> Result<Vec<MessageDetail>, ChatError> {
        let cell = self
            .backend
            .cell(conversation_id)
            .await
            .ok_or(ChatError::ConversationNotFound(*conversation_id))?;
        let cell = cell.lock().await;

        let limit = limit.max(0) as usize;
        let start = cell.messages.len().saturating_sub(limit);
        Ok(cell.messages[start..].iter().map(|m| m.detail(conversation_id)).collect())
    }

    async fn edit(
        &self,
        conversation_id: &Uuid,
        message_id: &Uuid,
        editor_id: &Uuid,
        text: &str,
    ) -> Result<MessageDetail, ChatError> {
        let cell = self
            .backend
            .cell(conversation_id)
            .await
            .ok_or(ChatError::ConversationNotFound(*conversation_id))?;
        let mut cell = cell.lock().await;

        let message = cell
            .messages
            .iter_mut()
            .find(|m| m.id == *message_id)
            .ok_or(ChatError::MessageNotFound(*message_id))?;

        if message.sender.user_id != *editor_id {
            return Err(ChatError::NotSender);
        }

        message.text = text.to_string();
        message.edited = true;
        message.edited_at = Some(chrono::Utc::now());

        Ok(message.detail(conversation_id))
    }

    async fn mark_read(&self, conversation_id: &Uuid, user_id: &Uuid) -> Result<(), ChatError> {
        let cell = self
            .backend
            .cell(conversation_id)
            .await
            .ok_or(ChatError::ConversationNotFound(*conversation_id))?;
        let mut cell = cell.lock().await;

        if !cell.is_participant(user_id) {
            return Err(ChatError::NotAParticipant(*conversation_id));
        }

        let cursor = cell.entity.last_seq;
        for message in cell.messages.iter_mut() {
            if message.seq <= cursor {
                message.read_by.insert(*user_id);
            }
        }
        if let Some(p) = cell.participant_mut(user_id) {
            p.unread_count = 0;
            p.last_read_seq = p.last_read_seq.max(cursor);
        }

        Ok(())
    }

    async fn mark_message_read(
        &self,
        conversation_id: &Uuid,
        message_id: &Uuid,
        user_id: &Uuid,
    ) -> Result<(), ChatError> {
        let cell = self
            .backend
            .cell(conversation_id)
            .await
            .ok_or(ChatError::ConversationNotFound(*conversation_id))?;
        let mut cell = cell.lock().await;

        if !cell.is_participant(user_id) {
            return Err(ChatError::NotAParticipant(*conversation_id));
        }

        let message = cell
            .messages
            .iter_mut()
            .find(|m| m.id == *message_id)
            .ok_or(ChatError::MessageNotFound(*message_id))?;

        message.read_by.insert(*user_id);
        Ok(())
    }

    async fn add_reaction(
        &self,
        conversation_id: &Uuid,
        message_id: &Uuid,
        user_id: &Uuid,
        emoji: &str,
    ) -> Result<(), ChatError> {
        let cell = self
            .backend
            .cell(conversation_id)
            .await
            .ok_or(ChatError::ConversationNotFound(*conversation_id))?;
        let mut cell = cell.lock().await;

        if !cell.is_participant(user_id) {
            return Err(ChatError::NotAParticipant(*conversation_id));
        }

        let message = cell
            .messages
            .iter_mut()
            .find(|m| m.id == *message_id)
            .ok_or(ChatError::MessageNotFound(*message_id))?;

        message.reactions.entry(emoji.to_string()).or_default().insert(*user_id);
        Ok(())
    }

    async fn remove_reaction(
        &self,
        conversation_id: &Uuid,
        message_id: &Uuid,
        user_id: &Uuid,
        emoji: &str,
    ) -> Result<(), ChatError> {
        let cell = self
            .backend
            .cell(conversation_id)
            .await
            .ok_or(ChatError::ConversationNotFound(*conversation_id))?;
        let mut cell = cell.lock().await;

        if !cell.is_participant(user_id) {
            return Err(ChatError::NotAParticipant(*conversation_id));
        }

        let message = cell
            .messages
            .iter_mut()
            .find(|m| m.id == *message_id)
            .ok_or(ChatError::MessageNotFound(*message_id))?;

        if let Some(users) = message.reactions.get_mut(emoji) {
            users.remove(user_id);
            // Set rỗng thì xoá luôn key: key-rỗng và key-vắng là một.
            if users.is_empty() {
                message.reactions.remove(emoji);
            }
        }

        Ok(())
    }
}
