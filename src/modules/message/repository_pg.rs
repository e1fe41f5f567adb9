use std::collections::{BTreeMap, HashMap};

use uuid::Uuid;

use crate::api::error::ChatError;
use crate::modules::conversation::model::Profile;
use crate::modules::message::{
    model::{AppendOutcome, MessageDetail, NewMessage},
    repository::MessageRepository,
    schema::MessageEntity,
};

#[derive(Clone)]
pub struct MessagePgRepository {
    pool: sqlx::PgPool,
}

impl MessagePgRepository {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }

    /// Khoá row conversation, trả về last_seq hiện tại.
    async fn lock_conversation<'e>(
        &self,
        tx: &mut sqlx::Transaction<'e, sqlx::Postgres>,
        conversation_id: &Uuid,
    ) -> Result<i64, ChatError> {
        let last_seq = sqlx::query_scalar::<_, i64>(
            "SELECT last_seq FROM conversations WHERE id = $1 FOR UPDATE",
        )
        .bind(conversation_id)
        .fetch_optional(tx.as_mut())
        .await?
        .ok_or(ChatError::ConversationNotFound(*conversation_id))?;

        Ok(last_seq)
    }

    async fn guard_member<'e>(
        &self,
        tx: &mut sqlx::Transaction<'e, sqlx::Postgres>,
        conversation_id: &Uuid,
        user_id: &Uuid,
    ) -> Result<(), ChatError> {
        let is_member = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM participants WHERE conversation_id = $1 AND user_id = $2)",
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_one(tx.as_mut())
        .await?;

        if !is_member {
            return Err(ChatError::NotAParticipant(*conversation_id));
        }
        Ok(())
    }

    async fn guard_message<'e>(
        &self,
        tx: &mut sqlx::Transaction<'e, sqlx::Postgres>,
        conversation_id: &Uuid,
        message_id: &Uuid,
    ) -> Result<(), ChatError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM messages WHERE id = $1 AND conversation_id = $2)",
        )
        .bind(message_id)
        .bind(conversation_id)
        .fetch_one(tx.as_mut())
        .await?;

        if !exists {
            return Err(ChatError::MessageNotFound(*message_id));
        }
        Ok(())
    }

    /// read_by và reactions cho một lô message, đã sort sẵn trong SQL.
    async fn load_marks(
        &self,
        message_ids: &[Uuid],
    ) -> Result<
        (HashMap<Uuid, Vec<Uuid>>, HashMap<Uuid, BTreeMap<String, Vec<Uuid>>>),
        ChatError,
    > {
        let read_rows = sqlx::query_as::<_, (Uuid, Uuid)>(
            r#"
            SELECT message_id, user_id
            FROM message_reads
            WHERE message_id = ANY($1)
            ORDER BY user_id
            "#,
        )
        .bind(message_ids)
        .fetch_all(&self.pool)
        .await?;

        let reaction_rows = sqlx::query_as::<_, (Uuid, String, Uuid)>(
            r#"
            SELECT message_id, emoji, user_id
            FROM message_reactions
            WHERE message_id = ANY($1)
            ORDER BY emoji, user_id
            "#,
        )
        .bind(message_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut reads = HashMap::<Uuid, Vec<Uuid>>::new();
        for (message_id, user_id) in read_rows {
            reads.entry(message_id).or_default().push(user_id);
        }

        let mut reactions = HashMap::<Uuid, BTreeMap<String, Vec<Uuid>>>::new();
        for (message_id, emoji, user_id) in reaction_rows {
            reactions
                .entry(message_id)
                .or_default()
                .entry(emoji)
                .or_default()
                .push(user_id);
        }

        Ok((reads, reactions))
    }

    async fn assemble(&self, entities: Vec<MessageEntity>) -> Result<Vec<MessageDetail>, ChatError> {
        let ids: Vec<Uuid> = entities.iter().map(|m| m.id).collect();
        let (mut reads, mut reactions) = self.load_marks(&ids).await?;

        let details = entities
            .into_iter()
            .map(|entity| {
                let read_by = reads.remove(&entity.id).unwrap_or_default();
                let reaction_map = reactions.remove(&entity.id).unwrap_or_default();
                MessageDetail::from_entity(entity, read_by, reaction_map)
            })
            .collect();

        Ok(details)
    }
}

#[async_trait::async_trait]
impl MessageRepository for MessagePgRepository {
    async fn append(
        &self,
        conversation_id: &Uuid,
        sender: &Profile,
        content: &NewMessage,
    ) -> Result<AppendOutcome, ChatError> {
        let mut tx = self.pool.begin().await?;

        self.lock_conversation(&mut tx, conversation_id).await?;
        self.guard_member(&mut tx, conversation_id, &sender.user_id).await?;

        // GREATEST giữ created_at không tụt lùi khi đồng hồ hai lần NOW()
        // lệch nhau; seq mới là thứ tự chuẩn, timestamp chỉ để hiển thị.
        let (seq, created_at) = sqlx::query_as::<_, (i64, chrono::DateTime<chrono::Utc>)>(
            r#"
            UPDATE conversations
            SET last_seq = last_seq + 1,
                last_message_at = GREATEST(last_message_at, NOW()),
                updated_at = NOW()
            WHERE id = $1
            RETURNING last_seq, last_message_at
            "#,
        )
        .bind(conversation_id)
        .fetch_one(tx.as_mut())
        .await?;

        let entity = sqlx::query_as::<_, MessageEntity>(
            r#"
            INSERT INTO messages
                (id, conversation_id, seq, sender_id, sender_name, sender_photo_url,
                 text, attachments, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(conversation_id)
        .bind(seq)
        .bind(sender.user_id)
        .bind(&sender.display_name)
        .bind(&sender.photo_url)
        .bind(&content.text)
        .bind(&content.attachments)
        .bind(created_at)
        .fetch_one(tx.as_mut())
        .await?;

        sqlx::query("INSERT INTO message_reads (message_id, user_id) VALUES ($1, $2)")
            .bind(entity.id)
            .bind(sender.user_id)
            .execute(tx.as_mut())
            .await?;

        sqlx::query(
            r#"
            UPDATE participants
            SET unread_count = unread_count + 1
            WHERE conversation_id = $1
            AND user_id <> $2
            "#,
        )
        .bind(conversation_id)
        .bind(sender.user_id)
        .execute(tx.as_mut())
        .await?;

        // Mỗi lần gửi refresh lại meta cache của người gửi.
        sqlx::query(
            r#"
            UPDATE participants
            SET display_name = $3,
                photo_url = $4
            WHERE conversation_id = $1
            AND user_id = $2
            "#,
        )
        .bind(conversation_id)
        .bind(sender.user_id)
        .bind(&sender.display_name)
        .bind(&sender.photo_url)
        .execute(tx.as_mut())
        .await?;

        let participant_ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT user_id FROM participants WHERE conversation_id = $1 ORDER BY joined_at, user_id",
        )
        .bind(conversation_id)
        .fetch_all(tx.as_mut())
        .await?;

        tx.commit().await?;

        let message = MessageDetail::from_entity(entity, vec![sender.user_id], BTreeMap::new());
        Ok(AppendOutcome { message, participant_ids })
    }

    async fn tail(
        &self,
        conversation_id: &Uuid,
        limit: i64,
    ) -> Result<Vec<MessageDetail>, ChatError> {
        let exists =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM conversations WHERE id = $1)")
                .bind(conversation_id)
                .fetch_one(&self.pool)
                .await?;
        if !exists {
            return Err(ChatError::ConversationNotFound(*conversation_id));
        }

        let mut entities = sqlx::query_as::<_, MessageEntity>(
            r#"
            SELECT * FROM messages
            WHERE conversation_id = $1
            ORDER BY seq DESC
            LIMIT $2
            "#,
        )
        .bind(conversation_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        entities.reverse();
        self.assemble(entities).await
    }

    async fn edit(
        &self,
        conversation_id: &Uuid,
        message_id: &Uuid,
        editor_id: &Uuid,
        text: &str,
    ) -> Result<MessageDetail, ChatError> {
        let mut tx = self.pool.begin().await?;

        self.lock_conversation(&mut tx, conversation_id).await?;

        let sender_id = sqlx::query_scalar::<_, Uuid>(
            "SELECT sender_id FROM messages WHERE id = $1 AND conversation_id = $2",
        )
        .bind(message_id)
        .bind(conversation_id)
        .fetch_optional(tx.as_mut())
        .await?
        .ok_or(ChatError::MessageNotFound(*message_id))?;

        if sender_id != *editor_id {
            return Err(ChatError::NotSender);
        }

        let entity = sqlx::query_as::<_, MessageEntity>(
            r#"
            UPDATE messages
            SET text = $2, edited = TRUE, edited_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(message_id)
        .bind(text)
        .fetch_one(tx.as_mut())
        .await?;

        tx.commit().await?;

        let mut details = self.assemble(vec![entity]).await?;
        details.pop().ok_or(ChatError::MessageNotFound(*message_id))
    }

    async fn mark_read(&self, conversation_id: &Uuid, user_id: &Uuid) -> Result<(), ChatError> {
        let mut tx = self.pool.begin().await?;

        // Cursor chốt dưới row lock: message append sau thời điểm này
        // mang seq lớn hơn và không bị quét vào.
        let cursor = self.lock_conversation(&mut tx, conversation_id).await?;
        self.guard_member(&mut tx, conversation_id, user_id).await?;

        sqlx::query(
            r#"
            INSERT INTO message_reads (message_id, user_id)
            SELECT m.id, $2
            FROM messages m
            WHERE m.conversation_id = $1
            AND m.seq <= $3
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(conversation_id)
        .bind(user_id)
        .bind(cursor)
        .execute(tx.as_mut())
        .await?;

        sqlx::query(
            r#"
            UPDATE participants
            SET unread_count = 0,
                last_read_seq = GREATEST(last_read_seq, $3)
            WHERE conversation_id = $1
            AND user_id = $2
            "#,
        )
        .bind(conversation_id)
        .bind(user_id)
        .bind(cursor)
        .execute(tx.as_mut())
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn mark_message_read(
        &self,
        conversation_id: &Uuid,
        message_id: &Uuid,
        user_id: &Uuid,
    ) -> Result<(), ChatError> {
        let mut tx = self.pool.begin().await?;

        self.lock_conversation(&mut tx, conversation_id).await?;
        self.guard_member(&mut tx, conversation_id, user_id).await?;
        self.guard_message(&mut tx, conversation_id, message_id).await?;

        sqlx::query(
            "INSERT INTO message_reads (message_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(message_id)
        .bind(user_id)
        .execute(tx.as_mut())
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn add_reaction(
        &self,
        conversation_id: &Uuid,
        message_id: &Uuid,
        user_id: &Uuid,
        emoji: &str,
    ) -> Result<(), ChatError> {
        let mut tx = self.pool.begin().await?;

        self.lock_conversation(&mut tx, conversation_id).await?;
        self.guard_member(&mut tx, conversation_id, user_id).await?;
        self.guard_message(&mut tx, conversation_id, message_id).await?;

        sqlx::query(
            r#"
            INSERT INTO message_reactions (message_id, user_id, emoji)
            VALUES ($1, $2, $3)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(message_id)
        .bind(user_id)
        .bind(emoji)
        .execute(tx.as_mut())
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn remove_reaction(
        &self,
        conversation_id: &Uuid,
        message_id: &Uuid,
        user_id: &Uuid,
        emoji: &str,
    ) -> Result<(), ChatError> {
        let mut tx = self.pool.begin().await?;

        self.lock_conversation(&mut tx, conversation_id).await?;
        self.guard_member(&mut tx, conversation_id, user_id).await?;
        self.guard_message(&mut tx, conversation_id, message_id).await?;

        sqlx::query(
            "DELETE FROM message_reactions WHERE message_id = $1 AND user_id = $2 AND emoji = $3",
        )
        .bind(message_id)
        .bind(user_id)
        .bind(emoji)
        .execute(tx.as_mut())
        .await?;

        tx.commit().await?;
        Ok(())
    }
}
