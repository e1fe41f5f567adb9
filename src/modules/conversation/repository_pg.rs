use std::collections::HashMap;
use uuid::Uuid;

use crate::api::error::ChatError;
use crate::modules::conversation::model::{
    ConversationDetail, ConversationRaw, ParticipantWithConversation, Profile,
};
use crate::modules::conversation::repository::{pair_key, ConversationRepository, TEAM_KEY};
use crate::modules::conversation::schema::ConversationEntity;

#[derive(Clone)]
pub struct ConversationPgRepository {
    pool: sqlx::PgPool,
}

impl ConversationPgRepository {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }

    /// Bulk insert giữ nguyên meta của từng profile. Trả về số row thực sự
    /// chèn mới (thành viên đã có bị ON CONFLICT bỏ qua).
    async fn insert_participants<'e>(
        &self,
        tx: &mut sqlx::Transaction<'e, sqlx::Postgres>,
        conversation_id: &Uuid,
        members: &[Profile],
    ) -> Result<u64, ChatError> {
        let user_ids: Vec<Uuid> = members.iter().map(|m| m.user_id).collect();
        let display_names: Vec<String> = members.iter().map(|m| m.display_name.clone()).collect();
        let photo_urls: Vec<Option<String>> =
            members.iter().map(|m| m.photo_url.clone()).collect();

        let res = sqlx::query(
            r#"
            INSERT INTO participants (conversation_id, user_id, display_name, photo_url)
            SELECT $1, user_id, display_name, photo_url
            FROM unnest($2::uuid[], $3::text[], $4::text[]) AS t(user_id, display_name, photo_url)
            ON CONFLICT (conversation_id, user_id) DO NOTHING
            "#,
        )
        .bind(conversation_id)
        .bind(&user_ids)
        .bind(&display_names)
        .bind(&photo_urls)
        .execute(tx.as_mut())
        .await?;

        Ok(res.rows_affected())
    }

    async fn participants_by_conversation_ids(
        &self,
        conversation_ids: &[Uuid],
    ) -> Result<Vec<ParticipantWithConversation>, ChatError> {
        let participants = sqlx::query_as::<_, ParticipantWithConversation>(
            r#"
            SELECT
                p.conversation_id,
                p.user_id,
                p.display_name,
                p.photo_url,
                p.unread_count,
                p.last_read_seq,
                p.joined_at
            FROM participants p
            WHERE p.conversation_id = ANY($1)
            ORDER BY p.joined_at, p.user_id
            "#,
        )
        .bind(conversation_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(participants)
    }
}

#[async_trait::async_trait]
impl ConversationRepository for ConversationPgRepository {
    async fn resolve_direct(
        &self,
        a: &Profile,
        b: &Profile,
    ) -> Result<(ConversationEntity, bool), ChatError> {
        let key = pair_key(&a.user_id, &b.user_id);

        // Hai lượt: lượt đầu thua race thì đọc lại row của người thắng.
        // Lượt hai chỉ chạy nếu người thắng abort transaction giữa chừng.
        for _ in 0..2 {
            let mut tx = self.pool.begin().await?;

            let created = sqlx::query_as::<_, ConversationEntity>(
                r#"
                INSERT INTO conversations (id, type, singleton_key, created_by)
                VALUES ($1, 'direct', $2, $3)
                ON CONFLICT (singleton_key) DO NOTHING
                RETURNING *
                "#,
            )
            .bind(Uuid::now_v7())
            .bind(&key)
            .bind(a.user_id)
            .fetch_optional(tx.as_mut())
            .await?;

            if let Some(entity) = created {
                self.insert_participants(&mut tx, &entity.id, &[a.clone(), b.clone()]).await?;
                tx.commit().await?;
                return Ok((entity, true));
            }

            tx.rollback().await?;

            let existing = sqlx::query_as::<_, ConversationEntity>(
                "SELECT * FROM conversations WHERE singleton_key = $1",
            )
            .bind(&key)
            .fetch_optional(&self.pool)
            .await?;

            if let Some(entity) = existing {
                return Ok((entity, false));
            }
        }

        Err(ChatError::DuplicateDirectConversation)
    }

    async fn resolve_team(
        &self,
        name: &str,
        roster: &[Profile],
    ) -> Result<(ConversationEntity, bool), ChatError> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query_as::<_, ConversationEntity>(
            r#"
            INSERT INTO conversations (id, type, name, singleton_key, created_by)
            VALUES ($1, 'team', $2, $3, $4)
            ON CONFLICT (singleton_key) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(name)
        .bind(TEAM_KEY)
        .bind(Uuid::nil())
        .fetch_optional(tx.as_mut())
        .await?;

        let (entity, created) = match inserted {
            Some(entity) => (entity, true),
            None => {
                let entity = sqlx::query_as::<_, ConversationEntity>(
                    "SELECT * FROM conversations WHERE singleton_key = $1",
                )
                .bind(TEAM_KEY)
                .fetch_optional(tx.as_mut())
                .await?
                .ok_or(ChatError::Store("team conversation vanished mid-resolve".into()))?;
                (entity, false)
            }
        };

        let added = self.insert_participants(&mut tx, &entity.id, roster).await?;

        if !created && added > 0 {
            sqlx::query("UPDATE conversations SET updated_at = NOW() WHERE id = $1")
                .bind(entity.id)
                .execute(tx.as_mut())
                .await?;
        }

        tx.commit().await?;
        Ok((entity, created || added > 0))
    }

    async fn create_group(
        &self,
        creator: &Profile,
        members: &[Profile],
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<ConversationEntity, ChatError> {
        let mut tx = self.pool.begin().await?;

        let entity = sqlx::query_as::<_, ConversationEntity>(
            r#"
            INSERT INTO conversations (id, type, name, description, created_by)
            VALUES ($1, 'group', $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(Uuid::now_v7())
        .bind(name)
        .bind(description)
        .bind(creator.user_id)
        .fetch_one(tx.as_mut())
        .await?;

        self.insert_participants(&mut tx, &entity.id, members).await?;

        tx.commit().await?;
        Ok(entity)
    }

    async fn find_by_id(
        &self,
        conversation_id: &Uuid,
    ) -> Result<Option<ConversationEntity>, ChatError> {
        let conversation =
            sqlx::query_as::<_, ConversationEntity>("SELECT * FROM conversations WHERE id = $1")
                .bind(conversation_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(conversation)
    }

    async fn find_detail(
        &self,
        conversation_id: &Uuid,
    ) -> Result<Option<ConversationDetail>, ChatError> {
        let raw = sqlx::query_as::<_, ConversationRaw>(
            r#"
            SELECT
                c.id,
                c.type,
                c.name,
                c.description,
                c.photo_url,
                c.created_by,
                c.created_at,
                c.updated_at,

                lm.text       AS last_text,
                lm.sender_id  AS last_sender_id,
                lm.sender_name AS last_sender_name,
                lm.created_at AS last_created_at
            FROM conversations c
            LEFT JOIN LATERAL (
                SELECT text, sender_id, sender_name, created_at
                FROM messages m
                WHERE m.conversation_id = c.id
                ORDER BY m.seq DESC
                LIMIT 1
            ) lm ON TRUE
            WHERE c.id = $1
            LIMIT 1
            "#,
        )
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await?;

        let raw = match raw {
            Some(v) => v,
            None => return Ok(None),
        };

        let participants = self
            .participants_by_conversation_ids(&[*conversation_id])
            .await?
            .into_iter()
            .map(ParticipantWithConversation::into_detail)
            .collect();

        Ok(Some(raw.into_detail(participants)))
    }

    async fn list_for_user(&self, user_id: &Uuid) -> Result<Vec<ConversationDetail>, ChatError> {
        let rows = sqlx::query_as::<_, ConversationRaw>(
            r#"
            SELECT
                c.id,
                c.type,
                c.name,
                c.description,
                c.photo_url,
                c.created_by,
                c.created_at,
                c.updated_at,

                lm.text        AS last_text,
                lm.sender_id   AS last_sender_id,
                lm.sender_name AS last_sender_name,
                lm.created_at  AS last_created_at

            FROM conversations c

            JOIN participants p
                ON p.conversation_id = c.id
            AND p.user_id = $1

            LEFT JOIN LATERAL (
                SELECT text, sender_id, sender_name, created_at
                FROM messages m
                WHERE m.conversation_id = c.id
                ORDER BY m.seq DESC
                LIMIT 1
            ) lm ON TRUE

            ORDER BY c.updated_at DESC, c.id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let conversation_ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let participants = self.participants_by_conversation_ids(&conversation_ids).await?;

        let mut participant_map = participants.into_iter().fold(
            HashMap::<Uuid, Vec<ParticipantWithConversation>>::new(),
            |mut acc, participant| {
                acc.entry(participant.conversation_id).or_default().push(participant);
                acc
            },
        );

        let res = rows
            .into_iter()
            .map(|raw| {
                let participants = participant_map
                    .remove(&raw.id)
                    .unwrap_or_default()
                    .into_iter()
                    .map(ParticipantWithConversation::into_detail)
                    .collect();
                raw.into_detail(participants)
            })
            .collect();

        Ok(res)
    }

    async fn add_participant(
        &self,
        conversation_id: &Uuid,
        member: &Profile,
    ) -> Result<(Vec<Uuid>, bool), ChatError> {
        let mut tx = self.pool.begin().await?;

        // Khoá row để membership không đua với append trên cùng conversation.
        sqlx::query_scalar::<_, Uuid>("SELECT id FROM conversations WHERE id = $1 FOR UPDATE")
            .bind(conversation_id)
            .fetch_optional(tx.as_mut())
            .await?
            .ok_or(ChatError::ConversationNotFound(*conversation_id))?;

        let existed = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM participants WHERE conversation_id = $1 AND user_id = $2)",
        )
        .bind(conversation_id)
        .bind(member.user_id)
        .fetch_one(tx.as_mut())
        .await?;

        sqlx::query(
            r#"
            INSERT INTO participants (conversation_id, user_id, display_name, photo_url)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (conversation_id, user_id) DO UPDATE
            SET display_name = EXCLUDED.display_name,
                photo_url = EXCLUDED.photo_url
            "#,
        )
        .bind(conversation_id)
        .bind(member.user_id)
        .bind(&member.display_name)
        .bind(&member.photo_url)
        .execute(tx.as_mut())
        .await?;

        if !existed {
            sqlx::query("UPDATE conversations SET updated_at = NOW() WHERE id = $1")
                .bind(conversation_id)
                .execute(tx.as_mut())
                .await?;
        }

        let ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT user_id FROM participants WHERE conversation_id = $1 ORDER BY joined_at, user_id",
        )
        .bind(conversation_id)
        .fetch_all(tx.as_mut())
        .await?;

        tx.commit().await?;
        Ok((ids, !existed))
    }

    async fn remove_participant(
        &self,
        conversation_id: &Uuid,
        user_id: &Uuid,
    ) -> Result<(Vec<Uuid>, bool), ChatError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query_scalar::<_, Uuid>("SELECT id FROM conversations WHERE id = $1 FOR UPDATE")
            .bind(conversation_id)
            .fetch_optional(tx.as_mut())
            .await?
            .ok_or(ChatError::ConversationNotFound(*conversation_id))?;

        let ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT user_id FROM participants WHERE conversation_id = $1 ORDER BY joined_at, user_id",
        )
        .bind(conversation_id)
        .fetch_all(tx.as_mut())
        .await?;

        let res = sqlx::query("DELETE FROM participants WHERE conversation_id = $1 AND user_id = $2")
            .bind(conversation_id)
            .bind(user_id)
            .execute(tx.as_mut())
            .await?;
        let removed = res.rows_affected() > 0;

        if removed {
            sqlx::query("UPDATE conversations SET updated_at = NOW() WHERE id = $1")
                .bind(conversation_id)
                .execute(tx.as_mut())
                .await?;
        }

        tx.commit().await?;
        Ok((ids, removed))
    }

    async fn participant_ids(&self, conversation_id: &Uuid) -> Result<Vec<Uuid>, ChatError> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT user_id FROM participants WHERE conversation_id = $1 ORDER BY joined_at, user_id",
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    async fn is_participant(
        &self,
        conversation_id: &Uuid,
        user_id: &Uuid,
    ) -> Result<bool, ChatError> {
        let is_member = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM participants WHERE conversation_id = $1 AND user_id = $2)",
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(is_member)
    }
}
