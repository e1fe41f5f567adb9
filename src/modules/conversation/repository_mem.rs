use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::api::error::ChatError;
use crate::modules::conversation::model::{
    ConversationDetail, LastMessageSummary, ParticipantDetail, Profile,
};
use crate::modules::conversation::repository::{pair_key, ConversationRepository, TEAM_KEY};
use crate::modules::conversation::schema::{ConversationEntity, ConversationType};
use crate::modules::message::repository_mem::MessageState;

/// Backend in-memory cho test suite và embedder không cần Postgres.
/// Mỗi conversation là một cell có mutex riêng, tương đương row lock
/// `FOR UPDATE` bên Postgres: ghi trên cùng conversation nối đuôi nhau,
/// khác conversation chạy song song.
#[derive(Clone, Default)]
pub struct MemBackend {
    state: Arc<MemState>,
}

#[derive(Default)]
struct MemState {
    conversations: RwLock<HashMap<Uuid, Arc<Mutex<ConversationCell>>>>,
    /// direct pair key hoặc TEAM_KEY → conversation id.
    singletons: Mutex<HashMap<String, Uuid>>,
}

impl MemBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn cell(&self, conversation_id: &Uuid) -> Option<Arc<Mutex<ConversationCell>>> {
        self.state.conversations.read().await.get(conversation_id).cloned()
    }

    async fn cells(&self) -> Vec<Arc<Mutex<ConversationCell>>> {
        self.state.conversations.read().await.values().cloned().collect()
    }

    async fn insert_cell(&self, cell: ConversationCell) -> ConversationEntity {
        let entity = cell.entity.clone();
        self.state
            .conversations
            .write()
            .await
            .insert(entity.id, Arc::new(Mutex::new(cell)));
        entity
    }
}

pub(crate) struct ConversationCell {
    pub(crate) entity: ConversationEntity,
    pub(crate) participants: Vec<ParticipantState>,
    pub(crate) messages: Vec<MessageState>,
    /// Mốc đơn điệu cho created_at của message kế tiếp.
    pub(crate) last_message_at: chrono::DateTime<chrono::Utc>,
}

pub(crate) struct ParticipantState {
    pub(crate) profile: Profile,
    pub(crate) unread_count: i32,
    pub(crate) last_read_seq: i64,
    pub(crate) joined_at: chrono::DateTime<chrono::Utc>,
}

impl ParticipantState {
    fn new(profile: Profile, joined_at: chrono::DateTime<chrono::Utc>) -> Self {
        ParticipantState { profile, unread_count: 0, last_read_seq: 0, joined_at }
    }

    fn detail(&self) -> ParticipantDetail {
        ParticipantDetail {
            user_id: self.profile.user_id,
            display_name: self.profile.display_name.clone(),
            photo_url: self.profile.photo_url.clone(),
            unread_count: self.unread_count,
            last_read_seq: self.last_read_seq,
            joined_at: self.joined_at,
        }
    }
}

impl ConversationCell {
    fn new(
        _type: ConversationType,
        name: Option<String>,
        description: Option<String>,
        created_by: Uuid,
        members: &[Profile],
    ) -> Self {
        let now = chrono::Utc::now();
        ConversationCell {
            entity: ConversationEntity {
                id: Uuid::now_v7(),
                _type,
                name,
                description,
                photo_url: None,
                created_by,
                last_seq: 0,
                created_at: now,
                updated_at: now,
            },
            participants: members.iter().map(|m| ParticipantState::new(m.clone(), now)).collect(),
            messages: Vec::new(),
            last_message_at: now,
        }
    }

    pub(crate) fn participant_ids(&self) -> Vec<Uuid> {
        self.participants.iter().map(|p| p.profile.user_id).collect()
    }

    pub(crate) fn is_participant(&self, user_id: &Uuid) -> bool {
        self.participants.iter().any(|p| p.profile.user_id == *user_id)
    }

    pub(crate) fn participant_mut(&mut self, user_id: &Uuid) -> Option<&mut ParticipantState> {
        self.participants.iter_mut().find(|p| p.profile.user_id == *user_id)
    }

    pub(crate) fn touch(&mut self) {
        self.entity.updated_at = chrono::Utc::now();
    }

    pub(crate) fn detail(&self) -> ConversationDetail {
        let last_message = self.messages.last().map(|m| LastMessageSummary {
            text: m.text.clone(),
            sender_id: m.sender.user_id,
            sender_name: m.sender.display_name.clone(),
            created_at: m.created_at,
        });

        ConversationDetail {
            conversation_id: self.entity.id,
            _type: self.entity._type,
            name: self.entity.name.clone(),
            description: self.entity.description.clone(),
            photo_url: self.entity.photo_url.clone(),
            created_by: self.entity.created_by,
            participants: self.participants.iter().map(ParticipantState::detail).collect(),
            last_message,
            typing: Vec::new(),
            created_at: self.entity.created_at,
            updated_at: self.entity.updated_at,
        }
    }
}

#[derive(Clone)]
pub struct ConversationMemRepository {
    backend: MemBackend,
}

impl ConversationMemRepository {
    pub fn new(backend: MemBackend) -> Self {
        Self { backend }
    }
}

#[async_trait::async_trait]
impl ConversationRepository for ConversationMemRepository {
    async fn resolve_direct(
        &self,
        a: &Profile,
        b: &Profile,
    ) -> Result<(ConversationEntity, bool), ChatError> {
        let key = pair_key(&a.user_id, &b.user_id);

        // Giữ khoá index qua cả bước tạo để hai resolve đồng thời
        // không bao giờ chèn hai conversation cho cùng một cặp.
        let mut singletons = self.backend.state.singletons.lock().await;

        if let Some(id) = singletons.get(&key) {
            let cell = self
                .backend
                .cell(id)
                .await
                .ok_or(ChatError::Store("singleton index points to missing conversation".into()))?;
            let entity = cell.lock().await.entity.clone();
            return Ok((entity, false));
        }

        let cell = ConversationCell::new(
            ConversationType::Direct,
            None,
            None,
            a.user_id,
            &[a.clone(), b.clone()],
        );
        let entity = self.backend.insert_cell(cell).await;
        singletons.insert(key, entity.id);

        Ok((entity, true))
    }

    async fn resolve_team(
        &self,
        name: &str,
        roster: &[Profile],
    ) -> Result<(ConversationEntity, bool), ChatError> {
        let mut singletons = self.backend.state.singletons.lock().await;

        if let Some(id) = singletons.get(TEAM_KEY) {
            let cell = self
                .backend
                .cell(id)
                .await
                .ok_or(ChatError::Store("singleton index points to missing conversation".into()))?;
            let mut cell = cell.lock().await;

            let mut added = false;
            for member in roster {
                if !cell.is_participant(&member.user_id) {
                    let joined_at = chrono::Utc::now();
                    cell.participants.push(ParticipantState::new(member.clone(), joined_at));
                    added = true;
                }
            }
            if added {
                cell.touch();
            }

            return Ok((cell.entity.clone(), added));
        }

        let cell = ConversationCell::new(
            ConversationType::Team,
            Some(name.to_string()),
            None,
            Uuid::nil(),
            roster,
        );
        let entity = self.backend.insert_cell(cell).await;
        singletons.insert(TEAM_KEY.to_string(), entity.id);

        Ok((entity, true))
    }

    async fn create_group(
        &self,
        creator: &Profile,
        members: &[Profile],
        name: Option<&str>,
        description: Option<&str>,
    ) -> Result<ConversationEntity, ChatError> {
        let cell = ConversationCell::new(
            ConversationType::Group,
            name.map(|n| n.to_string()),
            description.map(|d| d.to_string()),
            creator.user_id,
            members,
        );
        Ok(self.backend.insert_cell(cell).await)
    }

    async fn find_by_id(
        &self,
        conversation_id: &Uuid,
    ) -> Result<Option<ConversationEntity>, ChatError> {
        match self.backend.cell(conversation_id).await {
            Some(cell) => Ok(Some(cell.lock().await.entity.clone())),
            None => Ok(None),
        }
    }

    async fn find_detail(
        &self,
        conversation_id: &Uuid,
    ) -> Result<Option<ConversationDetail>, ChatError> {
        match self.backend.cell(conversation_id).await {
            Some(cell) => Ok(Some(cell.lock().await.detail())),
            None => Ok(None),
        }
    }

    async fn list_for_user(&self, user_id: &Uuid) -> Result<Vec<ConversationDetail>, ChatError> {
        let mut details = Vec::new();
        for cell in self.backend.cells().await {
            let cell = cell.lock().await;
            if cell.is_participant(user_id) {
                details.push(cell.detail());
            }
        }

        details.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then(b.conversation_id.cmp(&a.conversation_id))
        });

        Ok(details)
    }

    async fn add_participant(
        &self,
        conversation_id: &Uuid,
        member: &Profile,
    ) -> Result<(Vec<Uuid>, bool), ChatError> {
        let cell = self
            .backend
            .cell(conversation_id)
            .await
            .ok_or(ChatError::ConversationNotFound(*conversation_id))?;
        let mut cell = cell.lock().await;

        let existed = cell.is_participant(&member.user_id);
        if existed {
            if let Some(existing) = cell.participant_mut(&member.user_id) {
                existing.profile = member.clone();
            }
        } else {
            let joined_at = chrono::Utc::now();
            cell.participants.push(ParticipantState::new(member.clone(), joined_at));
            cell.touch();
        }

        Ok((cell.participant_ids(), !existed))
    }

    async fn remove_participant(
        &self,
        conversation_id: &Uuid,
        user_id: &Uuid,
    ) -> Result<(Vec<Uuid>, bool), ChatError> {
        let cell = self
            .backend
            .cell(conversation_id)
            .await
            .ok_or(ChatError::ConversationNotFound(*conversation_id))?;
        let mut cell = cell.lock().await;

        let ids = cell.participant_ids();
        let before = cell.participants.len();
        cell.participants.retain(|p| p.profile.user_id != *user_id);
        let removed = cell.participants.len() < before;

        if removed {
            cell.touch();
        }

        Ok((ids, removed))
    }

    async fn participant_ids(&self, conversation_id: &Uuid) -> Result<Vec<Uuid>, ChatError> {
        match self.backend.cell(conversation_id).await {
            Some(cell) => Ok(cell.lock().await.participant_ids()),
            None => Ok(Vec::new()),
        }
    }

    async fn is_participant(
        &self,
        conversation_id: &Uuid,
        user_id: &Uuid,
    ) -> Result<bool, ChatError> {
        match self.backend.cell(conversation_id).await {
            Some(cell) => Ok(cell.lock().await.is_participant(user_id)),
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::profile;

    #[actix_web::test]
    async fn concurrent_direct_resolves_converge_on_one_conversation() {
        let repo = ConversationMemRepository::new(MemBackend::new());
        let a = profile("Lan");
        let b = profile("Minh");

        let mut handles = Vec::new();
        for _ in 0..8 {
            let repo = repo.clone();
            let (a, b) = (a.clone(), b.clone());
            handles.push(actix_web::rt::spawn(async move {
                repo.resolve_direct(&a, &b).await
            }));
        }

        let mut ids = Vec::new();
        let mut created_count = 0;
        for handle in handles {
            let (entity, created) = handle.await.unwrap().unwrap();
            ids.push(entity.id);
            if created {
                created_count += 1;
            }
        }

        assert_eq!(created_count, 1);
        assert!(ids.windows(2).all(|w| w[0] == w[1]));
    }

    #[actix_web::test]
    async fn team_resolve_is_a_singleton_and_grows_membership() {
        let repo = ConversationMemRepository::new(MemBackend::new());
        let a = profile("Lan");
        let b = profile("Minh");

        let (first, changed_a) = repo.resolve_team("Team Chat", &[a.clone()]).await.unwrap();
        let (second, changed_b) = repo.resolve_team("Team Chat", &[b.clone()]).await.unwrap();
        let (third, changed_c) = repo.resolve_team("Team Chat", &[b.clone()]).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.id, third.id);
        assert!(changed_a);
        assert!(changed_b);
        assert!(!changed_c);

        let ids = repo.participant_ids(&first.id).await.unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(first._type, ConversationType::Team);
        assert_eq!(first.created_by, Uuid::nil());
    }
}
