use std::sync::Arc;

use actix::Addr;
use uuid::Uuid;

use crate::{
    api::error::ChatError,
    modules::notifier::{events::ConversationTouched, hub::NotifierHub},
};

use super::{
    model::{Actor, ConversationDetail, NewConversation, Profile},
    repository::ConversationRepository,
    schema::ConversationEntity,
};

#[derive(Clone)]
pub struct ConversationService<R>
where
    R: ConversationRepository + Send + Sync + 'static,
{
    conversation_repo: Arc<R>,
    notifier: Addr<NotifierHub>,
}

impl<R> ConversationService<R>
where
    R: ConversationRepository + Send + Sync + 'static,
{
    pub fn with_dependencies(conversation_repo: Arc<R>, notifier: Addr<NotifierHub>) -> Self {
        ConversationService { conversation_repo, notifier }
    }

    /// Direct conversation giữa hai user: trả về cái đã có hoặc tạo mới,
    /// an toàn khi cả hai phía resolve cùng lúc.
    pub async fn resolve_direct(
        &self,
        me: &Profile,
        peer: &Profile,
    ) -> Result<ConversationDetail, ChatError> {
        if me.user_id == peer.user_id {
            return Err(ChatError::invalid_membership(
                "A direct conversation needs two distinct users",
            ));
        }

        let (entity, changed) = self.conversation_repo.resolve_direct(me, peer).await?;
        if changed {
            self.notify(entity.id, vec![me.user_id, peer.user_id]);
        }

        self.detail(&entity.id).await
    }

    /// Conversation `team` chung của cả hệ thống; user chạm tới lần đầu
    /// được tự động đưa vào roster.
    pub async fn resolve_team(
        &self,
        name: &str,
        me: &Profile,
    ) -> Result<ConversationDetail, ChatError> {
        let (entity, changed) =
            self.conversation_repo.resolve_team(name, std::slice::from_ref(me)).await?;
        if changed {
            let user_ids = self.conversation_repo.participant_ids(&entity.id).await?;
            self.notify(entity.id, user_ids);
        }

        self.detail(&entity.id).await
    }

    pub async fn create_group(
        &self,
        creator: &Profile,
        payload: NewConversation,
    ) -> Result<ConversationDetail, ChatError> {
        let mut members: Vec<Profile> = Vec::with_capacity(payload.members.len() + 1);
        members.push(creator.clone());
        for member in payload.members {
            if members.iter().all(|m| m.user_id != member.user_id) {
                members.push(member);
            }
        }
        if members.len() < 2 {
            return Err(ChatError::invalid_membership(
                "A group needs at least two distinct members",
            ));
        }

        let entity = self
            .conversation_repo
            .create_group(
                creator,
                &members,
                payload.name.as_deref(),
                payload.description.as_deref(),
            )
            .await?;

        self.notify(entity.id, members.iter().map(|m| m.user_id).collect());
        self.detail(&entity.id).await
    }

    pub async fn add_participant(
        &self,
        conversation_id: Uuid,
        actor: Actor,
        member: Profile,
    ) -> Result<ConversationDetail, ChatError> {
        let entity = self.guard_manage(&conversation_id, actor).await?;

        let (user_ids, added) = self.conversation_repo.add_participant(&entity.id, &member).await?;
        if added {
            self.notify(entity.id, user_ids);
        }

        self.detail(&entity.id).await
    }

    /// Gỡ thành viên; fan-out tới cả người vừa bị gỡ để sidebar của họ
    /// cập nhật nốt lần cuối.
    pub async fn remove_participant(
        &self,
        conversation_id: Uuid,
        actor: Actor,
        user_id: Uuid,
    ) -> Result<ConversationDetail, ChatError> {
        let entity = self.guard_manage(&conversation_id, actor).await?;

        let (user_ids, removed) =
            self.conversation_repo.remove_participant(&entity.id, &user_id).await?;
        if removed {
            self.notify(entity.id, user_ids);
        }

        self.detail(&entity.id).await
    }

    pub async fn list_for_user(
        &self,
        user_id: &Uuid,
    ) -> Result<Vec<ConversationDetail>, ChatError> {
        self.conversation_repo.list_for_user(user_id).await
    }

    pub async fn ensure_member(
        &self,
        conversation_id: &Uuid,
        user_id: &Uuid,
    ) -> Result<(), ChatError> {
        if self.conversation_repo.find_by_id(conversation_id).await?.is_none() {
            return Err(ChatError::ConversationNotFound(*conversation_id));
        }
        if !self.conversation_repo.is_participant(conversation_id, user_id).await? {
            return Err(ChatError::NotAParticipant(*conversation_id));
        }
        Ok(())
    }

    async fn guard_manage(
        &self,
        conversation_id: &Uuid,
        actor: Actor,
    ) -> Result<ConversationEntity, ChatError> {
        let entity = self
            .conversation_repo
            .find_by_id(conversation_id)
            .await?
            .ok_or(ChatError::ConversationNotFound(*conversation_id))?;

        if !actor.can_manage(&entity._type) {
            return Err(ChatError::Unsupported(entity._type));
        }
        if let Actor::User(user_id) = actor {
            if !self.conversation_repo.is_participant(conversation_id, &user_id).await? {
                return Err(ChatError::NotAParticipant(*conversation_id));
            }
        }

        Ok(entity)
    }

    async fn detail(&self, conversation_id: &Uuid) -> Result<ConversationDetail, ChatError> {
        self.conversation_repo
            .find_detail(conversation_id)
            .await?
            .ok_or(ChatError::ConversationNotFound(*conversation_id))
    }

    fn notify(&self, conversation_id: Uuid, user_ids: Vec<Uuid>) {
        self.notifier.do_send(ConversationTouched { conversation_id, user_ids });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::conversation::repository_mem::ConversationMemRepository;
    use crate::modules::conversation::schema::ConversationType;
    use crate::modules::message::{model::NewMessage, repository::MessageRepository};
    use crate::test::{mem_stack, profile, MemStack};

    fn service(stack: &MemStack) -> ConversationService<ConversationMemRepository> {
        ConversationService::with_dependencies(stack.conversations.clone(), stack.hub.clone())
    }

    #[actix_web::test]
    async fn direct_with_self_is_rejected() {
        let stack = mem_stack();
        let svc = service(&stack);
        let alice = profile("Alice");

        let err = svc.resolve_direct(&alice, &alice).await.unwrap_err();
        assert!(matches!(err, ChatError::InvalidMembership(_)));
    }

    #[actix_web::test]
    async fn resolve_direct_is_idempotent_per_pair() {
        let stack = mem_stack();
        let svc = service(&stack);
        let alice = profile("Alice");
        let bob = profile("Bob");

        let first = svc.resolve_direct(&alice, &bob).await.unwrap();
        let second = svc.resolve_direct(&bob, &alice).await.unwrap();

        assert_eq!(first.conversation_id, second.conversation_id);
        assert_eq!(second.participants.len(), 2);
    }

    #[actix_web::test]
    async fn group_needs_two_distinct_members() {
        let stack = mem_stack();
        let svc = service(&stack);
        let alice = profile("Alice");

        // Thành viên duy nhất sau khi khử trùng lặp lại chính là creator.
        let payload = NewConversation {
            name: Some("Weekend".into()),
            description: None,
            members: vec![alice.clone()],
        };
        let err = svc.create_group(&alice, payload).await.unwrap_err();
        assert!(matches!(err, ChatError::InvalidMembership(_)));
    }

    #[actix_web::test]
    async fn group_roster_includes_creator_once() {
        let stack = mem_stack();
        let svc = service(&stack);
        let alice = profile("Alice");
        let bob = profile("Bob");

        let payload = NewConversation {
            name: Some("Weekend".into()),
            description: Some("kế hoạch leo núi".into()),
            members: vec![bob.clone(), alice.clone(), bob.clone()],
        };
        let detail = svc.create_group(&alice, payload).await.unwrap();

        assert_eq!(detail._type, ConversationType::Group);
        assert_eq!(detail.participants.len(), 2);
        assert_eq!(detail.created_by, alice.user_id);
    }

    #[actix_web::test]
    async fn membership_edits_follow_type_capabilities() {
        let stack = mem_stack();
        let svc = service(&stack);
        let alice = profile("Alice");
        let bob = profile("Bob");
        let carol = profile("Carol");

        let direct = svc.resolve_direct(&alice, &bob).await.unwrap();
        let err = svc
            .add_participant(direct.conversation_id, Actor::User(alice.user_id), carol.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Unsupported(ConversationType::Direct)));

        let team = svc.resolve_team("Team Chat", &alice).await.unwrap();
        let err = svc
            .add_participant(team.conversation_id, Actor::User(alice.user_id), carol.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Unsupported(ConversationType::Team)));

        // Mã nội bộ (seed roster) thì được đụng vào team.
        let seeded =
            svc.add_participant(team.conversation_id, Actor::System, carol.clone()).await.unwrap();
        assert!(seeded.participants.iter().any(|p| p.user_id == carol.user_id));
    }

    #[actix_web::test]
    async fn group_manager_must_be_a_member() {
        let stack = mem_stack();
        let svc = service(&stack);
        let alice = profile("Alice");
        let bob = profile("Bob");
        let mallory = profile("Mallory");

        let payload =
            NewConversation { name: None, description: None, members: vec![bob.clone()] };
        let group = svc.create_group(&alice, payload).await.unwrap();

        let err = svc
            .add_participant(group.conversation_id, Actor::User(mallory.user_id), profile("Carol"))
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::NotAParticipant(_)));
    }

    #[actix_web::test]
    async fn removing_a_member_is_idempotent() {
        let stack = mem_stack();
        let svc = service(&stack);
        let alice = profile("Alice");
        let bob = profile("Bob");
        let carol = profile("Carol");

        let payload = NewConversation {
            name: None,
            description: None,
            members: vec![bob.clone(), carol.clone()],
        };
        let group = svc.create_group(&alice, payload).await.unwrap();

        let after_first = svc
            .remove_participant(group.conversation_id, Actor::User(alice.user_id), carol.user_id)
            .await
            .unwrap();
        assert!(after_first.participants.iter().all(|p| p.user_id != carol.user_id));

        let after_second = svc
            .remove_participant(group.conversation_id, Actor::User(alice.user_id), carol.user_id)
            .await
            .unwrap();
        assert_eq!(after_second.participants.len(), 2);
    }

    #[actix_web::test]
    async fn list_is_sorted_by_recency() {
        let stack = mem_stack();
        let svc = service(&stack);
        let alice = profile("Alice");
        let bob = profile("Bob");
        let carol = profile("Carol");

        let with_bob = svc.resolve_direct(&alice, &bob).await.unwrap();
        let with_carol = svc.resolve_direct(&alice, &carol).await.unwrap();

        // Nhắn vào conversation cũ hơn để nó nhảy lên đầu danh sách.
        stack
            .messages
            .append(
                &with_bob.conversation_id,
                &alice,
                &NewMessage { text: "ping".into(), attachments: vec![] },
            )
            .await
            .unwrap();

        let list = svc.list_for_user(&alice.user_id).await.unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].conversation_id, with_bob.conversation_id);
        assert_eq!(list[1].conversation_id, with_carol.conversation_id);
    }
}
