use std::sync::Arc;

use actix::Addr;
use uuid::Uuid;

use crate::api::error::ChatError;
use crate::modules::conversation::repository::ConversationRepository;
use crate::modules::notifier::events::TypingChanged;
use crate::modules::notifier::hub::NotifierHub;

use super::tracker::TypingTracker;

#[derive(Clone)]
pub struct TypingService<C>
where
    C: ConversationRepository + Send + Sync + 'static,
{
    conversation_repo: Arc<C>,
    tracker: TypingTracker,
    notifier: Addr<NotifierHub>,
}

impl<C> TypingService<C>
where
    C: ConversationRepository + Send + Sync + 'static,
{
    pub fn with_dependencies(
        conversation_repo: Arc<C>,
        tracker: TypingTracker,
        notifier: Addr<NotifierHub>,
    ) -> Self {
        TypingService { conversation_repo, tracker, notifier }
    }

    pub async fn signal(
        &self,
        conversation_id: Uuid,
        user_id: &Uuid,
        is_typing: bool,
    ) -> Result<(), ChatError> {
        if !self.conversation_repo.is_participant(&conversation_id, user_id).await? {
            return Err(ChatError::NotAParticipant(conversation_id));
        }

        if self.tracker.set(conversation_id, *user_id, is_typing) {
            let participant_ids = self.conversation_repo.participant_ids(&conversation_id).await?;
            self.notifier.do_send(TypingChanged { conversation_id, participant_ids });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::conversation::repository_mem::ConversationMemRepository;
    use crate::test::{mem_stack, profile, MemStack};

    fn service(stack: &MemStack) -> TypingService<ConversationMemRepository> {
        TypingService::with_dependencies(
            stack.conversations.clone(),
            stack.typing.clone(),
            stack.hub.clone(),
        )
    }

    #[actix_web::test]
    async fn signals_from_non_members_are_rejected() {
        let stack = mem_stack();
        let alice = profile("Alice");
        let bob = profile("Bob");
        let charlie = profile("Charlie");
        let (entity, _) = stack.conversations.resolve_direct(&alice, &bob).await.unwrap();
        let svc = service(&stack);

        let err = svc.signal(entity.id, &charlie.user_id, true).await.unwrap_err();
        assert!(matches!(err, ChatError::NotAParticipant(_)));
        assert!(stack.typing.current(&entity.id).is_empty());
    }

    #[actix_web::test]
    async fn signal_drives_the_shared_tracker() {
        let stack = mem_stack();
        let alice = profile("Alice");
        let bob = profile("Bob");
        let (entity, _) = stack.conversations.resolve_direct(&alice, &bob).await.unwrap();
        let svc = service(&stack);

        svc.signal(entity.id, &bob.user_id, true).await.unwrap();
        assert_eq!(stack.typing.current(&entity.id), vec![bob.user_id]);

        svc.signal(entity.id, &bob.user_id, false).await.unwrap();
        assert!(stack.typing.current(&entity.id).is_empty());
    }
}
