use std::sync::Arc;

use actix::Addr;
use uuid::Uuid;

use crate::api::error::ChatError;
use crate::modules::message::repository::MessageRepository;
use crate::modules::notifier::events::MessageLogTouched;
use crate::modules::notifier::hub::NotifierHub;

#[derive(Clone)]
pub struct ReactionService<M>
where
    M: MessageRepository + Send + Sync + 'static,
{
    message_repo: Arc<M>,
    notifier: Addr<NotifierHub>,
}

impl<M> ReactionService<M>
where
    M: MessageRepository + Send + Sync + 'static,
{
    pub fn with_dependencies(message_repo: Arc<M>, notifier: Addr<NotifierHub>) -> Self {
        ReactionService { message_repo, notifier }
    }

    pub async fn add(
        &self,
        conversation_id: Uuid,
        message_id: &Uuid,
        user_id: &Uuid,
        emoji: &str,
    ) -> Result<(), ChatError> {
        self.message_repo.add_reaction(&conversation_id, message_id, user_id, emoji).await?;

        self.notifier.do_send(MessageLogTouched { conversation_id });

        Ok(())
    }

    pub async fn remove(
        &self,
        conversation_id: Uuid,
        message_id: &Uuid,
        user_id: &Uuid,
        emoji: &str,
    ) -> Result<(), ChatError> {
        self.message_repo.remove_reaction(&conversation_id, message_id, user_id, emoji).await?;

        self.notifier.do_send(MessageLogTouched { conversation_id });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::conversation::repository::ConversationRepository;
    use crate::modules::message::model::NewMessage;
    use crate::modules::message::repository_mem::MessageMemRepository;
    use crate::test::{mem_stack, profile, MemStack};

    fn service(stack: &MemStack) -> ReactionService<MessageMemRepository> {
        ReactionService::with_dependencies(stack.messages.clone(), stack.hub.clone())
    }

    fn text(t: &str) -> NewMessage {
        NewMessage { text: t.to_string(), attachments: vec![] }
    }

    #[actix_web::test]
    async fn repeated_reactions_count_once() {
        let stack = mem_stack();
        let alice = profile("Alice");
        let bob = profile("Bob");
        let (entity, _) = stack.conversations.resolve_direct(&alice, &bob).await.unwrap();
        let svc = service(&stack);

        let outcome = stack.messages.append(&entity.id, &alice, &text("hi")).await.unwrap();
        let message_id = outcome.message.id;

        svc.add(entity.id, &message_id, &bob.user_id, "👍").await.unwrap();
        svc.add(entity.id, &message_id, &bob.user_id, "👍").await.unwrap();
        svc.add(entity.id, &message_id, &alice.user_id, "👍").await.unwrap();

        let tail = stack.messages.tail(&entity.id, 10).await.unwrap();
        let mut expected = vec![alice.user_id, bob.user_id];
        expected.sort();
        assert_eq!(tail[0].reactions["👍"], expected);
    }

    #[actix_web::test]
    async fn removing_the_last_reaction_drops_the_emoji() {
        let stack = mem_stack();
        let alice = profile("Alice");
        let bob = profile("Bob");
        let (entity, _) = stack.conversations.resolve_direct(&alice, &bob).await.unwrap();
        let svc = service(&stack);

        let outcome = stack.messages.append(&entity.id, &alice, &text("hi")).await.unwrap();
        let message_id = outcome.message.id;

        svc.add(entity.id, &message_id, &bob.user_id, "❤️").await.unwrap();
        svc.remove(entity.id, &message_id, &bob.user_id, "❤️").await.unwrap();

        let tail = stack.messages.tail(&entity.id, 10).await.unwrap();
        assert!(tail[0].reactions.is_empty());
    }

    #[actix_web::test]
    async fn removing_an_absent_reaction_is_a_quiet_no_op() {
        let stack = mem_stack();
        let alice = profile("Alice");
        let bob = profile("Bob");
        let (entity, _) = stack.conversations.resolve_direct(&alice, &bob).await.unwrap();
        let svc = service(&stack);

        let outcome = stack.messages.append(&entity.id, &alice, &text("hi")).await.unwrap();
        let message_id = outcome.message.id;

        svc.add(entity.id, &message_id, &alice.user_id, "👍").await.unwrap();
        svc.remove(entity.id, &message_id, &bob.user_id, "👍").await.unwrap();

        // Reaction của người khác không bị vạ lây.
        let tail = stack.messages.tail(&entity.id, 10).await.unwrap();
        assert_eq!(tail[0].reactions["👍"], vec![alice.user_id]);
    }

    #[actix_web::test]
    async fn non_members_cannot_react() {
        let stack = mem_stack();
        let alice = profile("Alice");
        let bob = profile("Bob");
        let charlie = profile("Charlie");
        let (entity, _) = stack.conversations.resolve_direct(&alice, &bob).await.unwrap();
        let svc = service(&stack);

        let outcome = stack.messages.append(&entity.id, &alice, &text("hi")).await.unwrap();

        let err =
            svc.add(entity.id, &outcome.message.id, &charlie.user_id, "👍").await.unwrap_err();
        assert!(matches!(err, ChatError::NotAParticipant(_)));
    }
}
