use std::sync::Arc;

use actix::Addr;
use uuid::Uuid;

use crate::api::error::ChatError;
use crate::modules::message::repository::MessageRepository;
use crate::modules::notifier::events::{ConversationTouched, MessageLogTouched};
use crate::modules::notifier::hub::NotifierHub;

#[derive(Clone)]
pub struct ReceiptService<M>
where
    M: MessageRepository + Send + Sync + 'static,
{
    message_repo: Arc<M>,
    notifier: Addr<NotifierHub>,
}

impl<M> ReceiptService<M>
where
    M: MessageRepository + Send + Sync + 'static,
{
    pub fn with_dependencies(message_repo: Arc<M>, notifier: Addr<NotifierHub>) -> Self {
        ReceiptService { message_repo, notifier }
    }

    /// Chốt cursor tại seq mới nhất: mọi message hiện có thành đã đọc,
    /// unread về 0. Message đến sau lần chốt này lại đếm từ đầu.
    pub async fn mark_read(
        &self,
        conversation_id: Uuid,
        user_id: &Uuid,
    ) -> Result<(), ChatError> {
        self.message_repo.mark_read(&conversation_id, user_id).await?;

        // read_by đổi trên log, unread đổi trên sidebar của chính người đọc.
        self.notifier
            .do_send(ConversationTouched { conversation_id, user_ids: vec![*user_id] });

        Ok(())
    }

    /// Đánh dấu đã xem một message duy nhất, unread giữ nguyên.
    pub async fn mark_message_read(
        &self,
        conversation_id: Uuid,
        message_id: &Uuid,
        user_id: &Uuid,
    ) -> Result<(), ChatError> {
        self.message_repo.mark_message_read(&conversation_id, message_id, user_id).await?;

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

    fn service(stack: &MemStack) -> ReceiptService<MessageMemRepository> {
        ReceiptService::with_dependencies(stack.messages.clone(), stack.hub.clone())
    }

    fn text(t: &str) -> NewMessage {
        NewMessage { text: t.to_string(), attachments: vec![] }
    }

    async fn unread_of(stack: &MemStack, conversation_id: &Uuid, user_id: &Uuid) -> i32 {
        let detail = stack.conversations.find_detail(conversation_id).await.unwrap().unwrap();
        detail.participants.iter().find(|p| p.user_id == *user_id).unwrap().unread_count
    }

    #[actix_web::test]
    async fn mark_read_resets_unread_and_later_messages_count_again() {
        let stack = mem_stack();
        let alice = profile("Alice");
        let bob = profile("Bob");
        let (entity, _) = stack.conversations.resolve_direct(&alice, &bob).await.unwrap();
        let svc = service(&stack);

        for i in 0..3 {
            stack.messages.append(&entity.id, &alice, &text(&format!("m{}", i))).await.unwrap();
        }
        assert_eq!(unread_of(&stack, &entity.id, &bob.user_id).await, 3);

        svc.mark_read(entity.id, &bob.user_id).await.unwrap();
        assert_eq!(unread_of(&stack, &entity.id, &bob.user_id).await, 0);

        // Đánh dấu lại khi đã sạch là no-op.
        svc.mark_read(entity.id, &bob.user_id).await.unwrap();
        assert_eq!(unread_of(&stack, &entity.id, &bob.user_id).await, 0);

        stack.messages.append(&entity.id, &alice, &text("m3")).await.unwrap();
        assert_eq!(unread_of(&stack, &entity.id, &bob.user_id).await, 1);
    }

    #[actix_web::test]
    async fn receipts_cover_exactly_the_messages_behind_the_cursor() {
        let stack = mem_stack();
        let alice = profile("Alice");
        let bob = profile("Bob");
        let (entity, _) = stack.conversations.resolve_direct(&alice, &bob).await.unwrap();
        let svc = service(&stack);

        stack.messages.append(&entity.id, &alice, &text("m0")).await.unwrap();
        stack.messages.append(&entity.id, &alice, &text("m1")).await.unwrap();

        svc.mark_read(entity.id, &bob.user_id).await.unwrap();

        // Message sau khi chốt cursor không được hưởng receipt cũ.
        stack.messages.append(&entity.id, &alice, &text("m2")).await.unwrap();

        let tail = stack.messages.tail(&entity.id, 10).await.unwrap();
        assert!(tail[0].read_by.contains(&bob.user_id));
        assert!(tail[1].read_by.contains(&bob.user_id));
        assert!(!tail[2].read_by.contains(&bob.user_id));
    }

    #[actix_web::test]
    async fn single_message_receipt_leaves_the_counter_alone() {
        let stack = mem_stack();
        let alice = profile("Alice");
        let bob = profile("Bob");
        let (entity, _) = stack.conversations.resolve_direct(&alice, &bob).await.unwrap();
        let svc = service(&stack);

        stack.messages.append(&entity.id, &alice, &text("m0")).await.unwrap();
        let outcome = stack.messages.append(&entity.id, &alice, &text("m1")).await.unwrap();

        svc.mark_message_read(entity.id, &outcome.message.id, &bob.user_id).await.unwrap();

        let tail = stack.messages.tail(&entity.id, 10).await.unwrap();
        assert!(!tail[0].read_by.contains(&bob.user_id));
        assert!(tail[1].read_by.contains(&bob.user_id));
        assert_eq!(unread_of(&stack, &entity.id, &bob.user_id).await, 2);
    }

    #[actix_web::test]
    async fn only_members_can_leave_receipts() {
        let stack = mem_stack();
        let alice = profile("Alice");
        let bob = profile("Bob");
        let charlie = profile("Charlie");
        let (entity, _) = stack.conversations.resolve_direct(&alice, &bob).await.unwrap();
        let svc = service(&stack);

        let err = svc.mark_read(entity.id, &charlie.user_id).await.unwrap_err();
        assert!(matches!(err, ChatError::NotAParticipant(_)));
    }
}
