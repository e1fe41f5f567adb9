use std::sync::Arc;

use actix::Addr;
use uuid::Uuid;

use crate::api::error::ChatError;
use crate::modules::conversation::model::Profile;
use crate::modules::conversation::repository::ConversationRepository;
use crate::modules::notifier::events::{ConversationTouched, MessageLogTouched};
use crate::modules::notifier::hub::NotifierHub;

use super::model::{MessageDetail, NewMessage};
use super::repository::MessageRepository;

#[derive(Clone)]
pub struct MessageService<M, C>
where
    M: MessageRepository + Send + Sync + 'static,
    C: ConversationRepository + Send + Sync + 'static,
{
    message_repo: Arc<M>,
    conversation_repo: Arc<C>,
    notifier: Addr<NotifierHub>,
}

impl<M, C> MessageService<M, C>
where
    M: MessageRepository + Send + Sync + 'static,
    C: ConversationRepository + Send + Sync + 'static,
{
    pub fn with_dependencies(
        message_repo: Arc<M>,
        conversation_repo: Arc<C>,
        notifier: Addr<NotifierHub>,
    ) -> Self {
        MessageService { message_repo, conversation_repo, notifier }
    }

    /// Gửi message: store cấp seq, cập nhật summary/unread, sau đó fan-out
    /// tới log feed của conversation và list feed của mọi thành viên.
    pub async fn send(
        &self,
        conversation_id: Uuid,
        sender: &Profile,
        content: NewMessage,
    ) -> Result<MessageDetail, ChatError> {
        if content.is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        let outcome = self.message_repo.append(&conversation_id, sender, &content).await?;

        self.notifier.do_send(ConversationTouched {
            conversation_id,
            user_ids: outcome.participant_ids,
        });

        Ok(outcome.message)
    }

    /// Đuôi log mới nhất theo seq tăng dần, chỉ thành viên được xem.
    pub async fn tail(
        &self,
        conversation_id: Uuid,
        user_id: &Uuid,
        limit: i64,
    ) -> Result<Vec<MessageDetail>, ChatError> {
        self.ensure_member(&conversation_id, user_id).await?;
        self.message_repo.tail(&conversation_id, limit).await
    }

    /// Sửa text một message của chính mình. List feed không cần refresh:
    /// summary sidebar giữ nguyên text lúc gửi.
    pub async fn edit(
        &self,
        conversation_id: Uuid,
        message_id: Uuid,
        editor_id: &Uuid,
        text: &str,
    ) -> Result<MessageDetail, ChatError> {
        let message =
            self.message_repo.edit(&conversation_id, &message_id, editor_id, text).await?;

        self.notifier.do_send(MessageLogTouched { conversation_id });

        Ok(message)
    }

    async fn ensure_member(
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::conversation::repository::ConversationRepository;
    use crate::modules::conversation::repository_mem::ConversationMemRepository;
    use crate::modules::message::repository_mem::MessageMemRepository;
    use crate::test::{mem_stack, profile, MemStack};

    fn service(stack: &MemStack) -> MessageService<MessageMemRepository, ConversationMemRepository> {
        MessageService::with_dependencies(
            stack.messages.clone(),
            stack.conversations.clone(),
            stack.hub.clone(),
        )
    }

    fn plain(text: &str) -> NewMessage {
        NewMessage { text: text.to_string(), attachments: vec![] }
    }

    #[actix_web::test]
    async fn empty_message_is_rejected() {
        let stack = mem_stack();
        let svc = service(&stack);
        let alice = profile("Alice");
        let bob = profile("Bob");
        let (entity, _) = stack.conversations.resolve_direct(&alice, &bob).await.unwrap();

        let err = svc
            .send(entity.id, &alice, NewMessage { text: "   ".into(), attachments: vec![] })
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::EmptyMessage));

        // Chỉ attachment, không text, vẫn là message hợp lệ.
        let sent = svc
            .send(
                entity.id,
                &alice,
                NewMessage { text: String::new(), attachments: vec!["files/a.png".into()] },
            )
            .await
            .unwrap();
        assert_eq!(sent.attachments, vec!["files/a.png".to_string()]);
    }

    #[actix_web::test]
    async fn sender_must_be_a_participant() {
        let stack = mem_stack();
        let svc = service(&stack);
        let alice = profile("Alice");
        let bob = profile("Bob");
        let mallory = profile("Mallory");
        let (entity, _) = stack.conversations.resolve_direct(&alice, &bob).await.unwrap();

        let err = svc.send(entity.id, &mallory, plain("lén lút")).await.unwrap_err();
        assert!(matches!(err, ChatError::NotAParticipant(_)));

        let err = svc.tail(entity.id, &mallory.user_id, 50).await.unwrap_err();
        assert!(matches!(err, ChatError::NotAParticipant(_)));
    }

    #[actix_web::test]
    async fn sequence_is_strict_even_under_concurrent_sends() {
        let stack = mem_stack();
        let svc = Arc::new(service(&stack));
        let alice = profile("Alice");
        let bob = profile("Bob");
        let (entity, _) = stack.conversations.resolve_direct(&alice, &bob).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..10 {
            let svc = svc.clone();
            let sender = if i % 2 == 0 { alice.clone() } else { bob.clone() };
            let conversation_id = entity.id;
            handles.push(actix_web::rt::spawn(async move {
                svc.send(conversation_id, &sender, plain(&format!("m{}", i))).await
            }));
        }

        let mut seqs = Vec::new();
        for handle in handles {
            seqs.push(handle.await.unwrap().unwrap().seq);
        }
        seqs.sort_unstable();

        assert_eq!(seqs, (1..=10).collect::<Vec<i64>>());
    }

    #[actix_web::test]
    async fn tail_returns_newest_window_in_order() {
        let stack = mem_stack();
        let svc = service(&stack);
        let alice = profile("Alice");
        let bob = profile("Bob");
        let (entity, _) = stack.conversations.resolve_direct(&alice, &bob).await.unwrap();

        for i in 0..7 {
            svc.send(entity.id, &alice, plain(&format!("m{}", i))).await.unwrap();
        }

        let tail = svc.tail(entity.id, &bob.user_id, 3).await.unwrap();
        let texts: Vec<&str> = tail.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["m4", "m5", "m6"]);
        assert!(tail.windows(2).all(|w| w[0].seq < w[1].seq));
    }

    #[actix_web::test]
    async fn only_the_sender_may_edit() {
        let stack = mem_stack();
        let svc = service(&stack);
        let alice = profile("Alice");
        let bob = profile("Bob");
        let (entity, _) = stack.conversations.resolve_direct(&alice, &bob).await.unwrap();

        let sent = svc.send(entity.id, &alice, plain("bản nháp")).await.unwrap();

        let err = svc.edit(entity.id, sent.id, &bob.user_id, "sửa trộm").await.unwrap_err();
        assert!(matches!(err, ChatError::NotSender));

        let edited = svc.edit(entity.id, sent.id, &alice.user_id, "bản chính").await.unwrap();
        assert_eq!(edited.text, "bản chính");
        assert!(edited.edited);
        assert!(edited.edited_at.is_some());
    }
}
