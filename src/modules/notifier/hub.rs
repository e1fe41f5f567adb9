/// Notifier Hub Actor
///
/// Pub/sub bus trung tâm: store ghi xong thì bắn event vào đây, hub đọc lại
/// snapshot mới nhất và phát cho mọi subscriber liên quan. Hai loại feed:
/// list feed theo user (sidebar) và log feed theo conversation (khung chat
/// đang mở).
///
/// Mỗi lần phát mang nguyên snapshot chứ không mang diff: subscriber chậm
/// hay vừa reconnect chỉ cần lần phát mới nhất là đủ. Nhiều event dồn đến
/// trong lúc một lần đọc đang chạy thì gộp thành đúng một lần đọc nữa
/// (cờ `dirty` bên dưới), nên writer không bao giờ phải chờ subscriber.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use actix::prelude::*;
use tokio::sync::mpsc::{self, UnboundedSender};
use uuid::Uuid;

use crate::api::error::ChatError;
use crate::modules::conversation::model::ConversationDetail;
use crate::modules::message::model::MessageDetail;
use crate::modules::typing::tracker::TypingTracker;

use super::events::{
    ConversationTouched, MessageLogTouched, SubscribeConversations, SubscribeMessages,
    TypingChanged, Unsubscribe,
};
use super::reader::SnapshotReader;
use super::snapshot::{ConversationListSnapshot, MessageTailSnapshot};
use super::subscription::{ConversationFeed, FeedEvent, FeedGuard, FeedKey, MessageFeed};

/// Số lần thử đọc snapshot trước khi kết liễu feed.
const READ_ATTEMPTS: u32 = 3;
/// Backoff giữa hai lần thử, nhân với số thứ tự lần thử.
const RETRY_BACKOFF: Duration = Duration::from_millis(200);
/// Chu kỳ dọn typing hết hạn.
const SWEEP_INTERVAL: Duration = Duration::from_secs(1);
/// Chỉ dùng khi một lần đọc log chạy mà không còn subscriber nào.
const FALLBACK_LOG_LIMIT: i64 = 50;

struct LogSub {
    limit: i64,
    tx: UnboundedSender<FeedEvent<MessageTailSnapshot>>,
}

/// Một lần đọc đang chạy cho feed key; `dirty` nghĩa là có event mới đến
/// giữa chừng, đọc lại một lần nữa khi xong.
struct ReadState {
    dirty: bool,
}

pub struct NotifierHub {
    reader: Arc<dyn SnapshotReader>,
    typing: TypingTracker,
    sweep_interval: Duration,

    list_subs: HashMap<Uuid, HashMap<Uuid, UnboundedSender<FeedEvent<ConversationListSnapshot>>>>,
    log_subs: HashMap<Uuid, HashMap<Uuid, LogSub>>,

    /// Key đang có lần đọc chạy dở. Vắng mặt nghĩa là rảnh.
    reads: HashMap<FeedKey, ReadState>,

    /// Thành viên conversation tại lần TypingChanged gần nhất; sweep dùng
    /// để biết list feed của ai cần refresh khi entry tự hết hạn.
    typing_scope: HashMap<Uuid, Vec<Uuid>>,
}

impl NotifierHub {
    pub fn new(reader: Arc<dyn SnapshotReader>, typing: TypingTracker) -> Self {
        Self::with_sweep_interval(reader, typing, SWEEP_INTERVAL)
    }

    /// Chu kỳ sweep ngắn cho test TTL.
    pub fn with_sweep_interval(
        reader: Arc<dyn SnapshotReader>,
        typing: TypingTracker,
        sweep_interval: Duration,
    ) -> Self {
        Self {
            reader,
            typing,
            sweep_interval,
            list_subs: HashMap::new(),
            log_subs: HashMap::new(),
            reads: HashMap::new(),
            typing_scope: HashMap::new(),
        }
    }

    fn has_subscribers(&self, key: &FeedKey) -> bool {
        match key {
            FeedKey::List(user_id) => self.list_subs.get(user_id).is_some_and(|s| !s.is_empty()),
            FeedKey::Log(conversation_id) => {
                self.log_subs.get(conversation_id).is_some_and(|s| !s.is_empty())
            }
        }
    }

    /// Lên lịch đọc lại snapshot cho một feed key. Đang có lần đọc chạy dở
    /// thì chỉ ghi nhận cờ dirty.
    fn refresh(&mut self, key: FeedKey, ctx: &mut Context<Self>) {
        if !self.has_subscribers(&key) {
            return;
        }
        match self.reads.get_mut(&key) {
            Some(state) => state.dirty = true,
            None => {
                self.reads.insert(key, ReadState { dirty: false });
                self.start_read(key, ctx);
            }
        }
    }

    fn start_read(&mut self, key: FeedKey, ctx: &mut Context<Self>) {
        let reader = self.reader.clone();
        match key {
            FeedKey::List(user_id) => {
                ctx.spawn(
                    async move { fetch_list(reader, user_id).await }
                        .into_actor(self)
                        .map(move |result, act, ctx| act.finish_list_read(user_id, result, ctx)),
                );
            }
            FeedKey::Log(conversation_id) => {
                let limit = self
                    .log_subs
                    .get(&conversation_id)
                    .and_then(|subs| subs.values().map(|s| s.limit).max())
                    .unwrap_or(FALLBACK_LOG_LIMIT);
                ctx.spawn(
                    async move { fetch_tail(reader, conversation_id, limit).await }
                        .into_actor(self)
                        .map(move |result, act, ctx| {
                            act.finish_log_read(conversation_id, result, ctx)
                        }),
                );
            }
        }
    }

    fn finish_list_read(
        &mut self,
        user_id: Uuid,
        result: Result<Vec<ConversationDetail>, ChatError>,
        ctx: &mut Context<Self>,
    ) {
        match result {
            Ok(mut conversations) => {
                for conversation in conversations.iter_mut() {
                    conversation.typing = self.typing.current(&conversation.conversation_id);
                }
                let snapshot = ConversationListSnapshot { conversations };
                if let Some(subs) = self.list_subs.get_mut(&user_id) {
                    subs.retain(|_, tx| tx.send(FeedEvent::Snapshot(snapshot.clone())).is_ok());
                    if subs.is_empty() {
                        self.list_subs.remove(&user_id);
                    }
                }
            }
            Err(e) => {
                tracing::error!("Giving up on conversation list feed for user {}: {}", user_id, e);
                if let Some(subs) = self.list_subs.remove(&user_id) {
                    for tx in subs.into_values() {
                        let _ = tx.send(FeedEvent::Terminated { reason: e.to_string() });
                    }
                }
            }
        }
        self.settle_read(FeedKey::List(user_id), ctx);
    }

    fn finish_log_read(
        &mut self,
        conversation_id: Uuid,
        result: Result<Vec<MessageDetail>, ChatError>,
        ctx: &mut Context<Self>,
    ) {
        match result {
            Ok(messages) => {
                let typing = self.typing.current(&conversation_id);
                if let Some(subs) = self.log_subs.get_mut(&conversation_id) {
                    subs.retain(|_, sub| {
                        let snapshot = MessageTailSnapshot {
                            conversation_id,
                            messages: tail_window(&messages, sub.limit),
                            typing: typing.clone(),
                        };
                        sub.tx.send(FeedEvent::Snapshot(snapshot)).is_ok()
                    });
                    if subs.is_empty() {
                        self.log_subs.remove(&conversation_id);
                    }
                }
            }
            Err(e) => {
                tracing::error!(
                    "Giving up on message feed for conversation {}: {}",
                    conversation_id,
                    e
                );
                if let Some(subs) = self.log_subs.remove(&conversation_id) {
                    for sub in subs.into_values() {
                        let _ = sub.tx.send(FeedEvent::Terminated { reason: e.to_string() });
                    }
                }
            }
        }
        self.settle_read(FeedKey::Log(conversation_id), ctx);
    }

    fn settle_read(&mut self, key: FeedKey, ctx: &mut Context<Self>) {
        let Some(state) = self.reads.remove(&key) else { return };
        if state.dirty && self.has_subscribers(&key) {
            self.reads.insert(key, ReadState { dirty: false });
            self.start_read(key, ctx);
        }
    }

    fn fan_out_typing(
        &mut self,
        conversation_id: Uuid,
        participant_ids: &[Uuid],
        ctx: &mut Context<Self>,
    ) {
        self.refresh(FeedKey::Log(conversation_id), ctx);
        for user_id in participant_ids {
            self.refresh(FeedKey::List(*user_id), ctx);
        }
    }
}

/// Cửa sổ đuôi theo limit của từng subscriber; hub đọc một lần với limit
/// lớn nhất rồi cắt lại cho từng feed.
fn tail_window(messages: &[MessageDetail], limit: i64) -> Vec<MessageDetail> {
    let limit = limit.max(0) as usize;
    let start = messages.len().saturating_sub(limit);
    messages[start..].to_vec()
}

async fn fetch_list(
    reader: Arc<dyn SnapshotReader>,
    user_id: Uuid,
) -> Result<Vec<ConversationDetail>, ChatError> {
    let mut attempt: u32 = 0;
    loop {
        match reader.conversation_list(&user_id).await {
            Ok(list) => return Ok(list),
            Err(e) => {
                attempt += 1;
                if attempt >= READ_ATTEMPTS {
                    return Err(e);
                }
                tracing::warn!(
                    "Conversation list read for user {} failed (attempt {}): {}",
                    user_id,
                    attempt,
                    e
                );
                tokio::time::sleep(RETRY_BACKOFF * attempt).await;
            }
        }
    }
}

async fn fetch_tail(
    reader: Arc<dyn SnapshotReader>,
    conversation_id: Uuid,
    limit: i64,
) -> Result<Vec<MessageDetail>, ChatError> {
    let mut attempt: u32 = 0;
    loop {
        match reader.message_tail(&conversation_id, limit).await {
            Ok(messages) => return Ok(messages),
            Err(e) => {
                attempt += 1;
                if attempt >= READ_ATTEMPTS {
                    return Err(e);
                }
                tracing::warn!(
                    "Message tail read for conversation {} failed (attempt {}): {}",
                    conversation_id,
                    attempt,
                    e
                );
                tokio::time::sleep(RETRY_BACKOFF * attempt).await;
            }
        }
    }
}

impl Actor for NotifierHub {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!("Notifier hub started");

        ctx.run_interval(self.sweep_interval, |act, ctx| {
            for conversation_id in act.typing.sweep() {
                let participant_ids =
                    act.typing_scope.get(&conversation_id).cloned().unwrap_or_default();
                act.fan_out_typing(conversation_id, &participant_ids, ctx);
                if act.typing.current(&conversation_id).is_empty() {
                    act.typing_scope.remove(&conversation_id);
                }
            }
        });
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        tracing::info!("Notifier hub stopped");
    }
}

impl Handler<ConversationTouched> for NotifierHub {
    type Result = ();

    fn handle(&mut self, msg: ConversationTouched, ctx: &mut Context<Self>) {
        tracing::debug!(
            "Conversation {} touched, refreshing {} list feeds",
            msg.conversation_id,
            msg.user_ids.len()
        );

        self.refresh(FeedKey::Log(msg.conversation_id), ctx);
        for user_id in &msg.user_ids {
            self.refresh(FeedKey::List(*user_id), ctx);
        }
    }
}

impl Handler<MessageLogTouched> for NotifierHub {
    type Result = ();

    fn handle(&mut self, msg: MessageLogTouched, ctx: &mut Context<Self>) {
        self.refresh(FeedKey::Log(msg.conversation_id), ctx);
    }
}

impl Handler<TypingChanged> for NotifierHub {
    type Result = ();

    fn handle(&mut self, msg: TypingChanged, ctx: &mut Context<Self>) {
        self.typing_scope.insert(msg.conversation_id, msg.participant_ids.clone());
        self.fan_out_typing(msg.conversation_id, &msg.participant_ids, ctx);
    }
}

impl Handler<SubscribeConversations> for NotifierHub {
    type Result = MessageResult<SubscribeConversations>;

    fn handle(&mut self, msg: SubscribeConversations, ctx: &mut Context<Self>) -> Self::Result {
        let id = Uuid::now_v7();
        let (tx, rx) = mpsc::unbounded_channel();
        self.list_subs.entry(msg.user_id).or_default().insert(id, tx);

        // Subscriber mới nhận ngay một snapshot khởi điểm.
        self.refresh(FeedKey::List(msg.user_id), ctx);

        tracing::debug!("List feed {} opened for user {}", id, msg.user_id);
        let guard = FeedGuard::new(ctx.address(), FeedKey::List(msg.user_id), id);
        MessageResult(ConversationFeed::new(guard, rx))
    }
}

impl Handler<SubscribeMessages> for NotifierHub {
    type Result = MessageResult<SubscribeMessages>;

    fn handle(&mut self, msg: SubscribeMessages, ctx: &mut Context<Self>) -> Self::Result {
        let id = Uuid::now_v7();
        let (tx, rx) = mpsc::unbounded_channel();
        self.log_subs
            .entry(msg.conversation_id)
            .or_default()
            .insert(id, LogSub { limit: msg.limit, tx });

        self.refresh(FeedKey::Log(msg.conversation_id), ctx);

        tracing::debug!("Log feed {} opened for conversation {}", id, msg.conversation_id);
        let guard = FeedGuard::new(ctx.address(), FeedKey::Log(msg.conversation_id), id);
        MessageResult(MessageFeed::new(guard, rx))
    }
}

impl Handler<Unsubscribe> for NotifierHub {
    type Result = ();

    fn handle(&mut self, msg: Unsubscribe, _: &mut Context<Self>) {
        match msg.key {
            FeedKey::List(user_id) => {
                if let Some(subs) = self.list_subs.get_mut(&user_id) {
                    subs.remove(&msg.id);
                    if subs.is_empty() {
                        self.list_subs.remove(&user_id);
                    }
                }
            }
            FeedKey::Log(conversation_id) => {
                if let Some(subs) = self.log_subs.get_mut(&conversation_id) {
                    subs.remove(&msg.id);
                    if subs.is_empty() {
                        self.log_subs.remove(&conversation_id);
                    }
                }
            }
        }
        tracing::debug!("Feed {} closed", msg.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::conversation::repository::ConversationRepository;
    use crate::modules::message::{model::NewMessage, repository::MessageRepository};
    use crate::test::{mem_stack, mem_stack_with, profile};

    fn plain_message(text: &str) -> NewMessage {
        NewMessage { text: text.to_string(), attachments: vec![] }
    }

    async fn next_tail(feed: &mut MessageFeed) -> MessageTailSnapshot {
        match tokio::time::timeout(Duration::from_secs(2), feed.recv()).await {
            Ok(Some(FeedEvent::Snapshot(snapshot))) => snapshot,
            other => panic!("Expected tail snapshot, got {:?}", other),
        }
    }

    async fn next_list(feed: &mut ConversationFeed) -> ConversationListSnapshot {
        match tokio::time::timeout(Duration::from_secs(2), feed.recv()).await {
            Ok(Some(FeedEvent::Snapshot(snapshot))) => snapshot,
            other => panic!("Expected list snapshot, got {:?}", other),
        }
    }

    #[actix_web::test]
    async fn log_subscriber_sees_exactly_one_snapshot_per_append() {
        let stack = mem_stack();
        let alice = profile("Alice");

        let (entity, _) = stack
            .conversations
            .resolve_team("Team Chat", std::slice::from_ref(&alice))
            .await
            .unwrap();

        let mut feed = stack
            .hub
            .send(SubscribeMessages { conversation_id: entity.id, limit: 50 })
            .await
            .unwrap();

        let initial = next_tail(&mut feed).await;
        assert!(initial.messages.is_empty());

        let outcome =
            stack.messages.append(&entity.id, &alice, &plain_message("Hello")).await.unwrap();
        stack.hub.do_send(ConversationTouched {
            conversation_id: entity.id,
            user_ids: outcome.participant_ids,
        });

        let snapshot = next_tail(&mut feed).await;
        assert_eq!(snapshot.messages.len(), 1);
        assert_eq!(snapshot.messages[0].text, "Hello");
        assert_eq!(snapshot.messages[0].read_by, vec![alice.user_id]);
        assert!(snapshot.messages[0].reactions.is_empty());

        // Không còn lần phát nào khác cho đúng một append.
        let quiet = tokio::time::timeout(Duration::from_millis(200), feed.recv()).await;
        assert!(quiet.is_err());
    }

    #[actix_web::test]
    async fn list_feed_carries_unread_and_last_message() {
        let stack = mem_stack();
        let alice = profile("Alice");
        let bob = profile("Bob");

        let (entity, _) = stack.conversations.resolve_direct(&alice, &bob).await.unwrap();

        let mut feed =
            stack.hub.send(SubscribeConversations { user_id: bob.user_id }).await.unwrap();
        let initial = next_list(&mut feed).await;
        assert_eq!(initial.conversations.len(), 1);

        let outcome =
            stack.messages.append(&entity.id, &alice, &plain_message("hi")).await.unwrap();
        stack.hub.do_send(ConversationTouched {
            conversation_id: entity.id,
            user_ids: outcome.participant_ids,
        });

        let snapshot = next_list(&mut feed).await;
        let conversation = &snapshot.conversations[0];
        let me =
            conversation.participants.iter().find(|p| p.user_id == bob.user_id).unwrap();
        assert_eq!(me.unread_count, 1);
        assert_eq!(conversation.last_message.as_ref().unwrap().text, "hi");
    }

    #[actix_web::test]
    async fn dropped_guard_stops_delivery() {
        let stack = mem_stack();
        let alice = profile("Alice");
        let bob = profile("Bob");
        let (entity, _) = stack.conversations.resolve_direct(&alice, &bob).await.unwrap();

        let feed = stack
            .hub
            .send(SubscribeMessages { conversation_id: entity.id, limit: 50 })
            .await
            .unwrap();
        let (guard, mut rx) = feed.split();

        // Nhận snapshot khởi điểm rồi huỷ đăng ký.
        assert!(rx.recv().await.is_some());
        drop(guard);

        stack.hub.do_send(MessageLogTouched { conversation_id: entity.id });

        // Hub gỡ sender khi xử lý Unsubscribe nên channel đóng hẳn.
        assert!(rx.recv().await.is_none());
    }

    #[actix_web::test]
    async fn typing_expiry_fans_out_cleared_state() {
        let stack = mem_stack_with(Duration::from_millis(40), Duration::from_millis(20));
        let alice = profile("Alice");
        let bob = profile("Bob");
        let (entity, _) = stack.conversations.resolve_direct(&alice, &bob).await.unwrap();

        let mut feed = stack
            .hub
            .send(SubscribeMessages { conversation_id: entity.id, limit: 50 })
            .await
            .unwrap();
        let initial = next_tail(&mut feed).await;
        assert!(initial.typing.is_empty());

        stack.typing.set(entity.id, bob.user_id, true);
        stack.hub.do_send(TypingChanged {
            conversation_id: entity.id,
            participant_ids: vec![alice.user_id, bob.user_id],
        });

        let typing_on = next_tail(&mut feed).await;
        assert_eq!(typing_on.typing, vec![bob.user_id]);

        // Không gửi stop: entry tự hết hạn và sweep phát snapshot đã dọn.
        let typing_off = next_tail(&mut feed).await;
        assert!(typing_off.typing.is_empty());
    }

    #[actix_web::test]
    async fn tail_window_respects_subscriber_limit() {
        let stack = mem_stack();
        let alice = profile("Alice");
        let bob = profile("Bob");
        let (entity, _) = stack.conversations.resolve_direct(&alice, &bob).await.unwrap();

        for i in 0..5 {
            stack
                .messages
                .append(&entity.id, &alice, &plain_message(&format!("m{}", i)))
                .await
                .unwrap();
        }

        let mut feed = stack
            .hub
            .send(SubscribeMessages { conversation_id: entity.id, limit: 2 })
            .await
            .unwrap();

        let snapshot = next_tail(&mut feed).await;
        assert_eq!(snapshot.messages.len(), 2);
        assert_eq!(snapshot.messages[0].text, "m3");
        assert_eq!(snapshot.messages[1].text, "m4");
    }

    struct FailingReader;

    #[async_trait::async_trait]
    impl SnapshotReader for FailingReader {
        async fn conversation_list(
            &self,
            _: &Uuid,
        ) -> Result<Vec<ConversationDetail>, ChatError> {
            Err(ChatError::Store("backing store is down".into()))
        }

        async fn message_tail(
            &self,
            _: &Uuid,
            _: i64,
        ) -> Result<Vec<MessageDetail>, ChatError> {
            Err(ChatError::Store("backing store is down".into()))
        }
    }

    #[actix_web::test]
    async fn failing_reads_terminate_the_feed_after_retries() {
        let typing = TypingTracker::with_ttl(Duration::from_secs(6));
        let hub = NotifierHub::new(Arc::new(FailingReader), typing).start();

        let mut feed =
            hub.send(SubscribeConversations { user_id: Uuid::now_v7() }).await.unwrap();

        match tokio::time::timeout(Duration::from_secs(3), feed.recv()).await {
            Ok(Some(FeedEvent::Terminated { reason })) => {
                assert!(reason.contains("backing store is down"));
            }
            other => panic!("Expected terminated event, got {:?}", other),
        }
    }
}
