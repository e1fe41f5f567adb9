/// Subscription Handles
///
/// Mỗi subscription là một mpsc channel: hub giữ sender, subscriber giữ
/// receiver cùng một guard. Drop guard (hoặc cả feed) là huỷ đăng ký;
/// nếu Unsubscribe chưa kịp tới, hub tự dọn sender chết ở lần phát kế tiếp.
use actix::Addr;
use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

use super::events::Unsubscribe;
use super::hub::NotifierHub;
use super::snapshot::{ConversationListSnapshot, MessageTailSnapshot};

/// Khoá định danh một nhóm subscription trong hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedKey {
    /// List feed của một user.
    List(Uuid),
    /// Log feed của một conversation.
    Log(Uuid),
}

/// Một lần phát trên feed.
#[derive(Debug, Clone)]
pub enum FeedEvent<T> {
    /// Snapshot mới nhất của aggregate, không phải diff.
    Snapshot(T),
    /// Hub bỏ cuộc sau khi retry thất bại; feed im lặng từ đây.
    Terminated { reason: String },
}

/// Handle huỷ đăng ký. Drop là huỷ.
pub struct FeedGuard {
    hub: Addr<NotifierHub>,
    key: FeedKey,
    id: Uuid,
}

impl FeedGuard {
    pub(super) fn new(hub: Addr<NotifierHub>, key: FeedKey, id: Uuid) -> Self {
        Self { hub, key, id }
    }
}

impl Drop for FeedGuard {
    fn drop(&mut self) {
        self.hub.do_send(Unsubscribe { key: self.key, id: self.id });
    }
}

/// Feed danh sách conversation của một user.
pub struct ConversationFeed {
    guard: FeedGuard,
    rx: UnboundedReceiver<FeedEvent<ConversationListSnapshot>>,
}

impl ConversationFeed {
    pub(super) fn new(
        guard: FeedGuard,
        rx: UnboundedReceiver<FeedEvent<ConversationListSnapshot>>,
    ) -> Self {
        Self { guard, rx }
    }

    /// Chờ lần phát kế tiếp. `None` khi hub đã đóng channel.
    pub async fn recv(&mut self) -> Option<FeedEvent<ConversationListSnapshot>> {
        self.rx.recv().await
    }

    /// Tách guard khỏi receiver khi hai thứ cần sống ở hai nơi khác nhau
    /// (session actor giữ guard, task forward giữ receiver).
    pub fn split(self) -> (FeedGuard, UnboundedReceiver<FeedEvent<ConversationListSnapshot>>) {
        (self.guard, self.rx)
    }
}

/// Feed đuôi log của một conversation.
pub struct MessageFeed {
    guard: FeedGuard,
    rx: UnboundedReceiver<FeedEvent<MessageTailSnapshot>>,
}

impl MessageFeed {
    pub(super) fn new(
        guard: FeedGuard,
        rx: UnboundedReceiver<FeedEvent<MessageTailSnapshot>>,
    ) -> Self {
        Self { guard, rx }
    }

    /// Chờ lần phát kế tiếp. `None` khi hub đã đóng channel.
    pub async fn recv(&mut self) -> Option<FeedEvent<MessageTailSnapshot>> {
        self.rx.recv().await
    }

    pub fn split(self) -> (FeedGuard, UnboundedReceiver<FeedEvent<MessageTailSnapshot>>) {
        (self.guard, self.rx)
    }
}
