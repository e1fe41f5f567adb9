/// Notifier Hub Events
///
/// Các message gửi vào hub actor: store báo thay đổi, client đăng ký
/// và huỷ đăng ký feed.
use actix::prelude::*;
use uuid::Uuid;

use super::subscription::{ConversationFeed, FeedKey, MessageFeed};

/// Store vừa ghi một thay đổi đụng đến conversation: message mới,
/// membership đổi, read cursor đổi. Log feed của conversation và list feed
/// của từng user trong `user_ids` sẽ được đọc lại.
#[derive(Message, Debug, Clone)]
#[rtype(result = "()")]
pub struct ConversationTouched {
    pub conversation_id: Uuid,
    pub user_ids: Vec<Uuid>,
}

/// Thay đổi chỉ nằm trong nội dung log (edit, reaction, đánh dấu đọc
/// một message): list feed không cần đọc lại.
#[derive(Message, Debug, Clone)]
#[rtype(result = "()")]
pub struct MessageLogTouched {
    pub conversation_id: Uuid,
}

/// Tập user đang gõ của conversation vừa đổi. `participant_ids` là phạm vi
/// fan-out cho list feed; hub nhớ lại để sweep dùng khi entry tự hết hạn.
#[derive(Message, Debug, Clone)]
#[rtype(result = "()")]
pub struct TypingChanged {
    pub conversation_id: Uuid,
    pub participant_ids: Vec<Uuid>,
}

/// Đăng ký list feed. Subscriber nhận ngay một snapshot khởi điểm.
#[derive(Message)]
#[rtype(result = "ConversationFeed")]
pub struct SubscribeConversations {
    pub user_id: Uuid,
}

/// Đăng ký log feed với cửa sổ đuôi `limit` message.
#[derive(Message)]
#[rtype(result = "MessageFeed")]
pub struct SubscribeMessages {
    pub conversation_id: Uuid,
    pub limit: i64,
}

/// Bắn từ `FeedGuard::drop`.
#[derive(Message, Debug, Clone)]
#[rtype(result = "()")]
pub struct Unsubscribe {
    pub key: FeedKey,
    pub id: Uuid,
}
