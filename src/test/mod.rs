#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use actix::{Actor, Addr};
use uuid::Uuid;

use crate::modules::conversation::model::Profile;
use crate::modules::conversation::repository_mem::{ConversationMemRepository, MemBackend};
use crate::modules::message::repository_mem::MessageMemRepository;
use crate::modules::notifier::hub::NotifierHub;
use crate::modules::notifier::reader::StoreReader;
use crate::modules::typing::tracker::TypingTracker;
use crate::utils::Claims;

/// Hồ sơ giả, id v7 mới cho mỗi lần gọi.
pub fn profile(name: &str) -> Profile {
    Profile { user_id: Uuid::now_v7(), display_name: name.to_string(), photo_url: None }
}

/// Token HS256 còn hạn cho các test phải đi qua lớp xác thực.
pub fn bearer_token(profile: &Profile, secret: &[u8]) -> String {
    Claims::new(&profile.user_id, &profile.display_name, profile.photo_url.as_deref(), 900)
        .encode(secret)
        .unwrap()
}

/// Nguyên stack chat trên backend in-memory, đủ cho test service và hub.
/// Hai repository dùng chung một backend nên thấy cùng dữ liệu.
pub struct MemStack {
    pub conversations: Arc<ConversationMemRepository>,
    pub messages: Arc<MessageMemRepository>,
    pub typing: TypingTracker,
    pub hub: Addr<NotifierHub>,
}

pub fn mem_stack() -> MemStack {
    mem_stack_with(Duration::from_secs(6), Duration::from_secs(1))
}

pub fn mem_stack_with(typing_ttl: Duration, sweep_interval: Duration) -> MemStack {
    let backend = MemBackend::new();
    let conversations = Arc::new(ConversationMemRepository::new(backend.clone()));
    let messages = Arc::new(MessageMemRepository::new(backend));
    let typing = TypingTracker::with_ttl(typing_ttl);
    let reader = StoreReader::new(conversations.clone(), messages.clone());
    let hub =
        NotifierHub::with_sweep_interval(Arc::new(reader), typing.clone(), sweep_interval).start();

    MemStack { conversations, messages, typing, hub }
}
