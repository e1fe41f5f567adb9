/// WebSocket Session Actor
///
/// Mỗi WebSocket connection có một Session actor riêng. Session giữ
/// feed guard cho list feed của user và log feed của từng conversation
/// đang mở; actor dừng thì guard rơi, hub tự gỡ subscriber.
///
/// Async operations (service calls, subscribe hub) sử dụng
/// `ctx.spawn()` + `into_actor()`.
use std::collections::HashMap;

use actix::prelude::*;
use actix_web::web;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::api::error::ChatError;
use crate::modules::conversation::model::Profile;
use crate::modules::conversation::repository_pg::ConversationPgRepository;
use crate::modules::conversation::service::ConversationService;
use crate::modules::message::model::NewMessage;
use crate::modules::message::repository_pg::MessagePgRepository;
use crate::modules::message::service::MessageService;
use crate::modules::notifier::events::{SubscribeConversations, SubscribeMessages};
use crate::modules::notifier::hub::NotifierHub;
use crate::modules::notifier::snapshot::{ConversationListSnapshot, MessageTailSnapshot};
use crate::modules::notifier::subscription::{FeedEvent, FeedGuard};
use crate::modules::receipt::service::ReceiptService;
use crate::modules::typing::service::TypingService;
use crate::utils::Claims;
use crate::ENV;

use super::message::{ClientMessage, ServerMessage};

/// Type aliases cho services với concrete repository types
pub type ConversationSvc = ConversationService<ConversationPgRepository>;
pub type MessageSvc = MessageService<MessagePgRepository, ConversationPgRepository>;
pub type ReceiptSvc = ReceiptService<MessagePgRepository>;
pub type TypingSvc = TypingService<ConversationPgRepository>;

/// WebSocket session cho một client
pub struct WebSocketSession {
    /// Unique session ID
    pub id: Uuid,

    /// Hồ sơ user sau khi authenticate (None nếu chưa auth)
    pub profile: Option<Profile>,

    /// Address của notifier hub
    pub hub: Addr<NotifierHub>,

    /// Channel gửi JSON messages tới client (bridge → handler.rs → WebSocket)
    pub tx: mpsc::UnboundedSender<String>,

    pub conversation_service: web::Data<ConversationSvc>,
    pub message_service: web::Data<MessageSvc>,
    pub receipt_service: web::Data<ReceiptSvc>,
    pub typing_service: web::Data<TypingSvc>,

    /// Guard của list feed, mở ngay sau khi auth thành công
    list_guard: Option<FeedGuard>,

    /// Guard của log feed theo conversation đang mở
    log_guards: HashMap<Uuid, FeedGuard>,
}

impl WebSocketSession {
    /// Tạo session mới với outbound channel và dependencies
    pub fn new(
        hub: Addr<NotifierHub>,
        tx: mpsc::UnboundedSender<String>,
        conversation_service: web::Data<ConversationSvc>,
        message_service: web::Data<MessageSvc>,
        receipt_service: web::Data<ReceiptSvc>,
        typing_service: web::Data<TypingSvc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            profile: None,
            hub,
            tx,
            conversation_service,
            message_service,
            receipt_service,
            typing_service,
            list_guard: None,
            log_guards: HashMap::new(),
        }
    }

    /// Gửi ServerMessage tới client thông qua channel
    fn send_to_client(&self, msg: &ServerMessage) {
        match serde_json::to_string(msg) {
            Ok(json) => {
                if let Err(e) = self.tx.send(json) {
                    tracing::error!(
                        "Không thể gửi message tới client (session {}): {}",
                        self.id,
                        e
                    );
                }
            }
            Err(e) => {
                tracing::error!("Không thể serialize ServerMessage (session {}): {}", self.id, e);
            }
        }
    }

    /// Gửi error message tới client
    fn send_error(&self, message: &str) {
        self.send_to_client(&ServerMessage::Error { message: message.to_string() });
    }

    /// Kiểm tra user đã authenticate chưa, trả về profile nếu có
    fn require_auth(&self) -> Option<Profile> {
        if self.profile.is_none() {
            self.send_error("Bạn cần xác thực trước khi thực hiện thao tác này");
            tracing::warn!("Session {} chưa authenticate, từ chối request", self.id);
        }
        self.profile.clone()
    }

    /// Xử lý message từ client - dispatch tới handler tương ứng
    fn handle_client_message(&mut self, msg: &ClientMessage, ctx: &mut Context<Self>) {
        match msg {
            ClientMessage::Auth { token } => {
                self.handle_auth(token, ctx);
            }

            ClientMessage::SendMessage { conversation_id, text, attachments } => {
                self.handle_send_message(*conversation_id, text.clone(), attachments.clone(), ctx);
            }

            ClientMessage::JoinConversation { conversation_id, limit } => {
                self.handle_join_conversation(*conversation_id, *limit, ctx);
            }

            ClientMessage::LeaveConversation { conversation_id } => {
                self.handle_leave_conversation(*conversation_id);
            }

            ClientMessage::MarkRead { conversation_id } => {
                self.handle_mark_read(*conversation_id, ctx);
            }

            ClientMessage::TypingStart { conversation_id } => {
                self.handle_typing(*conversation_id, true, ctx);
            }

            ClientMessage::TypingStop { conversation_id } => {
                self.handle_typing(*conversation_id, false, ctx);
            }

            ClientMessage::Ping => {
                // Gửi pong response về client
                self.send_to_client(&ServerMessage::Pong);
            }
        }
    }

    /// Xử lý authentication - verify JWT token và liên kết user với session
    fn handle_auth(&mut self, token: &str, ctx: &mut Context<Self>) {
        // Kiểm tra đã auth chưa (tránh auth lại)
        if self.profile.is_some() {
            self.send_error("Session đã được xác thực");
            return;
        }

        // Decode và verify JWT token
        let claims = match Claims::decode(token, ENV.jwt_secret.as_ref()) {
            Ok(claims) => claims,
            Err(e) => {
                tracing::warn!("JWT verification thất bại (session {}): {}", self.id, e);
                self.send_to_client(&ServerMessage::AuthFailed {
                    reason: "Token không hợp lệ hoặc đã hết hạn".to_string(),
                });
                return;
            }
        };

        let user_id = claims.sub;
        self.profile = Some(claims.profile());

        // Gửi success response về client
        self.send_to_client(&ServerMessage::AuthSuccess { user_id });
        tracing::info!("User {} đã authenticate thành công trên session {}", user_id, self.id);

        // Auth xong mở luôn list feed: snapshot sidebar đầu tiên đến ngay,
        // không cần client subscribe riêng.
        self.open_list_feed(user_id, ctx);
    }

    fn open_list_feed(&self, user_id: Uuid, ctx: &mut Context<Self>) {
        let hub = self.hub.clone();

        ctx.spawn(
            async move { hub.send(SubscribeConversations { user_id }).await }
                .into_actor(self)
                .map(|res, act, _ctx| match res {
                    Ok(feed) => {
                        let (guard, rx) = feed.split();
                        act.list_guard = Some(guard);
                        act.pump_list(rx);
                    }
                    Err(e) => {
                        tracing::error!("Không mở được list feed (session {}): {}", act.id, e);
                        act.send_error("Không thể theo dõi danh sách conversation");
                    }
                }),
        );
    }

    /// Bơm snapshot từ list feed ra WebSocket. Task tự dừng khi guard rơi
    /// (channel đóng) hoặc client disconnect (tx lỗi).
    fn pump_list(&self, mut rx: mpsc::UnboundedReceiver<FeedEvent<ConversationListSnapshot>>) {
        let tx = self.tx.clone();
        actix_web::rt::spawn(async move {
            while let Some(event) = rx.recv().await {
                let msg = match event {
                    FeedEvent::Snapshot(snapshot) => ServerMessage::ConversationList(snapshot),
                    FeedEvent::Terminated { reason } => {
                        ServerMessage::FeedClosed { conversation_id: None, reason }
                    }
                };
                let Ok(json) = serde_json::to_string(&msg) else { continue };
                if tx.send(json).is_err() {
                    break;
                }
            }
        });
    }

    fn pump_log(
        &self,
        conversation_id: Uuid,
        mut rx: mpsc::UnboundedReceiver<FeedEvent<MessageTailSnapshot>>,
    ) {
        let tx = self.tx.clone();
        actix_web::rt::spawn(async move {
            while let Some(event) = rx.recv().await {
                let msg = match event {
                    FeedEvent::Snapshot(snapshot) => ServerMessage::MessageLog(snapshot),
                    FeedEvent::Terminated { reason } => ServerMessage::FeedClosed {
                        conversation_id: Some(conversation_id),
                        reason,
                    },
                };
                let Ok(json) = serde_json::to_string(&msg) else { continue };
                if tx.send(json).is_err() {
                    break;
                }
            }
        });
    }

    /// Xử lý gửi tin nhắn - service ghi store rồi hub fan-out snapshot,
    /// client không nhận ack riêng ngoài chính snapshot mới.
    fn handle_send_message(
        &self,
        conversation_id: Uuid,
        text: String,
        attachments: Vec<String>,
        ctx: &mut Context<Self>,
    ) {
        let Some(profile) = self.require_auth() else {
            return;
        };

        tracing::debug!(
            "User {} gửi message tới conversation {}",
            profile.user_id,
            conversation_id
        );

        let service = self.message_service.clone();
        let session_id = self.id;

        ctx.spawn(
            async move {
                service.send(conversation_id, &profile, NewMessage { text, attachments }).await
            }
            .into_actor(self)
            .map(move |res, act, _ctx| match res {
                Ok(message) => {
                    tracing::info!(
                        "Message {} saved, fan-out qua notifier hub tới conversation {}",
                        message.id,
                        conversation_id
                    );
                }
                Err(e) => {
                    tracing::error!(
                        "Lỗi lưu message (session {}, conversation {}): {}",
                        session_id,
                        conversation_id,
                        e
                    );
                    act.send_error("Không thể gửi tin nhắn. Vui lòng thử lại.");
                }
            }),
        );
    }

    /// Xử lý join conversation - guard thành viên rồi mở log feed
    fn handle_join_conversation(
        &mut self,
        conversation_id: Uuid,
        limit: Option<i64>,
        ctx: &mut Context<Self>,
    ) {
        let Some(profile) = self.require_auth() else {
            return;
        };
        let user_id = profile.user_id;

        if self.log_guards.contains_key(&conversation_id) {
            tracing::debug!("Session {} đã mở log feed {}", self.id, conversation_id);
            return;
        }

        let service = self.conversation_service.clone();
        let hub = self.hub.clone();
        let limit = limit.unwrap_or(ENV.message_tail_limit);

        ctx.spawn(
            async move {
                service.ensure_member(&conversation_id, &user_id).await?;
                let feed = hub.send(SubscribeMessages { conversation_id, limit }).await?;
                Ok::<_, ChatError>(feed)
            }
            .into_actor(self)
            .map(move |res, act, _ctx| match res {
                Ok(feed) => {
                    let (guard, rx) = feed.split();
                    act.log_guards.insert(conversation_id, guard);
                    act.pump_log(conversation_id, rx);
                    tracing::debug!("User {} joined conversation {}", user_id, conversation_id);
                }
                Err(e) => act.send_error(&e.to_string()),
            }),
        );
    }

    /// Xử lý leave conversation - thả guard là hub tự gỡ subscriber
    fn handle_leave_conversation(&mut self, conversation_id: Uuid) {
        let Some(profile) = self.require_auth() else {
            return;
        };

        if self.log_guards.remove(&conversation_id).is_some() {
            tracing::debug!("User {} left conversation {}", profile.user_id, conversation_id);
        }
    }

    /// Xử lý mark read - chốt cursor đã-đọc cho cả conversation
    fn handle_mark_read(&self, conversation_id: Uuid, ctx: &mut Context<Self>) {
        let Some(profile) = self.require_auth() else {
            return;
        };
        let user_id = profile.user_id;

        let service = self.receipt_service.clone();

        ctx.spawn(
            async move { service.mark_read(conversation_id, &user_id).await }
                .into_actor(self)
                .map(|res, act, _ctx| {
                    if let Err(e) = res {
                        act.send_error(&e.to_string());
                    }
                }),
        );
    }

    /// Xử lý typing signal - lỗi chỉ log, không trả về client
    fn handle_typing(&self, conversation_id: Uuid, is_typing: bool, ctx: &mut Context<Self>) {
        let Some(profile) = self.require_auth() else {
            return;
        };
        let user_id = profile.user_id;

        let service = self.typing_service.clone();

        ctx.spawn(
            async move { service.signal(conversation_id, &user_id, is_typing).await }
                .into_actor(self)
                .map(move |res, _act, _ctx| {
                    if let Err(e) = res {
                        tracing::warn!("Typing signal từ user {} bị từ chối: {}", user_id, e);
                    }
                }),
        );
    }
}

impl Actor for WebSocketSession {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Self::Context) {
        tracing::debug!("WebSocket session started: {}", self.id);
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        // Guard rơi cùng actor, hub nhận Unsubscribe cho từng feed.
        tracing::debug!("WebSocket session stopped: {}", self.id);
    }
}

/// Implement Message trait cho ClientMessage để có thể send qua actors
impl Message for ClientMessage {
    type Result = ();
}

/// Handler: Nhận ClientMessage từ handler.rs
impl Handler<ClientMessage> for WebSocketSession {
    type Result = ();

    fn handle(&mut self, msg: ClientMessage, ctx: &mut Context<Self>) {
        self.handle_client_message(&msg, ctx);
    }
}
