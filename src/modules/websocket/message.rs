/// WebSocket Message Protocol
///
/// Module này định nghĩa các message types được trao đổi giữa client và server
/// thông qua WebSocket connection. Chiều server → client chủ yếu mang nguyên
/// snapshot từ notifier hub, không mang diff.
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::modules::notifier::snapshot::{ConversationListSnapshot, MessageTailSnapshot};

/// Messages được gửi từ client đến server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Xác thực WebSocket connection với JWT token. Auth xong server tự mở
    /// list feed cho user, không cần subscribe riêng.
    #[serde(rename_all = "camelCase")]
    Auth { token: String },

    /// Gửi tin nhắn đến conversation
    #[serde(rename_all = "camelCase")]
    SendMessage {
        conversation_id: Uuid,
        #[serde(default)]
        text: String,
        #[serde(default)]
        attachments: Vec<String>,
    },

    /// Mở log feed của conversation để nhận snapshot real-time.
    /// `limit` là cỡ đuôi log muốn theo dõi, bỏ trống dùng mặc định server.
    #[serde(rename_all = "camelCase")]
    JoinConversation {
        conversation_id: Uuid,
        #[serde(default)]
        limit: Option<i64>,
    },

    /// Đóng log feed của conversation
    #[serde(rename_all = "camelCase")]
    LeaveConversation { conversation_id: Uuid },

    /// Chốt cursor "đã đọc đến đây" cho cả conversation
    #[serde(rename_all = "camelCase")]
    MarkRead { conversation_id: Uuid },

    /// Bắt đầu typing trong conversation
    #[serde(rename_all = "camelCase")]
    TypingStart { conversation_id: Uuid },

    /// Dừng typing trong conversation
    #[serde(rename_all = "camelCase")]
    TypingStop { conversation_id: Uuid },

    /// Ping để giữ connection alive
    Ping,
}

/// Messages được gửi từ server đến client
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Xác thực thành công
    #[serde(rename_all = "camelCase")]
    AuthSuccess { user_id: Uuid },

    /// Xác thực thất bại
    #[serde(rename_all = "camelCase")]
    AuthFailed { reason: String },

    /// Snapshot mới nhất của sidebar (mọi conversation của user)
    ConversationList(ConversationListSnapshot),

    /// Snapshot mới nhất của đuôi log một conversation
    MessageLog(MessageTailSnapshot),

    /// Feed bị hub kết liễu sau khi đọc store thất bại nhiều lần.
    /// `conversation_id` rỗng nghĩa là list feed; client nên re-join.
    #[serde(rename_all = "camelCase")]
    FeedClosed { conversation_id: Option<Uuid>, reason: String },

    /// Pong response cho Ping
    Pong,

    /// Lỗi xảy ra
    #[serde(rename_all = "camelCase")]
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    // === ClientMessage deserialization ===

    #[test]
    fn test_client_auth_deserialize() {
        let json = r#"{"type":"auth","token":"my-jwt-token"}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        assert!(matches!(msg, ClientMessage::Auth { token } if token == "my-jwt-token"));
    }

    #[test]
    fn test_client_send_message_deserialize() {
        let id = Uuid::now_v7();
        let json =
            format!(r#"{{"type":"sendMessage","conversationId":"{}","text":"Xin chào!"}}"#, id);
        let msg: ClientMessage = serde_json::from_str(&json).unwrap();
        match msg {
            ClientMessage::SendMessage { conversation_id, text, attachments } => {
                assert_eq!(conversation_id, id);
                assert_eq!(text, "Xin chào!");
                assert!(attachments.is_empty());
            }
            _ => panic!("Expected SendMessage variant"),
        }
    }

    #[test]
    fn test_client_join_conversation_deserialize() {
        let id = Uuid::now_v7();
        let json = format!(r#"{{"type":"joinConversation","conversationId":"{}"}}"#, id);
        let msg: ClientMessage = serde_json::from_str(&json).unwrap();
        match msg {
            ClientMessage::JoinConversation { conversation_id, limit } => {
                assert_eq!(conversation_id, id);
                assert!(limit.is_none());
            }
            _ => panic!("Expected JoinConversation variant"),
        }

        let json = format!(r#"{{"type":"joinConversation","conversationId":"{}","limit":20}}"#, id);
        let msg: ClientMessage = serde_json::from_str(&json).unwrap();
        assert!(matches!(msg, ClientMessage::JoinConversation { limit: Some(20), .. }));
    }

    #[test]
    fn test_client_mark_read_deserialize() {
        let id = Uuid::now_v7();
        let json = format!(r#"{{"type":"markRead","conversationId":"{}"}}"#, id);
        let msg: ClientMessage = serde_json::from_str(&json).unwrap();
        assert!(matches!(msg, ClientMessage::MarkRead { conversation_id } if conversation_id == id));
    }

    #[test]
    fn test_client_typing_start_deserialize() {
        let id = Uuid::now_v7();
        let json = format!(r#"{{"type":"typingStart","conversationId":"{}"}}"#, id);
        let msg: ClientMessage = serde_json::from_str(&json).unwrap();
        assert!(
            matches!(msg, ClientMessage::TypingStart { conversation_id } if conversation_id == id)
        );
    }

    #[test]
    fn test_client_ping_deserialize() {
        let json = r#"{"type":"ping"}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        assert!(matches!(msg, ClientMessage::Ping));
    }

    #[test]
    fn test_invalid_type_returns_error() {
        let json = r#"{"type":"unknownType"}"#;
        let result = serde_json::from_str::<ClientMessage>(json);
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_required_field_returns_error() {
        // markRead thiếu conversationId
        let json = r#"{"type":"markRead"}"#;
        let result = serde_json::from_str::<ClientMessage>(json);
        assert!(result.is_err());
    }

    // === ServerMessage serialization ===

    #[test]
    fn test_server_auth_success_serialize() {
        let uid = Uuid::now_v7();
        let msg = ServerMessage::AuthSuccess { user_id: uid };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"authSuccess\""));
        assert!(json.contains(&uid.to_string()));
    }

    #[test]
    fn test_server_auth_failed_serialize() {
        let msg = ServerMessage::AuthFailed { reason: "Token hết hạn".to_string() };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"authFailed\""));
        assert!(json.contains("Token hết hạn"));
    }

    #[test]
    fn test_server_conversation_list_serialize() {
        let msg =
            ServerMessage::ConversationList(ConversationListSnapshot { conversations: vec![] });
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"conversationList\""));
        assert!(json.contains("\"conversations\":[]"));
    }

    #[test]
    fn test_server_message_log_serialize() {
        let conv_id = Uuid::now_v7();
        let typing_id = Uuid::now_v7();
        let msg = ServerMessage::MessageLog(MessageTailSnapshot {
            conversation_id: conv_id,
            messages: vec![],
            typing: vec![typing_id],
        });
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"messageLog\""));
        assert!(json.contains(&format!("\"conversationId\":\"{}\"", conv_id)));
        assert!(json.contains(&typing_id.to_string()));
    }

    #[test]
    fn test_server_feed_closed_serialize() {
        let msg = ServerMessage::FeedClosed {
            conversation_id: None,
            reason: "store unavailable".to_string(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"feedClosed\""));
        assert!(json.contains("\"conversationId\":null"));
    }

    #[test]
    fn test_server_pong_serialize() {
        let msg = ServerMessage::Pong;
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"type":"pong"}"#);
    }

    // === Roundtrip ===

    #[test]
    fn test_client_message_roundtrip() {
        let id = Uuid::now_v7();
        let original = ClientMessage::SendMessage {
            conversation_id: id,
            text: "Test message 🇻🇳".to_string(),
            attachments: vec!["https://cdn.example/a.png".to_string()],
        };
        let json = serde_json::to_string(&original).unwrap();
        let deserialized: ClientMessage = serde_json::from_str(&json).unwrap();

        match deserialized {
            ClientMessage::SendMessage { conversation_id, text, attachments } => {
                assert_eq!(conversation_id, id);
                assert_eq!(text, "Test message 🇻🇳");
                assert_eq!(attachments.len(), 1);
            }
            _ => panic!("Roundtrip failed"),
        }
    }
}
