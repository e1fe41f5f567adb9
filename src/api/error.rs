use actix_web::{
    http::StatusCode,
    HttpResponse, ResponseError,
};
use std::borrow::Cow;
use uuid::Uuid;

use crate::{modules::conversation::schema::ConversationType, ENV};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Bad Request: {0}")]
    BadRequest(Cow<'static, str>),
    #[error("Unauthorized: {0}")]
    Unauthorized(Cow<'static, str>),
    #[error("Forbidden: {0}")]
    Forbidden(Cow<'static, str>),
    #[error("Not Found: {0}")]
    NotFound(Cow<'static, str>),
    #[error("Internal Server Error")]
    InternalServer,
}

#[derive(serde::Serialize)]
pub struct ErrorBody {
    pub message: Cow<'static, str>,
}

impl Error {
    pub fn bad_request(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn unauthorized(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn forbidden(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::Forbidden(msg.into())
    }
}

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        match *self {
            Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::InternalServer => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let header = ("Access-Control-Allow-Origin", ENV.frontend_url.as_str());
        let mut res = HttpResponse::build(self.status_code());

        res.insert_header(header);
        res.insert_header(("Access-Control-Allow-Credentials", "true"));

        match self {
            // Has Message
            Error::NotFound(msg)
            | Error::Unauthorized(msg)
            | Error::BadRequest(msg)
            | Error::Forbidden(msg) => res.json(ErrorBody { message: msg.clone() }),
            // No Message
            Error::InternalServer => {
                res.json(ErrorBody { message: "Internal Server Error".into() })
            }
        }
    }
}

/// Lỗi nghiệp vụ của chat core. Repository và service chỉ trả về loại này,
/// tầng HTTP đổi sang `Error` qua `From`.
#[derive(thiserror::Error, Debug)]
pub enum ChatError {
    #[error("Not a participant of conversation {0}")]
    NotAParticipant(Uuid),
    #[error("Conversation {0} not found")]
    ConversationNotFound(Uuid),
    #[error("Message {0} not found")]
    MessageNotFound(Uuid),
    #[error("Invalid membership: {0}")]
    InvalidMembership(Cow<'static, str>),
    #[error("Direct conversation already exists for this pair")]
    DuplicateDirectConversation,
    #[error("Operation not supported for {0} conversations")]
    Unsupported(ConversationType),
    #[error("Only the sender can edit this message")]
    NotSender,
    #[error("Message must carry text or at least one attachment")]
    EmptyMessage,
    #[error("Notifier is not running")]
    NotifierClosed,
    #[error("Database Error: {0}")]
    Store(Cow<'static, str>),
}

impl ChatError {
    pub fn invalid_membership(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidMembership(msg.into())
    }
}

impl From<ChatError> for Error {
    fn from(value: ChatError) -> Self {
        match &value {
            ChatError::NotAParticipant(_) | ChatError::NotSender => {
                Error::Forbidden(value.to_string().into())
            }
            ChatError::ConversationNotFound(_) | ChatError::MessageNotFound(_) => {
                Error::NotFound(value.to_string().into())
            }
            ChatError::InvalidMembership(_)
            | ChatError::Unsupported(_)
            | ChatError::EmptyMessage => Error::BadRequest(value.to_string().into()),
            ChatError::DuplicateDirectConversation
            | ChatError::NotifierClosed
            | ChatError::Store(_) => {
                tracing::error!(error = %value, "internal chat error");
                Error::InternalServer
            }
        }
    }
}

impl From<sqlx::Error> for ChatError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            // 23505: unique_violation. Chỉ direct-pair key có thể chạm vào đây,
            // mọi ON CONFLICT khác đã nuốt conflict trong câu SQL.
            if db_err.code().as_deref() == Some("23505") {
                return ChatError::DuplicateDirectConversation;
            }
        }
        tracing::error!(error = ?err, "database error");
        ChatError::Store(err.to_string().into())
    }
}

// Hub đã dừng thì mailbox trả lỗi, coi như notifier tắt.
impl From<actix::MailboxError> for ChatError {
    fn from(_: actix::MailboxError) -> Self {
        ChatError::NotifierClosed
    }
}
