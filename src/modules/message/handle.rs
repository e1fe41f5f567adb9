use actix_web::{get, patch, post, web, HttpRequest};
use uuid::Uuid;

use crate::{
    api::{error, success},
    middlewares::get_claims,
    modules::{
        conversation::repository_pg::ConversationPgRepository,
        message::{
            model::{EditMessage, MessageDetail, NewMessage, TailQuery},
            repository_pg::MessagePgRepository,
            service::MessageService,
        },
    },
    utils::{ValidatedJson, ValidatedQuery},
    ENV,
};

type MessageSvc = MessageService<MessagePgRepository, ConversationPgRepository>;

#[post("/{conversation_id}")]
pub async fn send_message(
    message_service: web::Data<MessageSvc>,
    conversation_id: web::Path<Uuid>,
    body: ValidatedJson<NewMessage>,
    req: HttpRequest,
) -> Result<success::Success<MessageDetail>, error::Error> {
    let sender = get_claims(&req)?.profile();

    let message = message_service.send(conversation_id.into_inner(), &sender, body.0).await?;

    Ok(success::Success::created(Some(message)).message("Message sent"))
}

#[get("/{conversation_id}")]
pub async fn get_messages(
    message_service: web::Data<MessageSvc>,
    conversation_id: web::Path<Uuid>,
    query: ValidatedQuery<TailQuery>,
    req: HttpRequest,
) -> Result<success::Success<Vec<MessageDetail>>, error::Error> {
    let user_id = get_claims(&req)?.sub;
    let limit = query.0.limit.unwrap_or(ENV.message_tail_limit);

    let messages =
        message_service.tail(conversation_id.into_inner(), &user_id, limit).await?;

    Ok(success::Success::ok(Some(messages)).message("Successfully retrieved messages"))
}

#[patch("/{conversation_id}/{message_id}")]
pub async fn edit_message(
    message_service: web::Data<MessageSvc>,
    path: web::Path<(Uuid, Uuid)>,
    body: ValidatedJson<EditMessage>,
    req: HttpRequest,
) -> Result<success::Success<MessageDetail>, error::Error> {
    let user_id = get_claims(&req)?.sub;
    let (conversation_id, message_id) = path.into_inner();

    let message =
        message_service.edit(conversation_id, message_id, &user_id, &body.0.text).await?;

    Ok(success::Success::ok(Some(message)).message("Message updated"))
}
