use actix_web::{post, web, HttpRequest};
use uuid::Uuid;

use crate::{
    api::{error, success},
    middlewares::get_claims,
    modules::{message::repository_pg::MessagePgRepository, receipt::service::ReceiptService},
};

type ReceiptSvc = ReceiptService<MessagePgRepository>;

#[post("/{conversation_id}")]
pub async fn mark_conversation_read(
    receipt_svc: web::Data<ReceiptSvc>,
    conversation_id: web::Path<Uuid>,
    req: HttpRequest,
) -> Result<success::Success<()>, error::Error> {
    let user_id = get_claims(&req)?.sub;

    receipt_svc.mark_read(conversation_id.into_inner(), &user_id).await?;

    Ok(success::Success::ok(None).message("Conversation marked as read"))
}

#[post("/{conversation_id}/{message_id}")]
pub async fn mark_message_read(
    receipt_svc: web::Data<ReceiptSvc>,
    path: web::Path<(Uuid, Uuid)>,
    req: HttpRequest,
) -> Result<success::Success<()>, error::Error> {
    let user_id = get_claims(&req)?.sub;
    let (conversation_id, message_id) = path.into_inner();

    receipt_svc.mark_message_read(conversation_id, &message_id, &user_id).await?;

    Ok(success::Success::ok(None).message("Message marked as read"))
}
