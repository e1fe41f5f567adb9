use actix_web::{delete, put, web, HttpRequest};
use uuid::Uuid;

use crate::{
    api::{error, success},
    middlewares::get_claims,
    modules::{
        message::repository_pg::MessagePgRepository,
        reaction::{model::ReactionPayload, service::ReactionService},
    },
    utils::ValidatedJson,
};

type ReactionSvc = ReactionService<MessagePgRepository>;

#[put("/{conversation_id}/{message_id}")]
pub async fn add_reaction(
    reaction_svc: web::Data<ReactionSvc>,
    path: web::Path<(Uuid, Uuid)>,
    body: ValidatedJson<ReactionPayload>,
    req: HttpRequest,
) -> Result<success::Success<()>, error::Error> {
    let user_id = get_claims(&req)?.sub;
    let (conversation_id, message_id) = path.into_inner();

    reaction_svc.add(conversation_id, &message_id, &user_id, &body.0.emoji).await?;

    Ok(success::Success::ok(None).message("Reaction added"))
}

#[delete("/{conversation_id}/{message_id}")]
pub async fn remove_reaction(
    reaction_svc: web::Data<ReactionSvc>,
    path: web::Path<(Uuid, Uuid)>,
    body: ValidatedJson<ReactionPayload>,
    req: HttpRequest,
) -> Result<success::Success<()>, error::Error> {
    let user_id = get_claims(&req)?.sub;
    let (conversation_id, message_id) = path.into_inner();

    reaction_svc.remove(conversation_id, &message_id, &user_id, &body.0.emoji).await?;

    Ok(success::Success::ok(None).message("Reaction removed"))
}
