use actix_web::{delete, get, post, web, HttpRequest};
use uuid::Uuid;

use crate::{
    api::{error, success},
    middlewares::get_claims,
    modules::conversation::{
        model::{Actor, ConversationDetail, DirectPeer, NewConversation, NewParticipant},
        repository_pg::ConversationPgRepository,
        service::ConversationService,
    },
    utils::ValidatedJson,
    ENV,
};

type ConversationSvc = ConversationService<ConversationPgRepository>;

#[get("/")]
pub async fn get_conversations(
    conversation_svc: web::Data<ConversationSvc>,
    req: HttpRequest,
) -> Result<success::Success<Vec<ConversationDetail>>, error::Error> {
    let user_id = get_claims(&req)?.sub;

    let conversations = conversation_svc.list_for_user(&user_id).await?;

    Ok(success::Success::ok(Some(conversations)).message("Successfully retrieved conversations"))
}

#[post("/")]
pub async fn create_group(
    conversation_svc: web::Data<ConversationSvc>,
    body: ValidatedJson<NewConversation>,
    req: HttpRequest,
) -> Result<success::Success<ConversationDetail>, error::Error> {
    let creator = get_claims(&req)?.profile();

    let conversation = conversation_svc.create_group(&creator, body.0).await?;

    Ok(success::Success::created(Some(conversation)).message("Successfully created conversation"))
}

#[post("/direct")]
pub async fn resolve_direct(
    conversation_svc: web::Data<ConversationSvc>,
    body: ValidatedJson<DirectPeer>,
    req: HttpRequest,
) -> Result<success::Success<ConversationDetail>, error::Error> {
    let me = get_claims(&req)?.profile();

    let conversation = conversation_svc.resolve_direct(&me, &body.0.peer).await?;

    Ok(success::Success::ok(Some(conversation)).message("Successfully resolved conversation"))
}

#[post("/team")]
pub async fn resolve_team(
    conversation_svc: web::Data<ConversationSvc>,
    req: HttpRequest,
) -> Result<success::Success<ConversationDetail>, error::Error> {
    let me = get_claims(&req)?.profile();

    let conversation = conversation_svc.resolve_team(&ENV.team_name, &me).await?;

    Ok(success::Success::ok(Some(conversation)).message("Successfully resolved conversation"))
}

#[post("/{conversation_id}/participants")]
pub async fn add_participant(
    conversation_svc: web::Data<ConversationSvc>,
    conversation_id: web::Path<Uuid>,
    body: ValidatedJson<NewParticipant>,
    req: HttpRequest,
) -> Result<success::Success<ConversationDetail>, error::Error> {
    let user_id = get_claims(&req)?.sub;

    let conversation = conversation_svc
        .add_participant(conversation_id.into_inner(), Actor::User(user_id), body.0.member)
        .await?;

    Ok(success::Success::ok(Some(conversation)).message("Participant added"))
}

#[delete("/{conversation_id}/participants/{user_id}")]
pub async fn remove_participant(
    conversation_svc: web::Data<ConversationSvc>,
    path: web::Path<(Uuid, Uuid)>,
    req: HttpRequest,
) -> Result<success::Success<ConversationDetail>, error::Error> {
    let caller_id = get_claims(&req)?.sub;
    let (conversation_id, user_id) = path.into_inner();

    let conversation = conversation_svc
        .remove_participant(conversation_id, Actor::User(caller_id), user_id)
        .await?;

    Ok(success::Success::ok(Some(conversation)).message("Participant removed"))
}
