use actix_web::{post, web, HttpRequest};
use uuid::Uuid;

use crate::{
    api::{error, success},
    middlewares::get_claims,
    modules::{
        conversation::repository_pg::ConversationPgRepository,
        typing::{model::TypingSignal, service::TypingService},
    },
    utils::ValidatedJson,
};

type TypingSvc = TypingService<ConversationPgRepository>;

#[post("/{conversation_id}")]
pub async fn signal_typing(
    typing_svc: web::Data<TypingSvc>,
    conversation_id: web::Path<Uuid>,
    body: ValidatedJson<TypingSignal>,
    req: HttpRequest,
) -> Result<success::Success<()>, error::Error> {
    let user_id = get_claims(&req)?.sub;

    typing_svc.signal(conversation_id.into_inner(), &user_id, body.0.is_typing).await?;

    Ok(success::Success::ok(None).message("Typing signal recorded"))
}
