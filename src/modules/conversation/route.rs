use actix_web::web::{scope, ServiceConfig};

use crate::modules::conversation::handle::*;

pub fn configure(cfg: &mut ServiceConfig) {
    cfg.service(
        scope("/conversations")
            .service(get_conversations)
            .service(create_group)
            .service(resolve_direct)
            .service(resolve_team)
            .service(add_participant)
            .service(remove_participant),
    );
}
