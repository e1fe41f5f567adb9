use actix_web::web::{scope, ServiceConfig};

use crate::modules::receipt::handle::*;

pub fn configure(cfg: &mut ServiceConfig) {
    cfg.service(
        scope("/receipts").service(mark_conversation_read).service(mark_message_read),
    );
}
