use actix_web::web::{scope, ServiceConfig};

use crate::modules::typing::handle::*;

pub fn configure(cfg: &mut ServiceConfig) {
    cfg.service(scope("/typing").service(signal_typing));
}
