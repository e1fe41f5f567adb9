use actix_web::web::{scope, ServiceConfig};

use crate::modules::reaction::handle::*;

pub fn configure(cfg: &mut ServiceConfig) {
    cfg.service(scope("/reactions").service(add_reaction).service(remove_reaction));
}
