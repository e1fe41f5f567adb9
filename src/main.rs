use actix::Actor;
use actix_cors::Cors;
use actix_web::{
    self, App, HttpServer,
    middleware::{Logger, from_fn},
    web,
};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use crate::{
    configs::connect_database,
    middlewares::authentication,
    modules::{
        conversation::{repository_pg::ConversationPgRepository, service::ConversationService},
        message::{repository_pg::MessagePgRepository, service::MessageService},
        notifier::{hub::NotifierHub, reader::StoreReader},
        reaction::service::ReactionService,
        receipt::service::ReceiptService,
        typing::{service::TypingService, tracker::TypingTracker},
        websocket::handler::websocket_handler,
    },
};

mod api;
mod configs;
mod constants;
mod middlewares;
mod modules;
mod test;
mod utils;

pub static ENV: LazyLock<constants::Env> = LazyLock::new(|| {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();
    tracing::info!("Environment variables loaded from .env file");
    constants::Env::default()
});

#[actix_web::get("/")]
async fn health_check() -> &'static str {
    "Server is running"
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let db_pool =
        connect_database().await.map_err(|_| std::io::Error::other("Database connection error"))?;

    let conversation_repo = Arc::new(ConversationPgRepository::new(db_pool.clone()));
    let message_repo = Arc::new(MessagePgRepository::new(db_pool.clone()));

    let typing = TypingTracker::with_ttl(Duration::from_millis(ENV.typing_ttl_ms));
    let reader = StoreReader::new(conversation_repo.clone(), message_repo.clone());
    let notifier = NotifierHub::new(Arc::new(reader), typing.clone()).start();

    let conversation_service =
        ConversationService::with_dependencies(conversation_repo.clone(), notifier.clone());
    let message_service = MessageService::with_dependencies(
        message_repo.clone(),
        conversation_repo.clone(),
        notifier.clone(),
    );
    let receipt_service =
        ReceiptService::with_dependencies(message_repo.clone(), notifier.clone());
    let reaction_service = ReactionService::with_dependencies(message_repo, notifier.clone());
    let typing_service =
        TypingService::with_dependencies(conversation_repo, typing, notifier.clone());

    println!("Starting server at http://{}:{}", ENV.ip.as_str(), ENV.port);
    HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin(ENV.frontend_url.as_str())
            .allow_any_method()
            .allow_any_header()
            .supports_credentials();

        App::new()
            .wrap(Logger::default())
            .wrap(cors)
            .app_data(web::Data::new(conversation_service.clone()))
            .app_data(web::Data::new(message_service.clone()))
            .app_data(web::Data::new(receipt_service.clone()))
            .app_data(web::Data::new(reaction_service.clone()))
            .app_data(web::Data::new(typing_service.clone()))
            .app_data(web::Data::new(notifier.clone()))
            .service(health_check)
            .route("/ws", web::get().to(websocket_handler))
            .service(
                web::scope("/api").service(
                    web::scope("")
                        .wrap(from_fn(authentication))
                        .configure(modules::conversation::route::configure)
                        .configure(modules::message::route::configure)
                        .configure(modules::receipt::route::configure)
                        .configure(modules::reaction::route::configure)
                        .configure(modules::typing::route::configure),
                ),
            )
    })
    .bind((ENV.ip.as_str(), ENV.port))?
    .workers(2)
    .run()
    .await
}
