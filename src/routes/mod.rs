use actix_web::{web, HttpResponse};
use serde_json::json;

use crate::middleware::JwtAuthMiddleware;

pub mod contacts;
pub mod conversations;
pub mod users;
pub mod wsroute;

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/ws", web::get().to(wsroute::ws_connect))
        .service(
            web::scope("/api")
                .wrap(JwtAuthMiddleware)
                .configure(conversations::configure)
                .configure(users::configure)
                .configure(contacts::configure),
        );
}
