use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::AuthedUser;
use crate::services::PresenceService;
use crate::state::AppState;
use crate::websocket::events::WsOutboundEvent;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/users")
            .route("/online", web::post().to(set_online))
            .route("/offline", web::post().to(set_offline))
            .route("/{id}/status", web::get().to(get_status)),
    );
}

async fn get_status(
    state: web::Data<AppState>,
    _user: AuthedUser,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    let status = PresenceService::query_status(&state.db, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "data": status })))
}

/// Explicit presence override via HTTP, mirrored to every room the user's
/// live session is subscribed to.
async fn set_presence(state: &AppState, user_id: Uuid, is_online: bool) -> AppResult<()> {
    PresenceService::set_explicit_status(&state.db, user_id, is_online).await?;

    let frame = if is_online {
        WsOutboundEvent::UserOnline { user_id }.to_json()
    } else {
        WsOutboundEvent::UserOffline {
            user_id,
            last_online: Some(Utc::now()),
        }
        .to_json()
    };
    for conversation_id in state.directory.rooms_for_user(user_id).await {
        state.directory.broadcast(conversation_id, &frame, None).await;
    }
    Ok(())
}

async fn set_online(state: web::Data<AppState>, user: AuthedUser) -> AppResult<HttpResponse> {
    set_presence(&state, user.0, true).await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "message": "Status updated to online" })))
}

async fn set_offline(state: web::Data<AppState>, user: AuthedUser) -> AppResult<HttpResponse> {
    set_presence(&state, user.0, false).await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "message": "Status updated to offline" })))
}
