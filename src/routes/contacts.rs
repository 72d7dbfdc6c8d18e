use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::AuthedUser;
use crate::services::contact::ConnectionResponse;
use crate::services::{ContactService, PresenceService};
use crate::state::AppState;
use crate::websocket::events::WsOutboundEvent;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    query: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestBody {
    recipient_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RespondBody {
    sender_id: Uuid,
    accept: bool,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/connections")
            .route("/search", web::get().to(search))
            .route("/request", web::post().to(send_request))
            .route("/respond", web::post().to(respond))
            .route("/requests", web::get().to(list_requests))
            .route("/contacts", web::get().to(list_contacts)),
    );
}

async fn search(
    state: web::Data<AppState>,
    user: AuthedUser,
    query: web::Query<SearchQuery>,
) -> AppResult<HttpResponse> {
    let users = ContactService::search_users(&state.db, user.0, &query.query).await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "data": users })))
}

async fn send_request(
    state: web::Data<AppState>,
    user: AuthedUser,
    body: web::Json<RequestBody>,
) -> AppResult<HttpResponse> {
    ContactService::send_request(&state.db, user.0, body.recipient_id).await?;

    // Live notification for the recipient, carrying the sender's profile.
    if let Some(sender) = PresenceService::user_summary(&state.db, user.0).await? {
        let frame = WsOutboundEvent::ConnectionRequest { from: sender }.to_json();
        state.directory.send_to_user(body.recipient_id, &frame).await;
    }

    Ok(HttpResponse::Ok().json(json!({ "success": true, "message": "Connection request sent" })))
}

async fn respond(
    state: web::Data<AppState>,
    user: AuthedUser,
    body: web::Json<RespondBody>,
) -> AppResult<HttpResponse> {
    let response = if body.accept {
        ConnectionResponse::Accepted
    } else {
        ConnectionResponse::Rejected
    };
    ContactService::respond(&state.db, user.0, body.sender_id, response).await?;

    let frame = if body.accept {
        let responder = PresenceService::user_summary(&state.db, user.0)
            .await?
            .ok_or(AppError::Unauthorized)?;
        WsOutboundEvent::ConnectionAccepted { user: responder }.to_json()
    } else {
        WsOutboundEvent::ConnectionRejected { user_id: user.0 }.to_json()
    };
    state.directory.send_to_user(body.sender_id, &frame).await;

    let message = if body.accept {
        "Connection request accepted"
    } else {
        "Connection request rejected"
    };
    Ok(HttpResponse::Ok().json(json!({ "success": true, "message": message })))
}

async fn list_requests(state: web::Data<AppState>, user: AuthedUser) -> AppResult<HttpResponse> {
    let requests = ContactService::list_requests(&state.db, user.0).await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "data": requests })))
}

async fn list_contacts(state: web::Data<AppState>, user: AuthedUser) -> AppResult<HttpResponse> {
    let contacts = ContactService::list_contacts(&state.db, user.0).await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "data": contacts })))
}
