use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use serde::Deserialize;

use crate::services::PresenceService;
use crate::state::AppState;
use crate::websocket::session::WsSession;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    token: String,
}

/// WebSocket upgrade. The bearer token travels in the query string because
/// browser WebSocket clients cannot set headers; authentication happens
/// before the upgrade, so a bad token is rejected with 401 and no actor is
/// ever started.
pub async fn ws_connect(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
    query: web::Query<WsQuery>,
) -> Result<HttpResponse, Error> {
    let user = PresenceService::authenticate(&state.db, &query.token).await?;
    let (session_id, rx) = state.directory.register(user.id).await;

    let session = WsSession::new(session_id, user.id, user.name, rx, state.get_ref().clone());
    ws::start(session, &req, stream)
}
