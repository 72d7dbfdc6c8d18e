use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::middleware::AuthedUser;
use crate::models::ConversationView;
use crate::services::ConversationService;
use crate::state::AppState;
use crate::websocket::events::WsOutboundEvent;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGroupBody {
    participant_ids: Vec<Uuid>,
    group_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberBody {
    user_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupImageBody {
    conversation_id: Uuid,
    image_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagesQuery {
    limit: Option<i64>,
    before_message_id: Option<Uuid>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/conversations")
            .route("", web::get().to(list_conversations))
            .route("/group", web::post().to(create_group))
            .route("/update-group-image", web::post().to(update_group_image))
            .route("/{id}", web::get().to(get_conversation))
            .route("/{id}", web::delete().to(delete_group))
            .route("/{id}/messages", web::get().to(get_messages))
            .route("/{id}/add-member", web::post().to(add_member))
            .route("/{id}/remove-member", web::post().to(remove_member))
            .route("/{id}/leave-group", web::post().to(leave_group)),
    );
}

async fn require_view(state: &AppState, conversation_id: Uuid) -> AppResult<ConversationView> {
    ConversationService::get_view(&state.db, conversation_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Group not found".into()))
}

async fn list_conversations(
    state: web::Data<AppState>,
    user: AuthedUser,
) -> AppResult<HttpResponse> {
    let conversations = ConversationService::list_for_user(&state.db, user.0).await?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "data": conversations })))
}

async fn get_conversation(
    state: web::Data<AppState>,
    user: AuthedUser,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    let conversation_id = path.into_inner();
    if !ConversationService::is_participant(&state.db, conversation_id, user.0).await? {
        return Err(AppError::NotFound(
            "Conversation not found or you are not a participant.".into(),
        ));
    }
    let view = ConversationService::get_view(&state.db, conversation_id)
        .await?
        .ok_or_else(|| {
            AppError::NotFound("Conversation not found or you are not a participant.".into())
        })?;
    Ok(HttpResponse::Ok().json(json!({ "success": true, "data": view })))
}

async fn get_messages(
    state: web::Data<AppState>,
    user: AuthedUser,
    path: web::Path<Uuid>,
    query: web::Query<MessagesQuery>,
) -> AppResult<HttpResponse> {
    let conversation_id = path.into_inner();
    if !ConversationService::is_participant(&state.db, conversation_id, user.0).await? {
        return Err(AppError::NotFound(
            "Conversation not found or you are not a participant.".into(),
        ));
    }

    let messages = ConversationService::get_messages(
        &state.db,
        conversation_id,
        query.limit,
        query.before_message_id,
    )
    .await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "messages": messages,
        "conversationId": conversation_id,
    })))
}

async fn create_group(
    state: web::Data<AppState>,
    user: AuthedUser,
    body: web::Json<CreateGroupBody>,
) -> AppResult<HttpResponse> {
    let conversation_id = ConversationService::create_group(
        &state.db,
        user.0,
        &body.participant_ids,
        &body.group_name,
    )
    .await?;
    let view = require_view(&state, conversation_id).await?;

    // Every member's live session joins the new room and hears about it;
    // the creator learns from the HTTP response.
    let announce = WsOutboundEvent::NewGroupConversation(view.clone()).to_json();
    for participant_id in view.participant_ids() {
        state.directory.join_user(participant_id, conversation_id).await;
        if participant_id != user.0 {
            state.directory.send_to_user(participant_id, &announce).await;
        }
    }

    Ok(HttpResponse::Created().json(json!({
        "success": true,
        "data": view,
        "message": "Group conversation created successfully",
    })))
}

async fn add_member(
    state: web::Data<AppState>,
    user: AuthedUser,
    path: web::Path<Uuid>,
    body: web::Json<MemberBody>,
) -> AppResult<HttpResponse> {
    let conversation_id = path.into_inner();
    ConversationService::add_member(&state.db, conversation_id, body.user_id, user.0).await?;
    let view = require_view(&state, conversation_id).await?;

    let updated = WsOutboundEvent::GroupUpdated(view.clone()).to_json();
    let added = WsOutboundEvent::AddedToGroup(view.clone()).to_json();
    for participant_id in view.participant_ids() {
        if participant_id == body.user_id {
            state.directory.join_user(participant_id, conversation_id).await;
            state.directory.send_to_user(participant_id, &added).await;
        } else {
            state.directory.send_to_user(participant_id, &updated).await;
        }
    }

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "data": view,
        "message": "Member added successfully",
    })))
}

async fn remove_member(
    state: web::Data<AppState>,
    user: AuthedUser,
    path: web::Path<Uuid>,
    body: web::Json<MemberBody>,
) -> AppResult<HttpResponse> {
    let conversation_id = path.into_inner();
    ConversationService::remove_member(&state.db, conversation_id, body.user_id, user.0).await?;
    let view = require_view(&state, conversation_id).await?;

    let removed = WsOutboundEvent::RemovedFromGroup { conversation_id }.to_json();
    state.directory.send_to_user(body.user_id, &removed).await;
    state.directory.leave_user(body.user_id, conversation_id).await;

    let updated = WsOutboundEvent::GroupUpdated(view.clone()).to_json();
    for participant_id in view.participant_ids() {
        state.directory.send_to_user(participant_id, &updated).await;
    }

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "data": view,
        "message": "Member removed successfully",
    })))
}

async fn leave_group(
    state: web::Data<AppState>,
    user: AuthedUser,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    let conversation_id = path.into_inner();
    ConversationService::leave_group(&state.db, conversation_id, user.0).await?;

    let left = WsOutboundEvent::LeftGroup { conversation_id }.to_json();
    state.directory.send_to_user(user.0, &left).await;
    state.directory.leave_user(user.0, conversation_id).await;

    let view = require_view(&state, conversation_id).await?;
    let updated = WsOutboundEvent::GroupUpdated(view.clone()).to_json();
    for participant_id in view.participant_ids() {
        state.directory.send_to_user(participant_id, &updated).await;
    }

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "You have left the group",
    })))
}

async fn delete_group(
    state: web::Data<AppState>,
    user: AuthedUser,
    path: web::Path<Uuid>,
) -> AppResult<HttpResponse> {
    let conversation_id = path.into_inner();
    let participants =
        ConversationService::delete_group(&state.db, conversation_id, user.0).await?;

    let deleted = WsOutboundEvent::GroupDeleted { conversation_id }.to_json();
    for participant_id in participants {
        state.directory.send_to_user(participant_id, &deleted).await;
        state.directory.leave_user(participant_id, conversation_id).await;
    }

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Group deleted successfully",
    })))
}

async fn update_group_image(
    state: web::Data<AppState>,
    user: AuthedUser,
    body: web::Json<GroupImageBody>,
) -> AppResult<HttpResponse> {
    ConversationService::update_group_image(
        &state.db,
        body.conversation_id,
        user.0,
        &body.image_url,
    )
    .await?;
    let view = require_view(&state, body.conversation_id).await?;

    let updated = WsOutboundEvent::GroupUpdated(view.clone()).to_json();
    for participant_id in view.participant_ids() {
        state.directory.send_to_user(participant_id, &updated).await;
    }

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "data": view,
        "message": "Group image updated successfully",
    })))
}
