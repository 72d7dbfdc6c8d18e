//! Per-connection WebSocket actor.
//!
//! One `WsSession` per upgraded connection. Inbound frames are parsed into
//! `WsInboundEvent` and dispatched to async handlers; outbound delivery runs
//! through the `ConnectionDirectory` channel the session drains into the
//! actor mailbox. Authentication happens before the upgrade, so by the time
//! this actor starts the user is known.

use std::time::{Duration, Instant};

use actix::prelude::*;
use actix_web_actors::ws;
use chrono::Utc;
use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

use crate::error::AppResult;
use crate::services::{ConversationService, MessageService, PresenceService};
use crate::state::AppState;
use crate::websocket::events::{ParticipantPresence, WsOutboundEvent};
use crate::websocket::message_types::WsInboundEvent;
use crate::websocket::SessionId;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

/// Payload pushed into the actor mailbox by the directory forwarder.
#[derive(Message)]
#[rtype(result = "()")]
struct OutboundFrame(String);

pub struct WsSession {
    session_id: SessionId,
    user_id: Uuid,
    user_name: String,
    /// Taken by `started` and drained into the mailbox.
    rx: Option<UnboundedReceiver<String>>,
    state: AppState,
    last_heartbeat: Instant,
}

impl WsSession {
    pub fn new(
        session_id: SessionId,
        user_id: Uuid,
        user_name: String,
        rx: UnboundedReceiver<String>,
        state: AppState,
    ) -> Self {
        Self {
            session_id,
            user_id,
            user_name,
            rx: Some(rx),
            state,
            last_heartbeat: Instant::now(),
        }
    }

    fn heartbeat(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > CLIENT_TIMEOUT {
                tracing::info!(user_id = %act.user_id, "client heartbeat timed out");
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    /// Run an async handler and write whatever frames it produced for this
    /// session. Handler errors are logged, never fatal to the connection.
    fn dispatch<F>(&self, ctx: &mut ws::WebsocketContext<Self>, fut: F)
    where
        F: std::future::Future<Output = AppResult<Vec<String>>> + 'static,
    {
        let wrapped = actix::fut::wrap_future::<_, Self>(fut).map(|result, act, ctx| {
            match result {
                Ok(frames) => {
                    for frame in frames {
                        ctx.text(frame);
                    }
                }
                Err(e) => {
                    tracing::warn!(user_id = %act.user_id, error = %e, "event handler failed");
                }
            }
        });
        ctx.spawn(wrapped);
    }

    fn handle_event(&self, event: WsInboundEvent, ctx: &mut ws::WebsocketContext<Self>) {
        let state = self.state.clone();
        let session_id = self.session_id;
        let user_id = self.user_id;
        let user_name = self.user_name.clone();

        match event {
            WsInboundEvent::JoinConversation { conversation_id } => {
                self.dispatch(ctx, async move {
                    join_conversation(state, session_id, user_id, user_name, conversation_id).await
                });
            }
            WsInboundEvent::LeaveConversation { conversation_id } => {
                self.dispatch(ctx, async move {
                    leave_conversation(state, session_id, user_id, conversation_id).await
                });
            }
            WsInboundEvent::SendMessage {
                content,
                conversation_id,
                recipient_id,
            } => {
                self.dispatch(ctx, async move {
                    send_message(state, user_id, conversation_id, recipient_id, &content).await
                });
            }
            WsInboundEvent::MessageRead {
                conversation_id,
                message_id,
            } => {
                self.dispatch(ctx, async move {
                    message_read(state, session_id, user_id, conversation_id, message_id).await
                });
            }
            WsInboundEvent::Typing {
                conversation_id,
                is_typing,
            } => {
                self.dispatch(ctx, async move {
                    typing(state, session_id, user_id, user_name, conversation_id, is_typing).await
                });
            }
            WsInboundEvent::GetParticipantStatus {
                target_user_id,
                conversation_id,
            } => {
                self.dispatch(ctx, async move {
                    participant_status(state, target_user_id, conversation_id).await
                });
            }
            WsInboundEvent::UserOnlineStatus { is_online } => {
                self.dispatch(ctx, async move {
                    explicit_status(state, session_id, user_id, is_online).await
                });
            }
        }
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!(user_id = %self.user_id, "websocket connected");
        self.heartbeat(ctx);

        // Drain directory deliveries into the actor mailbox.
        if let Some(mut rx) = self.rx.take() {
            let addr = ctx.address();
            actix::spawn(async move {
                while let Some(payload) = rx.recv().await {
                    addr.do_send(OutboundFrame(payload));
                }
            });
        }

        // Mark online, auto-subscribe to every conversation the user is in
        // and announce presence to each.
        let state = self.state.clone();
        let session_id = self.session_id;
        let user_id = self.user_id;
        self.dispatch(ctx, async move {
            PresenceService::mark_connected(&state.db, user_id).await?;
            let online = WsOutboundEvent::UserOnline { user_id }.to_json();
            for conversation_id in
                ConversationService::conversation_ids_for_user(&state.db, user_id).await?
            {
                state.directory.join(session_id, conversation_id).await;
                state
                    .directory
                    .broadcast(conversation_id, &online, Some(session_id))
                    .await;
            }
            Ok(Vec::new())
        });
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        tracing::info!(user_id = %self.user_id, "websocket disconnected");

        let state = self.state.clone();
        let session_id = self.session_id;
        let user_id = self.user_id;
        actix::spawn(async move {
            let rooms = state.directory.unregister(session_id).await;

            // Another device may have taken over the user's handle; only a
            // fully disconnected user goes offline.
            if state.directory.is_user_connected(user_id).await {
                return;
            }
            if let Err(e) = PresenceService::mark_disconnected(&state.db, user_id).await {
                tracing::error!(%user_id, error = %e, "failed to mark user offline");
            }
            let offline = WsOutboundEvent::UserOffline {
                user_id,
                last_online: Some(Utc::now()),
            }
            .to_json();
            for conversation_id in rooms {
                state.directory.broadcast(conversation_id, &offline, None).await;
            }
        });
    }
}

impl Handler<OutboundFrame> for WsSession {
    type Result = ();

    fn handle(&mut self, msg: OutboundFrame, ctx: &mut Self::Context) {
        ctx.text(msg.0);
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(payload)) => {
                self.last_heartbeat = Instant::now();
                ctx.pong(&payload);
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Text(text)) => {
                self.last_heartbeat = Instant::now();
                match serde_json::from_str::<WsInboundEvent>(&text) {
                    Ok(event) => self.handle_event(event, ctx),
                    Err(e) => {
                        // Malformed frames are dropped, never fatal.
                        tracing::warn!(user_id = %self.user_id, error = %e, "unparseable frame");
                    }
                }
            }
            Ok(ws::Message::Binary(_)) => {
                tracing::warn!(user_id = %self.user_id, "binary frames are not part of the protocol");
            }
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) | Ok(ws::Message::Nop) => {}
            Err(e) => {
                tracing::warn!(user_id = %self.user_id, error = %e, "websocket protocol error");
                ctx.stop();
            }
        }
    }
}

async fn join_conversation(
    state: AppState,
    session_id: SessionId,
    user_id: Uuid,
    user_name: String,
    conversation_id: Uuid,
) -> AppResult<Vec<String>> {
    if !ConversationService::is_participant(&state.db, conversation_id, user_id).await? {
        tracing::warn!(%user_id, %conversation_id, "join refused: not a participant");
        return Ok(Vec::new());
    }

    state.directory.join(session_id, conversation_id).await;

    let joined = WsOutboundEvent::UserJoined {
        user_id,
        user_name,
        conversation_id,
    }
    .to_json();
    state
        .directory
        .broadcast(conversation_id, &joined, Some(session_id))
        .await;

    let participant_ids = ConversationService::participant_ids(&state.db, conversation_id).await?;
    let participants = PresenceService::statuses_of(&state.db, &participant_ids)
        .await?
        .into_iter()
        .map(|s| ParticipantPresence {
            user_id: s.user_id,
            user_name: s.name,
            is_online: s.is_online,
        })
        .collect();

    Ok(vec![
        WsOutboundEvent::JoinedConversation { conversation_id }.to_json(),
        WsOutboundEvent::ConversationParticipantsStatus {
            conversation_id,
            participants,
        }
        .to_json(),
    ])
}

async fn leave_conversation(
    state: AppState,
    session_id: SessionId,
    user_id: Uuid,
    conversation_id: Uuid,
) -> AppResult<Vec<String>> {
    state.directory.leave(session_id, conversation_id).await;

    let left = WsOutboundEvent::UserLeft {
        user_id,
        conversation_id,
    }
    .to_json();
    state.directory.broadcast(conversation_id, &left, None).await;

    Ok(vec![
        WsOutboundEvent::LeftConversation { conversation_id }.to_json(),
    ])
}

async fn send_message(
    state: AppState,
    user_id: Uuid,
    conversation_id: Option<Uuid>,
    recipient_id: Option<Uuid>,
    content: &str,
) -> AppResult<Vec<String>> {
    let delivery =
        match MessageService::send(&state.db, user_id, conversation_id, recipient_id, content)
            .await
        {
            Ok(delivery) => delivery,
            // Send failures go back to the sender only; the room never
            // hears about them.
            Err(e) => {
                return Ok(vec![WsOutboundEvent::MessageError {
                    error: e.to_string(),
                }
                .to_json()]);
            }
        };

    if delivery.created {
        if let Some(view) =
            ConversationService::get_view(&state.db, delivery.conversation_id).await?
        {
            let announce = WsOutboundEvent::NewConversationCreated(view.clone()).to_json();
            for participant_id in view.participant_ids() {
                state
                    .directory
                    .join_user(participant_id, delivery.conversation_id)
                    .await;
                state.directory.send_to_user(participant_id, &announce).await;
            }
        }
    }

    let frame = WsOutboundEvent::NewMessage(delivery.message).to_json();
    state
        .directory
        .broadcast(delivery.conversation_id, &frame, None)
        .await;

    Ok(Vec::new())
}

async fn message_read(
    state: AppState,
    session_id: SessionId,
    user_id: Uuid,
    conversation_id: Uuid,
    message_id: Uuid,
) -> AppResult<Vec<String>> {
    let Some(view) = MessageService::mark_read(&state.db, user_id, conversation_id, message_id)
        .await?
    else {
        return Ok(Vec::new());
    };

    let frame = WsOutboundEvent::MessageRead { conversation: view }.to_json();
    // The reader gets the refreshed state directly; the rest of the room via
    // broadcast.
    state
        .directory
        .broadcast(conversation_id, &frame, Some(session_id))
        .await;
    Ok(vec![frame])
}

async fn typing(
    state: AppState,
    session_id: SessionId,
    user_id: Uuid,
    user_name: String,
    conversation_id: Uuid,
    is_typing: bool,
) -> AppResult<Vec<String>> {
    let frame = WsOutboundEvent::UserTyping {
        user_id,
        user_name,
        conversation_id,
        is_typing,
    }
    .to_json();
    state
        .directory
        .broadcast(conversation_id, &frame, Some(session_id))
        .await;
    Ok(Vec::new())
}

async fn participant_status(
    state: AppState,
    target_user_id: Uuid,
    conversation_id: Uuid,
) -> AppResult<Vec<String>> {
    let status = PresenceService::query_status(&state.db, target_user_id).await?;
    Ok(vec![WsOutboundEvent::ParticipantStatus {
        user_id: status.user_id,
        user_name: status.name,
        is_online: status.is_online,
        conversation_id,
    }
    .to_json()])
}

async fn explicit_status(
    state: AppState,
    session_id: SessionId,
    user_id: Uuid,
    is_online: bool,
) -> AppResult<Vec<String>> {
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
        state
            .directory
            .broadcast(conversation_id, &frame, Some(session_id))
            .await;
    }
    Ok(Vec::new())
}
