//! Wire-format checks for the WebSocket protocol: the JSON tags and field
//! names clients depend on must never drift.

use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use cadence_backend::models::{ConversationView, MessageView, UserSummary};
use cadence_backend::websocket::events::WsOutboundEvent;
use cadence_backend::websocket::message_types::WsInboundEvent;

fn summary(name: &str) -> UserSummary {
    UserSummary {
        id: Uuid::new_v4(),
        name: name.to_string(),
        email: format!("{}@example.com", name.to_lowercase()),
        profile_image_url: None,
    }
}

#[test]
fn inbound_event_tags_round_trip() {
    let conversation_id = Uuid::new_v4();
    let frames = [
        json!({ "type": "joinConversation", "conversationId": conversation_id }),
        json!({ "type": "leaveConversation", "conversationId": conversation_id }),
        json!({ "type": "sendMessage", "content": "hi", "conversationId": conversation_id }),
        json!({
            "type": "messageRead",
            "conversationId": conversation_id,
            "messageId": Uuid::new_v4(),
        }),
        json!({ "type": "typing", "conversationId": conversation_id, "isTyping": false }),
        json!({
            "type": "getParticipantStatus",
            "targetUserId": Uuid::new_v4(),
            "conversationId": conversation_id,
        }),
        json!({ "type": "userOnlineStatus", "isOnline": true }),
    ];

    for frame in frames {
        let raw = frame.to_string();
        assert!(
            serde_json::from_str::<WsInboundEvent>(&raw).is_ok(),
            "failed to parse: {raw}"
        );
    }
}

#[test]
fn send_message_requires_content() {
    let raw = json!({ "type": "sendMessage", "conversationId": Uuid::new_v4() }).to_string();
    assert!(serde_json::from_str::<WsInboundEvent>(&raw).is_err());
}

#[test]
fn new_message_event_carries_the_populated_view() {
    let sender = summary("Ada");
    let reader = Uuid::new_v4();
    let event = WsOutboundEvent::NewMessage(MessageView {
        id: Uuid::new_v4(),
        conversation_id: Uuid::new_v4(),
        content: "hello there".into(),
        timestamp: Utc::now(),
        sender: Some(sender.clone()),
        read_by: vec![sender.id, reader],
    });

    let parsed: Value = serde_json::from_str(&event.to_json()).unwrap();
    assert_eq!(parsed["type"], "newMessage");
    assert_eq!(parsed["content"], "hello there");
    assert_eq!(parsed["sender"]["name"], "Ada");
    assert_eq!(parsed["readBy"].as_array().unwrap().len(), 2);
    assert!(parsed["conversationId"].is_string());
}

#[test]
fn conversation_events_hide_group_fields_for_direct_threads() {
    let now = Utc::now();
    let event = WsOutboundEvent::NewConversationCreated(ConversationView {
        id: Uuid::new_v4(),
        participants: vec![summary("Ada"), summary("Grace")],
        is_group_chat: false,
        group_name: None,
        group_admin: None,
        group_image_url: None,
        last_message: None,
        created_at: now,
        updated_at: now,
    });

    let parsed: Value = serde_json::from_str(&event.to_json()).unwrap();
    assert_eq!(parsed["type"], "newConversationCreated");
    assert_eq!(parsed["isGroupChat"], false);
    assert_eq!(parsed["participants"].as_array().unwrap().len(), 2);
    assert!(parsed.get("groupName").is_none());
    assert!(parsed.get("groupAdmin").is_none());
}

#[test]
fn group_events_use_the_expected_tags() {
    let conversation_id = Uuid::new_v4();
    for (event, tag) in [
        (
            WsOutboundEvent::RemovedFromGroup { conversation_id },
            "removedFromGroup",
        ),
        (WsOutboundEvent::LeftGroup { conversation_id }, "leftGroup"),
        (
            WsOutboundEvent::GroupDeleted { conversation_id },
            "groupDeleted",
        ),
    ] {
        let parsed: Value = serde_json::from_str(&event.to_json()).unwrap();
        assert_eq!(parsed["type"], tag);
        assert!(parsed["conversationId"].is_string());
    }
}

#[test]
fn presence_events_carry_last_online_only_when_offline() {
    let user_id = Uuid::new_v4();

    let online: Value =
        serde_json::from_str(&WsOutboundEvent::UserOnline { user_id }.to_json()).unwrap();
    assert_eq!(online["type"], "userOnline");

    let offline: Value = serde_json::from_str(
        &WsOutboundEvent::UserOffline {
            user_id,
            last_online: Some(Utc::now()),
        }
        .to_json(),
    )
    .unwrap();
    assert_eq!(offline["type"], "userOffline");
    assert!(offline["lastOnline"].is_string());
}

#[test]
fn connection_events_carry_user_profiles() {
    let from = summary("Ada");
    let parsed: Value = serde_json::from_str(
        &WsOutboundEvent::ConnectionRequest { from: from.clone() }.to_json(),
    )
    .unwrap();
    assert_eq!(parsed["type"], "connectionRequest");
    assert_eq!(parsed["from"]["email"], from.email);

    let rejected: Value = serde_json::from_str(
        &WsOutboundEvent::ConnectionRejected {
            user_id: Uuid::new_v4(),
        }
        .to_json(),
    )
    .unwrap();
    assert_eq!(rejected["type"], "connectionRejected");
}
