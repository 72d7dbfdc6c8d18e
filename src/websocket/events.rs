//! Outbound WebSocket event protocol.
//!
//! One variant per event name the clients know about. Serialization is
//! centralized here: handlers build a variant and call `to_json()`, no
//! manual JSON construction at call sites.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{ConversationView, MessageView, UserSummary};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantPresence {
    pub user_id: Uuid,
    pub user_name: String,
    pub is_online: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WsOutboundEvent {
    // Room lifecycle
    #[serde(rename_all = "camelCase")]
    JoinedConversation { conversation_id: Uuid },

    #[serde(rename_all = "camelCase")]
    UserJoined {
        user_id: Uuid,
        user_name: String,
        conversation_id: Uuid,
    },

    #[serde(rename_all = "camelCase")]
    ConversationParticipantsStatus {
        conversation_id: Uuid,
        participants: Vec<ParticipantPresence>,
    },

    #[serde(rename_all = "camelCase")]
    LeftConversation { conversation_id: Uuid },

    #[serde(rename_all = "camelCase")]
    UserLeft {
        user_id: Uuid,
        conversation_id: Uuid,
    },

    // Messaging
    NewMessage(MessageView),

    NewConversationCreated(ConversationView),

    #[serde(rename_all = "camelCase")]
    MessageError { error: String },

    #[serde(rename_all = "camelCase")]
    MessageRead { conversation: ConversationView },

    #[serde(rename_all = "camelCase")]
    UserTyping {
        user_id: Uuid,
        user_name: String,
        conversation_id: Uuid,
        is_typing: bool,
    },

    // Presence
    #[serde(rename_all = "camelCase")]
    ParticipantStatus {
        user_id: Uuid,
        user_name: String,
        is_online: bool,
        conversation_id: Uuid,
    },

    #[serde(rename_all = "camelCase")]
    UserOnline { user_id: Uuid },

    #[serde(rename_all = "camelCase")]
    UserOffline {
        user_id: Uuid,
        last_online: Option<DateTime<Utc>>,
    },

    // Group lifecycle (delivered on participants' personal channels)
    NewGroupConversation(ConversationView),

    GroupUpdated(ConversationView),

    AddedToGroup(ConversationView),

    #[serde(rename_all = "camelCase")]
    RemovedFromGroup { conversation_id: Uuid },

    #[serde(rename_all = "camelCase")]
    LeftGroup { conversation_id: Uuid },

    #[serde(rename_all = "camelCase")]
    GroupDeleted { conversation_id: Uuid },

    // Contacts
    #[serde(rename_all = "camelCase")]
    ConnectionRequest { from: UserSummary },

    #[serde(rename_all = "camelCase")]
    ConnectionAccepted { user: UserSummary },

    #[serde(rename_all = "camelCase")]
    ConnectionRejected { user_id: Uuid },
}

impl WsOutboundEvent {
    /// Serialize for broadcast. Events are plain data; serialization can
    /// only fail on malformed float/map content, which these variants
    /// cannot contain, so a failure is logged and an empty object sent.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::error!(error = %e, "failed to serialize outbound event");
            "{}".to_string()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_tags_match_the_client_wire_names() {
        let evt = WsOutboundEvent::JoinedConversation {
            conversation_id: Uuid::new_v4(),
        };
        let parsed: serde_json::Value = serde_json::from_str(&evt.to_json()).unwrap();
        assert_eq!(parsed["type"], "joinedConversation");
        assert!(parsed["conversationId"].is_string());
    }

    #[test]
    fn user_typing_carries_camel_case_fields() {
        let evt = WsOutboundEvent::UserTyping {
            user_id: Uuid::new_v4(),
            user_name: "Ada".into(),
            conversation_id: Uuid::new_v4(),
            is_typing: true,
        };
        let parsed: serde_json::Value = serde_json::from_str(&evt.to_json()).unwrap();
        assert_eq!(parsed["type"], "userTyping");
        assert_eq!(parsed["userName"], "Ada");
        assert_eq!(parsed["isTyping"], true);
    }

    #[test]
    fn new_message_flattens_the_message_fields() {
        let evt = WsOutboundEvent::NewMessage(MessageView {
            id: Uuid::new_v4(),
            conversation_id: Uuid::new_v4(),
            content: "hello".into(),
            timestamp: Utc::now(),
            sender: None,
            read_by: vec![],
        });
        let parsed: serde_json::Value = serde_json::from_str(&evt.to_json()).unwrap();
        assert_eq!(parsed["type"], "newMessage");
        assert_eq!(parsed["content"], "hello");
        assert!(parsed["readBy"].is_array());
    }
}
