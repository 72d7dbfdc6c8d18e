use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Inbound events from client to server. Closed protocol: one variant per
/// event name, fixed required fields, validated by serde at the boundary
/// before any dispatch. Unknown or malformed frames are dropped with a
/// warning; they never sever the connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum WsInboundEvent {
    #[serde(rename_all = "camelCase")]
    JoinConversation { conversation_id: Uuid },

    #[serde(rename_all = "camelCase")]
    LeaveConversation { conversation_id: Uuid },

    /// Either `conversationId` (append to an existing thread) or
    /// `recipientId` (direct send, resolving or creating the thread).
    #[serde(rename_all = "camelCase")]
    SendMessage {
        content: String,
        #[serde(default)]
        conversation_id: Option<Uuid>,
        #[serde(default)]
        recipient_id: Option<Uuid>,
    },

    #[serde(rename_all = "camelCase")]
    MessageRead {
        conversation_id: Uuid,
        message_id: Uuid,
    },

    #[serde(rename_all = "camelCase")]
    Typing {
        conversation_id: Uuid,
        is_typing: bool,
    },

    #[serde(rename_all = "camelCase")]
    GetParticipantStatus {
        target_user_id: Uuid,
        conversation_id: Uuid,
    },

    #[serde(rename_all = "camelCase")]
    UserOnlineStatus { is_online: bool },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_message_accepts_recipient_only_form() {
        let raw = r#"{"type":"sendMessage","content":"hi","recipientId":"7f0c0b84-8a2f-4f7e-9b38-5af4ad5a1001"}"#;
        let evt: WsInboundEvent = serde_json::from_str(raw).unwrap();
        match evt {
            WsInboundEvent::SendMessage {
                content,
                conversation_id,
                recipient_id,
            } => {
                assert_eq!(content, "hi");
                assert!(conversation_id.is_none());
                assert!(recipient_id.is_some());
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn typing_uses_camel_case_wire_names() {
        let conversation_id = Uuid::new_v4();
        let raw = format!(
            r#"{{"type":"typing","conversationId":"{conversation_id}","isTyping":true}}"#
        );
        let evt: WsInboundEvent = serde_json::from_str(&raw).unwrap();
        assert!(matches!(
            evt,
            WsInboundEvent::Typing { is_typing: true, .. }
        ));
    }

    #[test]
    fn unknown_event_type_is_rejected() {
        let raw = r#"{"type":"launchMissiles"}"#;
        assert!(serde_json::from_str::<WsInboundEvent>(raw).is_err());
    }
}
