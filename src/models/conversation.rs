use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::user::UserSummary;

#[derive(Debug, Clone, FromRow)]
pub struct ConversationRow {
    pub id: Uuid,
    pub is_group: bool,
    pub group_name: Option<String>,
    pub group_admin: Option<Uuid>,
    pub group_image_url: Option<String>,
    pub last_message_sender_id: Option<Uuid>,
    pub last_message_content: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Denormalized cache of the most recent message, kept on the conversation
/// so list views render without scanning the log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastMessage {
    pub sender: Option<UserSummary>,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Populated conversation as sent to clients, participants included.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationView {
    pub id: Uuid,
    pub participants: Vec<UserSummary>,
    pub is_group_chat: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_admin: Option<UserSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_image_url: Option<String>,
    pub last_message: Option<LastMessage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConversationView {
    pub fn participant_ids(&self) -> Vec<Uuid> {
        self.participants.iter().map(|p| p.id).collect()
    }
}
