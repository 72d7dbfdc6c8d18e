use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Full user record as stored. Presence fields are mutated only by
/// connect/disconnect/explicit-status events, never by message traffic.
#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub profile_image_url: Option<String>,
    pub is_online: bool,
    pub last_online: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Public projection embedded in conversation and message payloads.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub profile_image_url: Option<String>,
}

impl From<&UserRow> for UserSummary {
    fn from(row: &UserRow) -> Self {
        UserSummary {
            id: row.id,
            name: row.name.clone(),
            email: row.email.clone(),
            profile_image_url: row.profile_image_url.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceStatus {
    pub user_id: Uuid,
    pub name: String,
    pub is_online: bool,
    pub last_online: Option<DateTime<Utc>>,
}
