use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{ConversationRow, ConversationView, LastMessage, MessageRow, MessageView, UserSummary};

/// Outcome of resolving a direct-message target.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedConversation {
    pub id: Uuid,
    /// True when this send created the conversation, so the caller can
    /// notify both sides of the brand-new thread.
    pub created: bool,
}

const DEFAULT_PAGE_SIZE: i64 = 30;
const MAX_PAGE_SIZE: i64 = 100;

/// Conversation Store + Resolver + group lifecycle.
pub struct ConversationService;

impl ConversationService {
    /// Canonical key for a direct pair: sorted "min:max". The partial
    /// unique index on this key is what makes direct conversations unique
    /// per unordered pair.
    pub fn direct_key(a: Uuid, b: Uuid) -> String {
        let (lo, hi) = if a < b { (a, b) } else { (b, a) };
        format!("{lo}:{hi}")
    }

    pub async fn is_participant(
        db: &Pool<Postgres>,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<bool> {
        let row = sqlx::query_scalar::<_, i32>(
            "SELECT 1 FROM conversation_participants WHERE conversation_id = $1 AND user_id = $2 LIMIT 1",
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_optional(db)
        .await?;
        Ok(row.is_some())
    }

    pub async fn participant_ids(
        db: &Pool<Postgres>,
        conversation_id: Uuid,
    ) -> AppResult<Vec<Uuid>> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT user_id FROM conversation_participants WHERE conversation_id = $1 ORDER BY joined_at",
        )
        .bind(conversation_id)
        .fetch_all(db)
        .await?;
        Ok(ids)
    }

    /// Conversation ids a user participates in, used to auto-join rooms on
    /// connect.
    pub async fn conversation_ids_for_user(
        db: &Pool<Postgres>,
        user_id: Uuid,
    ) -> AppResult<Vec<Uuid>> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT conversation_id FROM conversation_participants WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_all(db)
        .await?;
        Ok(ids)
    }

    pub async fn get_row(
        db: &Pool<Postgres>,
        conversation_id: Uuid,
    ) -> AppResult<Option<ConversationRow>> {
        let row = sqlx::query_as::<_, ConversationRow>(
            "SELECT id, is_group, group_name, group_admin, group_image_url, \
                    last_message_sender_id, last_message_content, last_message_at, \
                    created_at, updated_at \
             FROM conversations WHERE id = $1",
        )
        .bind(conversation_id)
        .fetch_optional(db)
        .await?;
        Ok(row)
    }

    async fn find_direct(db: &Pool<Postgres>, a: Uuid, b: Uuid) -> AppResult<Option<Uuid>> {
        let id = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM conversations WHERE direct_key = $1 AND NOT is_group",
        )
        .bind(Self::direct_key(a, b))
        .fetch_optional(db)
        .await?;
        Ok(id)
    }

    /// Resolve-or-create for a direct pair. Lookup first; on miss, insert
    /// guarded by the unique direct_key index. Losing the insert race means
    /// another process created the thread between our lookup and insert:
    /// re-select the winner and append there.
    pub async fn resolve_direct(
        db: &Pool<Postgres>,
        sender_id: Uuid,
        recipient_id: Uuid,
    ) -> AppResult<ResolvedConversation> {
        if sender_id == recipient_id {
            return Err(AppError::BadRequest(
                "Cannot start a conversation with yourself".into(),
            ));
        }

        if let Some(id) = Self::find_direct(db, sender_id, recipient_id).await? {
            return Ok(ResolvedConversation { id, created: false });
        }

        let mut tx = db.begin().await?;
        let inserted = sqlx::query_scalar::<_, Uuid>(
            "INSERT INTO conversations (is_group, direct_key) VALUES (FALSE, $1) \
             ON CONFLICT (direct_key) WHERE NOT is_group DO NOTHING \
             RETURNING id",
        )
        .bind(Self::direct_key(sender_id, recipient_id))
        .fetch_optional(&mut *tx)
        .await?;

        match inserted {
            Some(id) => {
                sqlx::query(
                    "INSERT INTO conversation_participants (conversation_id, user_id) \
                     VALUES ($1, $2), ($1, $3)",
                )
                .bind(id)
                .bind(sender_id)
                .bind(recipient_id)
                .execute(&mut *tx)
                .await?;
                tx.commit().await?;
                Ok(ResolvedConversation { id, created: true })
            }
            None => {
                tx.rollback().await?;
                let id = Self::find_direct(db, sender_id, recipient_id)
                    .await?
                    .ok_or(AppError::Internal)?;
                Ok(ResolvedConversation { id, created: false })
            }
        }
    }

    async fn summaries_by_id(
        db: &Pool<Postgres>,
        user_ids: &[Uuid],
    ) -> AppResult<HashMap<Uuid, UserSummary>> {
        if user_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = sqlx::query_as::<_, UserSummary>(
            "SELECT id, name, email, profile_image_url FROM users WHERE id = ANY($1)",
        )
        .bind(user_ids)
        .fetch_all(db)
        .await?;
        Ok(rows.into_iter().map(|u| (u.id, u)).collect())
    }

    async fn compose_view(
        db: &Pool<Postgres>,
        row: ConversationRow,
    ) -> AppResult<ConversationView> {
        let participants = sqlx::query_as::<_, UserSummary>(
            "SELECT u.id, u.name, u.email, u.profile_image_url \
             FROM conversation_participants cp JOIN users u ON u.id = cp.user_id \
             WHERE cp.conversation_id = $1 ORDER BY cp.joined_at",
        )
        .bind(row.id)
        .fetch_all(db)
        .await?;

        let find = |id: Uuid| participants.iter().find(|p| p.id == id).cloned();

        let group_admin = match row.group_admin {
            Some(admin_id) => match find(admin_id) {
                Some(summary) => Some(summary),
                // Admin may no longer be in the participant list only for
                // rows mid-deletion; fall back to a direct lookup.
                None => {
                    crate::services::PresenceService::user_summary(db, admin_id).await?
                }
            },
            None => None,
        };

        let last_message = match (&row.last_message_content, row.last_message_at) {
            (Some(content), Some(timestamp)) => Some(LastMessage {
                sender: row.last_message_sender_id.and_then(find),
                content: content.clone(),
                timestamp,
            }),
            _ => None,
        };

        Ok(ConversationView {
            id: row.id,
            participants,
            is_group_chat: row.is_group,
            group_name: row.group_name,
            group_admin,
            group_image_url: row.group_image_url,
            last_message,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }

    /// Populated view of one conversation. `None` when the id does not
    /// resolve.
    pub async fn get_view(
        db: &Pool<Postgres>,
        conversation_id: Uuid,
    ) -> AppResult<Option<ConversationView>> {
        match Self::get_row(db, conversation_id).await? {
            Some(row) => Ok(Some(Self::compose_view(db, row).await?)),
            None => Ok(None),
        }
    }

    /// All conversations for a user, most recent activity first.
    pub async fn list_for_user(
        db: &Pool<Postgres>,
        user_id: Uuid,
    ) -> AppResult<Vec<ConversationView>> {
        let rows = sqlx::query_as::<_, ConversationRow>(
            "SELECT c.id, c.is_group, c.group_name, c.group_admin, c.group_image_url, \
                    c.last_message_sender_id, c.last_message_content, c.last_message_at, \
                    c.created_at, c.updated_at \
             FROM conversations c \
             JOIN conversation_participants cp ON cp.conversation_id = c.id \
             WHERE cp.user_id = $1 \
             ORDER BY c.last_message_at DESC NULLS LAST, c.updated_at DESC",
        )
        .bind(user_id)
        .fetch_all(db)
        .await?;

        let mut views = Vec::with_capacity(rows.len());
        for row in rows {
            views.push(Self::compose_view(db, row).await?);
        }
        Ok(views)
    }

    /// Reverse-chronological page of messages before the cursor, re-sorted
    /// ascending for the client. An unknown cursor is ignored (newest page).
    pub async fn get_messages(
        db: &Pool<Postgres>,
        conversation_id: Uuid,
        limit: Option<i64>,
        before_message_id: Option<Uuid>,
    ) -> AppResult<Vec<MessageView>> {
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);

        let cursor: Option<(DateTime<Utc>, Uuid)> = match before_message_id {
            Some(id) => sqlx::query_scalar::<_, DateTime<Utc>>(
                "SELECT created_at FROM messages WHERE id = $1 AND conversation_id = $2",
            )
            .bind(id)
            .bind(conversation_id)
            .fetch_optional(db)
            .await?
            .map(|ts| (ts, id)),
            None => None,
        };

        let mut rows: Vec<MessageRow> = match cursor {
            Some((ts, id)) => {
                sqlx::query_as::<_, MessageRow>(
                    "SELECT id, conversation_id, sender_id, content, created_at \
                     FROM messages \
                     WHERE conversation_id = $1 AND (created_at, id) < ($2, $3) \
                     ORDER BY created_at DESC, id DESC LIMIT $4",
                )
                .bind(conversation_id)
                .bind(ts)
                .bind(id)
                .bind(limit)
                .fetch_all(db)
                .await?
            }
            None => {
                sqlx::query_as::<_, MessageRow>(
                    "SELECT id, conversation_id, sender_id, content, created_at \
                     FROM messages WHERE conversation_id = $1 \
                     ORDER BY created_at DESC, id DESC LIMIT $2",
                )
                .bind(conversation_id)
                .bind(limit)
                .fetch_all(db)
                .await?
            }
        };

        // Sliced newest-first; clients consume ascending.
        rows.reverse();
        Self::populate_messages(db, rows).await
    }

    async fn populate_messages(
        db: &Pool<Postgres>,
        rows: Vec<MessageRow>,
    ) -> AppResult<Vec<MessageView>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let sender_ids: Vec<Uuid> = rows.iter().map(|m| m.sender_id).collect();
        let senders = Self::summaries_by_id(db, &sender_ids).await?;

        let message_ids: Vec<Uuid> = rows.iter().map(|m| m.id).collect();
        let read_rows: Vec<(Uuid, Uuid)> = sqlx::query_as(
            "SELECT message_id, user_id FROM message_reads WHERE message_id = ANY($1)",
        )
        .bind(&message_ids)
        .fetch_all(db)
        .await?;

        let mut read_by: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
        for (message_id, user_id) in read_rows {
            read_by.entry(message_id).or_default().push(user_id);
        }

        Ok(rows
            .into_iter()
            .map(|m| MessageView {
                id: m.id,
                conversation_id: m.conversation_id,
                content: m.content,
                timestamp: m.created_at,
                sender: senders.get(&m.sender_id).cloned(),
                read_by: read_by.remove(&m.id).unwrap_or_default(),
            })
            .collect())
    }

    /// Create a group conversation; the creator becomes admin and is always
    /// a participant.
    pub async fn create_group(
        db: &Pool<Postgres>,
        admin_id: Uuid,
        participant_ids: &[Uuid],
        group_name: &str,
    ) -> AppResult<Uuid> {
        let group_name = group_name.trim();
        if group_name.is_empty() {
            return Err(AppError::BadRequest(
                "Participant IDs (as an array) and group name are required".into(),
            ));
        }

        let mut all_participants = vec![admin_id];
        for id in participant_ids {
            if !all_participants.contains(id) {
                all_participants.push(*id);
            }
        }
        if all_participants.len() < 2 {
            return Err(AppError::BadRequest(
                "A group chat must have at least two unique participants".into(),
            ));
        }

        let existing: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE id = ANY($1)")
                .bind(&all_participants)
                .fetch_one(db)
                .await?;
        if existing != all_participants.len() as i64 {
            return Err(AppError::BadRequest(
                "One or more specified participant IDs are invalid or do not exist".into(),
            ));
        }

        let mut tx = db.begin().await?;
        let conversation_id = sqlx::query_scalar::<_, Uuid>(
            "INSERT INTO conversations (is_group, group_name, group_admin) \
             VALUES (TRUE, $1, $2) RETURNING id",
        )
        .bind(group_name)
        .bind(admin_id)
        .fetch_one(&mut *tx)
        .await?;

        for user_id in &all_participants {
            sqlx::query(
                "INSERT INTO conversation_participants (conversation_id, user_id) VALUES ($1, $2)",
            )
            .bind(conversation_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(conversation_id)
    }

    async fn get_group_row(
        db: &Pool<Postgres>,
        conversation_id: Uuid,
    ) -> AppResult<ConversationRow> {
        let row = Self::get_row(db, conversation_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Group not found".into()))?;
        if !row.is_group {
            return Err(AppError::BadRequest(
                "This is not a group conversation".into(),
            ));
        }
        Ok(row)
    }

    pub async fn add_member(
        db: &Pool<Postgres>,
        conversation_id: Uuid,
        user_id: Uuid,
        requester_id: Uuid,
    ) -> AppResult<()> {
        let row = Self::get_group_row(db, conversation_id).await?;
        if row.group_admin != Some(requester_id) {
            return Err(AppError::Forbidden("Only group admin can add members".into()));
        }

        let user_exists: Option<i32> = sqlx::query_scalar("SELECT 1 FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(db)
            .await?;
        if user_exists.is_none() {
            return Err(AppError::NotFound("User not found".into()));
        }

        if Self::is_participant(db, conversation_id, user_id).await? {
            return Err(AppError::BadRequest(
                "User is already a member of this group".into(),
            ));
        }

        let mut tx = db.begin().await?;
        sqlx::query(
            "INSERT INTO conversation_participants (conversation_id, user_id) VALUES ($1, $2)",
        )
        .bind(conversation_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
        sqlx::query("UPDATE conversations SET updated_at = NOW() WHERE id = $1")
            .bind(conversation_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn remove_member(
        db: &Pool<Postgres>,
        conversation_id: Uuid,
        user_id: Uuid,
        requester_id: Uuid,
    ) -> AppResult<()> {
        let row = Self::get_group_row(db, conversation_id).await?;
        if row.group_admin != Some(requester_id) {
            return Err(AppError::Forbidden(
                "Only group admin can remove members".into(),
            ));
        }
        if row.group_admin == Some(user_id) {
            return Err(AppError::BadRequest(
                "Admin cannot be removed from the group".into(),
            ));
        }
        if !Self::is_participant(db, conversation_id, user_id).await? {
            return Err(AppError::BadRequest(
                "User is not a member of this group".into(),
            ));
        }

        let mut tx = db.begin().await?;
        sqlx::query(
            "DELETE FROM conversation_participants WHERE conversation_id = $1 AND user_id = $2",
        )
        .bind(conversation_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
        sqlx::query("UPDATE conversations SET updated_at = NOW() WHERE id = $1")
            .bind(conversation_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Any non-admin participant may leave. The admin must delete the group
    /// instead; this is a product rule, not a technical constraint.
    pub async fn leave_group(
        db: &Pool<Postgres>,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<()> {
        let row = Self::get_group_row(db, conversation_id).await?;
        if !Self::is_participant(db, conversation_id, user_id).await? {
            return Err(AppError::BadRequest(
                "You are not a member of this group".into(),
            ));
        }
        if row.group_admin == Some(user_id) {
            return Err(AppError::BadRequest(
                "As the admin, you should delete the group instead of leaving".into(),
            ));
        }

        let mut tx = db.begin().await?;
        sqlx::query(
            "DELETE FROM conversation_participants WHERE conversation_id = $1 AND user_id = $2",
        )
        .bind(conversation_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
        sqlx::query("UPDATE conversations SET updated_at = NOW() WHERE id = $1")
            .bind(conversation_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Delete a group (admin only). Returns the participant set as it was
    /// before deletion so the caller can notify everyone.
    pub async fn delete_group(
        db: &Pool<Postgres>,
        conversation_id: Uuid,
        requester_id: Uuid,
    ) -> AppResult<Vec<Uuid>> {
        let row = Self::get_group_row(db, conversation_id).await?;
        if row.group_admin != Some(requester_id) {
            return Err(AppError::Forbidden(
                "Only group admin can delete the group".into(),
            ));
        }

        let participants = Self::participant_ids(db, conversation_id).await?;
        sqlx::query("DELETE FROM conversations WHERE id = $1")
            .bind(conversation_id)
            .execute(db)
            .await?;
        Ok(participants)
    }

    pub async fn update_group_image(
        db: &Pool<Postgres>,
        conversation_id: Uuid,
        requester_id: Uuid,
        image_url: &str,
    ) -> AppResult<()> {
        let row = Self::get_group_row(db, conversation_id).await?;
        if row.group_admin != Some(requester_id) {
            return Err(AppError::Forbidden(
                "Only group admin can update group image".into(),
            ));
        }

        sqlx::query(
            "UPDATE conversations SET group_image_url = $1, updated_at = NOW() WHERE id = $2",
        )
        .bind(image_url)
        .bind(conversation_id)
        .execute(db)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_key_is_order_independent() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(
            ConversationService::direct_key(a, b),
            ConversationService::direct_key(b, a)
        );
    }

    #[test]
    fn direct_key_sorts_the_pair() {
        let a = Uuid::parse_str("00000000-0000-0000-0000-000000000001").unwrap();
        let b = Uuid::parse_str("00000000-0000-0000-0000-000000000002").unwrap();
        assert_eq!(
            ConversationService::direct_key(b, a),
            format!("{a}:{b}")
        );
    }
}
