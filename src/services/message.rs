use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{ConversationView, MessageView};
use crate::services::{ConversationService, PresenceService};

/// What a successful send produced, enough for the caller to route the
/// realtime fanout.
#[derive(Debug)]
pub struct DeliveryResult {
    pub conversation_id: Uuid,
    /// The send created a brand-new direct conversation.
    pub created: bool,
    pub message: MessageView,
}

/// Message Log: append, populate, mark-read.
pub struct MessageService;

impl MessageService {
    /// Append a message. Targets either an existing conversation by id or a
    /// recipient (resolving/creating the direct conversation). The insert,
    /// the sender's own read receipt and the conversation's last-message
    /// cache move in one transaction.
    pub async fn send(
        db: &Pool<Postgres>,
        sender_id: Uuid,
        conversation_id: Option<Uuid>,
        recipient_id: Option<Uuid>,
        content: &str,
    ) -> AppResult<DeliveryResult> {
        let content = content.trim();
        if content.is_empty() {
            return Err(AppError::BadRequest("Message content cannot be empty".into()));
        }

        let (conversation_id, created) = match (conversation_id, recipient_id) {
            (Some(cid), _) => {
                let row = ConversationService::get_row(db, cid)
                    .await?
                    .ok_or_else(|| AppError::NotFound("Conversation not found".into()))?;
                if !ConversationService::is_participant(db, row.id, sender_id).await? {
                    return Err(AppError::Forbidden(
                        "You are not a participant in this conversation".into(),
                    ));
                }
                (row.id, false)
            }
            (None, Some(rid)) => {
                if PresenceService::fetch_user(db, rid).await?.is_none() {
                    return Err(AppError::NotFound("Recipient not found".into()));
                }
                let resolved = ConversationService::resolve_direct(db, sender_id, rid).await?;
                (resolved.id, resolved.created)
            }
            (None, None) => {
                return Err(AppError::BadRequest(
                    "Either conversationId or recipientId is required".into(),
                ));
            }
        };

        let mut tx = db.begin().await?;
        let (message_id, created_at): (Uuid, chrono::DateTime<chrono::Utc>) = sqlx::query_as(
            "INSERT INTO messages (conversation_id, sender_id, content) \
             VALUES ($1, $2, $3) RETURNING id, created_at",
        )
        .bind(conversation_id)
        .bind(sender_id)
        .bind(content)
        .fetch_one(&mut *tx)
        .await?;

        // Sender has read their own message from the start.
        sqlx::query("INSERT INTO message_reads (message_id, user_id) VALUES ($1, $2)")
            .bind(message_id)
            .bind(sender_id)
            .execute(&mut *tx)
            .await?;

        Self::refresh_last_message(&mut *tx, conversation_id, sender_id, content, created_at)
            .await?;
        tx.commit().await?;

        let sender = PresenceService::user_summary(db, sender_id).await?;
        let message = MessageView {
            id: message_id,
            conversation_id,
            content: content.to_owned(),
            timestamp: created_at,
            sender,
            read_by: vec![sender_id],
        };

        Ok(DeliveryResult {
            conversation_id,
            created,
            message,
        })
    }

    /// Newer-wins refresh of the conversation's last-message cache.
    /// Concurrent sends can commit out of timestamp order; an older message
    /// must never clobber a newer cache entry.
    pub async fn refresh_last_message<'e, E>(
        executor: E,
        conversation_id: Uuid,
        sender_id: Uuid,
        content: &str,
        sent_at: chrono::DateTime<chrono::Utc>,
    ) -> AppResult<()>
    where
        E: sqlx::PgExecutor<'e>,
    {
        sqlx::query(
            "UPDATE conversations SET last_message_sender_id = $1, last_message_content = $2, \
             last_message_at = $3, updated_at = NOW() \
             WHERE id = $4 AND (last_message_at IS NULL OR last_message_at <= $3)",
        )
        .bind(sender_id)
        .bind(content)
        .bind(sent_at)
        .bind(conversation_id)
        .execute(executor)
        .await?;
        Ok(())
    }

    /// Record that `user_id` has read `message_id`. Best-effort: a missing
    /// conversation or message is logged and swallowed rather than surfaced,
    /// since read receipts race with deletions. Re-reading a message is a
    /// no-op for storage but still returns the refreshed view so the caller
    /// re-broadcasts current read state.
    pub async fn mark_read(
        db: &Pool<Postgres>,
        user_id: Uuid,
        conversation_id: Uuid,
        message_id: Uuid,
    ) -> AppResult<Option<ConversationView>> {
        let belongs: Option<i32> = sqlx::query_scalar(
            "SELECT 1 FROM messages WHERE id = $1 AND conversation_id = $2",
        )
        .bind(message_id)
        .bind(conversation_id)
        .fetch_optional(db)
        .await?;
        if belongs.is_none() {
            tracing::warn!(%conversation_id, %message_id, "read receipt for unknown message");
            return Ok(None);
        }

        sqlx::query(
            "INSERT INTO message_reads (message_id, user_id) VALUES ($1, $2) \
             ON CONFLICT (message_id, user_id) DO NOTHING",
        )
        .bind(message_id)
        .bind(user_id)
        .execute(db)
        .await?;

        ConversationService::get_view(db, conversation_id).await
    }
}
